use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{OrderRepository, SeatLedger, UserRepository};
use crate::error::{LedgerError, StoreError};
use crate::models::{Order, OrderStatus, Seat, SeatStatus, User};

/// Места в памяти. Один мьютекс на всё хранилище, поэтому claim набора атомарен.
#[derive(Default)]
pub struct MemorySeatLedger {
    seats: Mutex<HashMap<i64, Seat>>,
}

impl MemorySeatLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, seat: Seat) {
        self.seats.lock().await.insert(seat.id, seat);
    }

    pub async fn get(&self, id: i64) -> Option<Seat> {
        self.seats.lock().await.get(&id).cloned()
    }

    pub async fn set_price(&self, id: i64, price: i64) {
        if let Some(seat) = self.seats.lock().await.get_mut(&id) {
            seat.price = price;
        }
    }
}

#[async_trait]
impl SeatLedger for MemorySeatLedger {
    async fn find_priceable(&self, ids: &[i64]) -> Result<Vec<Seat>, StoreError> {
        let seats = self.seats.lock().await;
        Ok(ids.iter().filter_map(|id| seats.get(id).cloned()).collect())
    }

    async fn claim(
        &self,
        holder: Uuid,
        ids: &[i64],
        expires_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut seats = self.seats.lock().await;

        // Сначала проверяем весь набор, потом меняем
        for id in ids {
            let seat = seats.get(id).ok_or(LedgerError::SeatNotFound(*id))?;
            let claimable = seat.status == SeatStatus::Free
                || (seat.status == SeatStatus::Reserved && seat.is_held_by(holder));
            if !claimable {
                return Err(LedgerError::SeatUnavailable(*id));
            }
        }

        let now = Utc::now();
        for id in ids {
            if let Some(seat) = seats.get_mut(id) {
                if seat.status == SeatStatus::Free {
                    seat.status = SeatStatus::Reserved;
                    seat.order_id = Some(holder);
                    seat.booking_time = Some(now);
                    seat.expiration_time = Some(expires_at);
                }
            }
        }
        Ok(())
    }

    async fn release(&self, holder: Uuid, ids: &[i64]) -> Result<usize, StoreError> {
        let mut seats = self.seats.lock().await;
        let mut released = 0;
        for id in ids {
            if let Some(seat) = seats.get_mut(id) {
                if seat.status != SeatStatus::Free && seat.is_held_by(holder) {
                    seat.status = SeatStatus::Free;
                    seat.order_id = None;
                    seat.booking_time = None;
                    seat.expiration_time = None;
                    released += 1;
                }
            }
        }
        Ok(released)
    }

    async fn finalize(&self, holder: Uuid, ids: &[i64]) -> Result<usize, StoreError> {
        let mut seats = self.seats.lock().await;
        let mut sold = 0;
        for id in ids {
            if let Some(seat) = seats.get_mut(id) {
                if seat.status == SeatStatus::Reserved && seat.is_held_by(holder) {
                    seat.status = SeatStatus::Occupied;
                    seat.expiration_time = None;
                    sold += 1;
                }
            }
        }
        Ok(sold)
    }
}

#[derive(Default)]
pub struct MemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl MemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        if let Some(tx) = &order.transaction_id {
            let taken = orders
                .values()
                .any(|o| o.id != order.id && o.transaction_id.as_ref() == Some(tx));
            if taken {
                return Err(StoreError::Corrupt(format!(
                    "transaction {} already belongs to another order",
                    tx
                )));
            }
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_transaction(&self, transaction_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.user == user_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.time.start_time);
        Ok(orders)
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect())
    }

    async fn list_created_between(&self, from: i64, to: i64) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.transaction_id.is_some())
            .filter(|o| o.create_time.is_some_and(|t| t >= from && t <= to))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.create_time);
        Ok(orders)
    }

    async fn delete_if_unpaid(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut orders = self.orders.write().await;
        match orders.get(&id) {
            Some(order) if order.status == OrderStatus::NotPaid => {
                orders.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<i64, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}
