//! Заказы: создание с бронью мест, правка позиций, пересчёт суммы.
//!
//! Каждое изменение проходит один и тот же конвейер:
//! проверка -> пересчёт суммы по живым ценам -> сохранение -> побочные эффекты.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::OrderError;
use crate::models::order::compute_amount;
use crate::models::{HoldWindow, LineItem, NewLineItem, NewOrder, Order};
use crate::repository::{OrderRepository, SeatLedger, UserRepository};
use crate::services::expiry::ExpiryScheduler;
use crate::services::order_locks::OrderLocks;
use crate::services::side_effects::SideEffects;

pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    seats: Arc<dyn SeatLedger>,
    users: Arc<dyn UserRepository>,
    locks: Arc<OrderLocks>,
    scheduler: Arc<ExpiryScheduler>,
    effects: SideEffects,
    hold: chrono::Duration,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        seats: Arc<dyn SeatLedger>,
        users: Arc<dyn UserRepository>,
        locks: Arc<OrderLocks>,
        scheduler: Arc<ExpiryScheduler>,
        effects: SideEffects,
        hold: chrono::Duration,
    ) -> Self {
        Self {
            orders,
            seats,
            users,
            locks,
            scheduler,
            effects,
            hold,
        }
    }

    pub async fn create(&self, request: NewOrder) -> Result<Order, OrderError> {
        request.validate()?;

        if self.users.find(request.user).await?.is_none() {
            return Err(OrderError::UserNotFound(request.user));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = request.seats.iter().find(|item| !seen.insert(item.seat)) {
            return Err(OrderError::DuplicateSeat(dup.seat));
        }

        let items: Vec<LineItem> = request.seats.into_iter().map(LineItem::from).collect();
        let hold = HoldWindow::starting_at(Utc::now(), self.hold);
        let mut order = Order::new(request.user, items, hold);
        let seat_ids = order.seat_ids();

        self.seats
            .claim(order.id, &seat_ids, order.time.end_time)
            .await?;

        if let Err(e) = self.persist(&mut order).await {
            self.compensate(order.id, &seat_ids).await;
            return Err(e);
        }

        self.scheduler.arm(order.id, order.time.end_time).await;
        info!(
            "Order {} created for user {}: {} seats, {} сум",
            order.id,
            order.user,
            seat_ids.len(),
            order.amount
        );

        self.effects.order_changed(order.clone());
        Ok(order)
    }

    pub async fn get(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.orders
            .find(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_by_user(user_id).await?)
    }

    /// Добавляет позицию и бронирует её место до конца окна удержания заказа.
    pub async fn add_seat(&self, order_id: Uuid, item: NewLineItem) -> Result<Order, OrderError> {
        item.validate()?;
        let _guard = self.locks.acquire(order_id).await;

        let mut order = self.editable(order_id).await?;
        if order.contains_seat(item.seat) {
            return Err(OrderError::DuplicateSeat(item.seat));
        }

        let seat_id = item.seat;
        self.seats
            .claim(order.id, &[seat_id], order.time.end_time)
            .await?;
        order.seats.push(LineItem::from(item));

        if let Err(e) = self.persist(&mut order).await {
            self.compensate(order.id, &[seat_id]).await;
            return Err(e);
        }

        info!("Seat {} added to order {}, amount {} сум", seat_id, order.id, order.amount);
        self.effects.order_changed(order.clone());
        Ok(order)
    }

    /// Убирает позицию и освобождает её место.
    pub async fn remove_seat(&self, order_id: Uuid, line_item_id: Uuid) -> Result<Order, OrderError> {
        let _guard = self.locks.acquire(order_id).await;

        let mut order = self.editable(order_id).await?;
        let position = order
            .seats
            .iter()
            .position(|item| item.id == line_item_id)
            .ok_or(OrderError::LineItemNotFound(line_item_id))?;
        let removed = order.seats.remove(position);

        // Место освобождаем до сохранения: при сбое заказ не меняется
        self.seats.release(order.id, &[removed.seat]).await?;

        if let Err(e) = self.persist(&mut order).await {
            self.reclaim(order.id, removed.seat, order.time.end_time).await;
            return Err(e);
        }

        info!("Seat {} removed from order {}, amount {} сум", removed.seat, order.id, order.amount);
        self.effects.order_changed(order.clone());
        Ok(order)
    }

    /// Пересчитывает сумму по текущим ценам мест.
    pub async fn recompute_amount(&self, order: &mut Order) -> Result<(), OrderError> {
        let priced = self.seats.find_priceable(&order.seat_ids()).await?;
        order.amount = compute_amount(&order.seats, &priced)?;
        Ok(())
    }

    /// Пересчёт суммы и сохранение. Все записи заказа идут через этот метод.
    pub async fn persist(&self, order: &mut Order) -> Result<(), OrderError> {
        self.recompute_amount(order).await?;
        self.orders.save(order).await?;
        Ok(())
    }

    async fn editable(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let order = self.get(order_id).await?;
        if !order.is_editable() {
            return Err(OrderError::NotEditable(order.id, order.status));
        }
        Ok(order)
    }

    async fn reclaim(&self, order_id: Uuid, seat_id: i64, expires_at: DateTime<Utc>) {
        if let Err(e) = self.seats.claim(order_id, &[seat_id], expires_at).await {
            warn!("Seat {} left order {} unsaved and could not be held again: {}", seat_id, order_id, e);
        }
    }

    async fn compensate(&self, order_id: Uuid, seat_ids: &[i64]) {
        if let Err(e) = self.seats.release(order_id, seat_ids).await {
            warn!("Failed to roll back seat hold for order {}: {}", order_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrderError;
    use crate::models::{OrderStatus, SeatStatus};
    use crate::services::testing::Harness;

    fn line(seat: i64) -> NewLineItem {
        NewLineItem {
            event_title: Some("Concert".to_string()),
            date: None,
            start_time: None,
            card_image: None,
            seat,
        }
    }

    #[tokio::test]
    async fn create_claims_seats_and_sums_prices() {
        let h = Harness::new().await;
        let order = h
            .orders
            .create(NewOrder { user: 1, seats: vec![line(1), line(2)] })
            .await
            .unwrap();

        assert_eq!(order.amount, 50000);
        assert_eq!(order.status, OrderStatus::NotPaid);
        assert_eq!(order.state, None);
        assert_eq!(order.time.end_time - order.time.start_time, chrono::Duration::minutes(15));
        assert!(h.scheduler.is_armed(order.id).await);

        let seat = h.seats.get(1).await.unwrap();
        assert_eq!(seat.status, SeatStatus::Reserved);
        assert_eq!(seat.order_id, Some(order.id));
        assert_eq!(seat.expiration_time, Some(order.time.end_time));

        h.settle().await;
        assert_eq!(h.notifier.statuses().await, vec![OrderStatus::NotPaid]);
    }

    #[tokio::test]
    async fn create_fails_without_side_effects_when_seat_taken() {
        let h = Harness::new().await;
        h.orders
            .create(NewOrder { user: 1, seats: vec![line(2)] })
            .await
            .unwrap();

        let err = h
            .orders
            .create(NewOrder { user: 1, seats: vec![line(1), line(2)] })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::SeatUnavailable(2)));
        assert_eq!(h.seats.get(1).await.unwrap().status, SeatStatus::Free);
    }

    #[tokio::test]
    async fn create_rejects_unknown_user_and_duplicates() {
        let h = Harness::new().await;
        let err = h
            .orders
            .create(NewOrder { user: 404, seats: vec![line(1)] })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::UserNotFound(404)));

        let err = h
            .orders
            .create(NewOrder { user: 1, seats: vec![line(1), line(1)] })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::DuplicateSeat(1)));

        let err = h
            .orders
            .create(NewOrder { user: 1, seats: vec![] })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
    }

    #[tokio::test]
    async fn add_and_remove_seat_keep_amount_in_sync() {
        let h = Harness::new().await;
        let order = h
            .orders
            .create(NewOrder { user: 1, seats: vec![line(1)] })
            .await
            .unwrap();
        assert_eq!(order.amount, 20000);

        let order = h.orders.add_seat(order.id, line(2)).await.unwrap();
        assert_eq!(order.amount, 50000);
        assert_eq!(h.seats.get(2).await.unwrap().order_id, Some(order.id));

        let first = order.seats[0].id;
        let order = h.orders.remove_seat(order.id, first).await.unwrap();
        assert_eq!(order.amount, 30000);
        assert_eq!(h.seats.get(1).await.unwrap().status, SeatStatus::Free);

        let stored = h.orders.get(order.id).await.unwrap();
        assert_eq!(stored.amount, 30000);
        assert_eq!(stored.seat_ids(), vec![2]);
    }

    #[tokio::test]
    async fn failed_release_leaves_line_item_in_place() {
        let h = Harness::new().await;
        let order = h
            .orders
            .create(NewOrder { user: 1, seats: vec![line(1), line(2)] })
            .await
            .unwrap();

        h.ledger.fail_next_release();
        let first = order.seats[0].id;
        assert!(matches!(
            h.orders.remove_seat(order.id, first).await,
            Err(OrderError::Store(_))
        ));

        let stored = h.orders.get(order.id).await.unwrap();
        assert_eq!(stored.seat_ids(), vec![1, 2]);
        assert_eq!(stored.amount, 50000);
        assert_eq!(h.seats.get(1).await.unwrap().order_id, Some(order.id));

        let order = h.orders.remove_seat(order.id, first).await.unwrap();
        assert_eq!(order.seat_ids(), vec![2]);
        assert_eq!(h.seats.get(1).await.unwrap().status, SeatStatus::Free);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_creates_for_one_seat_have_one_winner() {
        let h = Harness::new().await;
        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let orders = h.orders.clone();
                tokio::spawn(async move {
                    orders
                        .create(NewOrder { user: 1, seats: vec![line(3)] })
                        .await
                })
            })
            .collect();

        let mut winners = Vec::new();
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(order) => winners.push(order),
                Err(e) => assert!(matches!(e, OrderError::SeatUnavailable(3)), "{e}"),
            }
        }

        assert_eq!(winners.len(), 1);
        let seat = h.seats.get(3).await.unwrap();
        assert_eq!(seat.status, SeatStatus::Reserved);
        assert_eq!(seat.order_id, Some(winners[0].id));
        assert_eq!(h.orders.list_by_user(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn amount_follows_live_prices() {
        let h = Harness::new().await;
        let order = h
            .orders
            .create(NewOrder { user: 1, seats: vec![line(1)] })
            .await
            .unwrap();

        h.seats.set_price(1, 25000).await;
        let order = h.orders.add_seat(order.id, line(2)).await.unwrap();
        assert_eq!(order.amount, 55000);
    }

    #[tokio::test]
    async fn edits_are_rejected_once_invoiced() {
        let h = Harness::new().await;
        let mut order = h
            .orders
            .create(NewOrder { user: 1, seats: vec![line(1)] })
            .await
            .unwrap();
        order.status = OrderStatus::Invoiced;
        h.order_repo.save(&order).await.unwrap();

        let err = h.orders.add_seat(order.id, line(2)).await.unwrap_err();
        assert!(matches!(err, OrderError::NotEditable(_, OrderStatus::Invoiced)));
        assert_eq!(h.seats.get(2).await.unwrap().status, SeatStatus::Free);
    }

    #[tokio::test]
    async fn missing_order_and_line_item() {
        let h = Harness::new().await;
        let missing = Uuid::new_v4();
        assert!(matches!(h.orders.get(missing).await, Err(OrderError::OrderNotFound(id)) if id == missing));
        assert!(matches!(
            h.orders.add_seat(missing, line(1)).await,
            Err(OrderError::OrderNotFound(_))
        ));

        let order = h
            .orders
            .create(NewOrder { user: 1, seats: vec![line(1)] })
            .await
            .unwrap();
        assert!(matches!(
            h.orders.remove_seat(order.id, Uuid::new_v4()).await,
            Err(OrderError::LineItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_by_user_returns_only_their_orders() {
        let h = Harness::new().await;
        h.orders
            .create(NewOrder { user: 1, seats: vec![line(1)] })
            .await
            .unwrap();
        h.orders
            .create(NewOrder { user: 2, seats: vec![line(2)] })
            .await
            .unwrap();

        let mine = h.orders.list_by_user(1).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].user, 1);
    }
}
