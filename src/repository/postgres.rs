use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

use super::{OrderRepository, SeatLedger, UserRepository};
use crate::database::Database;
use crate::error::{LedgerError, StoreError};
use crate::models::order::{LineItemRow, OrderRow};
use crate::models::seat::SeatRow;
use crate::models::{LineItem, Order, OrderStatus, Seat, SeatStatus, User};

const ORDER_COLUMNS: &str = "id, user_id, start_time, end_time, amount, transaction_id, \
     create_time, perform_time, cancel_time, state, reason, status, payment_type";

#[derive(Clone)]
pub struct PgSeatLedger {
    pool: PgPool,
}

impl PgSeatLedger {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }
}

#[async_trait]
impl SeatLedger for PgSeatLedger {
    async fn find_priceable(&self, ids: &[i64]) -> Result<Vec<Seat>, StoreError> {
        let rows = sqlx::query_as::<_, SeatRow>(
            "SELECT id, category, sector, \"row\", number, price, color, status, order_id,
                    booking_time, expiration_time
             FROM seats
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn claim(
        &self,
        holder: Uuid,
        ids: &[i64],
        expires_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        // Блокируем строки мест до конца транзакции
        let current: Vec<(i64, String, Option<Uuid>)> = sqlx::query_as(
            "SELECT id, status, order_id FROM seats WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        let by_id: HashMap<i64, (SeatStatus, Option<Uuid>)> = current
            .into_iter()
            .map(|(id, status, order_id)| -> Result<_, StoreError> {
                Ok((id, (status.parse::<SeatStatus>()?, order_id)))
            })
            .collect::<Result<_, StoreError>>()?;

        for id in ids {
            match by_id.get(id) {
                None => return Err(LedgerError::SeatNotFound(*id)),
                Some((SeatStatus::Free, _)) => {}
                Some((SeatStatus::Reserved, owner)) if *owner == Some(holder) => {}
                Some(_) => return Err(LedgerError::SeatUnavailable(*id)),
            }
        }

        // CAS по статусу: трогаем только свободные места
        sqlx::query(
            "UPDATE seats
             SET status = 'reserved', order_id = $2, booking_time = NOW(), expiration_time = $3
             WHERE id = ANY($1) AND status = 'free'",
        )
        .bind(ids)
        .bind(holder)
        .bind(expires_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn release(&self, holder: Uuid, ids: &[i64]) -> Result<usize, StoreError> {
        let result = sqlx::query(
            "UPDATE seats
             SET status = 'free', order_id = NULL, booking_time = NULL, expiration_time = NULL
             WHERE id = ANY($1) AND order_id = $2 AND status <> 'free'",
        )
        .bind(ids)
        .bind(holder)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn finalize(&self, holder: Uuid, ids: &[i64]) -> Result<usize, StoreError> {
        let result = sqlx::query(
            "UPDATE seats
             SET status = 'occupied', expiration_time = NULL
             WHERE id = ANY($1) AND order_id = $2 AND status = 'reserved'",
        )
        .bind(ids)
        .bind(holder)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }
}

#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }

    // Подтягивает позиции для набора заказов одним запросом
    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, LineItemRow>(
            "SELECT id, order_id, seat_id, event_title, event_date, start_time, card_image
             FROM order_seats
             WHERE order_id = ANY($1)
             ORDER BY order_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
        for item in items {
            grouped.entry(item.order_id).or_default().push(item.into());
        }

        rows.into_iter()
            .map(|row| {
                let seats = grouped.remove(&row.id).unwrap_or_default();
                row.into_order(seats)
            })
            .collect()
    }

    async fn fetch_where(&self, clause: &str, bind: OrderFilter<'_>) -> Result<Vec<Order>, StoreError> {
        let sql = format!("SELECT {} FROM orders WHERE {}", ORDER_COLUMNS, clause);
        let query = sqlx::query_as::<_, OrderRow>(&sql);
        let query = match bind {
            OrderFilter::Id(id) => query.bind(id),
            OrderFilter::Transaction(tx) => query.bind(tx),
            OrderFilter::User(user_id) => query.bind(user_id),
            OrderFilter::Status(status) => query.bind(status.as_str()),
            OrderFilter::CreatedBetween(from, to) => query.bind(from).bind(to),
        };
        let rows = query.fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }
}

enum OrderFilter<'a> {
    Id(Uuid),
    Transaction(&'a str),
    User(i64),
    Status(OrderStatus),
    CreatedBetween(i64, i64),
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, start_time, end_time, amount, transaction_id,
                                create_time, perform_time, cancel_time, state, reason, status,
                                payment_type, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
            ON CONFLICT (id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time,
                amount = EXCLUDED.amount,
                transaction_id = EXCLUDED.transaction_id,
                create_time = EXCLUDED.create_time,
                perform_time = EXCLUDED.perform_time,
                cancel_time = EXCLUDED.cancel_time,
                state = EXCLUDED.state,
                reason = EXCLUDED.reason,
                status = EXCLUDED.status,
                payment_type = EXCLUDED.payment_type,
                updated_at = NOW()
            "#,
        )
        .bind(order.id)
        .bind(order.user)
        .bind(order.time.start_time)
        .bind(order.time.end_time)
        .bind(order.amount)
        .bind(order.transaction_id.as_deref())
        .bind(order.create_time)
        .bind(order.perform_time)
        .bind(order.cancel_time)
        .bind(order.state.map(|s| s.code()))
        .bind(order.reason)
        .bind(order.status.as_str())
        .bind(order.payment_type.map(|p| p.as_str()))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM order_seats WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut *tx)
            .await?;

        for (position, item) in order.seats.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_seats (id, order_id, position, seat_id, event_title, event_date,
                                          start_time, card_image)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(item.id)
            .bind(order.id)
            .bind(position as i32)
            .bind(item.seat)
            .bind(item.event_title.as_deref())
            .bind(item.date)
            .bind(item.start_time)
            .bind(item.card_image.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.fetch_where("id = $1", OrderFilter::Id(id)).await?.pop())
    }

    async fn find_by_transaction(&self, transaction_id: &str) -> Result<Option<Order>, StoreError> {
        let mut found = self
            .fetch_where("transaction_id = $1", OrderFilter::Transaction(transaction_id))
            .await?;
        if found.len() > 1 {
            warn!("Transaction {} is linked to {} orders", transaction_id, found.len());
        }
        Ok(found.pop())
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Order>, StoreError> {
        self.fetch_where("user_id = $1 ORDER BY start_time", OrderFilter::User(user_id))
            .await
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, StoreError> {
        self.fetch_where("status = $1", OrderFilter::Status(status)).await
    }

    async fn list_created_between(&self, from: i64, to: i64) -> Result<Vec<Order>, StoreError> {
        self.fetch_where(
            "transaction_id IS NOT NULL AND create_time >= $1 AND create_time <= $2 ORDER BY create_time",
            OrderFilter::CreatedBetween(from, to),
        )
        .await
    }

    async fn delete_if_unpaid(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1 AND status = 'NOT_PAID'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, first_name, last_name, phone_number, email FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
