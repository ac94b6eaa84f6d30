//! Хранилища мест, заказов и пользователей.
//!
//! Сервисы работают только через эти трейты: в проде за ними стоит Postgres,
//! в тестах и при `STORAGE_BACKEND=memory` — реализации в памяти.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{LedgerError, StoreError};
use crate::models::{Order, OrderStatus, Seat, User};

pub use memory::{MemoryOrderRepository, MemorySeatLedger, MemoryUserRepository};
pub use postgres::{PgOrderRepository, PgSeatLedger, PgUserRepository};

/// Учёт доступности мест.
///
/// Все переходы идемпотентны: место, уже находящееся в целевом состоянии у
/// того же заказа, пропускается без ошибки.
#[async_trait]
pub trait SeatLedger: Send + Sync {
    /// Текущие цены и статусы; отсутствующие id просто не попадают в ответ.
    async fn find_priceable(&self, ids: &[i64]) -> Result<Vec<Seat>, StoreError>;

    /// Атомарно free -> reserved для всего набора. Если хоть одно место занято
    /// другим заказом, не меняется ничего.
    async fn claim(
        &self,
        holder: Uuid,
        ids: &[i64],
        expires_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    /// reserved/occupied -> free для мест этого заказа. Возвращает число освобождённых.
    async fn release(&self, holder: Uuid, ids: &[i64]) -> Result<usize, StoreError>;

    /// reserved -> occupied (продажа) для мест этого заказа.
    async fn finalize(&self, holder: Uuid, ids: &[i64]) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Вставка или полная перезапись заказа вместе с позициями.
    async fn save(&self, order: &Order) -> Result<(), StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn find_by_transaction(&self, transaction_id: &str) -> Result<Option<Order>, StoreError>;

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Order>, StoreError>;

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, StoreError>;

    /// Заказы с транзакцией, у которых from <= create_time <= to, по возрастанию create_time.
    async fn list_created_between(&self, from: i64, to: i64) -> Result<Vec<Order>, StoreError>;

    /// Удаляет заказ только если он всё ещё NOT_PAID.
    async fn delete_if_unpaid(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find(&self, id: i64) -> Result<Option<User>, StoreError>;
}
