//! Общая обвязка для тестов сервисов: хранилища в памяти и записывающие
//! уведомитель с почтой.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{LedgerError, StoreError};
use crate::models::{OrderStatus, Seat, SeatStatus, User};
use crate::repository::{MemoryOrderRepository, MemorySeatLedger, MemoryUserRepository, SeatLedger};
use crate::services::expiry::ExpiryScheduler;
use crate::services::mailer::EmailSender;
use crate::services::notifier::{OrderNotifier, OrderSnapshot};
use crate::services::order_locks::OrderLocks;
use crate::services::orders::OrderService;
use crate::services::payme::PaymeService;
use crate::services::side_effects::SideEffects;

#[derive(Default)]
pub struct RecordingNotifier {
    snapshots: Mutex<Vec<OrderSnapshot>>,
}

impl RecordingNotifier {
    pub async fn statuses(&self) -> Vec<OrderStatus> {
        self.snapshots.lock().await.iter().map(|s| s.status).collect()
    }
}

#[async_trait]
impl OrderNotifier for RecordingNotifier {
    async fn order_changed(&self, snapshot: &OrderSnapshot) -> anyhow::Result<()> {
        self.snapshots.lock().await.push(snapshot.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    recipients: Mutex<Vec<String>>,
}

impl RecordingMailer {
    pub async fn sent(&self) -> Vec<String> {
        self.recipients.lock().await.clone()
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, to: &str, _subject: &str, _body: &str) -> anyhow::Result<()> {
        self.recipients.lock().await.push(to.to_string());
        Ok(())
    }
}

/// Учёт мест в памяти, у которого можно уронить следующий `release`.
pub struct FlakyLedger {
    inner: Arc<MemorySeatLedger>,
    fail_release: AtomicBool,
}

impl FlakyLedger {
    pub fn new(inner: Arc<MemorySeatLedger>) -> Self {
        Self {
            inner,
            fail_release: AtomicBool::new(false),
        }
    }

    pub fn fail_next_release(&self) {
        self.fail_release.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SeatLedger for FlakyLedger {
    async fn find_priceable(&self, ids: &[i64]) -> Result<Vec<Seat>, StoreError> {
        self.inner.find_priceable(ids).await
    }

    async fn claim(
        &self,
        holder: Uuid,
        ids: &[i64],
        expires_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.inner.claim(holder, ids, expires_at).await
    }

    async fn release(&self, holder: Uuid, ids: &[i64]) -> Result<usize, StoreError> {
        if self.fail_release.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Corrupt("connection reset".to_string()));
        }
        self.inner.release(holder, ids).await
    }

    async fn finalize(&self, holder: Uuid, ids: &[i64]) -> Result<usize, StoreError> {
        self.inner.finalize(holder, ids).await
    }
}

pub fn seat(id: i64, price: i64) -> Seat {
    Seat {
        id,
        category: "VIP 1".to_string(),
        sector: "A".to_string(),
        row: 1,
        number: id as i32,
        price,
        color: None,
        status: SeatStatus::Free,
        order_id: None,
        booking_time: None,
        expiration_time: None,
    }
}

/// Сервисы на хранилищах в памяти: пользователи 1 (с почтой) и 2,
/// места 1..3 по 20000, 30000 и 10000 сум, бронь на 15 минут.
pub struct Harness {
    pub orders: Arc<OrderService>,
    pub payme: PaymeService,
    pub scheduler: Arc<ExpiryScheduler>,
    pub seats: Arc<MemorySeatLedger>,
    pub ledger: Arc<FlakyLedger>,
    pub order_repo: Arc<MemoryOrderRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub mailer: Arc<RecordingMailer>,
}

impl Harness {
    pub async fn new() -> Self {
        let seats = Arc::new(MemorySeatLedger::new());
        seats.insert(seat(1, 20000)).await;
        seats.insert(seat(2, 30000)).await;
        seats.insert(seat(3, 10000)).await;
        let ledger = Arc::new(FlakyLedger::new(seats.clone()));

        let users = Arc::new(MemoryUserRepository::new());
        users
            .insert(User {
                id: 1,
                first_name: "Ali".to_string(),
                last_name: "Valiyev".to_string(),
                phone_number: "+998901234567".to_string(),
                email: Some("ali@example.com".to_string()),
            })
            .await;
        users
            .insert(User {
                id: 2,
                first_name: "Dilnoza".to_string(),
                last_name: String::new(),
                phone_number: "+998907654321".to_string(),
                email: None,
            })
            .await;

        let order_repo = Arc::new(MemoryOrderRepository::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let mailer = Arc::new(RecordingMailer::default());
        let locks = Arc::new(OrderLocks::new());

        let scheduler = Arc::new(ExpiryScheduler::new(
            order_repo.clone(),
            ledger.clone(),
            locks.clone(),
        ));
        let effects = SideEffects::new(notifier.clone(), mailer.clone(), users.clone(), ledger.clone());
        let orders = Arc::new(OrderService::new(
            order_repo.clone(),
            ledger.clone(),
            users,
            locks.clone(),
            scheduler.clone(),
            effects.clone(),
            chrono::Duration::minutes(15),
        ));
        let payme = PaymeService::new(
            order_repo.clone(),
            ledger.clone(),
            orders.clone(),
            locks,
            scheduler.clone(),
            effects,
        );

        Harness {
            orders,
            payme,
            scheduler,
            seats,
            ledger,
            order_repo,
            notifier,
            mailer,
        }
    }

    /// Даёт фоновым задачам побочных эффектов доработать.
    pub async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
