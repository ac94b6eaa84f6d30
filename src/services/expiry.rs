//! Истечение брони неоплаченных заказов.
//!
//! На каждый заказ в NOT_PAID заводится отменяемая задача, которая срабатывает
//! в момент `time.endTime`. Задача снимается, как только заказ уходит из
//! NOT_PAID. Само истечение выполняется под мьютексом заказа и удаляет его
//! только если он всё ещё NOT_PAID, поэтому запоздавший таймер не может
//! удалить выставленный или оплаченный заказ.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::OrderStatus;
use crate::repository::{OrderRepository, SeatLedger};
use crate::services::order_locks::OrderLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// Заказ удалён, места освобождены.
    Expired { released: usize },
    /// Провайдер уже подключился к заказу, бронь не трогаем.
    Kept(OrderStatus),
    /// Заказа уже нет.
    Missing,
}

struct Job {
    generation: u64,
    handle: AbortHandle,
}

pub struct ExpiryScheduler {
    orders: Arc<dyn OrderRepository>,
    seats: Arc<dyn SeatLedger>,
    locks: Arc<OrderLocks>,
    jobs: Mutex<HashMap<Uuid, Job>>,
    generation: AtomicU64,
}

impl ExpiryScheduler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        seats: Arc<dyn SeatLedger>,
        locks: Arc<OrderLocks>,
    ) -> Self {
        Self {
            orders,
            seats,
            locks,
            jobs: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Заводит (или перезаводит) таймер заказа. Уже истёкшая бронь
    /// обрабатывается сразу, отдельной задачей.
    pub async fn arm(self: &Arc<Self>, order_id: Uuid, end_time: DateTime<Utc>) {
        let delay = (end_time - Utc::now()).to_std().unwrap_or_default();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        // Задача не снимет свою запись раньше, чем мы её вставим
        let mut jobs = self.jobs.lock().await;
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.fire(order_id, generation).await;
        });

        let job = Job {
            generation,
            handle: task.abort_handle(),
        };
        if let Some(previous) = jobs.insert(order_id, job) {
            previous.handle.abort();
        }
        debug!("Expiry armed for order {} in {:?}", order_id, delay);
    }

    /// Снимает таймер заказа. Возвращает true, если таймер был.
    pub async fn cancel(&self, order_id: Uuid) -> bool {
        match self.jobs.lock().await.remove(&order_id) {
            Some(job) => {
                job.handle.abort();
                debug!("Expiry cancelled for order {}", order_id);
                true
            }
            None => false,
        }
    }

    pub async fn is_armed(&self, order_id: Uuid) -> bool {
        self.jobs.lock().await.contains_key(&order_id)
    }

    async fn fire(&self, order_id: Uuid, generation: u64) {
        {
            let mut jobs = self.jobs.lock().await;
            match jobs.get(&order_id) {
                Some(job) if job.generation == generation => {
                    jobs.remove(&order_id);
                }
                // Таймер уже перезаведён или снят
                _ => return,
            }
        }

        match self.expire(order_id).await {
            Ok(ExpiryOutcome::Expired { released }) => {
                info!("Order {} expired, {} seats released", order_id, released)
            }
            Ok(outcome) => debug!("Expiry of order {} skipped: {:?}", order_id, outcome),
            Err(e) => error!("Expiry of order {} failed: {}", order_id, e),
        }
    }

    /// Истечение брони: освобождает места заказа, если он всё ещё NOT_PAID,
    /// и затем удаляет его.
    ///
    /// Места освобождаются до удаления: если освобождение не удалось, заказ
    /// остаётся NOT_PAID и следующий проход `sweep_overdue` повторит попытку.
    pub async fn expire(&self, order_id: Uuid) -> Result<ExpiryOutcome, StoreError> {
        let _guard = self.locks.acquire(order_id).await;

        let Some(order) = self.orders.find(order_id).await? else {
            return Ok(ExpiryOutcome::Missing);
        };
        if order.status != OrderStatus::NotPaid {
            return Ok(ExpiryOutcome::Kept(order.status));
        }

        let released = self.seats.release(order_id, &order.seat_ids()).await?;
        if !self.orders.delete_if_unpaid(order_id).await? {
            warn!("Order {} vanished while its hold was expiring", order_id);
            return Ok(ExpiryOutcome::Missing);
        }
        Ok(ExpiryOutcome::Expired { released })
    }

    /// Заводит таймеры для всех NOT_PAID заказов (таймеры не переживают рестарт).
    pub async fn rearm_pending(self: &Arc<Self>) -> Result<usize, StoreError> {
        let pending = self.orders.list_by_status(OrderStatus::NotPaid).await?;
        for order in &pending {
            self.arm(order.id, order.time.end_time).await;
        }
        Ok(pending.len())
    }

    /// Истекает все просроченные NOT_PAID заказы, чей таймер потерялся.
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let pending = self.orders.list_by_status(OrderStatus::NotPaid).await?;
        let mut expired = 0;

        for order in pending.iter().filter(|o| o.time.is_over(now)) {
            self.cancel(order.id).await;
            match self.expire(order.id).await {
                Ok(ExpiryOutcome::Expired { .. }) => expired += 1,
                Ok(_) => {}
                Err(e) => error!("Sweep failed to expire order {}: {}", order.id, e),
            }
        }

        self.locks.evict_idle();
        Ok(expired)
    }
}
