use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Реестр мьютексов по id заказа.
///
/// Все переходы одного заказа (методы Payme, правка позиций, истечение брони)
/// выполняются под его мьютексом, поэтому перечитывание заказа под замком
/// видит результат предыдущего перехода.
#[derive(Default)]
pub struct OrderLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn acquire(&self, order_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self.registry().entry(order_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Удаляет мьютексы, которые никто не держит и не ждёт.
    pub fn evict_idle(&self) -> usize {
        let mut locks = self.registry();
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.registry().len()
    }
}
