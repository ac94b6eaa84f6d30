//! Хранилище id сообщений бота о выставленных счетах.
//!
//! Когда заказ выставлен (INVOICED), бот публикует сообщение в группу
//! ожидающих заказов и запоминает его id. При оплате уведомление об оплате
//! отправляется ответом на это сообщение. Запись удаляется, как только заказ
//! стал PAID или CANCELLED, и в любом случае живёт не дольше TTL.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::StoreError;
use crate::redis_client::RedisClient;

#[async_trait]
pub trait PendingMessageStore: Send + Sync {
    async fn remember(&self, order_id: Uuid, message_id: i64) -> Result<(), StoreError>;

    /// Возвращает id сообщения и удаляет запись.
    async fn take(&self, order_id: Uuid) -> Result<Option<i64>, StoreError>;
}

pub struct RedisPendingMessages {
    redis: RedisClient,
    ttl_seconds: u64,
}

impl RedisPendingMessages {
    pub fn new(redis: RedisClient, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }

    fn key(order_id: Uuid) -> String {
        format!("pending_message:{}", order_id)
    }
}

#[async_trait]
impl PendingMessageStore for RedisPendingMessages {
    async fn remember(&self, order_id: Uuid, message_id: i64) -> Result<(), StoreError> {
        self.redis
            .set_ex(&Self::key(order_id), message_id, self.ttl_seconds)
            .await?;
        Ok(())
    }

    async fn take(&self, order_id: Uuid) -> Result<Option<i64>, StoreError> {
        Ok(self.redis.take(&Self::key(order_id)).await?)
    }
}

pub struct MemoryPendingMessages {
    entries: Mutex<HashMap<Uuid, (i64, Instant)>>,
    ttl: Duration,
}

impl MemoryPendingMessages {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl PendingMessageStore for MemoryPendingMessages {
    async fn remember(&self, order_id: Uuid, message_id: i64) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(order_id, (message_id, now + self.ttl));
        Ok(())
    }

    async fn take(&self, order_id: Uuid) -> Result<Option<i64>, StoreError> {
        let entry = self.entries.lock().await.remove(&order_id);
        Ok(entry
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(message_id, _)| message_id))
    }
}
