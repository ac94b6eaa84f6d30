use redis::{aio::MultiplexedConnection, AsyncCommands, Client, RedisResult};
use tracing::info;

#[derive(Clone)]
pub struct RedisClient {
    pub conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        info!("Redis connected");
        Ok(RedisClient { conn })
    }

    pub async fn set_ex(&self, key: &str, value: i64, ttl_seconds: u64) -> RedisResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex(key, value, ttl_seconds).await
    }

    /// GETDEL: читает и сразу удаляет ключ.
    pub async fn take(&self, key: &str) -> RedisResult<Option<i64>> {
        let mut conn = self.conn.clone();
        conn.get_del(key).await
    }
}
