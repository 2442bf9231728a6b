use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use super::CacheStore;
use crate::error::StoreUnavailable;

fn unavailable(e: redis::RedisError) -> StoreUnavailable {
    StoreUnavailable(e.to_string())
}

/// Redis-backed store shared by every source of a deployment.
pub struct RedisStore {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    /// Parses the url only; the connection is made on first use.
    pub fn open(url: &str) -> Result<Self, StoreUnavailable> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
        })
    }

    async fn conn(&self) -> Result<MultiplexedConnection, StoreUnavailable> {
        let mut slot = self.conn.lock().await;
        if let Some(c) = slot.as_ref() {
            return Ok(c.clone());
        }
        let c = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        *slot = Some(c.clone());
        Ok(c)
    }

    async fn reset(&self) {
        *self.conn.lock().await = None;
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T, StoreUnavailable>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let conn = self.conn().await?;
        match op(conn).await {
            Ok(v) => Ok(v),
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() {
                    self.reset().await;
                }
                Err(unavailable(e))
            }
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreUnavailable> {
        self.run(|mut c| async move { c.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreUnavailable> {
        // SET EX rejects 0
        let secs = ttl.as_secs().max(1);
        self.run(|mut c| async move { c.set_ex::<_, _, ()>(key, value, secs).await })
            .await
    }

    async fn set_forever(&self, key: &str, value: &str) -> Result<(), StoreUnavailable> {
        self.run(|mut c| async move { c.set::<_, _, ()>(key, value).await })
            .await
    }
}
