use super::{CacheError, CacheResult, KvCache};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Redis-backed key-value cache
///
/// The connection is established on first use, so the service starts even
/// when Redis is down and picks it up once it comes back.
pub struct RedisCache {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    key_prefix: String,
    op_timeout: Duration,
}

impl RedisCache {
    /// Create a new Redis cache with custom key prefix
    pub fn new(redis_url: &str, prefix: &str, op_timeout: Duration) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            AppError::Configuration(format!("Failed to create Redis client: {}", e))
        })?;

        tracing::info!("Initialized Redis cache with prefix '{}'", prefix);

        Ok(Self {
            client,
            connection: OnceCell::new(),
            key_prefix: prefix.to_string(),
            op_timeout,
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn connection(&self) -> CacheResult<ConnectionManager> {
        let connection = self
            .bounded(async {
                self.connection
                    .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
                    .await
                    .cloned()
            })
            .await
            .map_err(|e| match e {
                CacheError::Backend(reason) => CacheError::Unavailable(reason),
                other => other,
            })?;
        Ok(connection)
    }

    /// Apply the per-operation timeout
    async fn bounded<T, F>(&self, operation: F) -> CacheResult<T>
    where
        F: Future<Output = std::result::Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout, operation).await {
            Ok(result) => result.map_err(|e| CacheError::Backend(e.to_string())),
            Err(_) => Err(CacheError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl KvCache for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection().await?;
        let key = self.key(key);
        self.bounded(async move {
            redis::cmd("GET")
                .arg(&key)
                .query_async::<_, Option<String>>(&mut conn)
                .await
        })
        .await
    }

    async fn set_with_expiry(&self, key: &str, value: String, expiry: Duration) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let key = self.key(key);
        let seconds = expiry.as_secs().max(1);
        self.bounded(async move {
            redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("EX")
                .arg(seconds)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        self.bounded(async move {
            redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
        })
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RedisCache::new("not a url", "logdash:", Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_keys_are_prefixed() {
        let cache =
            RedisCache::new("redis://127.0.0.1:6379", "logdash:", Duration::from_millis(100))
                .unwrap();
        assert_eq!(cache.key("stats:snapshot"), "logdash:stats:snapshot");
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_fast() {
        // Nothing listens on port 1
        let cache =
            RedisCache::new("redis://127.0.0.1:1", "logdash:", Duration::from_millis(300)).unwrap();
        assert!(cache.ping().await.is_err());
        assert!(cache.get("anything").await.is_err());
    }
}
