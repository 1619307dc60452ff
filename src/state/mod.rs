//! Key-value cache and the cache-aside layer built on it

pub mod cache;
pub mod cache_aside;
pub mod clock;
pub mod factory;
pub mod redis_store;

pub use cache::InMemoryCache;
pub use cache_aside::{CacheAside, CacheEntry, Cached};
pub use clock::{Clock, MockClock, SystemClock};
pub use factory::create_cache;
pub use redis_store::RedisCache;

use crate::error::AppError;
use async_trait::async_trait;
use std::time::Duration;

/// Result type for key-value cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backend not reachable
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    /// Operation exceeded its deadline
    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    /// Backend answered with an error
    #[error("Cache backend error: {0}")]
    Backend(String),
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Cache(err.to_string())
    }
}

/// String key-value store with per-key expiry
#[async_trait]
pub trait KvCache: Send + Sync {
    /// Backend name used in logs and health reports
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store `value`, dropping it after `expiry`
    async fn set_with_expiry(&self, key: &str, value: String, expiry: Duration) -> CacheResult<()>;

    async fn ping(&self) -> CacheResult<()>;
}
