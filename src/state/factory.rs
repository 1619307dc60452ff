use crate::config::{CacheBackend, CacheConfig};
use crate::error::{AppError, Result};
use crate::state::{InMemoryCache, KvCache, RedisCache};
use std::sync::Arc;

/// Create the key-value cache based on configuration
pub fn create_cache(config: &CacheConfig) -> Result<Arc<dyn KvCache>> {
    match config.backend {
        CacheBackend::Redis => {
            let redis_url = config.redis_url.as_ref().ok_or_else(|| {
                AppError::Configuration("Redis backend requires 'redis_url' configuration".to_string())
            })?;

            tracing::info!(
                url = %redis_url,
                op_timeout_ms = config.op_timeout_ms,
                "Initializing Redis cache backend"
            );

            let cache = RedisCache::new(redis_url, &config.key_prefix, config.op_timeout())?;
            Ok(Arc::new(cache))
        }

        CacheBackend::Memory => {
            tracing::info!(
                capacity = config.memory_capacity,
                "Initializing in-memory cache backend"
            );
            Ok(Arc::new(InMemoryCache::new(config.memory_capacity)))
        }
    }
}
