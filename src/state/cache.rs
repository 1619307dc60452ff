use super::{CacheError, CacheResult, KvCache};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process key-value cache using Moka
///
/// Capacity bounded with per-key expiry. Can be switched off to behave
/// like an unreachable backend.
pub struct InMemoryCache {
    cache: Cache<String, Entry>,
    available: AtomicBool,
}

impl InMemoryCache {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            cache,
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    fn check(&self) -> CacheResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("in-memory cache switched off".to_string()))
        }
    }
}

#[async_trait]
impl KvCache for InMemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set_with_expiry(&self, key: &str, value: String, expiry: Duration) -> CacheResult<()> {
        self.check()?;
        self.cache
            .insert(key.to_string(), Entry { value, ttl: expiry })
            .await;
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check()
    }
}
