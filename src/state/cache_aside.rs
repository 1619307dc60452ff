//! Cache-aside with stale fallback
//!
//! Fresh entries are served directly. Expired entries trigger a recompute;
//! if that fails the expired entry is served marked stale. Entries are kept
//! in the backing store for the retention period, well past their TTL, so
//! that a fallback value survives a long outage.
//!
//! Concurrent recomputes of one key are not coordinated: the last write
//! wins, and since every compute of a key derives from the same inputs the
//! only cost is an extra compute.

use super::{Clock, KvCache};
use crate::error::Result;
use crate::metrics::{CACHE_BACKEND_ERRORS_TOTAL, CACHE_LOOKUPS_TOTAL};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Freshness window of the statistics snapshot
pub const STATS_TTL: Duration = Duration::from_secs(30);

/// Serialized form of a cached value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.cached_at);
        age < chrono::Duration::seconds(self.ttl_secs as i64)
    }
}

/// A value together with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,

    /// Served from the cache rather than computed for this request
    pub from_cache: bool,

    /// Past its TTL; served because recomputation failed
    pub stale: bool,

    /// Why recomputation failed, when stale
    pub error: Option<String>,

    pub cached_at: DateTime<Utc>,
}

pub struct CacheAside {
    cache: Arc<dyn KvCache>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl CacheAside {
    pub fn new(cache: Arc<dyn KvCache>, clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self {
            cache,
            clock,
            retention,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn backend(&self) -> &Arc<dyn KvCache> {
        &self.cache
    }

    /// Serve `key` from cache when fresh, otherwise compute and store it.
    ///
    /// A failed compute falls back to the expired entry if there is one and
    /// propagates the failure otherwise.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Cached<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let namespace = key.split(':').next().unwrap_or(key);
        let now = self.clock.now();

        let existing = match self.read::<T>(key).await {
            Some(entry) if entry.is_fresh(now) => {
                debug!(key, "Cache hit");
                CACHE_LOOKUPS_TOTAL.with_label_values(&[namespace, "hit"]).inc();
                return Ok(Cached {
                    value: entry.data,
                    from_cache: true,
                    stale: false,
                    error: None,
                    cached_at: entry.cached_at,
                });
            }
            other => other,
        };

        match compute().await {
            Ok(value) => {
                CACHE_LOOKUPS_TOTAL.with_label_values(&[namespace, "miss"]).inc();
                let entry = CacheEntry {
                    data: value,
                    cached_at: self.clock.now(),
                    ttl_secs: ttl.as_secs(),
                };
                self.write(key, &entry).await;

                Ok(Cached {
                    value: entry.data,
                    from_cache: false,
                    stale: false,
                    error: None,
                    cached_at: entry.cached_at,
                })
            }
            Err(e) => match existing {
                Some(entry) => {
                    warn!(
                        key,
                        cached_at = %entry.cached_at,
                        error = %e,
                        "Recompute failed, serving stale cache entry"
                    );
                    CACHE_LOOKUPS_TOTAL.with_label_values(&[namespace, "stale"]).inc();
                    Ok(Cached {
                        value: entry.data,
                        from_cache: true,
                        stale: true,
                        error: Some(e.to_string()),
                        cached_at: entry.cached_at,
                    })
                }
                None => Err(e),
            },
        }
    }

    /// Read an entry; backend and decode failures count as a miss
    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        match self.cache.get(key).await {
            Ok(Some(json)) => match serde_json::from_str::<CacheEntry<T>>(&json) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, backend = self.cache.name(), error = %e, "Cache read failed");
                CACHE_BACKEND_ERRORS_TOTAL.with_label_values(&["get"]).inc();
                None
            }
        }
    }

    /// Best-effort write
    async fn write<T: Serialize>(&self, key: &str, entry: &CacheEntry<T>) {
        let json = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        let expiry = self.retention.max(Duration::from_secs(entry.ttl_secs));
        if let Err(e) = self.cache.set_with_expiry(key, json, expiry).await {
            warn!(key, backend = self.cache.name(), error = %e, "Cache write failed");
            CACHE_BACKEND_ERRORS_TOTAL.with_label_values(&["set"]).inc();
        }
    }
}
