//! Dashboard statistics
//!
//! [`AggregationEngine`] computes a [`StatsSnapshot`] from the log store and
//! the metadata store: totals, the trailing-24h error rate and latency, the
//! slowest endpoints, the most recent error and an hourly trend.
//!
//! Sub-statistics are independent. When one fails the snapshot still comes
//! back, with that statistic at its zero value, its name in
//! `partial_failures` and the responsible dependency marked unhealthy.
//!
//! # Example
//!
//! ```no_run
//! use log_dashboard::analytics::AggregationEngine;
//! use log_dashboard::metadata::InMemoryMetadataStore;
//! use log_dashboard::state::InMemoryCache;
//! use log_dashboard::store::InMemoryLogStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = AggregationEngine::new(
//!         Arc::new(InMemoryLogStore::new()),
//!         Arc::new(InMemoryCache::new(1_000)),
//!         Arc::new(InMemoryMetadataStore::new()),
//!     );
//!
//!     let snapshot = engine.compute_snapshot(chrono::Utc::now()).await?;
//!     println!("error rate: {}%", snapshot.error_rate);
//!
//!     Ok(())
//! }
//! ```

mod engine;
mod snapshot;

pub use engine::{AggregationEngine, CACHE_SERVICE, METADATA_SERVICE, STORE_SERVICE};
pub use snapshot::{
    percentage, EndpointLatency, HealthStatus, HourlyBucket, ServiceHealth, StatsSnapshot,
    SystemHealth,
};
