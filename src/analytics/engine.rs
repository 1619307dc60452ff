//! Aggregation engine for the dashboard statistics

use crate::analytics::snapshot::{
    percentage, EndpointLatency, HourlyBucket, ServiceHealth, StatsSnapshot, SystemHealth,
};
use crate::error::{AppError, Result};
use crate::metadata::MetadataStore;
use crate::metrics::STATS_PARTIAL_FAILURES_TOTAL;
use crate::search::filter::SortOrder;
use crate::search::query::{LogField, Query, QueryBuilder, SortKey};
use crate::state::KvCache;
use crate::store::{Aggregation, BucketKey, BucketOrder, LogStore, Metric};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const STORE_SERVICE: &str = "elasticsearch";
pub const CACHE_SERVICE: &str = "redis";
pub const METADATA_SERVICE: &str = "metadata";

/// Length of the trailing window
const WINDOW_HOURS: i64 = 24;

/// Number of endpoints in the slowest-endpoints list
const SLOWEST_ENDPOINTS: usize = 3;

/// Computes dashboard statistics from the log store and the metadata store
pub struct AggregationEngine {
    store: Arc<dyn LogStore>,
    cache: Arc<dyn KvCache>,
    metadata: Arc<dyn MetadataStore>,
}

/// Collects failed sub-statistics while a snapshot is assembled
struct Degradations {
    failures: Vec<String>,
    health: SystemHealth,
}

impl Degradations {
    /// Unwrap a sub-statistic, recording its failure against `service`
    fn settle<T: Default, E: Display>(
        &mut self,
        stat: &str,
        service: &str,
        backend: &str,
        result: std::result::Result<T, E>,
    ) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(stat, service, error = %e, "Statistic unavailable, using zero value");
                STATS_PARTIAL_FAILURES_TOTAL.with_label_values(&[stat]).inc();
                self.failures.push(stat.to_string());
                self.health
                    .mark(service, ServiceHealth::unhealthy(backend, e.to_string()));
                T::default()
            }
        }
    }
}

impl AggregationEngine {
    pub fn new(
        store: Arc<dyn LogStore>,
        cache: Arc<dyn KvCache>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            store,
            cache,
            metadata,
        }
    }

    /// Ping every dependency concurrently
    #[instrument(skip(self))]
    pub async fn check_health(&self) -> SystemHealth {
        let (store, cache, metadata) = futures::join!(
            self.store.ping(),
            self.cache.ping(),
            self.metadata.ping()
        );

        let mut services = BTreeMap::new();
        services.insert(
            STORE_SERVICE.to_string(),
            health_of(self.store.name(), store),
        );
        services.insert(
            CACHE_SERVICE.to_string(),
            health_of(self.cache.name(), cache),
        );
        services.insert(
            METADATA_SERVICE.to_string(),
            health_of(self.metadata.name(), metadata),
        );

        let health = SystemHealth::from_services(services);
        if !health.healthy {
            warn!(services = ?health.services, "Dependencies unhealthy");
        }
        health
    }

    /// Compute every dashboard statistic as of `now`.
    ///
    /// Fails only when the log store cannot be reached at all. Any other
    /// failing sub-statistic is reported with its zero value and listed in
    /// `partial_failures`.
    #[instrument(skip(self))]
    pub async fn compute_snapshot(&self, now: DateTime<Utc>) -> Result<StatsSnapshot> {
        if let Err(e) = self.store.ping().await {
            warn!(backend = self.store.name(), error = %e, "Log store unreachable");
            return Err(AppError::StoreUnavailable(e.to_string()));
        }

        let window_start = now - Duration::hours(WINDOW_HOURS);
        let window = Query::match_all().with_filter(QueryBuilder::time_window(window_start, now));
        let window_errors = window.clone().with_filter(QueryBuilder::server_errors());
        let hours = hourly_ranges(window_start);

        let avg_aggs = [(
            "avg".to_string(),
            Aggregation::Metric(Metric::Avg(LogField::ResponseTime)),
        )];
        let users_aggs = [(
            "users".to_string(),
            Aggregation::Metric(Metric::Cardinality(LogField::UserId)),
        )];
        let slowest_aggs = [(
            "slowest".to_string(),
            Aggregation::Terms {
                field: LogField::Endpoint,
                size: SLOWEST_ENDPOINTS,
                order: BucketOrder::MetricDesc("avg".to_string()),
                metrics: vec![("avg".to_string(), Metric::Avg(LogField::ResponseTime))],
            },
        )];
        let hourly_aggs = [(
            "hourly".to_string(),
            Aggregation::DateRanges {
                field: LogField::Timestamp,
                ranges: hours.clone(),
                metrics: vec![
                    (
                        "errors".to_string(),
                        Metric::FilteredCount(QueryBuilder::server_errors()),
                    ),
                    ("avg".to_string(), Metric::Avg(LogField::ResponseTime)),
                ],
            },
        )];
        let latest_error_query = Query::match_all()
            .with_filter(QueryBuilder::error_levels())
            .with_sort(SortKey::Field(LogField::Timestamp), SortOrder::Desc)
            .with_limit(1);
        let everything = Query::match_all();

        let (
            total_logs,
            total_logs_24h,
            error_count_24h,
            avg,
            users,
            slowest,
            latest_error,
            hourly,
            files_uploaded,
            cache_ping,
            metadata_ping,
        ) = futures::join!(
            self.store.count(&everything),
            self.store.count(&window),
            self.store.count(&window_errors),
            self.store.aggregate(&window, &avg_aggs),
            self.store.aggregate(&window, &users_aggs),
            self.store.aggregate(&window, &slowest_aggs),
            self.store.search(&latest_error_query),
            self.store.aggregate(&window, &hourly_aggs),
            self.metadata.count_uploads(),
            self.cache.ping(),
            self.metadata.ping(),
        );

        let mut services = BTreeMap::new();
        services.insert(
            STORE_SERVICE.to_string(),
            ServiceHealth::healthy(self.store.name()),
        );
        services.insert(
            CACHE_SERVICE.to_string(),
            health_of(self.cache.name(), cache_ping),
        );
        services.insert(
            METADATA_SERVICE.to_string(),
            health_of(self.metadata.name(), metadata_ping),
        );
        let mut degraded = Degradations {
            failures: Vec::new(),
            health: SystemHealth::from_services(services),
        };

        let store = self.store.name();
        let total_logs = degraded.settle("total_logs", STORE_SERVICE, store, total_logs);
        let total_logs_24h =
            degraded.settle("total_logs_24h", STORE_SERVICE, store, total_logs_24h);
        let error_count_24h =
            degraded.settle("error_count_24h", STORE_SERVICE, store, error_count_24h);

        let avg_response_time = degraded
            .settle("avg_response_time", STORE_SERVICE, store, avg)
            .metric("avg")
            .map(|avg| avg.round() as u64)
            .unwrap_or(0);

        let active_users = degraded
            .settle("active_users", STORE_SERVICE, store, users)
            .metric("users")
            .map(|count| count as u64)
            .unwrap_or(0);

        let top_slowest_endpoints = degraded
            .settle("top_slowest_endpoints", STORE_SERVICE, store, slowest)
            .buckets("slowest")
            .iter()
            .filter_map(|bucket| {
                let endpoint = bucket.term()?;
                let avg = bucket.metric("avg")?;
                Some(EndpointLatency {
                    endpoint: endpoint.to_string(),
                    avg_response_time: round2(avg),
                    requests: bucket.doc_count,
                })
            })
            .collect();

        let latest_error = degraded
            .settle("latest_error", STORE_SERVICE, store, latest_error)
            .hits
            .into_iter()
            .next();

        let hourly = degraded.settle("hourly_trend", STORE_SERVICE, store, hourly);
        let hourly_trend = hours
            .iter()
            .map(|&(from, to)| {
                let bucket = hourly.buckets("hourly").iter().find(|bucket| {
                    matches!(bucket.key, BucketKey::Range { from: f, to: t } if f == from && t == to)
                });
                HourlyBucket {
                    hour: from,
                    total: bucket.map(|b| b.doc_count).unwrap_or(0),
                    errors: bucket
                        .and_then(|b| b.metric("errors"))
                        .map(|count| count as u64)
                        .unwrap_or(0),
                    avg_response_time: bucket
                        .and_then(|b| b.metric("avg"))
                        .map(|avg| avg.round() as u64)
                        .unwrap_or(0),
                }
            })
            .collect();

        let files_uploaded = degraded.settle(
            "files_uploaded",
            METADATA_SERVICE,
            self.metadata.name(),
            files_uploaded,
        );

        let snapshot = StatsSnapshot {
            total_logs,
            total_logs_24h,
            error_count_24h,
            error_rate: percentage(error_count_24h, total_logs_24h),
            avg_response_time,
            top_slowest_endpoints,
            active_users,
            latest_error,
            hourly_trend,
            files_uploaded,
            health: degraded.health,
            partial_failures: degraded.failures,
            computed_at: now,
        };

        info!(
            total_logs = snapshot.total_logs,
            total_logs_24h = snapshot.total_logs_24h,
            error_rate = snapshot.error_rate,
            partial_failures = snapshot.partial_failures.len(),
            "Computed statistics snapshot"
        );

        Ok(snapshot)
    }
}

fn health_of<E: Display>(backend: &str, result: std::result::Result<(), E>) -> ServiceHealth {
    match result {
        Ok(()) => ServiceHealth::healthy(backend),
        Err(e) => ServiceHealth::unhealthy(backend, e.to_string()),
    }
}

/// Consecutive one-hour ranges covering the window, oldest first
fn hourly_ranges(window_start: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    (0..WINDOW_HOURS)
        .map(|i| {
            let from = window_start + Duration::hours(i);
            (from, from + Duration::hours(1))
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{InMemoryMetadataStore, UploadRecord};
    use crate::models::{HttpMethod, LogEntry, LogLevel};
    use crate::state::InMemoryCache;
    use crate::store::{InMemoryLogStore, StoreOperation};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap()
    }

    struct Fixture {
        store: Arc<InMemoryLogStore>,
        cache: Arc<InMemoryCache>,
        metadata: Arc<InMemoryMetadataStore>,
        engine: AggregationEngine,
    }

    fn fixture(entries: Vec<LogEntry>) -> Fixture {
        let store = Arc::new(InMemoryLogStore::with_entries(entries));
        let cache = Arc::new(InMemoryCache::new(100));
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let engine = AggregationEngine::new(store.clone(), cache.clone(), metadata.clone());
        Fixture {
            store,
            cache,
            metadata,
            engine,
        }
    }

    fn upload(id: &str) -> UploadRecord {
        UploadRecord {
            file_id: id.to_string(),
            original_filename: format!("{}.csv", id),
            file_type: "csv".to_string(),
            file_size: 1024,
            record_count: 10,
            upload_timestamp: now(),
            processing_status: "uploaded".to_string(),
        }
    }

    fn sample_entries() -> Vec<LogEntry> {
        let now = now();
        vec![
            // Outside the window
            LogEntry::new(now - Duration::hours(30), LogLevel::Critical, "Disk full")
                .with_request(HttpMethod::Post, "/api/upload", 507, 100),
            LogEntry::new(now - Duration::minutes(90), LogLevel::Info, "Listed users")
                .with_request(HttpMethod::Get, "/api/users", 200, 100)
                .with_user("u1"),
            LogEntry::new(now - Duration::minutes(80), LogLevel::Error, "Payment gateway timeout")
                .with_request(HttpMethod::Post, "/api/payments", 504, 3000)
                .with_user("u2"),
            LogEntry::new(now - Duration::minutes(20), LogLevel::Info, "Listed users")
                .with_request(HttpMethod::Get, "/api/users", 200, 300)
                .with_user("u1"),
            LogEntry::new(now - Duration::minutes(10), LogLevel::Warning, "Slow order lookup")
                .with_request(HttpMethod::Get, "/api/orders", 200, 1000)
                .with_user("u3"),
        ]
    }

    #[tokio::test]
    async fn test_snapshot_statistics() {
        let f = fixture(sample_entries());
        f.metadata.record_upload(upload("a"));
        f.metadata.record_upload(upload("b"));

        let snapshot = f.engine.compute_snapshot(now()).await.unwrap();

        assert_eq!(snapshot.total_logs, 5);
        assert_eq!(snapshot.total_logs_24h, 4);
        assert_eq!(snapshot.error_count_24h, 1);
        assert_eq!(snapshot.error_rate, 25.0);
        assert_eq!(snapshot.avg_response_time, 1100);
        assert_eq!(snapshot.active_users, 3);
        assert_eq!(snapshot.files_uploaded, 2);
        assert!(snapshot.partial_failures.is_empty());
        assert!(snapshot.health.healthy);
        assert_eq!(snapshot.computed_at, now());

        let endpoints: Vec<_> = snapshot
            .top_slowest_endpoints
            .iter()
            .map(|e| (e.endpoint.as_str(), e.avg_response_time, e.requests))
            .collect();
        assert_eq!(
            endpoints,
            vec![
                ("/api/payments", 3000.0, 1),
                ("/api/orders", 1000.0, 1),
                ("/api/users", 200.0, 2),
            ]
        );

        let latest = snapshot.latest_error.unwrap();
        assert_eq!(latest.entry.message, "Payment gateway timeout");
    }

    #[tokio::test]
    async fn test_hourly_trend_buckets() {
        let f = fixture(sample_entries());
        let snapshot = f.engine.compute_snapshot(now()).await.unwrap();
        let trend = &snapshot.hourly_trend;

        assert_eq!(trend.len(), 24);
        assert_eq!(trend[0].hour, now() - Duration::hours(24));
        assert_eq!(trend[23].hour, now() - Duration::hours(1));

        // -90m and -80m fall in [now-2h, now-1h)
        assert_eq!(trend[22].total, 2);
        assert_eq!(trend[22].errors, 1);
        assert_eq!(trend[22].avg_response_time, 1550);

        assert_eq!(trend[23].total, 2);
        assert_eq!(trend[23].errors, 0);
        assert_eq!(trend[23].avg_response_time, 650);

        let total: u64 = trend.iter().map(|bucket| bucket.total).sum();
        assert_eq!(total, snapshot.total_logs_24h);
    }

    #[tokio::test]
    async fn test_empty_window() {
        let f = fixture(Vec::new());
        let snapshot = f.engine.compute_snapshot(now()).await.unwrap();

        assert_eq!(snapshot.total_logs, 0);
        assert_eq!(snapshot.total_logs_24h, 0);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.avg_response_time, 0);
        assert_eq!(snapshot.active_users, 0);
        assert!(snapshot.top_slowest_endpoints.is_empty());
        assert!(snapshot.latest_error.is_none());
        assert_eq!(snapshot.hourly_trend.len(), 24);
        assert!(snapshot
            .hourly_trend
            .iter()
            .all(|bucket| bucket.total == 0 && bucket.errors == 0));
        assert!(snapshot.partial_failures.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_fails() {
        let f = fixture(sample_entries());
        f.store.set_available(false);

        let err = f.engine.compute_snapshot(now()).await.unwrap_err();
        assert!(err.is_store_unavailable());
    }

    #[tokio::test]
    async fn test_partial_failures() {
        let f = fixture(sample_entries());
        f.store.fail(StoreOperation::Aggregate);
        f.metadata.set_available(false);

        let snapshot = f.engine.compute_snapshot(now()).await.unwrap();

        // Counts and search still work
        assert_eq!(snapshot.total_logs, 5);
        assert_eq!(snapshot.error_count_24h, 1);
        assert!(snapshot.latest_error.is_some());

        assert_eq!(snapshot.avg_response_time, 0);
        assert_eq!(snapshot.active_users, 0);
        assert!(snapshot.top_slowest_endpoints.is_empty());
        assert_eq!(snapshot.hourly_trend.len(), 24);
        assert_eq!(snapshot.files_uploaded, 0);

        for stat in [
            "avg_response_time",
            "active_users",
            "top_slowest_endpoints",
            "hourly_trend",
            "files_uploaded",
        ] {
            assert!(snapshot.partial_failures.iter().any(|s| s == stat), "{}", stat);
        }
        assert!(!snapshot.health.healthy);
        assert!(!snapshot.health.service(STORE_SERVICE).unwrap().is_healthy());
        assert!(!snapshot.health.service(METADATA_SERVICE).unwrap().is_healthy());
        assert!(snapshot.health.service(CACHE_SERVICE).unwrap().is_healthy());
    }

    #[tokio::test]
    async fn test_check_health() {
        let f = fixture(Vec::new());
        let health = f.engine.check_health().await;
        assert!(health.healthy);
        assert_eq!(health.services.len(), 3);
        assert_eq!(health.service(STORE_SERVICE).unwrap().backend, "memory");

        f.cache.set_available(false);
        let health = f.engine.check_health().await;
        assert!(!health.healthy);
        let redis = health.service(CACHE_SERVICE).unwrap();
        assert!(!redis.is_healthy());
        assert!(redis.error.is_some());
    }
}
