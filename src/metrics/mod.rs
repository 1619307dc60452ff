//! Prometheus metrics for the dashboard backend.
//!
//! Covers HTTP request handling, cache-aside lookups and document store
//! round trips. Everything is registered on [`PROMETHEUS_REGISTRY`] by
//! [`init_metrics`] and exposed in text format by [`gather_metrics`].
//!
//! # Example
//! ```no_run
//! use log_dashboard::metrics::CACHE_LOOKUPS_TOTAL;
//!
//! CACHE_LOOKUPS_TOTAL.with_label_values(&["stats", "hit"]).inc();
//! ```

mod middleware;

pub use middleware::track_metrics;

use crate::store::StoreResult;
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::time::Duration;

const NAMESPACE: &str = "log_dashboard";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Total number of HTTP requests received
    ///
    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests")
            .namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// HTTP request duration in seconds
    ///
    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    /// Requests currently being handled
    pub static ref HTTP_REQUESTS_IN_FLIGHT: Gauge = Gauge::with_opts(
        Opts::new("http_requests_in_flight", "HTTP requests currently being handled")
            .namespace(NAMESPACE)
    ).expect("Failed to create HTTP_REQUESTS_IN_FLIGHT metric");

    // ============================================================================
    // Cache Metrics
    // ============================================================================

    /// Cache-aside lookups by outcome
    ///
    /// Labels: namespace (stats, search, levels, endpoints), outcome (hit, miss, stale)
    pub static ref CACHE_LOOKUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("cache_lookups_total", "Cache-aside lookups by outcome")
            .namespace(NAMESPACE),
        &["namespace", "outcome"]
    ).expect("Failed to create CACHE_LOOKUPS_TOTAL metric");

    /// Key-value backend failures that were degraded to a miss
    ///
    /// Labels: operation (get, set)
    pub static ref CACHE_BACKEND_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("cache_backend_errors_total", "Key-value cache backend failures")
            .namespace(NAMESPACE),
        &["operation"]
    ).expect("Failed to create CACHE_BACKEND_ERRORS_TOTAL metric");

    // ============================================================================
    // Document Store Metrics
    // ============================================================================

    /// Document store requests by outcome
    ///
    /// Labels: operation (ping, count, search, aggregate), outcome
    pub static ref STORE_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("store_requests_total", "Document store requests")
            .namespace(NAMESPACE),
        &["operation", "outcome"]
    ).expect("Failed to create STORE_REQUESTS_TOTAL metric");

    /// Document store request duration in seconds
    ///
    /// Labels: operation
    pub static ref STORE_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "store_request_duration_seconds",
            "Document store request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"]
    ).expect("Failed to create STORE_REQUEST_DURATION_SECONDS metric");

    /// Statistics snapshots computed with at least one failed sub-statistic
    ///
    /// Labels: component
    pub static ref STATS_PARTIAL_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("stats_partial_failures_total", "Failed statistics sub-computations")
            .namespace(NAMESPACE),
        &["component"]
    ).expect("Failed to create STATS_PARTIAL_FAILURES_TOTAL metric");
}

/// Register all metrics with the global registry
///
/// Fails if called twice in one process.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(CACHE_LOOKUPS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(CACHE_BACKEND_ERRORS_TOTAL.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(STORE_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(STORE_REQUEST_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(STATS_PARTIAL_FAILURES_TOTAL.clone()))?;

    tracing::info!("Prometheus metrics registered");
    Ok(())
}

/// Record one document store round trip
pub fn record_store_operation<T>(operation: &str, elapsed: Duration, result: &StoreResult<T>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    STORE_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
    STORE_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(elapsed.as_secs_f64());
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
