//! Shared fixtures for the integration tests
//!
//! Wires the router to in-memory backends and a mock clock so tests can
//! switch dependencies off and move time forward.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use log_dashboard::{
    analytics::AggregationEngine,
    api::{build_router, AppState},
    config::QueryLimits,
    metadata::InMemoryMetadataStore,
    models::{HttpMethod, LogEntry, LogLevel},
    search::{QueryBuilder, SearchService},
    state::{CacheAside, InMemoryCache, MockClock},
    store::InMemoryLogStore,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const RESULT_TTL_SECS: u64 = 15;

pub struct TestApp {
    pub store: Arc<InMemoryLogStore>,
    pub kv: Arc<InMemoryCache>,
    pub metadata: Arc<InMemoryMetadataStore>,
    pub clock: Arc<MockClock>,
    pub router: Router,
}

/// Fixed "now" of every test
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap()
}

pub fn test_app(entries: Vec<LogEntry>) -> TestApp {
    let store = Arc::new(InMemoryLogStore::with_entries(entries));
    let kv = Arc::new(InMemoryCache::new(1_000));
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let clock = Arc::new(MockClock::with_time(base_time()));

    let search = Arc::new(SearchService::new(
        store.clone(),
        QueryBuilder::new(QueryLimits::default()),
    ));
    let analytics = Arc::new(AggregationEngine::new(
        store.clone(),
        kv.clone(),
        metadata.clone(),
    ));
    let cache = Arc::new(CacheAside::new(
        kv.clone(),
        clock.clone(),
        std::time::Duration::from_secs(86_400),
    ));

    let state = AppState::new(
        search,
        analytics,
        cache,
        std::time::Duration::from_secs(RESULT_TTL_SECS),
    );
    let router = build_router(state, std::time::Duration::from_secs(30));

    TestApp {
        store,
        kv,
        metadata,
        clock,
        router,
    }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send_json(request).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send_json(post_request(uri, &body)).await
    }

    /// Raw response for non-JSON endpoints
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, header::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request).await;
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }
}

pub fn post_request(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const ENDPOINTS: [&str; 4] = ["/api/users", "/api/orders", "/api/payments", "/api/search"];

/// 1000 records, one per minute back from `now`.
///
/// - 0..12: ERROR with a 5xx status
/// - 12..30: ERROR with a 4xx status
/// - 30..50: WARNING with a 5xx status
/// - remainder: INFO or DEBUG with a 2xx status
pub fn mixed_corpus(now: DateTime<Utc>) -> Vec<LogEntry> {
    (0..1000)
        .map(|i: i64| {
            let (level, status, message) = match i {
                0..=11 => (LogLevel::Error, 500 + (i % 4) as u16, "Upstream failure"),
                12..=29 => (LogLevel::Error, 404, "Resource not found"),
                30..=49 => (LogLevel::Warning, 503, "Service degraded"),
                _ if i % 5 == 0 => (LogLevel::Debug, 200, "Cache lookup"),
                _ => (LogLevel::Info, 200, "Request completed"),
            };
            let endpoint = ENDPOINTS[(i % 4) as usize];

            LogEntry::new(now - Duration::minutes(i), level, message)
                .with_request(HttpMethod::Get, endpoint, status, 20 + (i as u64 % 50))
                .with_user(format!("user-{}", i % 37))
                .with_server(format!("web-{}", i % 3))
        })
        .collect()
}
