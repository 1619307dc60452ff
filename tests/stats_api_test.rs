//! Statistics, cache fallback and health endpoints

mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::{base_time, mixed_corpus, test_app};
use log_dashboard::metadata::UploadRecord;
use log_dashboard::models::{HttpMethod, LogEntry, LogLevel};
use log_dashboard::store::StoreOperation;
use serde_json::json;

fn upload(id: &str) -> UploadRecord {
    UploadRecord {
        file_id: id.to_string(),
        original_filename: format!("{}.json", id),
        file_type: "json".to_string(),
        file_size: 2048,
        record_count: 100,
        upload_timestamp: base_time(),
        processing_status: "uploaded".to_string(),
    }
}

#[tokio::test]
async fn test_stats_snapshot() {
    let app = test_app(mixed_corpus(base_time()));
    app.metadata.record_upload(upload("logs-1"));

    let (status, body) = app.get("/api/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_logs"], 1000);
    assert_eq!(body["total_logs_24h"], 1000);
    // 12 ERROR + 20 WARNING records carry a 5xx status
    assert_eq!(body["error_count_24h"], 32);
    assert_eq!(body["error_rate"], 3.2);
    assert_eq!(body["active_users"], 37);
    assert_eq!(body["files_uploaded"], 1);
    assert_eq!(body["latest_error"]["message"], "Upstream failure");
    assert_eq!(body["top_slowest_endpoints"].as_array().unwrap().len(), 3);
    assert_eq!(body["hourly_trend"].as_array().unwrap().len(), 24);
    assert_eq!(body["health"]["healthy"], true);
    assert_eq!(body["partial_failures"], json!([]));
    assert_eq!(body["cached"], false);
    assert_eq!(body["stale"], false);
    assert!(body.get("cache_error").is_none());
}

#[tokio::test]
async fn test_stats_empty_window() {
    let old = base_time() - Duration::days(3);
    let app = test_app(vec![LogEntry::new(old, LogLevel::Error, "Old failure")
        .with_request(HttpMethod::Get, "/api/users", 500, 900)
        .with_user("u1")]);

    let (status, body) = app.get("/api/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_logs"], 1);
    assert_eq!(body["total_logs_24h"], 0);
    assert_eq!(body["error_rate"], 0.0);
    assert_eq!(body["avg_response_time"], 0);
    assert_eq!(body["active_users"], 0);
    assert_eq!(body["top_slowest_endpoints"], json!([]));
    // Latest error is not bound to the window
    assert_eq!(body["latest_error"]["message"], "Old failure");

    let trend = body["hourly_trend"].as_array().unwrap();
    assert_eq!(trend.len(), 24);
    assert!(trend.iter().all(|bucket| bucket["total"] == 0));
}

#[tokio::test]
async fn test_stats_cache_hit_then_stale_fallback() {
    let app = test_app(mixed_corpus(base_time()));

    let (_, first) = app.get("/api/stats").await;
    assert_eq!(first["cached"], false);

    // T+10s: fresh entry
    app.clock.advance(Duration::seconds(10));
    let (status, second) = app.get("/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], true);
    assert_eq!(second["stale"], false);
    assert_eq!(second["computed_at"], first["computed_at"]);

    // T+40s with the store down: expired entry served stale
    app.clock.advance(Duration::seconds(30));
    app.store.set_available(false);
    let (status, third) = app.get("/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(third["cached"], true);
    assert_eq!(third["stale"], true);
    assert!(third["cache_error"].as_str().is_some());
    assert_eq!(third["total_logs"], first["total_logs"]);
    assert_eq!(third["computed_at"], first["computed_at"]);

    // Store back: recomputed
    app.store.set_available(true);
    let (_, fourth) = app.get("/api/stats").await;
    assert_eq!(fourth["cached"], false);
    assert_eq!(fourth["stale"], false);
}

#[tokio::test]
async fn test_stats_store_down_without_cache() {
    let app = test_app(mixed_corpus(base_time()));
    app.store.set_available(false);

    let (status, body) = app.get("/api/stats").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "STORE_UNAVAILABLE");
}

#[tokio::test]
async fn test_stats_partial_failure() {
    let app = test_app(mixed_corpus(base_time()));
    app.store.fail(StoreOperation::Search);

    let (status, body) = app.get("/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_logs"], 1000);
    assert!(body["latest_error"].is_null());
    assert_eq!(body["partial_failures"], json!(["latest_error"]));
    assert_eq!(body["health"]["healthy"], false);
    assert_eq!(body["health"]["services"]["elasticsearch"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_stats_survive_cache_outage() {
    let app = test_app(mixed_corpus(base_time()));
    app.kv.set_available(false);

    let (status, body) = app.get("/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_logs"], 1000);
    assert_eq!(body["cached"], false);
    assert_eq!(body["health"]["services"]["redis"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(Vec::new());

    let (status, body) = app.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    for service in ["elasticsearch", "redis", "metadata"] {
        assert_eq!(body["services"][service]["status"], "healthy", "{}", service);
    }

    app.metadata.set_available(false);
    let (status, body) = app.get("/api/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["healthy"], false);
    assert_eq!(body["services"]["metadata"]["status"], "unhealthy");
    assert!(body["services"]["metadata"]["error"].as_str().is_some());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let _ = log_dashboard::metrics::init_metrics();
    let app = test_app(Vec::new());

    app.get("/api/health").await;

    let request = axum::http::Request::builder()
        .uri("/metrics")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("log_dashboard_http_requests_total"));
    assert!(text.contains("path=\"/api/health\""));
}
