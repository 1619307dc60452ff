use crate::api::{handlers, AppState};
use crate::metrics::track_metrics;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        // Health and metrics
        .route("/api/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        // Statistics
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/logs/stats/by-level", get(handlers::logs_by_level))
        // Search
        .route("/api/logs/search", get(handlers::search_logs))
        .route("/api/logs/recent", get(handlers::recent_logs))
        .route("/api/search", post(handlers::advanced_search))
        .route("/api/search/endpoints", get(handlers::list_endpoints))
        // Export
        .route("/api/logs/export", post(handlers::export_logs))
        // Per-route so the matched path is known
        .route_layer(middleware::from_fn(track_metrics))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
