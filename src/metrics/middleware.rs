//! HTTP middleware recording request count, duration and in-flight gauge
//!
//! Paths are labelled by their route template so that ids in the URL do not
//! blow up label cardinality.
use super::*;
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Scrape endpoint is not itself measured
const EXCLUDED_PATHS: &[&str] = &["/metrics"];

/// Axum middleware function for metrics collection
///
/// # Example
/// ```no_run
/// use axum::{Router, middleware};
/// use log_dashboard::metrics::track_metrics;
///
/// let app: Router = Router::new()
///     .layer(middleware::from_fn(track_metrics));
/// ```
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    if EXCLUDED_PATHS.contains(&path.as_str()) {
        return next.run(req).await;
    }

    HTTP_REQUESTS_IN_FLIGHT.inc();
    let start = Instant::now();
    let response = next.run(req).await;
    HTTP_REQUESTS_IN_FLIGHT.dec();

    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_requests_are_counted_by_route_template() {
        let app = Router::new()
            .route("/probe/:id", get(|| async { "ok" }))
            .layer(middleware::from_fn(track_metrics));

        let before = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/probe/:id", "200"])
            .get();

        let response = app
            .oneshot(Request::builder().uri("/probe/42").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(
            HTTP_REQUESTS_TOTAL
                .with_label_values(&["GET", "/probe/:id", "200"])
                .get(),
            before + 1.0
        );
    }

    #[tokio::test]
    async fn test_scrape_endpoint_excluded() {
        let app = Router::new()
            .route("/metrics", get(|| async { "" }))
            .layer(middleware::from_fn(track_metrics));

        let before = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/metrics", "200"])
            .get();

        app.oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(
            HTTP_REQUESTS_TOTAL
                .with_label_values(&["GET", "/metrics", "200"])
                .get(),
            before
        );
    }
}
