use crate::analytics::{StatsSnapshot, SystemHealth};
use crate::api::AppState;
use crate::error::Result;
use crate::export::{export_filename, CSV_CONTENT_TYPE};
use crate::metrics::gather_metrics;
use crate::models::LogHit;
use crate::search::{FilterCriteria, FilterParams, LevelCount, SearchPage};
use crate::state::cache_aside::STATS_TTL;
use crate::state::Cached;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

const STATS_KEY: &str = "stats:snapshot";
const LEVELS_KEY: &str = "levels:all";
const ENDPOINTS_KEY: &str = "endpoints:all";

/// Records returned by `/api/logs/recent` when no limit is given
const DEFAULT_RECENT_LIMIT: usize = 50;

/// Validate filters and run a cached paged search
async fn cached_search(state: &AppState, params: &FilterParams) -> Result<Cached<SearchPage>> {
    let criteria = FilterCriteria::normalize(params, state.search.builder().limits())?;
    let key = format!("search:{}", criteria.fingerprint());

    let cached = state
        .cache
        .get_or_compute(&key, state.result_ttl, || state.search.search(&criteria))
        .await?;
    Ok(cached)
}

/// Staleness marker carried by responses served through the cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Freshness {
    /// Past its freshness window because recomputation failed
    pub stale: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_error: Option<String>,
}

impl<T> From<&Cached<T>> for Freshness {
    fn from(cached: &Cached<T>) -> Self {
        Self {
            stale: cached.stale,
            cache_error: cached.error.clone(),
        }
    }
}

/// Search logs with query-string filters
pub async fn search_logs(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> Result<Json<LogSearchResponse>> {
    let cached = cached_search(&state, &params).await?;
    let freshness = Freshness::from(&cached);
    let page = cached.value;

    Ok(Json(LogSearchResponse {
        success: true,
        pagination: PaginationInfo::from(&page),
        logs: page.records,
        freshness,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogSearchResponse {
    pub success: bool,
    pub logs: Vec<LogHit>,
    pub pagination: PaginationInfo,
    #[serde(flatten)]
    pub freshness: Freshness,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub page: usize,
    pub per_page: usize,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl From<&SearchPage> for PaginationInfo {
    fn from(page: &SearchPage) -> Self {
        Self {
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            total_pages: page.total_pages(),
            has_next: page.has_next(),
            has_prev: page.has_prev(),
        }
    }
}

/// Search logs with filters in a JSON body
pub async fn advanced_search(
    State(state): State<AppState>,
    Json(params): Json<FilterParams>,
) -> Result<Json<AdvancedSearchResponse>> {
    let cached = cached_search(&state, &params).await?;
    let freshness = Freshness::from(&cached);
    let page = cached.value;

    Ok(Json(AdvancedSearchResponse {
        success: true,
        total: page.total,
        page: page.page,
        pages: page.total_pages(),
        per_page: page.per_page,
        results: page.records,
        freshness,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdvancedSearchResponse {
    pub success: bool,
    pub results: Vec<LogHit>,
    pub total: u64,
    pub page: usize,
    pub pages: u64,
    pub per_page: usize,
    #[serde(flatten)]
    pub freshness: Freshness,
}

/// Dashboard statistics, served from cache when fresh
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let now = state.cache.clock().now();
    let cached = state
        .cache
        .get_or_compute(STATS_KEY, STATS_TTL, || state.analytics.compute_snapshot(now))
        .await?;

    Ok(Json(StatsResponse::from(cached)))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub snapshot: StatsSnapshot,

    /// Served from the cache rather than computed for this request
    pub cached: bool,

    /// Past its freshness window because recomputation failed
    pub stale: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_error: Option<String>,

    pub cached_at: DateTime<Utc>,
}

impl From<Cached<StatsSnapshot>> for StatsResponse {
    fn from(cached: Cached<StatsSnapshot>) -> Self {
        Self {
            snapshot: cached.value,
            cached: cached.from_cache,
            stale: cached.stale,
            cache_error: cached.error,
            cached_at: cached.cached_at,
        }
    }
}

/// Record count per level
pub async fn logs_by_level(State(state): State<AppState>) -> Result<Json<LevelsResponse>> {
    let cached = state
        .cache
        .get_or_compute(LEVELS_KEY, state.result_ttl, || state.search.count_by_level())
        .await?;

    Ok(Json(LevelsResponse {
        freshness: Freshness::from(&cached),
        levels: cached.value,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LevelsResponse {
    pub levels: Vec<LevelCount>,
    #[serde(flatten)]
    pub freshness: Freshness,
}

/// Distinct endpoints for the endpoint picker
pub async fn list_endpoints(State(state): State<AppState>) -> Result<Json<EndpointsResponse>> {
    let cached = state
        .cache
        .get_or_compute(ENDPOINTS_KEY, state.result_ttl, || state.search.endpoints())
        .await?;

    Ok(Json(EndpointsResponse {
        success: true,
        freshness: Freshness::from(&cached),
        endpoints: cached.value,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndpointsResponse {
    pub success: bool,
    pub endpoints: Vec<String>,
    #[serde(flatten)]
    pub freshness: Freshness,
}

/// Most recent records
pub async fn recent_logs(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Result<Json<RecentLogsResponse>> {
    let logs = state
        .search
        .recent(params.limit.unwrap_or(DEFAULT_RECENT_LIMIT))
        .await?;

    Ok(Json(RecentLogsResponse {
        success: true,
        count: logs.len(),
        logs,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecentLogsResponse {
    pub success: bool,
    pub count: usize,
    pub logs: Vec<LogHit>,
}

/// Matching records as a CSV attachment
pub async fn export_logs(
    State(state): State<AppState>,
    Json(params): Json<FilterParams>,
) -> Result<Response> {
    let criteria = FilterCriteria::normalize(&params, state.search.builder().limits())?;
    let hits = state.search.export_hits(&criteria).await?;
    let body = state.exporter.render(&hits)?;
    let filename = export_filename(state.cache.clock().now());

    info!(rows = hits.len(), filename = %filename, "Exported logs");

    Ok((
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

/// Per-dependency health; 503 unless every dependency is healthy
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<SystemHealth>) {
    let health = state.analytics.check_health().await;
    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

/// Prometheus scrape endpoint
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}
