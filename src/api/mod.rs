pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::analytics::AggregationEngine;
use crate::export::CsvExporter;
use crate::search::SearchService;
use crate::state::CacheAside;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    pub analytics: Arc<AggregationEngine>,
    pub cache: Arc<CacheAside>,
    pub exporter: CsvExporter,

    /// Freshness window of cached search and facet results
    pub result_ttl: Duration,
}

impl AppState {
    pub fn new(
        search: Arc<SearchService>,
        analytics: Arc<AggregationEngine>,
        cache: Arc<CacheAside>,
        result_ttl: Duration,
    ) -> Self {
        Self {
            search,
            analytics,
            cache,
            exporter: CsvExporter::new(),
            result_ttl,
        }
    }
}
