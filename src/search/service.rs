//! Search executor: runs built queries against the document store

use crate::error::Result;
use crate::models::LogHit;
use crate::search::filter::{FilterCriteria, SortOrder};
use crate::search::query::{LogField, Query, QueryBuilder, SortKey};
use crate::store::LogStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// Distinct endpoints returned for the endpoint picker
const ENDPOINT_LIMIT: usize = 100;

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub records: Vec<LogHit>,

    /// Documents matching the criteria across all pages
    pub total: u64,

    pub page: usize,

    pub per_page: usize,
}

impl SearchPage {
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(self.per_page as u64)
    }

    pub fn has_next(&self) -> bool {
        (self.page as u64) < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCount {
    pub level: String,
    pub count: u64,
}

/// Executes search, export and facet queries
pub struct SearchService {
    store: Arc<dyn LogStore>,
    builder: QueryBuilder,
}

impl SearchService {
    pub fn new(store: Arc<dyn LogStore>, builder: QueryBuilder) -> Self {
        Self { store, builder }
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    /// Run a paged search
    #[instrument(skip(self, criteria), fields(page = criteria.pagination.page, per_page = criteria.pagination.per_page))]
    pub async fn search(&self, criteria: &FilterCriteria) -> Result<SearchPage> {
        let start = Instant::now();
        let query = self.builder.build(criteria);
        let result = self.store.search(&query).await?;

        debug!(
            total = result.total,
            returned = result.hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search completed"
        );

        Ok(SearchPage {
            records: result.hits,
            total: result.total,
            page: criteria.pagination.page,
            per_page: criteria.pagination.per_page,
        })
    }

    /// All matching records up to the export cap, newest first
    #[instrument(skip(self, criteria))]
    pub async fn export_hits(&self, criteria: &FilterCriteria) -> Result<Vec<LogHit>> {
        let query = self.builder.build_export(criteria);
        let result = self.store.search(&query).await?;

        debug!(
            total = result.total,
            exported = result.hits.len(),
            "Export query completed"
        );
        Ok(result.hits)
    }

    /// Most recent records, limit clamped to the maximum page size
    pub async fn recent(&self, limit: usize) -> Result<Vec<LogHit>> {
        let limit = limit.clamp(1, self.builder.limits().max_page_size);
        let query = Query::match_all()
            .with_sort(SortKey::Field(LogField::Timestamp), SortOrder::Desc)
            .with_limit(limit);

        Ok(self.store.search(&query).await?.hits)
    }

    /// Record count per level, most frequent first
    pub async fn count_by_level(&self) -> Result<Vec<LevelCount>> {
        let values = self.store.distinct_values(LogField::Level, 10).await?;

        Ok(values
            .into_iter()
            .map(|(level, count)| LevelCount { level, count })
            .collect())
    }

    /// Distinct endpoints, alphabetical
    pub async fn endpoints(&self) -> Result<Vec<String>> {
        let mut endpoints: Vec<String> = self
            .store
            .distinct_values(LogField::Endpoint, ENDPOINT_LIMIT)
            .await?
            .into_iter()
            .map(|(endpoint, _)| endpoint)
            .collect();
        endpoints.sort();
        Ok(endpoints)
    }
}
