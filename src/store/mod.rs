//! Document store abstraction
//!
//! The search executor and the aggregation engine talk to the log index only
//! through [`LogStore`]. Queries and aggregations are typed values; each
//! adapter owns their translation to its own wire format.
//!
//! - [`ElasticsearchStore`]: HTTP adapter over a time-partitioned index pattern
//! - [`InMemoryLogStore`]: evaluates the same typed values over a vector

mod elasticsearch;
mod error;
mod factory;
mod memory;

pub use elasticsearch::ElasticsearchStore;
pub use error::{StoreError, StoreResult};
pub use factory::create_store;
pub use memory::{InMemoryLogStore, StoreOperation};

use crate::models::LogHit;
use crate::search::query::{LogField, Predicate, Query};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Hits for one page plus the total number of matching documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub hits: Vec<LogHit>,
    pub total: u64,
}

/// A single-value statistic
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    /// Mean of a numeric field; `None` when no document carries it
    Avg(LogField),

    /// Number of distinct values of a field
    Cardinality(LogField),

    /// Number of documents matching an extra predicate
    FilteredCount(Predicate),
}

/// Bucket ordering for terms aggregations
#[derive(Debug, Clone, PartialEq)]
pub enum BucketOrder {
    /// Most documents first, ties by key
    CountDesc,

    /// Highest value of the named sub-metric first
    MetricDesc(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Metric(Metric),

    /// One bucket per distinct value of `field`
    Terms {
        field: LogField,
        size: usize,
        order: BucketOrder,
        metrics: Vec<(String, Metric)>,
    },

    /// One bucket per `[from, to)` range, in the order given
    DateRanges {
        field: LogField,
        ranges: Vec<(DateTime<Utc>, DateTime<Utc>)>,
        metrics: Vec<(String, Metric)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BucketKey {
    Term(String),
    Range {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub key: BucketKey,
    pub doc_count: u64,
    pub metrics: HashMap<String, Option<f64>>,
}

impl Bucket {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().flatten()
    }

    /// Term key, or `None` for range buckets
    pub fn term(&self) -> Option<&str> {
        match &self.key {
            BucketKey::Term(term) => Some(term),
            BucketKey::Range { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationValue {
    Metric(Option<f64>),
    Buckets(Vec<Bucket>),
}

/// Named aggregation results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationResults {
    values: HashMap<String, AggregationValue>,
}

impl AggregationResults {
    pub fn insert(&mut self, name: impl Into<String>, value: AggregationValue) {
        self.values.insert(name.into(), value);
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(AggregationValue::Metric(value)) => *value,
            _ => None,
        }
    }

    pub fn buckets(&self, name: &str) -> &[Bucket] {
        match self.values.get(name) {
            Some(AggregationValue::Buckets(buckets)) => buckets,
            _ => &[],
        }
    }
}

/// Read-only access to the log index
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Backend name used in logs and health reports
    fn name(&self) -> &'static str;

    /// Cheap reachability check
    async fn ping(&self) -> StoreResult<()>;

    /// Number of documents matching the query's predicates
    async fn count(&self, query: &Query) -> StoreResult<u64>;

    /// One page of hits, sorted and sliced per the query
    async fn search(&self, query: &Query) -> StoreResult<SearchHits>;

    /// Evaluate named aggregations over the documents matching the query
    async fn aggregate(
        &self,
        query: &Query,
        aggregations: &[(String, Aggregation)],
    ) -> StoreResult<AggregationResults>;

    /// Up to `size` distinct values of a facet field, most frequent first
    async fn distinct_values(&self, field: LogField, size: usize) -> StoreResult<Vec<(String, u64)>> {
        let name = "values".to_string();
        let aggregations = [(
            name.clone(),
            Aggregation::Terms {
                field,
                size,
                order: BucketOrder::CountDesc,
                metrics: Vec::new(),
            },
        )];
        let results = self.aggregate(&Query::match_all(), &aggregations).await?;

        Ok(results
            .buckets(&name)
            .iter()
            .filter_map(|bucket| bucket.term().map(|term| (term.to_string(), bucket.doc_count)))
            .collect())
    }
}
