//! In-memory log store
//!
//! Evaluates typed queries and aggregations over a vector of entries. Used as
//! the `memory` backend and as the store double in tests, where individual
//! operations can be switched to fail.

use super::{
    Aggregation, AggregationResults, AggregationValue, Bucket, BucketKey, BucketOrder, LogStore,
    Metric, SearchHits, StoreError, StoreResult,
};
use crate::models::{LogEntry, LogHit};
use crate::search::filter::SortOrder;
use crate::search::query::{FieldValue, LogField, Predicate, Query, SortKey, SortSpec};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Ping,
    Count,
    Search,
    Aggregate,
}

const ALL_OPERATIONS: [StoreOperation; 4] = [
    StoreOperation::Ping,
    StoreOperation::Count,
    StoreOperation::Search,
    StoreOperation::Aggregate,
];

#[derive(Default)]
pub struct InMemoryLogStore {
    entries: RwLock<Vec<LogHit>>,
    failing: RwLock<HashSet<StoreOperation>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = LogEntry>) -> Self {
        let store = Self::new();
        store.extend(entries);
        store
    }

    pub fn insert(&self, entry: LogEntry) {
        self.extend(std::iter::once(entry));
    }

    pub fn extend(&self, entries: impl IntoIterator<Item = LogEntry>) {
        let mut stored = self.entries.write();
        for entry in entries {
            let id = stored.len();
            stored.push(LogHit {
                id: Some(format!("mem-{}", id)),
                index: Some("memory".to_string()),
                entry,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every operation fail (or succeed again) as if the store were down
    pub fn set_available(&self, available: bool) {
        let mut failing = self.failing.write();
        if available {
            failing.clear();
        } else {
            failing.extend(ALL_OPERATIONS);
        }
    }

    /// Make a single operation fail
    pub fn fail(&self, operation: StoreOperation) {
        self.failing.write().insert(operation);
    }

    pub fn restore(&self, operation: StoreOperation) {
        self.failing.write().remove(&operation);
    }

    fn check(&self, operation: StoreOperation) -> StoreResult<()> {
        if self.failing.read().contains(&operation) {
            return Err(StoreError::Unavailable(format!(
                "in-memory store marked unavailable for {:?}",
                operation
            )));
        }
        Ok(())
    }

    /// Matching hits with their relevance scores, in insertion order
    fn matching(&self, query: &Query) -> Vec<(f64, LogHit)> {
        self.entries
            .read()
            .iter()
            .filter_map(|hit| evaluate(&hit.entry, query).map(|score| (score, hit.clone())))
            .collect()
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check(StoreOperation::Ping)
    }

    async fn count(&self, query: &Query) -> StoreResult<u64> {
        self.check(StoreOperation::Count)?;
        Ok(self.matching(query).len() as u64)
    }

    async fn search(&self, query: &Query) -> StoreResult<SearchHits> {
        self.check(StoreOperation::Search)?;

        let mut matched = self.matching(query);
        let total = matched.len() as u64;

        // No explicit sort means relevance, as in the real store
        let default_sort = [SortSpec {
            key: SortKey::Score,
            order: SortOrder::Desc,
        }];
        let specs: &[SortSpec] = if query.sort.is_empty() {
            &default_sort
        } else {
            &query.sort
        };
        matched.sort_by(|a, b| compare_hits(a, b, specs));

        let hits = matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(_, hit)| hit)
            .collect();

        Ok(SearchHits { hits, total })
    }

    async fn aggregate(
        &self,
        query: &Query,
        aggregations: &[(String, Aggregation)],
    ) -> StoreResult<AggregationResults> {
        self.check(StoreOperation::Aggregate)?;

        let matched = self.matching(query);
        let docs: Vec<&LogEntry> = matched.iter().map(|(_, hit)| &hit.entry).collect();

        let mut results = AggregationResults::default();
        for (name, aggregation) in aggregations {
            results.insert(name.clone(), evaluate_aggregation(&docs, aggregation));
        }
        Ok(results)
    }
}

fn field_value(entry: &LogEntry, field: LogField) -> Option<FieldValue> {
    match field {
        LogField::Timestamp => Some(FieldValue::Timestamp(entry.timestamp)),
        LogField::Level => Some(FieldValue::Text(entry.level.to_string())),
        LogField::Message => Some(FieldValue::Text(entry.message.clone())),
        LogField::Endpoint => entry.endpoint.clone().map(FieldValue::Text),
        LogField::Method => entry.method.map(|m| FieldValue::Text(m.to_string())),
        LogField::StatusCode => entry.status_code.map(|c| FieldValue::Integer(c as i64)),
        LogField::ResponseTime => entry.response_time_ms.map(|v| FieldValue::Integer(v as i64)),
        LogField::UserId => entry.user_id.clone().map(FieldValue::Text),
        LogField::UserAgent => entry.user_agent.clone().map(FieldValue::Text),
        LogField::Server => entry.server.clone().map(FieldValue::Text),
        LogField::TenantId => entry.tenant_id.clone().map(FieldValue::Text),
    }
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Option<Ordering> {
    match (a, b) {
        (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
        (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
        (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn key_string(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(s) => s.clone(),
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Timestamp(ts) => ts.to_rfc3339(),
    }
}

fn numeric(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Integer(n) => Some(*n as f64),
        _ => None,
    }
}

/// Lowercased alphanumeric runs
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn in_range(value: &FieldValue, lower: &Bound<FieldValue>, upper: &Bound<FieldValue>) -> bool {
    let above = match lower {
        Bound::Included(bound) => matches!(
            compare_values(value, bound),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Bound::Excluded(bound) => matches!(compare_values(value, bound), Some(Ordering::Greater)),
        Bound::Unbounded => true,
    };
    let below = match upper {
        Bound::Included(bound) => matches!(
            compare_values(value, bound),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Bound::Excluded(bound) => matches!(compare_values(value, bound), Some(Ordering::Less)),
        Bound::Unbounded => true,
    };
    above && below
}

/// Score contributed by a predicate, `None` when it does not match
fn score_predicate(entry: &LogEntry, predicate: &Predicate) -> Option<f64> {
    match predicate {
        Predicate::Term { field, value } => {
            (field_value(entry, *field).as_ref() == Some(value)).then_some(1.0)
        }
        Predicate::Terms { field, values } => {
            let actual = field_value(entry, *field)?;
            values.contains(&actual).then_some(1.0)
        }
        Predicate::Range {
            field,
            lower,
            upper,
        } => {
            let actual = field_value(entry, *field)?;
            in_range(&actual, lower, upper).then_some(1.0)
        }
        Predicate::MultiMatch { query, fields } => {
            let wanted = tokenize(query);
            let score: usize = fields
                .iter()
                .filter_map(|field| field_value(entry, *field))
                .map(|value| {
                    let present = tokenize(&key_string(&value));
                    wanted.iter().filter(|token| present.contains(token)).count()
                })
                .sum();
            (score > 0).then_some(score as f64)
        }
    }
}

/// Relevance score of a matching entry, `None` when any clause fails
fn evaluate(entry: &LogEntry, query: &Query) -> Option<f64> {
    for predicate in &query.filter {
        score_predicate(entry, predicate)?;
    }
    let mut score = 0.0;
    for predicate in &query.must {
        score += score_predicate(entry, predicate)?;
    }
    Some(score)
}

fn compare_hits(a: &(f64, LogHit), b: &(f64, LogHit), specs: &[SortSpec]) -> Ordering {
    for spec in specs {
        let ordering = match spec.key {
            SortKey::Score => {
                let ordering = a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal);
                directed(ordering, spec.order)
            }
            SortKey::Field(field) => {
                match (field_value(&a.1.entry, field), field_value(&b.1.entry, field)) {
                    (Some(x), Some(y)) => {
                        directed(compare_values(&x, &y).unwrap_or(Ordering::Equal), spec.order)
                    }
                    // Missing values sort last in either direction
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn evaluate_metric(docs: &[&LogEntry], metric: &Metric) -> Option<f64> {
    match metric {
        Metric::Avg(field) => {
            let samples: Vec<f64> = docs
                .iter()
                .filter_map(|entry| field_value(entry, *field))
                .filter_map(|value| numeric(&value))
                .collect();
            if samples.is_empty() {
                None
            } else {
                Some(samples.iter().sum::<f64>() / samples.len() as f64)
            }
        }
        Metric::Cardinality(field) => {
            let distinct: HashSet<String> = docs
                .iter()
                .filter_map(|entry| field_value(entry, *field))
                .map(|value| key_string(&value))
                .collect();
            Some(distinct.len() as f64)
        }
        Metric::FilteredCount(predicate) => Some(
            docs.iter()
                .filter(|entry| score_predicate(entry, predicate).is_some())
                .count() as f64,
        ),
    }
}

fn bucket(key: BucketKey, docs: &[&LogEntry], metrics: &[(String, Metric)]) -> Bucket {
    Bucket {
        key,
        doc_count: docs.len() as u64,
        metrics: metrics
            .iter()
            .map(|(name, metric)| (name.clone(), evaluate_metric(docs, metric)))
            .collect(),
    }
}

fn evaluate_aggregation(docs: &[&LogEntry], aggregation: &Aggregation) -> AggregationValue {
    match aggregation {
        Aggregation::Metric(metric) => AggregationValue::Metric(evaluate_metric(docs, metric)),
        Aggregation::Terms {
            field,
            size,
            order,
            metrics,
        } => {
            let mut groups: BTreeMap<String, Vec<&LogEntry>> = BTreeMap::new();
            for entry in docs {
                if let Some(value) = field_value(entry, *field) {
                    groups.entry(key_string(&value)).or_default().push(*entry);
                }
            }

            let mut buckets: Vec<Bucket> = groups
                .into_iter()
                .map(|(key, members)| bucket(BucketKey::Term(key), &members, metrics))
                .collect();

            // Stable sorts keep key order for ties
            match order {
                BucketOrder::CountDesc => buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count)),
                BucketOrder::MetricDesc(name) => buckets.sort_by(|a, b| {
                    match (a.metric(name), b.metric(name)) {
                        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    }
                }),
            }
            buckets.truncate(*size);
            AggregationValue::Buckets(buckets)
        }
        Aggregation::DateRanges {
            field,
            ranges,
            metrics,
        } => {
            let buckets = ranges
                .iter()
                .map(|(from, to)| {
                    let members: Vec<&LogEntry> = docs
                        .iter()
                        .filter(|entry| {
                            matches!(
                                field_value(entry, *field),
                                Some(FieldValue::Timestamp(ts)) if ts >= *from && ts < *to
                            )
                        })
                        .copied()
                        .collect();
                    bucket(
                        BucketKey::Range {
                            from: *from,
                            to: *to,
                        },
                        &members,
                        metrics,
                    )
                })
                .collect();
            AggregationValue::Buckets(buckets)
        }
    }
}
