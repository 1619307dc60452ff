//! Elasticsearch adapter
//!
//! Serializes typed queries and aggregations to the search DSL and reads
//! the responses back. All calls go to `{url}/{index_pattern}/...`.

use super::{
    Aggregation, AggregationResults, AggregationValue, Bucket, BucketKey, BucketOrder, LogStore,
    Metric, SearchHits, StoreError, StoreResult,
};
use crate::config::ElasticsearchConfig;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{LogEntry, LogHit};
use crate::search::query::{FieldValue, LogField, Predicate, Query, SortKey, SortSpec};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::ops::Bound;
use std::time::Instant;
use tracing::{debug, warn};

/// Largest `from + size` the index accepts
const MAX_RESULT_WINDOW: usize = 10_000;

const DATE_FORMAT: &str = "strict_date_optional_time";

#[derive(Clone)]
pub struct ElasticsearchStore {
    client: Client,
    base_url: String,
    index_pattern: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticsearchStore {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(concat!("log-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        let password = config
            .password_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok());

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index_pattern: config.index_pattern.clone(),
            username: config.username.clone(),
            password,
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        // A pattern with no matching index yet is an empty result, not an error
        format!(
            "{}/{}/{}?ignore_unavailable=true&allow_no_indices=true",
            self.base_url, self.index_pattern, endpoint
        )
    }

    async fn post(&self, operation: &'static str, endpoint: &str, body: &Value) -> StoreResult<Value> {
        let start = Instant::now();
        let result = self.send(endpoint, body).await;
        metrics::record_store_operation(operation, start.elapsed(), &result);

        match &result {
            Ok(_) => debug!(
                operation,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Store request completed"
            ),
            Err(e) => warn!(operation, error = %e, "Store request failed"),
        }
        result
    }

    async fn send(&self, endpoint: &str, body: &Value) -> StoreResult<Value> {
        let mut request = self.client.post(self.endpoint_url(endpoint)).json(body);
        if let Some(ref username) = self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = error_reason(&body);
            return Err(if status.is_client_error() {
                StoreError::Rejected {
                    status: status.as_u16(),
                    reason,
                }
            } else {
                StoreError::Unavailable(format!("status {}: {}", status, reason))
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl LogStore for ElasticsearchStore {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn ping(&self) -> StoreResult<()> {
        let start = Instant::now();
        let mut request = self.client.get(format!("{}/", self.base_url));
        if let Some(ref username) = self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let result = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(StoreError::Unavailable(format!(
                "cluster answered {}",
                response.status()
            ))),
            Err(e) => Err(e.into()),
        };
        metrics::record_store_operation("ping", start.elapsed(), &result);
        result
    }

    async fn count(&self, query: &Query) -> StoreResult<u64> {
        let body = json!({ "query": query_json(query) });
        let response = self.post("count", "_count", &body).await?;

        response["count"]
            .as_u64()
            .ok_or_else(|| StoreError::Decode("count response without 'count'".to_string()))
    }

    async fn search(&self, query: &Query) -> StoreResult<SearchHits> {
        if query.offset >= MAX_RESULT_WINDOW {
            // Past the result window only the total is obtainable
            let total = self.count(query).await?;
            return Ok(SearchHits {
                hits: Vec::new(),
                total,
            });
        }

        let body = search_body(query);
        let response = self.post("search", "_search", &body).await?;
        parse_hits(&response)
    }

    async fn aggregate(
        &self,
        query: &Query,
        aggregations: &[(String, Aggregation)],
    ) -> StoreResult<AggregationResults> {
        let aggs: Map<String, Value> = aggregations
            .iter()
            .map(|(name, aggregation)| (name.clone(), aggregation_json(aggregation)))
            .collect();

        let body = json!({
            "size": 0,
            "track_total_hits": false,
            "query": query_json(query),
            "aggs": aggs,
        });
        let response = self.post("aggregate", "_search", &body).await?;

        let mut results = AggregationResults::default();
        for (name, aggregation) in aggregations {
            let raw = response
                .get("aggregations")
                .and_then(|aggs| aggs.get(name))
                .ok_or_else(|| StoreError::Decode(format!("aggregation '{}' missing", name)))?;
            results.insert(name.clone(), parse_aggregation(aggregation, raw)?);
        }
        Ok(results)
    }
}

/// Best-effort human readable reason from an error body
fn error_reason(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            value["error"]["root_cause"][0]["reason"]
                .as_str()
                .or_else(|| value["error"]["reason"].as_str())
                .or_else(|| value["error"].as_str())
        })
        .map(str::to_string)
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(200).collect()
            }
        })
}

fn keyed(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn value_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Integer(n) => json!(n),
        FieldValue::Timestamp(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }
}

fn predicate_json(predicate: &Predicate) -> Value {
    match predicate {
        Predicate::Term { field, value } => {
            keyed("term", keyed(field.exact_name(), value_json(value)))
        }
        Predicate::Terms { field, values } => keyed(
            "terms",
            keyed(
                field.exact_name(),
                Value::Array(values.iter().map(value_json).collect()),
            ),
        ),
        Predicate::Range {
            field,
            lower,
            upper,
        } => {
            let mut bounds = Map::new();
            match lower {
                Bound::Included(v) => {
                    bounds.insert("gte".to_string(), value_json(v));
                }
                Bound::Excluded(v) => {
                    bounds.insert("gt".to_string(), value_json(v));
                }
                Bound::Unbounded => {}
            }
            match upper {
                Bound::Included(v) => {
                    bounds.insert("lte".to_string(), value_json(v));
                }
                Bound::Excluded(v) => {
                    bounds.insert("lt".to_string(), value_json(v));
                }
                Bound::Unbounded => {}
            }
            if *field == LogField::Timestamp {
                bounds.insert("format".to_string(), json!(DATE_FORMAT));
            }
            keyed("range", keyed(field.exact_name(), Value::Object(bounds)))
        }
        Predicate::MultiMatch { query, fields } => json!({
            "multi_match": {
                "query": query,
                "fields": fields.iter().map(|f| f.text_name()).collect::<Vec<_>>(),
                "operator": "or",
                "lenient": true,
            }
        }),
    }
}

fn query_json(query: &Query) -> Value {
    if query.is_match_all() {
        return json!({ "match_all": {} });
    }

    let mut clauses = Map::new();
    if !query.filter.is_empty() {
        clauses.insert(
            "filter".to_string(),
            Value::Array(query.filter.iter().map(predicate_json).collect()),
        );
    }
    if !query.must.is_empty() {
        clauses.insert(
            "must".to_string(),
            Value::Array(query.must.iter().map(predicate_json).collect()),
        );
    }
    keyed("bool", Value::Object(clauses))
}

fn unmapped_type(field: LogField) -> &'static str {
    match field {
        LogField::Timestamp => "date",
        LogField::StatusCode | LogField::ResponseTime => "long",
        _ => "keyword",
    }
}

fn sort_json(sort: &[SortSpec]) -> Value {
    Value::Array(
        sort.iter()
            .map(|spec| {
                let order = spec.order.to_string();
                match spec.key {
                    SortKey::Score => json!({ "_score": { "order": order } }),
                    SortKey::Field(field) => keyed(
                        field.exact_name(),
                        json!({ "order": order, "unmapped_type": unmapped_type(field) }),
                    ),
                }
            })
            .collect(),
    )
}

fn search_body(query: &Query) -> Value {
    let size = query.limit.min(MAX_RESULT_WINDOW.saturating_sub(query.offset));
    let mut body = json!({
        "query": query_json(query),
        "from": query.offset,
        "size": size,
        "track_total_hits": true,
    });
    if !query.sort.is_empty() {
        body["sort"] = sort_json(&query.sort);
    }
    body
}

fn metric_json(metric: &Metric) -> Value {
    match metric {
        Metric::Avg(field) => json!({ "avg": { "field": field.exact_name() } }),
        Metric::Cardinality(field) => json!({ "cardinality": { "field": field.exact_name() } }),
        Metric::FilteredCount(predicate) => json!({ "filter": predicate_json(predicate) }),
    }
}

fn sub_aggregations(metrics: &[(String, Metric)]) -> Value {
    Value::Object(
        metrics
            .iter()
            .map(|(name, metric)| (name.clone(), metric_json(metric)))
            .collect(),
    )
}

fn aggregation_json(aggregation: &Aggregation) -> Value {
    match aggregation {
        Aggregation::Metric(metric) => metric_json(metric),
        Aggregation::Terms {
            field,
            size,
            order,
            metrics,
        } => {
            let order = match order {
                BucketOrder::CountDesc => json!([{ "_count": "desc" }, { "_key": "asc" }]),
                BucketOrder::MetricDesc(name) => keyed(name, json!("desc")),
            };
            let mut body = json!({
                "terms": { "field": field.exact_name(), "size": size, "order": order }
            });
            if !metrics.is_empty() {
                body["aggs"] = sub_aggregations(metrics);
            }
            body
        }
        Aggregation::DateRanges {
            field,
            ranges,
            metrics,
        } => {
            let ranges: Vec<Value> = ranges
                .iter()
                .enumerate()
                .map(|(i, (from, to))| {
                    json!({
                        "key": i.to_string(),
                        "from": from.to_rfc3339_opts(SecondsFormat::Millis, true),
                        "to": to.to_rfc3339_opts(SecondsFormat::Millis, true),
                    })
                })
                .collect();
            let mut body = json!({
                "date_range": { "field": field.exact_name(), "format": DATE_FORMAT, "ranges": ranges }
            });
            if !metrics.is_empty() {
                body["aggs"] = sub_aggregations(metrics);
            }
            body
        }
    }
}

fn parse_metric(metric: &Metric, raw: &Value) -> Option<f64> {
    match metric {
        Metric::FilteredCount(_) => raw["doc_count"].as_f64(),
        Metric::Avg(_) | Metric::Cardinality(_) => raw["value"].as_f64(),
    }
}

fn parse_bucket_metrics(metrics: &[(String, Metric)], raw: &Value) -> HashMap<String, Option<f64>> {
    metrics
        .iter()
        .map(|(name, metric)| (name.clone(), parse_metric(metric, &raw[name.as_str()])))
        .collect()
}

fn raw_buckets<'a>(raw: &'a Value) -> StoreResult<&'a Vec<Value>> {
    raw["buckets"]
        .as_array()
        .ok_or_else(|| StoreError::Decode("bucket aggregation without 'buckets'".to_string()))
}

fn parse_aggregation(aggregation: &Aggregation, raw: &Value) -> StoreResult<AggregationValue> {
    match aggregation {
        Aggregation::Metric(metric) => Ok(AggregationValue::Metric(parse_metric(metric, raw))),
        Aggregation::Terms { metrics, .. } => {
            let buckets = raw_buckets(raw)?
                .iter()
                .map(|bucket| {
                    let key = match &bucket["key"] {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    Bucket {
                        key: BucketKey::Term(key),
                        doc_count: bucket["doc_count"].as_u64().unwrap_or(0),
                        metrics: parse_bucket_metrics(metrics, bucket),
                    }
                })
                .collect();
            Ok(AggregationValue::Buckets(buckets))
        }
        Aggregation::DateRanges {
            ranges, metrics, ..
        } => {
            let by_key: HashMap<&str, &Value> = raw_buckets(raw)?
                .iter()
                .filter_map(|bucket| bucket["key"].as_str().map(|key| (key, bucket)))
                .collect();

            // Returned in request order regardless of how the store sorts them
            let buckets = ranges
                .iter()
                .enumerate()
                .map(|(i, (from, to))| {
                    let bucket = by_key.get(i.to_string().as_str()).ok_or_else(|| {
                        StoreError::Decode(format!("date range bucket {} missing", i))
                    })?;
                    Ok(Bucket {
                        key: BucketKey::Range {
                            from: *from,
                            to: *to,
                        },
                        doc_count: bucket["doc_count"].as_u64().unwrap_or(0),
                        metrics: parse_bucket_metrics(metrics, bucket),
                    })
                })
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(AggregationValue::Buckets(buckets))
        }
    }
}

fn parse_hits(response: &Value) -> StoreResult<SearchHits> {
    let hits = &response["hits"];
    let total = match &hits["total"] {
        Value::Number(n) => n.as_u64(),
        other => other["value"].as_u64(),
    }
    .ok_or_else(|| StoreError::Decode("search response without total".to_string()))?;

    let raw_hits = hits["hits"]
        .as_array()
        .ok_or_else(|| StoreError::Decode("search response without hits".to_string()))?;

    let mut decoded = Vec::with_capacity(raw_hits.len());
    for raw in raw_hits {
        match serde_json::from_value::<LogEntry>(raw["_source"].clone()) {
            Ok(entry) => decoded.push(LogHit {
                id: raw["_id"].as_str().map(str::to_string),
                index: raw["_index"].as_str().map(str::to_string),
                entry,
            }),
            Err(e) => warn!(
                id = raw["_id"].as_str().unwrap_or("?"),
                error = %e,
                "Skipping undecodable log document"
            ),
        }
    }

    Ok(SearchHits {
        hits: decoded,
        total,
    })
}
