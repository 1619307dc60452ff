//! Elasticsearch adapter wire format against a mock cluster

use log_dashboard::config::{ElasticsearchConfig, QueryLimits, StoreBackend};
use log_dashboard::search::{FilterCriteria, FilterParams, QueryBuilder, SearchService};
use log_dashboard::store::{
    Aggregation, BucketOrder, ElasticsearchStore, LogStore, Metric, StoreError,
};
use log_dashboard::search::query::LogField;
use log_dashboard::search::Query;
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;

const INDEX: &str = "saas-logs-test";

fn config(url: String) -> ElasticsearchConfig {
    ElasticsearchConfig {
        backend: StoreBackend::Elasticsearch,
        url,
        index_pattern: INDEX.to_string(),
        ..Default::default()
    }
}

fn index_query() -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("ignore_unavailable".into(), "true".into()),
        Matcher::UrlEncoded("allow_no_indices".into(), "true".into()),
    ])
}

#[tokio::test]
async fn test_ping() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(r#"{"cluster_name":"logs"}"#)
        .create_async()
        .await;

    let store = ElasticsearchStore::new(&config(server.url())).unwrap();
    store.ping().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_count_match_all() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", format!("/{}/_count", INDEX).as_str())
        .match_query(index_query())
        .match_body(Matcher::Json(json!({ "query": { "match_all": {} } })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"count":42,"_shards":{"total":3}}"#)
        .create_async()
        .await;

    let store = ElasticsearchStore::new(&config(server.url())).unwrap();
    assert_eq!(store.count(&Query::match_all()).await.unwrap(), 42);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_filtered_search_page() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", format!("/{}/_search", INDEX).as_str())
        .match_query(index_query())
        .match_body(Matcher::Json(json!({
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "level.keyword": "ERROR" } },
                        { "range": { "status_code": { "gte": 500, "lt": 600 } } }
                    ]
                }
            },
            "from": 10,
            "size": 10,
            "track_total_hits": true,
            "sort": [
                { "@timestamp": { "order": "desc", "unmapped_type": "date" } }
            ]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "hits": {
                    "total": { "value": 12, "relation": "eq" },
                    "hits": [
                        {
                            "_id": "a1",
                            "_index": "saas-logs-2024.03.02",
                            "_source": {
                                "@timestamp": "2024-03-02T11:59:00Z",
                                "level": "ERROR",
                                "message": "Upstream failure",
                                "endpoint": "/api/payments",
                                "status_code": 502,
                                "response_time_ms": 1200,
                                "user_id": 7
                            }
                        },
                        {
                            "_id": "broken",
                            "_index": "saas-logs-2024.03.02",
                            "_source": { "level": "ERROR" }
                        }
                    ]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let store = Arc::new(ElasticsearchStore::new(&config(server.url())).unwrap());
    let service = SearchService::new(store, QueryBuilder::new(QueryLimits::default()));
    let params: FilterParams = serde_json::from_value(json!({
        "level": "ERROR",
        "status_code": "5xx",
        "page": 2,
        "per_page": 10
    }))
    .unwrap();
    let criteria = FilterCriteria::normalize(&params, &QueryLimits::default()).unwrap();

    let page = service.search(&criteria).await.unwrap();
    mock.assert_async().await;

    assert_eq!(page.total, 12);
    assert_eq!(page.total_pages(), 2);
    assert!(page.has_prev());
    assert!(!page.has_next());

    // The undecodable document is skipped
    assert_eq!(page.records.len(), 1);
    let hit = &page.records[0];
    assert_eq!(hit.id.as_deref(), Some("a1"));
    assert_eq!(hit.entry.user_id.as_deref(), Some("7"));
    assert_eq!(hit.entry.status_code, Some(502));
}

#[tokio::test]
async fn test_terms_aggregation_by_metric() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", format!("/{}/_search", INDEX).as_str())
        .match_query(index_query())
        .match_body(Matcher::PartialJson(json!({
            "size": 0,
            "aggs": {
                "slowest": {
                    "terms": {
                        "field": "endpoint.keyword",
                        "size": 3,
                        "order": { "avg": "desc" }
                    },
                    "aggs": { "avg": { "avg": { "field": "response_time_ms" } } }
                }
            }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "aggregations": {
                    "slowest": {
                        "buckets": [
                            { "key": "/api/payments", "doc_count": 4, "avg": { "value": 1500.5 } },
                            { "key": "/api/orders", "doc_count": 9, "avg": { "value": 300.0 } }
                        ]
                    }
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let store = ElasticsearchStore::new(&config(server.url())).unwrap();
    let aggregations = [(
        "slowest".to_string(),
        Aggregation::Terms {
            field: LogField::Endpoint,
            size: 3,
            order: BucketOrder::MetricDesc("avg".to_string()),
            metrics: vec![("avg".to_string(), Metric::Avg(LogField::ResponseTime))],
        },
    )];

    let results = store
        .aggregate(&Query::match_all(), &aggregations)
        .await
        .unwrap();
    mock.assert_async().await;

    let buckets = results.buckets("slowest");
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].term(), Some("/api/payments"));
    assert_eq!(buckets[0].metric("avg"), Some(1500.5));
    assert_eq!(buckets[1].doc_count, 9);
}

#[tokio::test]
async fn test_client_error_is_rejection() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", format!("/{}/_count", INDEX).as_str())
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error":{"root_cause":[{"reason":"failed to parse query"}]},"status":400}"#)
        .create_async()
        .await;

    let store = ElasticsearchStore::new(&config(server.url())).unwrap();
    match store.count(&Query::match_all()).await.unwrap_err() {
        StoreError::Rejected { status, reason } => {
            assert_eq!(status, 400);
            assert_eq!(reason, "failed to parse query");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", format!("/{}/_search", INDEX).as_str())
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("cluster is recovering")
        .create_async()
        .await;

    let store = ElasticsearchStore::new(&config(server.url())).unwrap();
    let query = Query::match_all().with_limit(10);
    let err = store.search(&query).await.unwrap_err();
    assert!(err.is_unavailable());

    let app_error: log_dashboard::AppError = err.into();
    assert!(app_error.is_store_unavailable());
}

#[tokio::test]
async fn test_unreachable_cluster() {
    let store = ElasticsearchStore::new(&ElasticsearchConfig {
        connect_timeout_ms: 200,
        request_timeout_ms: 500,
        ..config("http://127.0.0.1:1".to_string())
    })
    .unwrap();

    assert!(store.ping().await.unwrap_err().is_unavailable());
    assert!(store.count(&Query::match_all()).await.unwrap_err().is_unavailable());
}

#[tokio::test]
async fn test_basic_auth_header() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .match_header("authorization", "Basic ZWxhc3RpYzo=")
        .with_status(200)
        .create_async()
        .await;

    let store = ElasticsearchStore::new(&ElasticsearchConfig {
        username: Some("elastic".to_string()),
        password_env: None,
        ..config(server.url())
    })
    .unwrap();

    store.ping().await.unwrap();
    mock.assert_async().await;
}
