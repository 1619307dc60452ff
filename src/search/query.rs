//! Typed store queries and the builder that produces them from filter criteria

use crate::config::QueryLimits;
use crate::models::LogLevel;
use crate::search::filter::{FilterCriteria, SortField, SortOrder, StatusFilter};
use chrono::{DateTime, Utc};
use std::ops::Bound;

/// Fields of a stored log document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogField {
    Timestamp,
    Level,
    Message,
    Endpoint,
    Method,
    StatusCode,
    ResponseTime,
    UserId,
    UserAgent,
    Server,
    TenantId,
}

impl LogField {
    /// Analyzed field name used for relevance matching
    pub fn text_name(&self) -> &'static str {
        match self {
            LogField::Timestamp => "@timestamp",
            LogField::Level => "level",
            LogField::Message => "message",
            LogField::Endpoint => "endpoint",
            LogField::Method => "method",
            LogField::StatusCode => "status_code",
            LogField::ResponseTime => "response_time_ms",
            LogField::UserId => "user_id",
            LogField::UserAgent => "user_agent",
            LogField::Server => "server",
            LogField::TenantId => "tenant_id",
        }
    }

    /// Field name used for exact matches, sorting and aggregations
    pub fn exact_name(&self) -> &'static str {
        match self {
            LogField::Level => "level.keyword",
            LogField::Endpoint => "endpoint.keyword",
            LogField::Method => "method.keyword",
            LogField::UserId => "user_id.keyword",
            LogField::Server => "server.keyword",
            LogField::TenantId => "tenant_id.keyword",
            // Dates, numbers and analyzed-only fields have no keyword subfield
            LogField::Timestamp
            | LogField::StatusCode
            | LogField::ResponseTime
            | LogField::Message
            | LogField::UserAgent => self.text_name(),
        }
    }
}

/// A literal compared against a stored field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

/// A single query predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exact equality on a facet field
    Term { field: LogField, value: FieldValue },

    /// Exact equality against any of several values
    Terms { field: LogField, values: Vec<FieldValue> },

    /// Range with independent bounds; `Unbounded` omits that side
    Range {
        field: LogField,
        lower: Bound<FieldValue>,
        upper: Bound<FieldValue>,
    },

    /// Relevance match of whitespace-separated tokens, any token matching
    MultiMatch { query: String, fields: Vec<LogField> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Field(LogField),
    Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub order: SortOrder,
}

/// The query sent to the document store.
///
/// `filter` predicates are a non-scoring conjunction, `must` predicates a
/// scoring conjunction. Both empty means match everything.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub filter: Vec<Predicate>,
    pub must: Vec<Predicate>,
    pub sort: Vec<SortSpec>,
    pub offset: usize,
    pub limit: usize,
}

impl Query {
    /// Match every document, return no hits
    pub fn match_all() -> Self {
        Self {
            filter: Vec::new(),
            must: Vec::new(),
            sort: Vec::new(),
            offset: 0,
            limit: 0,
        }
    }

    pub fn is_match_all(&self) -> bool {
        self.filter.is_empty() && self.must.is_empty()
    }

    pub fn with_filter(mut self, predicate: Predicate) -> Self {
        self.filter.push(predicate);
        self
    }

    pub fn with_sort(mut self, key: SortKey, order: SortOrder) -> Self {
        self.sort.push(SortSpec { key, order });
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Fields searched by free-text queries
pub const TEXT_FIELDS: [LogField; 4] = [
    LogField::Message,
    LogField::Endpoint,
    LogField::UserId,
    LogField::UserAgent,
];

/// Builds store queries from validated criteria.
///
/// Shared by search, export and the aggregation engine so the predicate
/// translation lives in one place.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    limits: QueryLimits,
}

impl QueryBuilder {
    pub fn new(limits: QueryLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    /// Build a paged query
    pub fn build(&self, criteria: &FilterCriteria) -> Query {
        let mut query = Self::predicates(criteria);

        let key = match criteria.sort.field {
            SortField::Timestamp => SortKey::Field(LogField::Timestamp),
            SortField::Level => SortKey::Field(LogField::Level),
            SortField::Endpoint => SortKey::Field(LogField::Endpoint),
            SortField::StatusCode => SortKey::Field(LogField::StatusCode),
            SortField::ResponseTime => SortKey::Field(LogField::ResponseTime),
            SortField::Server => SortKey::Field(LogField::Server),
            SortField::Relevance => SortKey::Score,
        };
        query.sort.push(SortSpec {
            key,
            order: criteria.sort.order,
        });

        query.offset = criteria.pagination.offset();
        query.limit = criteria.pagination.per_page;
        query
    }

    /// Build an unpaged export query: newest first, capped at the export limit
    pub fn build_export(&self, criteria: &FilterCriteria) -> Query {
        Self::predicates(criteria)
            .with_sort(SortKey::Field(LogField::Timestamp), SortOrder::Desc)
            .with_limit(self.limits.export_limit)
    }

    fn predicates(criteria: &FilterCriteria) -> Query {
        let mut query = Query::match_all();

        if let Some(ref text) = criteria.text {
            query.must.push(Predicate::MultiMatch {
                query: text.clone(),
                fields: TEXT_FIELDS.to_vec(),
            });
        }

        if let Some(level) = criteria.level {
            query.filter.push(Self::level(level));
        }

        let range = &criteria.time_range;
        if !range.is_unbounded() {
            query.filter.push(Predicate::Range {
                field: LogField::Timestamp,
                lower: range
                    .from
                    .map_or(Bound::Unbounded, |ts| Bound::Included(ts.into())),
                upper: range
                    .to
                    .map_or(Bound::Unbounded, |ts| Bound::Included(ts.into())),
            });
        }

        if let Some(ref endpoint) = criteria.endpoint {
            query.filter.push(Predicate::Term {
                field: LogField::Endpoint,
                value: endpoint.as_str().into(),
            });
        }

        match criteria.status {
            Some(StatusFilter::Exact(code)) => query.filter.push(Predicate::Term {
                field: LogField::StatusCode,
                value: FieldValue::Integer(code as i64),
            }),
            Some(StatusFilter::Class(class)) => {
                let (lower, upper) = class.bounds();
                query.filter.push(Self::status_range(lower, upper));
            }
            None => {}
        }

        if let Some(ref server) = criteria.server {
            query.filter.push(Predicate::Term {
                field: LogField::Server,
                value: server.as_str().into(),
            });
        }

        query
    }

    /// Exact level match
    pub fn level(level: LogLevel) -> Predicate {
        Predicate::Term {
            field: LogField::Level,
            value: FieldValue::Text(level.to_string()),
        }
    }

    /// `[lower, upper)` on the status code
    pub fn status_range(lower: u16, upper: u16) -> Predicate {
        Predicate::Range {
            field: LogField::StatusCode,
            lower: Bound::Included(FieldValue::Integer(lower as i64)),
            upper: Bound::Excluded(FieldValue::Integer(upper as i64)),
        }
    }

    /// Status code in [500, 600)
    pub fn server_errors() -> Predicate {
        Self::status_range(500, 600)
    }

    /// ERROR or CRITICAL level
    pub fn error_levels() -> Predicate {
        Predicate::Terms {
            field: LogField::Level,
            values: LogLevel::ALL
                .iter()
                .filter(|level| level.is_error())
                .map(|level| FieldValue::Text(level.to_string()))
                .collect(),
        }
    }

    /// `[from, to]` on the timestamp
    pub fn time_window(from: DateTime<Utc>, to: DateTime<Utc>) -> Predicate {
        Predicate::Range {
            field: LogField::Timestamp,
            lower: Bound::Included(from.into()),
            upper: Bound::Included(to.into()),
        }
    }
}
