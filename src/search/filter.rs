//! Filter model: raw request parameters and their validated form

use crate::config::QueryLimits;
use crate::error::{AppError, Result};
use crate::models::{log_entry::parse_timestamp, LogLevel};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use validator::Validate;

/// A numeric request parameter that may arrive as a number or a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    fn as_int(&self, field: &str) -> Result<i64> {
        match self {
            ParamValue::Int(n) => Ok(*n),
            ParamValue::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            ParamValue::Float(f) => Err(AppError::Validation(format!(
                "{}: expected an integer, got {}",
                field, f
            ))),
            ParamValue::Text(s) => s.trim().parse::<i64>().map_err(|_| {
                AppError::Validation(format!("{}: expected an integer, got '{}'", field, s))
            }),
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, ParamValue::Text(s) if s.trim().is_empty())
    }
}

/// Raw filter parameters as received from a query string or JSON body
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct FilterParams {
    /// Free-text query
    #[validate(length(max = 512))]
    pub q: Option<String>,

    /// Level name or "ALL"
    pub level: Option<String>,

    /// Inclusive lower time bound
    #[serde(alias = "start_date")]
    pub date_from: Option<String>,

    /// Inclusive upper time bound
    #[serde(alias = "end_date")]
    pub date_to: Option<String>,

    /// Exact endpoint
    #[validate(length(max = 512))]
    pub endpoint: Option<String>,

    /// Exact status code or one of 2xx/4xx/5xx
    pub status_code: Option<ParamValue>,

    /// Exact server identifier
    #[validate(length(max = 512))]
    pub server: Option<String>,

    pub page: Option<ParamValue>,

    pub per_page: Option<ParamValue>,

    pub sort_field: Option<String>,

    pub sort_order: Option<String>,
}

/// Inclusive time bounds; either side may be open
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// Shorthand status classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusClass {
    Success,
    ClientError,
    ServerError,
}

impl StatusClass {
    /// Half-open range `[lower, upper)` covered by the class
    pub fn bounds(&self) -> (u16, u16) {
        match self {
            StatusClass::Success => (200, 300),
            StatusClass::ClientError => (400, 500),
            StatusClass::ServerError => (500, 600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusFilter {
    Exact(u16),
    Class(StatusClass),
}

impl StatusFilter {
    fn parse(value: &ParamValue) -> Result<Option<Self>> {
        if value.is_blank() {
            return Ok(None);
        }

        if let ParamValue::Text(s) = value {
            match s.trim().to_ascii_lowercase().as_str() {
                "2xx" => return Ok(Some(StatusFilter::Class(StatusClass::Success))),
                "4xx" => return Ok(Some(StatusFilter::Class(StatusClass::ClientError))),
                "5xx" => return Ok(Some(StatusFilter::Class(StatusClass::ServerError))),
                _ => {}
            }
        }

        let code = value.as_int("status_code").map_err(|_| {
            AppError::Validation(
                "status_code: expected 2xx, 4xx, 5xx or a code between 100 and 599".to_string(),
            )
        })?;
        if !(100..=599).contains(&code) {
            return Err(AppError::Validation(format!(
                "status_code: {} is outside 100-599",
                code
            )));
        }
        Ok(Some(StatusFilter::Exact(code as u16)))
    }
}

/// Caller-facing sort fields. Store field names are resolved by the query builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Timestamp,
    Level,
    Endpoint,
    StatusCode,
    ResponseTime,
    Server,
    Relevance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based page number
    pub page: usize,
    pub per_page: usize,
}

impl Pagination {
    /// Saturates; anything past the store's result window pages out empty
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: QueryLimits::default().default_page_size,
        }
    }
}

/// Validated, normalized filter criteria
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub text: Option<String>,
    pub level: Option<LogLevel>,
    pub time_range: TimeRange,
    pub endpoint: Option<String>,
    pub status: Option<StatusFilter>,
    pub server: Option<String>,
    pub pagination: Pagination,
    pub sort: Sort,
}

impl FilterCriteria {
    /// Validate and normalize raw parameters.
    ///
    /// An upper time bound before the lower bound is accepted and simply
    /// matches nothing.
    pub fn normalize(params: &FilterParams, limits: &QueryLimits) -> Result<Self> {
        params.validate()?;

        let level = match non_blank(&params.level) {
            None => None,
            Some(raw) if raw.eq_ignore_ascii_case("ALL") => None,
            Some(raw) => Some(LogLevel::from_str(raw).map_err(|_| {
                AppError::Validation(format!("level: unknown level '{}'", raw))
            })?),
        };

        let time_range = TimeRange {
            from: non_blank(&params.date_from)
                .map(|raw| parse_bound(raw, "date_from", Bound::Lower))
                .transpose()?,
            to: non_blank(&params.date_to)
                .map(|raw| parse_bound(raw, "date_to", Bound::Upper))
                .transpose()?,
        };

        let status = match &params.status_code {
            Some(value) => StatusFilter::parse(value)?,
            None => None,
        };

        let page = match params.page.as_ref().filter(|v| !v.is_blank()) {
            Some(value) => value.as_int("page")?,
            None => 1,
        };
        if page < 1 {
            return Err(AppError::Validation(format!(
                "page: must be at least 1, got {}",
                page
            )));
        }

        let per_page = match params.per_page.as_ref().filter(|v| !v.is_blank()) {
            Some(value) => value.as_int("per_page")?,
            None => limits.default_page_size as i64,
        };
        if per_page < 1 || per_page as usize > limits.max_page_size {
            return Err(AppError::Validation(format!(
                "per_page: must be between 1 and {}, got {}",
                limits.max_page_size, per_page
            )));
        }

        let field = match non_blank(&params.sort_field) {
            Some(raw) => SortField::from_str(raw)
                .map_err(|_| AppError::Validation(format!("sort_field: '{}' is not sortable", raw)))?,
            None => SortField::default(),
        };
        let order = match non_blank(&params.sort_order) {
            Some(raw) => SortOrder::from_str(raw).map_err(|_| {
                AppError::Validation(format!("sort_order: expected asc or desc, got '{}'", raw))
            })?,
            None => SortOrder::default(),
        };

        Ok(Self {
            text: non_blank(&params.q).map(str::to_string),
            level,
            time_range,
            endpoint: non_blank(&params.endpoint).map(str::to_string),
            status,
            server: non_blank(&params.server).map(str::to_string),
            pagination: Pagination {
                page: page as usize,
                per_page: per_page as usize,
            },
            sort: Sort { field, order },
        })
    }

    /// True when no predicate is set
    pub fn has_predicates(&self) -> bool {
        self.text.is_some()
            || self.level.is_some()
            || !self.time_range.is_unbounded()
            || self.endpoint.is_some()
            || self.status.is_some()
            || self.server.is_some()
    }

    /// Stable digest of the criteria, used for cache keys
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        // Serializing plain data with no maps cannot fail
        hasher.update(serde_json::to_vec(self).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }
}

enum Bound {
    Lower,
    Upper,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_bound(raw: &str, field: &str, bound: Bound) -> Result<DateTime<Utc>> {
    if let Some(ts) = parse_timestamp(raw) {
        return Ok(ts);
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        AppError::Validation(format!(
            "{}: '{}' is not an RFC 3339 timestamp or YYYY-MM-DD date",
            field, raw
        ))
    })?;
    let naive = match bound {
        Bound::Lower => date.and_hms_opt(0, 0, 0),
        Bound::Upper => date.and_hms_milli_opt(23, 59, 59, 999),
    };
    naive
        .map(|n| n.and_utc())
        .ok_or_else(|| AppError::Validation(format!("{}: '{}' is out of range", field, raw)))
}
