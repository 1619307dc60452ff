use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// A single application log record as stored in the document index.
///
/// Records are produced by the ingestion path and are read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// Event time
    #[serde(
        rename = "@timestamp",
        alias = "timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: DateTime<Utc>,

    /// Severity level
    pub level: LogLevel,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Request path
    #[serde(default)]
    pub endpoint: Option<String>,

    /// HTTP method
    #[serde(default)]
    pub method: Option<HttpMethod>,

    /// HTTP status code (100-599)
    #[serde(default)]
    pub status_code: Option<u16>,

    /// Response time in milliseconds
    #[serde(default, rename = "response_time_ms", alias = "response_time")]
    pub response_time_ms: Option<u64>,

    /// Authenticated user
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub user_id: Option<String>,

    /// Client user agent
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Server/instance identifier
    #[serde(default)]
    pub server: Option<String>,

    /// Tenant
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub tenant_id: Option<String>,
}

impl LogEntry {
    /// Create an entry with the required attributes; everything else empty
    pub fn new(timestamp: DateTime<Utc>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
            endpoint: None,
            method: None,
            status_code: None,
            response_time_ms: None,
            user_id: None,
            user_agent: None,
            server: None,
            tenant_id: None,
        }
    }

    pub fn with_request(
        mut self,
        method: HttpMethod,
        endpoint: impl Into<String>,
        status_code: u16,
        response_time_ms: u64,
    ) -> Self {
        self.method = Some(method);
        self.endpoint = Some(endpoint.into());
        self.status_code = Some(status_code);
        self.response_time_ms = Some(response_time_ms);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Status code in [500, 600)
    pub fn is_server_error(&self) -> bool {
        matches!(self.status_code, Some(code) if (500..600).contains(&code))
    }
}

/// A log entry as returned by the store, with its document coordinates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogHit {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,

    #[serde(rename = "_index", default)]
    pub index: Option<String>,

    #[serde(flatten)]
    pub entry: LogEntry,
}

impl From<LogEntry> for LogHit {
    fn from(entry: LogEntry) -> Self {
        Self {
            id: None,
            index: None,
            entry,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "WARN")]
    #[strum(to_string = "WARNING", serialize = "WARN")]
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
    ];

    /// ERROR or CRITICAL
    pub fn is_error(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Critical)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

/// Accepts RFC 3339 or a naive ISO timestamp (interpreted as UTC)
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("invalid timestamp '{}'", raw))
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Ingested ids are sometimes numeric
fn deserialize_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) if s.is_empty() => None,
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Int(n)) => Some(n.to_string()),
        Some(Raw::Float(f)) => Some(f.to_string()),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_level_parsing() {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("WARN").unwrap(), LogLevel::Warning);
        assert_eq!(LogLevel::from_str("Warning").unwrap(), LogLevel::Warning);
        assert!(LogLevel::from_str("FATAL").is_err());
        assert_eq!(LogLevel::Warning.to_string(), "WARNING");
        assert!(LogLevel::Critical.is_error());
        assert!(!LogLevel::Warning.is_error());
    }

    #[test]
    fn test_decode_ingested_document() {
        let doc = json!({
            "@timestamp": "2024-03-01T10:15:00.000Z",
            "level": "ERROR",
            "message": "Internal server error processing GET /api/orders",
            "endpoint": "/api/orders",
            "method": "GET",
            "status_code": 500,
            "response_time_ms": 1200,
            "user_id": 42,
            "server": "server-03",
            "tenant_id": "tenant_7"
        });

        let entry: LogEntry = serde_json::from_value(doc).unwrap();
        assert_eq!(
            entry.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap()
        );
        assert_eq!(entry.user_id.as_deref(), Some("42"));
        assert_eq!(entry.method, Some(HttpMethod::Get));
        assert!(entry.is_server_error());
    }

    #[test]
    fn test_decode_sparse_document() {
        let doc = json!({
            "timestamp": "2024-03-01T10:15:00",
            "level": "INFO",
        });

        let entry: LogEntry = serde_json::from_value(doc).unwrap();
        assert_eq!(entry.message, "");
        assert!(entry.endpoint.is_none());
        assert!(entry.user_id.is_none());
        assert!(!entry.is_server_error());
    }

    #[test]
    fn test_hit_serializes_coordinates() {
        let entry = LogEntry::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            LogLevel::Info,
            "ok",
        );
        let hit = LogHit {
            id: Some("abc".to_string()),
            index: Some("saas-logs-2024.03.01".to_string()),
            entry,
        };

        let value = serde_json::to_value(&hit).unwrap();
        assert_eq!(value["_id"], "abc");
        assert_eq!(value["_index"], "saas-logs-2024.03.01");
        assert_eq!(value["level"], "INFO");
        assert!(value.get("@timestamp").is_some());

        let back: LogHit = serde_json::from_value(value).unwrap();
        assert_eq!(back, hit);
    }
}
