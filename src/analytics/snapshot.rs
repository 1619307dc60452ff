//! Dashboard statistics snapshot

use crate::models::LogHit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;

/// Average response time of one endpoint over the trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointLatency {
    pub endpoint: String,
    pub avg_response_time: f64,
    pub requests: u64,
}

/// One hour of the trailing window, `[hour, hour + 1h)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyBucket {
    pub hour: DateTime<Utc>,
    pub total: u64,
    pub errors: u64,
    pub avg_response_time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,

    /// Backend implementation behind the dependency
    pub backend: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn healthy(backend: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            backend: backend.into(),
            error: None,
        }
    }

    pub fn unhealthy(backend: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            backend: backend.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Per-dependency health plus the overall flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    /// True iff every dependency is healthy
    pub healthy: bool,
    pub services: BTreeMap<String, ServiceHealth>,
}

impl SystemHealth {
    pub fn from_services(services: BTreeMap<String, ServiceHealth>) -> Self {
        let healthy = services.values().all(ServiceHealth::is_healthy);
        Self { healthy, services }
    }

    /// Replace one dependency's entry and recompute the overall flag
    pub fn mark(&mut self, name: &str, health: ServiceHealth) {
        self.services.insert(name.to_string(), health);
        self.healthy = self.services.values().all(ServiceHealth::is_healthy);
    }

    pub fn service(&self, name: &str) -> Option<&ServiceHealth> {
        self.services.get(name)
    }
}

/// Dashboard statistics computed in one pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// All records, all time
    pub total_logs: u64,

    /// Records in the trailing 24 hours
    pub total_logs_24h: u64,

    /// 5xx records in the trailing 24 hours
    pub error_count_24h: u64,

    /// Percentage of 5xx in the trailing 24 hours, two decimals
    pub error_rate: f64,

    /// Milliseconds, trailing 24 hours
    pub avg_response_time: u64,

    pub top_slowest_endpoints: Vec<EndpointLatency>,

    /// Distinct users in the trailing 24 hours
    pub active_users: u64,

    /// Most recent ERROR or CRITICAL record, any time
    pub latest_error: Option<LogHit>,

    /// Exactly 24 buckets, oldest first
    pub hourly_trend: Vec<HourlyBucket>,

    pub files_uploaded: u64,

    pub health: SystemHealth,

    /// Sub-statistics that failed and hold their zero value
    #[serde(default)]
    pub partial_failures: Vec<String>,

    pub computed_at: DateTime<Utc>,
}

/// `part / whole` as a percentage rounded to two decimals, 0 for an empty whole
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let rate = (part as f64 / whole as f64 * 100.0).clamp(0.0, 100.0);
    (rate * 100.0).round() / 100.0
}
