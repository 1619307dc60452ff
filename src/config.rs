use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Document store configuration
    pub elasticsearch: ElasticsearchConfig,

    /// Key-value cache configuration
    pub cache: CacheConfig,

    /// Metadata store configuration
    pub metadata: MetadataConfig,

    /// Filter and paging limits
    #[serde(default)]
    pub query: QueryLimits,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: LOGDASH_)
            .add_source(
                config::Environment::with_prefix("LOGDASH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            elasticsearch: ElasticsearchConfig::default(),
            cache: CacheConfig::default(),
            metadata: MetadataConfig::default(),
            query: QueryLimits::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Elasticsearch,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Document store backend
    #[serde(default)]
    pub backend: StoreBackend,

    /// Base URL of the cluster
    #[serde(default = "default_es_url")]
    pub url: String,

    /// Index name pattern covering the time-partitioned log indices
    #[serde(default = "default_index_pattern")]
    pub index_pattern: String,

    /// Connection establishment timeout (milliseconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Per-request timeout (milliseconds), independent of connect timeout
    #[serde(default = "default_search_timeout")]
    pub request_timeout_ms: u64,

    /// Basic auth username
    pub username: Option<String>,

    /// Basic auth password (from env var)
    pub password_env: Option<String>,
}

impl ElasticsearchConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_es_url(),
            index_pattern: default_index_pattern(),
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_search_timeout(),
            username: None,
            password_env: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache backend type
    #[serde(default)]
    pub backend: CacheBackend,

    /// Redis connection string
    pub redis_url: Option<String>,

    /// Prefix prepended to every cache key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Freshness window for search, by-level and endpoint results (seconds)
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,

    /// How long expired entries stay readable for stale fallback (seconds)
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// Per-operation timeout for cache calls (milliseconds)
    #[serde(default = "default_cache_op_timeout")]
    pub op_timeout_ms: u64,

    /// Capacity of the in-memory backend
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: u64,
}

impl CacheConfig {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            redis_url: Some("redis://localhost:6379".to_string()),
            key_prefix: default_key_prefix(),
            result_ttl_secs: default_result_ttl(),
            retention_secs: default_retention(),
            op_timeout_ms: default_cache_op_timeout(),
            memory_capacity: default_memory_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MetadataBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Metadata backend type
    #[serde(default)]
    pub backend: MetadataBackend,

    /// Path for the embedded database
    pub path: Option<PathBuf>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: MetadataBackend::default(),
            path: Some(PathBuf::from("./data/metadata")),
        }
    }
}

/// Bounds applied when normalizing filter input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLimits {
    /// Page size used when the request omits one
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Largest accepted page size
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Maximum number of rows in an export
    #[serde(default = "default_export_limit")]
    pub export_limit: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            export_limit: default_export_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    5000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_es_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index_pattern() -> String {
    "saas-logs-*".to_string()
}

fn default_connect_timeout() -> u64 {
    2_000
}

fn default_search_timeout() -> u64 {
    10_000
}

fn default_key_prefix() -> String {
    "logdash:".to_string()
}

fn default_result_ttl() -> u64 {
    15
}

fn default_retention() -> u64 {
    86_400 // 24 hours
}

fn default_cache_op_timeout() -> u64 {
    500
}

fn default_memory_capacity() -> u64 {
    10_000
}

fn default_page_size() -> usize {
    50
}

fn default_max_page_size() -> usize {
    200
}

fn default_export_limit() -> usize {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "log-dashboard".to_string()
}

fn default_true() -> bool {
    true
}
