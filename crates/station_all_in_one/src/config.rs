use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Telemetry
    #[serde(default)]
    pub otel_enabled: bool,

    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    // Main stream upstream
    /// Vendor API base URL; absent or blank disables the sync engine
    #[serde(default)]
    pub mainstream_url: Option<String>,

    #[serde(default = "default_mainstream_request_timeout_ms")]
    pub mainstream_request_timeout_ms: u64,

    // Sync engine
    /// How long the cached device list stays fresh
    #[serde(default = "default_device_cache_ttl_ms")]
    pub device_cache_ttl_ms: u64,

    #[serde(default = "default_device_cache_key")]
    pub device_cache_key: String,

    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// Look-back of each batch fetch
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,

    #[serde(default = "default_warmup_retry_delay_ms")]
    pub warmup_retry_delay_ms: u64,

    #[serde(default = "default_cache_retry_delay_ms")]
    pub cache_retry_delay_ms: u64,

    /// Offset assumed for upstream timestamps that carry none
    #[serde(default = "default_upstream_naive_utc_offset_hours")]
    pub upstream_naive_utc_offset_hours: i32,

    /// Offset of the stored `monitorTime` strings
    #[serde(default = "default_display_utc_offset_hours")]
    pub display_utc_offset_hours: i32,

    // PostgreSQL
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    #[serde(default = "default_postgres_connect_timeout_ms")]
    pub postgres_connect_timeout_ms: u64,

    /// Create the tables on startup when they are missing
    #[serde(default)]
    pub postgres_ensure_schema: bool,

    /// Upper bound for cleanup on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "station-all-in-one".to_string()
}

fn default_mainstream_request_timeout_ms() -> u64 {
    30_000
}

fn default_device_cache_ttl_ms() -> u64 {
    300_000
}

fn default_device_cache_key() -> String {
    "main_stream_devices".to_string()
}

fn default_sync_interval_ms() -> u64 {
    60 * 60 * 1000
}

fn default_batch_window_ms() -> u64 {
    30 * 60 * 1000
}

fn default_warmup_retry_delay_ms() -> u64 {
    500
}

fn default_cache_retry_delay_ms() -> u64 {
    1000
}

fn default_upstream_naive_utc_offset_hours() -> i32 {
    8
}

fn default_display_utc_offset_hours() -> i32 {
    7
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "station".to_string()
}

fn default_postgres_username() -> String {
    "station".to_string()
}

fn default_postgres_password() -> String {
    "station".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_connect_timeout_ms() -> u64 {
    10_000
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("STATION"))
            .build()?
            .try_deserialize()
    }

    /// The configured upstream URL, if it is non-blank
    pub fn mainstream_base_url(&self) -> Option<&str> {
        self.mainstream_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}
