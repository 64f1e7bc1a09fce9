use std::net::SocketAddr;
use std::path::PathBuf;

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub regions_path: PathBuf,
    pub target_regions: Vec<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub scraper_request_timeout_secs: u64,
    pub scraper_user_agent: String,
    pub scraper_max_retries: u32,
    pub scraper_retry_backoff_base_ms: u64,
    /// Per-call item limit of the record store; sub-batches never exceed it.
    pub batch_size: usize,
    /// `None` when `SHOPDIR_RUN_TIMEOUT_SECS=0`.
    pub run_timeout_secs: Option<u64>,
    pub geocoding_enabled: bool,
    pub google_maps_api_key: Option<String>,
    pub geocoding_rate_limit: u32,
    pub geocode_not_found_ttl_hours: u64,
    /// `None` means successful lookups never expire.
    pub geocode_found_ttl_days: Option<u64>,
    pub slack_webhook_url: Option<String>,
    pub slack_channel: Option<String>,
    pub api_keys: Vec<String>,
    pub scrape_schedule: Vec<String>,
}

impl AppConfig {
    /// Returns the database URL, or an error naming the missing variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] if `DATABASE_URL` was not set.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("regions_path", &self.regions_path)
            .field("target_regions", &self.target_regions)
            .field("database_url", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field("scraper_user_agent", &self.scraper_user_agent)
            .field("scraper_max_retries", &self.scraper_max_retries)
            .field(
                "scraper_retry_backoff_base_ms",
                &self.scraper_retry_backoff_base_ms,
            )
            .field("batch_size", &self.batch_size)
            .field("run_timeout_secs", &self.run_timeout_secs)
            .field("geocoding_enabled", &self.geocoding_enabled)
            .field(
                "google_maps_api_key",
                &self.google_maps_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("geocoding_rate_limit", &self.geocoding_rate_limit)
            .field(
                "geocode_not_found_ttl_hours",
                &self.geocode_not_found_ttl_hours,
            )
            .field("geocode_found_ttl_days", &self.geocode_found_ttl_days)
            .field(
                "slack_webhook_url",
                &self.slack_webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .field("slack_channel", &self.slack_channel)
            .field("api_keys", &format!("[{} redacted]", self.api_keys.len()))
            .field("scrape_schedule", &self.scrape_schedule)
            .finish()
    }
}
