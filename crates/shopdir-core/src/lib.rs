pub mod app_config;
pub mod config;
pub mod geocode;
pub mod notify;
pub mod progress;
pub mod records;
pub mod regions;
pub mod run;
pub mod store;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use geocode::{normalize_address, GeocodeCacheEntry};
pub use notify::{NotifyError, Notifier, RunEvent};
pub use progress::{Progress, ProgressKey, SCRAPE_PURPOSE};
pub use records::{Coordinate, Record};
pub use regions::{
    load_regions, parse_regions, LabelTableSelectors, PaginationConfig, ParserConfig, PatternSelectors,
    RateLimitConfig, RegionConfig, RegionsFile, SessionConfig, RECORD_FIELDS,
};
pub use run::{RecordFailure, RunCounts, RunResult, RunStatus, StopReason};
pub use store::{
    GeocodeCacheStore, ProgressStore, ProgressStoreError, RecordStore, RunHistory, StoreError,
    Stores, UpsertCounts, WriteError,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read regions file {path}: {source}")]
    RegionsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse regions file: {0}")]
    RegionsFileParse(#[source] serde_yaml::Error),

    #[error("region config validation failed: {0}")]
    Validation(String),
}
