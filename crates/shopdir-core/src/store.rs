//! Storage seams used by the scrape pipeline. Postgres and in-memory
//! implementations live in other crates.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::geocode::GeocodeCacheEntry;
use crate::progress::{Progress, ProgressKey};
use crate::records::Record;
use crate::run::RunResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub created: u64,
    pub updated: u64,
}

impl UpsertCounts {
    #[must_use]
    pub fn total(self) -> u64 {
        self.created + self.updated
    }
}

/// Failure of one store call. The whole call is rolled back.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("record {id} rejected: {reason}")]
    Rejected { id: String, reason: String },

    /// The backend refused the data without naming the offending record.
    #[error("records refused by storage: {0}")]
    Invalid(String),

    #[error("batch of {size} exceeds store limit of {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl WriteError {
    /// True when resubmitting the same records unchanged fails again.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !matches!(self, WriteError::Backend(_))
    }
}

#[derive(Debug, Error)]
pub enum ProgressStoreError {
    #[error("progress for {key} was modified concurrently (expected revision {expected:?})")]
    Conflict { key: String, expected: Option<i64> },

    #[error("progress store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
#[error("store backend error: {0}")]
pub struct StoreError(pub String);

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Largest slice accepted by one [`RecordStore::upsert_records`] call.
    fn max_batch_size(&self) -> usize;

    /// Upserts by `Record::id`, refreshing `updated_at` on existing rows.
    /// All-or-nothing per call.
    async fn upsert_records(&self, records: &[Record]) -> Result<UpsertCounts, WriteError>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load(&self, key: &ProgressKey) -> Result<Option<Progress>, ProgressStoreError>;

    /// Conditional write. `expected_revision: None` means the key must not
    /// exist yet. Returns the new revision.
    async fn save(
        &self,
        key: &ProgressKey,
        progress: &Progress,
        expected_revision: Option<i64>,
    ) -> Result<i64, ProgressStoreError>;

    async fn clear(&self, key: &ProgressKey) -> Result<(), ProgressStoreError>;
}

#[async_trait]
pub trait GeocodeCacheStore: Send + Sync {
    async fn get(&self, address_key: &str) -> Result<Option<GeocodeCacheEntry>, StoreError>;
    async fn put(&self, entry: &GeocodeCacheEntry) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RunHistory: Send + Sync {
    async fn record_run(&self, result: &RunResult) -> Result<(), StoreError>;
    async fn recent_runs(
        &self,
        region_code: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RunResult>, StoreError>;
}

/// The storage collaborators one scrape run needs, bundled for wiring.
#[derive(Clone)]
pub struct Stores {
    pub records: Arc<dyn RecordStore>,
    pub progress: Arc<dyn ProgressStore>,
    pub geocode_cache: Arc<dyn GeocodeCacheStore>,
    pub history: Arc<dyn RunHistory>,
}
