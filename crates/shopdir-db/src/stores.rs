//! Postgres implementations of the pipeline's storage traits.

use std::sync::Arc;

use async_trait::async_trait;
use shopdir_core::{
    GeocodeCacheEntry, GeocodeCacheStore, Progress, ProgressKey, ProgressStore,
    ProgressStoreError, Record, RecordStore, RunHistory, RunResult, StoreError, Stores,
    UpsertCounts, WriteError,
};
use sqlx::error::ErrorKind;
use sqlx::PgPool;

use crate::{geocode_cache, progress, scrape_runs, shops, DbError};

pub struct PgRecordStore {
    pool: PgPool,
    max_batch_size: usize,
}

impl PgRecordStore {
    #[must_use]
    pub fn new(pool: PgPool, max_batch_size: usize) -> Self {
        Self {
            pool,
            max_batch_size: max_batch_size.max(1),
        }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn upsert_records(&self, records: &[Record]) -> Result<UpsertCounts, WriteError> {
        if records.len() > self.max_batch_size {
            return Err(WriteError::TooLarge {
                size: records.len(),
                limit: self.max_batch_size,
            });
        }
        if let Some((record, reason)) = records
            .iter()
            .find_map(|r| r.validation_error().map(|reason| (r, reason)))
        {
            return Err(WriteError::Rejected {
                id: record.id.clone(),
                reason,
            });
        }
        shops::upsert_shops(&self.pool, records)
            .await
            .map_err(WriteError::from)
    }
}

/// Constraint and data errors are the records' fault; anything else may pass
/// on a later attempt.
impl From<DbError> for WriteError {
    fn from(error: DbError) -> Self {
        if let DbError::Sqlx(sqlx::Error::Database(db)) = &error {
            let data_exception = db.code().is_some_and(|code| code.starts_with("22"));
            if data_exception
                || matches!(
                    db.kind(),
                    ErrorKind::CheckViolation | ErrorKind::NotNullViolation
                )
            {
                return WriteError::Invalid(db.message().to_string());
            }
        }
        WriteError::Backend(error.to_string())
    }
}

pub struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(error: &DbError) -> ProgressStoreError {
    ProgressStoreError::Backend(error.to_string())
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn load(&self, key: &ProgressKey) -> Result<Option<Progress>, ProgressStoreError> {
        progress::load_progress(&self.pool, key)
            .await
            .and_then(|row| row.map(progress::ProgressRow::into_progress).transpose())
            .map_err(|e| backend(&e))
    }

    async fn save(
        &self,
        key: &ProgressKey,
        progress: &Progress,
        expected_revision: Option<i64>,
    ) -> Result<i64, ProgressStoreError> {
        match progress::save_progress(&self.pool, key, progress, expected_revision).await {
            Ok(Some(revision)) => Ok(revision),
            Ok(None) => Err(ProgressStoreError::Conflict {
                key: key.to_string(),
                expected: expected_revision,
            }),
            Err(e) => Err(backend(&e)),
        }
    }

    async fn clear(&self, key: &ProgressKey) -> Result<(), ProgressStoreError> {
        progress::clear_progress(&self.pool, key)
            .await
            .map(|_| ())
            .map_err(|e| backend(&e))
    }
}

pub struct PgGeocodeCacheStore {
    pool: PgPool,
}

impl PgGeocodeCacheStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GeocodeCacheStore for PgGeocodeCacheStore {
    async fn get(&self, address_key: &str) -> Result<Option<GeocodeCacheEntry>, StoreError> {
        geocode_cache::get_geocode_entry(&self.pool, address_key)
            .await
            .map_err(|e| StoreError(e.to_string()))
    }

    async fn put(&self, entry: &GeocodeCacheEntry) -> Result<(), StoreError> {
        geocode_cache::put_geocode_entry(&self.pool, entry)
            .await
            .map_err(|e| StoreError(e.to_string()))
    }
}

pub struct PgRunHistory {
    pool: PgPool,
}

impl PgRunHistory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunHistory for PgRunHistory {
    async fn record_run(&self, result: &RunResult) -> Result<(), StoreError> {
        scrape_runs::insert_scrape_run(&self.pool, result)
            .await
            .map(|_| ())
            .map_err(|e| StoreError(e.to_string()))
    }

    async fn recent_runs(
        &self,
        region_code: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RunResult>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = scrape_runs::list_scrape_runs(&self.pool, region_code, limit)
            .await
            .map_err(|e| StoreError(e.to_string()))?;
        rows.into_iter()
            .map(scrape_runs::ScrapeRunRow::into_run_result)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError(e.to_string()))
    }
}

/// Postgres-backed [`Stores`] sharing one pool.
#[must_use]
pub fn pg_stores(pool: &PgPool, max_batch_size: usize) -> Stores {
    Stores {
        records: Arc::new(PgRecordStore::new(pool.clone(), max_batch_size)),
        progress: Arc::new(PgProgressStore::new(pool.clone())),
        geocode_cache: Arc::new(PgGeocodeCacheStore::new(pool.clone())),
        history: Arc::new(PgRunHistory::new(pool.clone())),
    }
}
