//! In-memory stores for dry runs and tests. Same contracts as the Postgres
//! stores, including compare-and-swap progress and all-or-nothing upserts.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use shopdir_core::{
    GeocodeCacheEntry, GeocodeCacheStore, Progress, ProgressKey, ProgressStore,
    ProgressStoreError, Record, RecordStore, RunHistory, RunResult, StoreError, Stores,
    UpsertCounts, WriteError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub struct MemoryRecordStore {
    rows: Mutex<BTreeMap<String, Record>>,
    max_batch_size: usize,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            max_batch_size: max_batch_size.max(1),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Record> {
        lock(&self.rows).get(id).cloned()
    }

    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        lock(&self.rows).values().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
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

        let now = Utc::now();
        let mut rows = lock(&self.rows);
        let mut counts = UpsertCounts::default();
        for record in records {
            let mut stored = record.clone();
            stored.updated_at = now;
            if let Some(existing) = rows.get(&record.id) {
                if stored.coordinate.is_none() {
                    stored.coordinate = existing.coordinate;
                }
                counts.updated += 1;
            } else {
                counts.created += 1;
            }
            rows.insert(record.id.clone(), stored);
        }
        Ok(counts)
    }
}

#[derive(Default)]
pub struct MemoryProgressStore {
    entries: Mutex<HashMap<ProgressKey, Progress>>,
}

impl MemoryProgressStore {
    #[must_use]
    pub fn snapshot(&self, key: &ProgressKey) -> Option<Progress> {
        lock(&self.entries).get(key).cloned()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load(&self, key: &ProgressKey) -> Result<Option<Progress>, ProgressStoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn save(
        &self,
        key: &ProgressKey,
        progress: &Progress,
        expected_revision: Option<i64>,
    ) -> Result<i64, ProgressStoreError> {
        let mut entries = lock(&self.entries);
        let current = entries.get(key).map(|p| p.revision);
        if current != expected_revision {
            return Err(ProgressStoreError::Conflict {
                key: key.to_string(),
                expected: expected_revision,
            });
        }
        let revision = current.unwrap_or(0) + 1;
        let mut stored = progress.clone();
        stored.revision = revision;
        stored.updated_at = Utc::now();
        entries.insert(key.clone(), stored);
        Ok(revision)
    }

    async fn clear(&self, key: &ProgressKey) -> Result<(), ProgressStoreError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryGeocodeCacheStore {
    entries: Mutex<HashMap<String, GeocodeCacheEntry>>,
}

impl MemoryGeocodeCacheStore {
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&self, entry: GeocodeCacheEntry) {
        lock(&self.entries).insert(entry.address_key.clone(), entry);
    }
}

#[async_trait]
impl GeocodeCacheStore for MemoryGeocodeCacheStore {
    async fn get(&self, address_key: &str) -> Result<Option<GeocodeCacheEntry>, StoreError> {
        Ok(lock(&self.entries).get(address_key).cloned())
    }

    async fn put(&self, entry: &GeocodeCacheEntry) -> Result<(), StoreError> {
        self.insert(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRunHistory {
    runs: Mutex<Vec<RunResult>>,
}

impl MemoryRunHistory {
    #[must_use]
    pub fn runs(&self) -> Vec<RunResult> {
        lock(&self.runs).clone()
    }
}

#[async_trait]
impl RunHistory for MemoryRunHistory {
    async fn record_run(&self, result: &RunResult) -> Result<(), StoreError> {
        lock(&self.runs).push(result.clone());
        Ok(())
    }

    async fn recent_runs(
        &self,
        region_code: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RunResult>, StoreError> {
        Ok(lock(&self.runs)
            .iter()
            .rev()
            .filter(|r| region_code.is_none_or(|code| r.region_code == code))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Concrete handles to a full set of in-memory stores.
#[derive(Clone)]
pub struct MemoryStores {
    pub records: Arc<MemoryRecordStore>,
    pub progress: Arc<MemoryProgressStore>,
    pub geocode_cache: Arc<MemoryGeocodeCacheStore>,
    pub history: Arc<MemoryRunHistory>,
}

impl MemoryStores {
    #[must_use]
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            records: Arc::new(MemoryRecordStore::new(max_batch_size)),
            progress: Arc::new(MemoryProgressStore::default()),
            geocode_cache: Arc::new(MemoryGeocodeCacheStore::default()),
            history: Arc::new(MemoryRunHistory::default()),
        }
    }

    #[must_use]
    pub fn stores(&self) -> Stores {
        Stores {
            records: self.records.clone(),
            progress: self.progress.clone(),
            geocode_cache: self.geocode_cache.clone(),
            history: self.history.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use shopdir_core::Progress;

    use super::*;

    fn progress(page: u32) -> Progress {
        Progress {
            last_completed_page: page,
            empty_page_streak: 0,
            pending: Vec::new(),
            records_written: 0,
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn progress_save_is_compare_and_swap() {
        let store = MemoryProgressStore::default();
        let key = ProgressKey::scrape("08");

        let r1 = store.save(&key, &progress(1), None).await.unwrap();
        assert_eq!(r1, 1);
        let r2 = store.save(&key, &progress(2), Some(r1)).await.unwrap();
        assert_eq!(r2, 2);

        let stale = store.save(&key, &progress(3), Some(r1)).await;
        assert!(matches!(stale, Err(ProgressStoreError::Conflict { .. })));
        let duplicate_create = store.save(&key, &progress(3), None).await;
        assert!(matches!(duplicate_create, Err(ProgressStoreError::Conflict { .. })));

        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.last_completed_page, 2);
        assert_eq!(loaded.revision, 2);

        store.clear(&key).await.unwrap();
        assert!(store.load(&key).await.unwrap().is_none());
    }
}
