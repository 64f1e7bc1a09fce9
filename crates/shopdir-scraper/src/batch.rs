use std::collections::HashMap;
use std::sync::Arc;

use shopdir_core::{Record, RecordStore, UpsertCounts, WriteError};

/// What a batch write achieved. Both failure lists carry the store's reason.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub written: u64,
    pub created: u64,
    pub updated: u64,
    /// Transient failures; worth submitting again later.
    pub failed: Vec<(Record, String)>,
    /// Records the store will never accept as they are.
    pub rejected: Vec<(Record, String)>,
}

impl BatchOutcome {
    fn absorb(&mut self, other: BatchOutcome) {
        self.written += other.written;
        self.created += other.created;
        self.updated += other.updated;
        self.failed.extend(other.failed);
        self.rejected.extend(other.rejected);
    }

    fn committed(counts: UpsertCounts) -> Self {
        Self {
            written: counts.total(),
            created: counts.created,
            updated: counts.updated,
            ..Self::default()
        }
    }

    fn all_failed(records: &[Record], error: &WriteError) -> Self {
        let reason = error.to_string();
        let failed = records.iter().map(|r| (r.clone(), reason.clone())).collect();
        if error.is_permanent() {
            Self {
                rejected: failed,
                ..Self::default()
            }
        } else {
            Self {
                failed,
                ..Self::default()
            }
        }
    }
}

/// Buffers records and writes them in sub-batches no larger than the
/// store's per-call limit. A failed sub-batch never stops the others, and a
/// sub-batch refused over bad data is rewritten one record at a time so only
/// the bad records fail.
pub struct BatchWriter {
    store: Arc<dyn RecordStore>,
    batch_size: usize,
    buffer: Vec<Record>,
}

impl BatchWriter {
    /// `batch_size` is clamped to the store's own limit.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, batch_size: usize) -> Self {
        let batch_size = batch_size.min(store.max_batch_size()).max(1);
        Self {
            store,
            batch_size,
            buffer: Vec::new(),
        }
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn push(&mut self, record: Record) {
        self.buffer.push(record);
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Writes everything buffered and empties the buffer.
    pub async fn flush(&mut self) -> BatchOutcome {
        let records = std::mem::take(&mut self.buffer);
        self.write_batch(&records).await
    }

    /// Upserts `records` in fixed-size sub-batches. Repeated ids keep the
    /// last occurrence.
    pub async fn write_batch(&self, records: &[Record]) -> BatchOutcome {
        let unique = dedupe_by_id(records);
        let mut outcome = BatchOutcome::default();

        for (index, chunk) in unique.chunks(self.batch_size).enumerate() {
            outcome.absorb(self.write_chunk(index, chunk).await);
        }
        outcome
    }

    async fn write_chunk(&self, index: usize, chunk: &[Record]) -> BatchOutcome {
        match self.store.upsert_records(chunk).await {
            Ok(counts) => {
                tracing::debug!(
                    chunk = index,
                    size = chunk.len(),
                    created = counts.created,
                    updated = counts.updated,
                    "sub-batch committed"
                );
                BatchOutcome::committed(counts)
            }
            Err(e) if e.is_permanent() && chunk.len() > 1 => {
                tracing::warn!(
                    chunk = index,
                    size = chunk.len(),
                    error = %e,
                    "sub-batch refused; writing its records one at a time"
                );
                self.write_singly(chunk).await
            }
            Err(e) => {
                tracing::warn!(chunk = index, size = chunk.len(), error = %e, "sub-batch failed");
                BatchOutcome::all_failed(chunk, &e)
            }
        }
    }

    async fn write_singly(&self, records: &[Record]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for record in records {
            let single = std::slice::from_ref(record);
            outcome.absorb(match self.store.upsert_records(single).await {
                Ok(counts) => BatchOutcome::committed(counts),
                Err(e) => {
                    tracing::warn!(record = %record.id, error = %e, "record not written");
                    BatchOutcome::all_failed(single, &e)
                }
            });
        }
        outcome
    }
}

fn dedupe_by_id(records: &[Record]) -> Vec<Record> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<Record> = Vec::with_capacity(records.len());
    for record in records {
        if let Some(&i) = position.get(record.id.as_str()) {
            unique[i] = record.clone();
        } else {
            position.insert(record.id.as_str(), unique.len());
            unique.push(record.clone());
        }
    }
    unique
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod tests;
