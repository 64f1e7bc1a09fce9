use std::sync::Arc;

use async_trait::async_trait;

use super::*;
use crate::memory::MemoryRecordStore;
use crate::test_support::record;

fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| record(&format!("08_{i:08}"), &format!("Shop {i}")))
        .collect()
}

#[tokio::test]
async fn splits_into_store_sized_sub_batches() {
    let store = Arc::new(MemoryRecordStore::new(2));
    let writer = BatchWriter::new(store.clone(), 500);
    assert_eq!(writer.batch_size(), 2);

    let outcome = writer.write_batch(&records(5)).await;
    assert_eq!(outcome.written, 5);
    assert_eq!(outcome.created, 5);
    assert!(outcome.failed.is_empty());
    assert_eq!(store.len(), 5);
}

#[tokio::test]
async fn malformed_record_fails_alone() {
    let store = Arc::new(MemoryRecordStore::new(2));
    let writer = BatchWriter::new(store.clone(), 2);
    let mut input = records(6);
    input[3].name = String::new();

    let outcome = writer.write_batch(&input).await;
    assert_eq!(outcome.written, 5);
    assert!(outcome.failed.is_empty());
    let rejected: Vec<&str> = outcome.rejected.iter().map(|(r, _)| r.id.as_str()).collect();
    assert_eq!(rejected, vec!["08_00000003"]);
    assert!(outcome.rejected[0].1.contains("shop name is empty"));
    assert_eq!(store.len(), 5);
    assert!(store.get("08_00000002").is_some());
    assert!(store.get("08_00000003").is_none());
}

/// Refuses any call containing a record named "corrupt" without saying which
/// one, like a database constraint violation.
struct ConstraintStore {
    inner: MemoryRecordStore,
}

#[async_trait]
impl RecordStore for ConstraintStore {
    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }

    async fn upsert_records(&self, records: &[Record]) -> Result<UpsertCounts, WriteError> {
        if records.iter().any(|r| r.name == "corrupt") {
            return Err(WriteError::Invalid("violates check constraint".to_string()));
        }
        self.inner.upsert_records(records).await
    }
}

#[tokio::test]
async fn unattributed_refusal_is_narrowed_to_the_bad_record() {
    let store = Arc::new(ConstraintStore {
        inner: MemoryRecordStore::new(10),
    });
    let writer = BatchWriter::new(store.clone(), 10);
    let mut input = records(3);
    input[1].name = "corrupt".to_string();

    let outcome = writer.write_batch(&input).await;
    assert_eq!(outcome.written, 2);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].0.id, "08_00000001");
    assert_eq!(store.inner.len(), 2);
}

struct DownStore;

#[async_trait]
impl RecordStore for DownStore {
    fn max_batch_size(&self) -> usize {
        10
    }

    async fn upsert_records(&self, _records: &[Record]) -> Result<UpsertCounts, WriteError> {
        Err(WriteError::Backend("connection refused".to_string()))
    }
}

#[tokio::test]
async fn backend_outage_is_transient() {
    let writer = BatchWriter::new(Arc::new(DownStore), 10);

    let outcome = writer.write_batch(&records(3)).await;
    assert_eq!(outcome.written, 0);
    assert_eq!(outcome.failed.len(), 3);
    assert!(outcome.rejected.is_empty());
}

#[tokio::test]
async fn rewriting_updates_without_duplicates() {
    let store = Arc::new(MemoryRecordStore::new(10));
    let writer = BatchWriter::new(store.clone(), 10);
    let input = records(3);

    let first = writer.write_batch(&input).await;
    let before = store.get("08_00000001").unwrap().updated_at;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = writer.write_batch(&input).await;

    assert_eq!(first.created, 3);
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 3);
    assert_eq!(store.len(), 3);
    assert!(store.get("08_00000001").unwrap().updated_at > before);
}

#[tokio::test]
async fn repeated_ids_in_one_call_keep_the_last() {
    let store = Arc::new(MemoryRecordStore::new(10));
    let writer = BatchWriter::new(store.clone(), 10);
    let input = vec![record("08_a", "Old"), record("08_b", "B"), record("08_a", "New")];

    let outcome = writer.write_batch(&input).await;
    assert_eq!(outcome.written, 2);
    assert_eq!(store.get("08_a").unwrap().name, "New");
}

#[tokio::test]
async fn flush_drains_the_buffer() {
    let store = Arc::new(MemoryRecordStore::new(10));
    let mut writer = BatchWriter::new(store.clone(), 10);
    writer.push(record("08_a", "A"));
    writer.push(record("08_b", "B"));
    assert_eq!(writer.buffered(), 2);

    let outcome = writer.flush().await;
    assert_eq!(outcome.written, 2);
    assert_eq!(writer.buffered(), 0);
    assert_eq!(writer.flush().await.written, 0);
}
