//! Access-time batcher.
//!
//! Reads record a last-access timestamp for tiering decisions. Writing one
//! metadata command per GET would serialize reads on the write lock, so
//! accesses coalesce in memory and flush periodically as a single
//! `BatchAccessTimes` command. Duplicate entries keep the latest timestamp.

use objvault_raft::codec::AccessTimesPayload;
use objvault_raft::{Command, ReplicatedStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

/// Coalescing buffer of `(bucket, key) -> unix seconds`.
#[derive(Debug, Default)]
pub struct AccessTimeBatcher {
    pending: Mutex<HashMap<(String, String), i64>>,
}

impl AccessTimeBatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one access; later timestamps win.
    pub fn record(&self, bucket: &str, key: &str, timestamp: i64) {
        let mut pending = self.pending.lock();
        let entry = pending
            .entry((bucket.to_string(), key.to_string()))
            .or_insert(timestamp);
        if timestamp > *entry {
            *entry = timestamp;
        }
    }

    /// Number of buffered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Take the buffered entries, leaving the buffer empty.
    #[must_use]
    pub fn drain(&self) -> Vec<(String, String, i64)> {
        let mut pending = self.pending.lock();
        let mut entries: Vec<(String, String, i64)> = pending
            .drain()
            .map(|((bucket, key), ts)| (bucket, key, ts))
            .collect();
        entries.sort();
        entries
    }

    /// Flush buffered accesses through the replicated store. Failures are
    /// logged and dropped; access times are advisory.
    pub async fn flush(&self, replicated: &ReplicatedStore) {
        let entries = self.drain();
        if entries.is_empty() {
            return;
        }
        let count = entries.len();
        if let Err(e) = replicated
            .apply(&Command::BatchAccessTimes(AccessTimesPayload { entries }))
            .await
        {
            warn!(count, error = %e, "access-time flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesces_to_latest() {
        let batcher = AccessTimeBatcher::new();
        batcher.record("b", "k", 10);
        batcher.record("b", "k", 30);
        batcher.record("b", "k", 20);
        batcher.record("b", "other", 5);

        let entries = batcher.drain();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&("b".into(), "k".into(), 30)));
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn test_flush_applies_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(
            objvault_store::Store::open(dir.path().join("meta.redb")).unwrap(),
        );
        let replicated = ReplicatedStore::single_node(store.clone());

        // Seed an object so the batch lands somewhere.
        replicated
            .apply(&Command::PutObjectMeta(Box::new(
                objvault_common::types::ObjectMeta {
                    bucket: "b".into(),
                    key: "k".into(),
                    last_modified: 1,
                    ..Default::default()
                },
            )))
            .await
            .unwrap();

        let batcher = AccessTimeBatcher::new();
        batcher.record("b", "k", 99);
        batcher.flush(&replicated).await;

        let rtx = store.begin_read().unwrap();
        let meta = objvault_store::object::get_object(&rtx, "b", "k").unwrap().unwrap();
        assert_eq!(meta.last_access, 99);
    }
}
