//! Transactional KV store over redb.
//!
//! One writer at a time, many concurrent readers; a write transaction commits
//! atomically or not at all. Waiting for the write slot is bounded so callers
//! get a typed `Busy` error instead of queueing without limit.

use crate::error::{Result, StoreError};
use crate::tables::{self, Keyspace};
use parking_lot::{Mutex, MutexGuard};
use redb::{Database, ReadableTable, ReadableTableMetadata};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long `begin_write` waits for the write slot before reporting busy
const WRITE_WAIT: Duration = Duration::from_secs(1);

/// Embedded metadata store
pub struct Store {
    db: Arc<Database>,
    write_gate: Mutex<()>,
}

impl Store {
    /// Open (or create) the store at `path` and ensure every keyspace exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref())
            .map_err(|e| StoreError::Storage(format!("open metadata database: {e}")))?;

        let wtx = db.begin_write()?;
        for ks in Keyspace::ALL {
            wtx.open_table(ks.table())?;
        }
        wtx.open_table(tables::SEQUENCES)?;
        wtx.commit()?;

        info!(path = %path.as_ref().display(), "opened metadata store");
        Ok(Self {
            db: Arc::new(db),
            write_gate: Mutex::new(()),
        })
    }

    /// Begin a read-only transaction over the latest committed snapshot.
    pub fn begin_read(&self) -> Result<ReadTxn> {
        Ok(ReadTxn {
            txn: self.db.begin_read()?,
        })
    }

    /// Begin a write transaction, waiting at most one second for the slot.
    pub fn begin_write(&self) -> Result<WriteTxn<'_>> {
        let gate = self
            .write_gate
            .try_lock_for(WRITE_WAIT)
            .ok_or(StoreError::Busy)?;
        Ok(WriteTxn {
            txn: self.db.begin_write()?,
            _gate: gate,
        })
    }

    // ── Change log ────────────────────────────────────────────────────────────

    /// Append one record to the change log and return its sequence.
    pub fn append_change_log(&self, payload: &[u8]) -> Result<u64> {
        let mut txn = self.begin_write()?;
        let seq = txn.append_change_log(payload)?;
        txn.commit()?;
        Ok(seq)
    }

    /// Read up to `limit` records with sequence > `since_seq`, ascending.
    pub fn read_change_log(&self, since_seq: u64, limit: usize) -> Result<Vec<(u64, Vec<u8>)>> {
        let rtx = self.begin_read()?;
        let mut out = Vec::new();
        let start = tables::sequence_key(since_seq.saturating_add(1));
        rtx.range(Keyspace::ChangeLog, &start, |k, v| {
            if out.len() >= limit {
                return false;
            }
            if let Ok(raw) = <[u8; 8]>::try_from(k) {
                out.push((u64::from_be_bytes(raw), v.to_vec()));
            }
            true
        })?;
        Ok(out)
    }

    /// Remove change-log records with sequence < `before_seq`.
    pub fn trim_change_log(&self, before_seq: u64) -> Result<u64> {
        let mut txn = self.begin_write()?;
        let removed = txn.trim_change_log(before_seq)?;
        txn.commit()?;
        Ok(removed)
    }

    // ── Snapshot ──────────────────────────────────────────────────────────────

    /// Emit every keyspace to `w` in the snapshot wire format:
    /// `[u32 name_len, name, u64 kv_count, {u32 k_len, k, u32 v_len, v}*]`,
    /// big-endian, keyspaces in declaration order.
    pub fn write_snapshot(&self, w: &mut dyn Write) -> Result<()> {
        let rtx = self.db.begin_read()?;
        for ks in Keyspace::ALL {
            let table = rtx.open_table(ks.table())?;
            let name = ks.name().as_bytes();
            w.write_all(&(name.len() as u32).to_be_bytes())?;
            w.write_all(name)?;
            w.write_all(&table.len()?.to_be_bytes())?;
            for entry in table.iter()? {
                let (k, v) = entry?;
                w.write_all(&(k.value().len() as u32).to_be_bytes())?;
                w.write_all(k.value())?;
                w.write_all(&(v.value().len() as u32).to_be_bytes())?;
                w.write_all(v.value())?;
            }
        }
        Ok(())
    }

    /// Replace the entire store contents with the snapshot stream from `r`.
    ///
    /// Runs in a single write transaction: on any error the transaction is
    /// dropped without commit and the previous state survives.
    pub fn restore_snapshot(&self, r: &mut dyn Read) -> Result<()> {
        let gate = self
            .write_gate
            .try_lock_for(WRITE_WAIT)
            .ok_or(StoreError::Busy)?;
        let _gate = gate;
        let wtx = self.db.begin_write()?;

        // Clear every keyspace and the sequence allocators.
        for ks in Keyspace::ALL {
            wtx.delete_table(ks.table())?;
            wtx.open_table(ks.table())?;
        }
        wtx.delete_table(tables::SEQUENCES)?;
        wtx.open_table(tables::SEQUENCES)?;

        let mut restored = 0u64;
        loop {
            let mut len_buf = [0u8; 4];
            match r.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let name_len = u32::from_be_bytes(len_buf) as usize;
            let mut name = vec![0u8; name_len];
            r.read_exact(&mut name)?;
            let name = String::from_utf8(name)
                .map_err(|_| StoreError::CorruptSnapshot("keyspace name not utf-8".into()))?;
            let ks = Keyspace::from_name(&name).ok_or_else(|| {
                StoreError::CorruptSnapshot(format!("unknown keyspace: {name}"))
            })?;

            let mut count_buf = [0u8; 8];
            r.read_exact(&mut count_buf)?;
            let count = u64::from_be_bytes(count_buf);

            let mut table = wtx.open_table(ks.table())?;
            let mut last_key: Option<Vec<u8>> = None;
            for _ in 0..count {
                r.read_exact(&mut len_buf)?;
                let mut key = vec![0u8; u32::from_be_bytes(len_buf) as usize];
                r.read_exact(&mut key)?;
                r.read_exact(&mut len_buf)?;
                let mut value = vec![0u8; u32::from_be_bytes(len_buf) as usize];
                r.read_exact(&mut value)?;
                table.insert(key.as_slice(), value.as_slice())?;
                last_key = Some(key);
                restored += 1;
            }
            drop(table);

            // Sequenced keyspaces resume allocation after the highest
            // restored key so post-restore appends never collide.
            if matches!(ks, Keyspace::ChangeLog | Keyspace::ReplicationQueue) {
                if let Some(last) = last_key.as_deref().and_then(|k| <[u8; 8]>::try_from(k).ok()) {
                    let mut seqs = wtx.open_table(tables::SEQUENCES)?;
                    seqs.insert(ks.name().as_bytes(), last.as_slice())?;
                }
            }
        }

        wtx.commit()?;
        info!(records = restored, "restored metadata snapshot");
        Ok(())
    }
}

/// Read-only transaction
pub struct ReadTxn {
    txn: redb::ReadTransaction,
}

impl ReadTxn {
    /// Fetch one value.
    pub fn get(&self, ks: Keyspace, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = self.txn.open_table(ks.table())?;
        let value = table.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    /// Visit every entry; stop when `f` returns false.
    pub fn for_each(&self, ks: Keyspace, mut f: impl FnMut(&[u8], &[u8]) -> bool) -> Result<()> {
        let table = self.txn.open_table(ks.table())?;
        for entry in table.iter()? {
            let (k, v) = entry?;
            if !f(k.value(), v.value()) {
                break;
            }
        }
        Ok(())
    }

    /// Visit entries with key >= `start`, ascending; stop when `f` returns false.
    pub fn range(
        &self,
        ks: Keyspace,
        start: &[u8],
        mut f: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        let table = self.txn.open_table(ks.table())?;
        for entry in table.range(start..)? {
            let (k, v) = entry?;
            if !f(k.value(), v.value()) {
                break;
            }
        }
        Ok(())
    }

    /// Number of entries in a keyspace.
    pub fn len(&self, ks: Keyspace) -> Result<u64> {
        Ok(self.txn.open_table(ks.table())?.len()?)
    }

    /// Last allocated sequence for a keyspace, 0 if none.
    pub fn keyspace_sequence(&self, ks: Keyspace) -> Result<u64> {
        let table = self.txn.open_table(tables::SEQUENCES)?;
        let value = table
            .get(ks.name().as_bytes())?
            .and_then(|v| <[u8; 8]>::try_from(v.value()).ok())
            .map_or(0, u64::from_be_bytes);
        Ok(value)
    }
}

/// Read-write transaction; commits atomically via [`WriteTxn::commit`].
pub struct WriteTxn<'a> {
    txn: redb::WriteTransaction,
    _gate: MutexGuard<'a, ()>,
}

impl WriteTxn<'_> {
    /// Fetch one value (sees this transaction's own writes).
    pub fn get(&self, ks: Keyspace, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = self.txn.open_table(ks.table())?;
        let value = table.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    /// Insert or overwrite one entry.
    pub fn put(&mut self, ks: Keyspace, key: &[u8], value: &[u8]) -> Result<()> {
        let mut table = self.txn.open_table(ks.table())?;
        table.insert(key, value)?;
        Ok(())
    }

    /// Remove one entry; returns whether it existed.
    pub fn delete(&mut self, ks: Keyspace, key: &[u8]) -> Result<bool> {
        let mut table = self.txn.open_table(ks.table())?;
        let existed = table.remove(key)?.is_some();
        Ok(existed)
    }

    /// Visit every entry; stop when `f` returns false.
    pub fn for_each(&self, ks: Keyspace, mut f: impl FnMut(&[u8], &[u8]) -> bool) -> Result<()> {
        let table = self.txn.open_table(ks.table())?;
        for entry in table.iter()? {
            let (k, v) = entry?;
            if !f(k.value(), v.value()) {
                break;
            }
        }
        Ok(())
    }

    /// Visit entries with key >= `start`, ascending; stop when `f` returns false.
    pub fn range(
        &self,
        ks: Keyspace,
        start: &[u8],
        mut f: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        let table = self.txn.open_table(ks.table())?;
        for entry in table.range(start..)? {
            let (k, v) = entry?;
            if !f(k.value(), v.value()) {
                break;
            }
        }
        Ok(())
    }

    /// Collect and remove every key matching `pred` (two-phase so the table
    /// is not mutated while iterating). Returns the number removed.
    pub fn delete_where(
        &mut self,
        ks: Keyspace,
        mut pred: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<u64> {
        let mut doomed: Vec<Vec<u8>> = Vec::new();
        self.for_each(ks, |k, v| {
            if pred(k, v) {
                doomed.push(k.to_vec());
            }
            true
        })?;
        let mut table = self.txn.open_table(ks.table())?;
        for key in &doomed {
            table.remove(key.as_slice())?;
        }
        Ok(doomed.len() as u64)
    }

    /// Allocate the next sequence for a keyspace.
    pub fn next_sequence(&mut self, ks: Keyspace) -> Result<u64> {
        let mut table = self.txn.open_table(tables::SEQUENCES)?;
        let current = table
            .get(ks.name().as_bytes())?
            .and_then(|v| <[u8; 8]>::try_from(v.value()).ok())
            .map_or(0, u64::from_be_bytes);
        let next = current + 1;
        table.insert(ks.name().as_bytes(), next.to_be_bytes().as_slice())?;
        Ok(next)
    }

    /// Last allocated sequence for a keyspace, 0 if none.
    pub fn keyspace_sequence(&self, ks: Keyspace) -> Result<u64> {
        let table = self.txn.open_table(tables::SEQUENCES)?;
        let value = table
            .get(ks.name().as_bytes())?
            .and_then(|v| <[u8; 8]>::try_from(v.value()).ok())
            .map_or(0, u64::from_be_bytes);
        Ok(value)
    }

    /// Append one record to the change log within this transaction.
    pub fn append_change_log(&mut self, payload: &[u8]) -> Result<u64> {
        let seq = self.next_sequence(Keyspace::ChangeLog)?;
        self.put(Keyspace::ChangeLog, &tables::sequence_key(seq), payload)?;
        debug!(seq, "appended change log record");
        Ok(seq)
    }

    /// Remove change-log records with sequence < `before_seq`.
    pub fn trim_change_log(&mut self, before_seq: u64) -> Result<u64> {
        self.delete_where(Keyspace::ChangeLog, |k, _| {
            <[u8; 8]>::try_from(k).is_ok_and(|raw| u64::from_be_bytes(raw) < before_seq)
        })
    }

    /// Commit the transaction.
    pub fn commit(self) -> Result<()> {
        self.txn.commit()?;
        Ok(())
    }
}

/// Decode a JSON record, returning `None` (and logging) on corrupt data so
/// iterators skip rather than fail.
pub fn decode_json<T: serde::de::DeserializeOwned>(ks: Keyspace, key: &[u8], value: &[u8]) -> Option<T> {
    match serde_json::from_slice(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(
                keyspace = ks.name(),
                key = %String::from_utf8_lossy(key),
                error = %e,
                "skipping corrupt record"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("meta.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_get_delete() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        txn.put(Keyspace::Buckets, b"b1", b"{}").unwrap();
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        assert_eq!(rtx.get(Keyspace::Buckets, b"b1").unwrap(), Some(b"{}".to_vec()));
        assert_eq!(rtx.get(Keyspace::Buckets, b"b2").unwrap(), None);
        drop(rtx);

        let mut txn = store.begin_write().unwrap();
        assert!(txn.delete(Keyspace::Buckets, b"b1").unwrap());
        assert!(!txn.delete(Keyspace::Buckets, b"b1").unwrap());
        txn.commit().unwrap();
    }

    #[test]
    fn test_uncommitted_write_not_visible() {
        let (_dir, store) = temp_store();
        {
            let mut txn = store.begin_write().unwrap();
            txn.put(Keyspace::Buckets, b"ghost", b"{}").unwrap();
            // dropped without commit
        }
        let rtx = store.begin_read().unwrap();
        assert_eq!(rtx.get(Keyspace::Buckets, b"ghost").unwrap(), None);
    }

    #[test]
    fn test_sequences_monotonic() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        assert_eq!(txn.next_sequence(Keyspace::ChangeLog).unwrap(), 1);
        assert_eq!(txn.next_sequence(Keyspace::ChangeLog).unwrap(), 2);
        assert_eq!(txn.next_sequence(Keyspace::ReplicationQueue).unwrap(), 1);
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        assert_eq!(rtx.keyspace_sequence(Keyspace::ChangeLog).unwrap(), 2);
    }

    #[test]
    fn test_change_log_append_read_trim() {
        let (_dir, store) = temp_store();
        for payload in [b"a".as_slice(), b"b", b"c"] {
            store.append_change_log(payload).unwrap();
        }

        let all = store.read_change_log(0, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], (1, b"a".to_vec()));
        assert_eq!(all[2], (3, b"c".to_vec()));

        let tail = store.read_change_log(1, 10).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].0, 2);

        let limited = store.read_change_log(0, 1).unwrap();
        assert_eq!(limited.len(), 1);

        assert_eq!(store.trim_change_log(3).unwrap(), 2);
        let rest = store.read_change_log(0, 10).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].0, 3);
    }

    #[test]
    fn test_range_scan() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        for key in ["a/1", "a/2", "b/1"] {
            txn.put(Keyspace::Objects, key.as_bytes(), b"{}").unwrap();
        }
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        let mut seen = Vec::new();
        rtx.range(Keyspace::Objects, b"a/", |k, _| {
            if !k.starts_with(b"a/") {
                return false;
            }
            seen.push(String::from_utf8_lossy(k).into_owned());
            true
        })
        .unwrap();
        assert_eq!(seen, vec!["a/1", "a/2"]);
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        txn.put(Keyspace::Buckets, b"b1", br#"{"name":"b1"}"#).unwrap();
        txn.put(Keyspace::Objects, b"b1/k", br#"{"key":"k"}"#).unwrap();
        txn.commit().unwrap();
        store.append_change_log(b"cmd1").unwrap();

        let mut snap = Vec::new();
        store.write_snapshot(&mut snap).unwrap();

        let (_dir2, other) = temp_store();
        let mut txn = other.begin_write().unwrap();
        txn.put(Keyspace::Buckets, b"stale", b"{}").unwrap();
        txn.commit().unwrap();

        other.restore_snapshot(&mut snap.as_slice()).unwrap();

        let rtx = other.begin_read().unwrap();
        assert_eq!(rtx.get(Keyspace::Buckets, b"stale").unwrap(), None);
        assert_eq!(
            rtx.get(Keyspace::Buckets, b"b1").unwrap(),
            Some(br#"{"name":"b1"}"#.to_vec())
        );
        assert_eq!(rtx.get(Keyspace::Objects, b"b1/k").unwrap(), Some(br#"{"key":"k"}"#.to_vec()));
        drop(rtx);

        // Sequence resumes after the restored change log tail.
        assert_eq!(other.append_change_log(b"cmd2").unwrap(), 2);
    }

    #[test]
    fn test_restore_rejects_garbage() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        txn.put(Keyspace::Buckets, b"keep", b"{}").unwrap();
        txn.commit().unwrap();

        let garbage = [0u8, 0, 0, 4, b'n', b'o', b'p', b'e', 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(store.restore_snapshot(&mut garbage.as_slice()).is_err());

        // Old state intact.
        let rtx = store.begin_read().unwrap();
        assert_eq!(rtx.get(Keyspace::Buckets, b"keep").unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn test_decode_json_skips_corrupt() {
        let ok: Option<serde_json::Value> = decode_json(Keyspace::Buckets, b"k", b"{\"a\":1}");
        assert!(ok.is_some());
        let bad: Option<serde_json::Value> = decode_json(Keyspace::Buckets, b"k", b"not-json");
        assert!(bad.is_none());
    }
}
