//! Audit trail and replication bookkeeping.

use crate::error::Result;
use crate::store::{decode_json, ReadTxn, WriteTxn};
use crate::tables::{self, Keyspace};
use objvault_common::types::{AuditEntry, ReplicationEvent, ReplicationStatus};

/// Append an audit record keyed by its timestamp (big-endian unix nanos).
/// The caller stamps the entry; keys from one wall clock are monotonic.
pub fn apply_append_audit(txn: &mut WriteTxn<'_>, entry: &AuditEntry) -> Result<()> {
    txn.put(
        Keyspace::AuditTrail,
        &tables::sequence_key(entry.timestamp),
        &serde_json::to_vec(entry).expect("audit entry serializes"),
    )
}

/// Remove audit records older than `before_nanos`. Returns the local count.
pub fn apply_prune_audit(txn: &mut WriteTxn<'_>, before_nanos: u64) -> Result<u64> {
    txn.delete_where(Keyspace::AuditTrail, |k, _| {
        <[u8; 8]>::try_from(k).is_ok_and(|raw| u64::from_be_bytes(raw) < before_nanos)
    })
}

/// Most recent audit records, newest last, capped at `limit`.
pub fn read_audit(rtx: &ReadTxn, since_nanos: u64, limit: usize) -> Result<Vec<AuditEntry>> {
    let mut out = Vec::new();
    rtx.range(Keyspace::AuditTrail, &tables::sequence_key(since_nanos), |k, v| {
        if out.len() >= limit {
            return false;
        }
        if let Some(entry) = decode_json(Keyspace::AuditTrail, k, v) {
            out.push(entry);
        }
        true
    })?;
    Ok(out)
}

/// Enqueue a replication event under its leader-assigned id. The applier
/// must not allocate the id itself or replicas would diverge.
pub fn apply_enqueue_replication(txn: &mut WriteTxn<'_>, event: &ReplicationEvent) -> Result<()> {
    txn.put(
        Keyspace::ReplicationQueue,
        &tables::sequence_key(event.id),
        &serde_json::to_vec(event).expect("replication event serializes"),
    )
}

pub fn apply_dequeue_replication(txn: &mut WriteTxn<'_>, id: u64) -> Result<()> {
    txn.delete(Keyspace::ReplicationQueue, &tables::sequence_key(id))?;
    Ok(())
}

/// Pending replication events with id > `since`, ascending, capped at `limit`.
pub fn read_replication_queue(
    rtx: &ReadTxn,
    since: u64,
    limit: usize,
) -> Result<Vec<ReplicationEvent>> {
    let mut out = Vec::new();
    rtx.range(
        Keyspace::ReplicationQueue,
        &tables::sequence_key(since.saturating_add(1)),
        |k, v| {
            if out.len() >= limit {
                return false;
            }
            if let Some(event) = decode_json(Keyspace::ReplicationQueue, k, v) {
                out.push(event);
            }
            true
        },
    )?;
    Ok(out)
}

pub fn apply_set_replication_status(
    txn: &mut WriteTxn<'_>,
    status: &ReplicationStatus,
) -> Result<()> {
    txn.put(
        Keyspace::ReplicationStatus,
        status.peer.as_bytes(),
        &serde_json::to_vec(status).expect("replication status serializes"),
    )
}

pub fn get_replication_status(rtx: &ReadTxn, peer: &str) -> Result<Option<ReplicationStatus>> {
    Ok(rtx
        .get(Keyspace::ReplicationStatus, peer.as_bytes())?
        .and_then(|v| decode_json(Keyspace::ReplicationStatus, peer.as_bytes(), &v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use objvault_common::types::ReplicationOp;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("meta.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_audit_append_and_prune() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        for ts in [100u64, 200, 300] {
            apply_append_audit(
                &mut txn,
                &AuditEntry {
                    timestamp: ts,
                    access_key: "AK".into(),
                    action: "s3:GetObject".into(),
                    bucket: "b".into(),
                    status: 200,
                    ..Default::default()
                },
            )
            .unwrap();
        }
        assert_eq!(apply_prune_audit(&mut txn, 250).unwrap(), 2);
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        let entries = read_audit(&rtx, 0, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp, 300);
    }

    #[test]
    fn test_replication_queue_order() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        for id in [3u64, 1, 2] {
            apply_enqueue_replication(
                &mut txn,
                &ReplicationEvent {
                    id,
                    op: ReplicationOp::Put,
                    bucket: "b".into(),
                    key: format!("k{id}"),
                    version_id: None,
                    created_at: 0,
                },
            )
            .unwrap();
        }
        apply_dequeue_replication(&mut txn, 1).unwrap();
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        let events = read_replication_queue(&rtx, 0, 10).unwrap();
        let ids: Vec<u64> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
