//! Typed bucket record access.
//!
//! Read helpers run on any replica; `apply_*` mutations are invoked only by
//! the command applier so every node performs the identical change.

use crate::error::Result;
use crate::store::{decode_json, ReadTxn, WriteTxn};
use crate::tables::Keyspace;
use objvault_common::types::{BucketInfo, DefaultRetention, VersioningStatus};

/// Keyspaces holding exactly one config record per bucket, cleared when the
/// bucket is deleted.
pub const BUCKET_CONFIG_KEYSPACES: [Keyspace; 9] = [
    Keyspace::BucketPolicies,
    Keyspace::LifecycleRules,
    Keyspace::WebsiteConfigs,
    Keyspace::CorsConfigs,
    Keyspace::NotificationConfigs,
    Keyspace::LambdaTriggers,
    Keyspace::EncryptionConfigs,
    Keyspace::PublicAccessBlocks,
    Keyspace::LoggingConfigs,
];

pub fn get_bucket(rtx: &ReadTxn, name: &str) -> Result<Option<BucketInfo>> {
    Ok(rtx
        .get(Keyspace::Buckets, name.as_bytes())?
        .and_then(|v| decode_json(Keyspace::Buckets, name.as_bytes(), &v)))
}

pub fn bucket_exists(rtx: &ReadTxn, name: &str) -> Result<bool> {
    Ok(rtx.get(Keyspace::Buckets, name.as_bytes())?.is_some())
}

/// All buckets, sorted by name (the table's key order).
pub fn list_buckets(rtx: &ReadTxn) -> Result<Vec<BucketInfo>> {
    let mut out = Vec::new();
    rtx.for_each(Keyspace::Buckets, |k, v| {
        if let Some(info) = decode_json::<BucketInfo>(Keyspace::Buckets, k, v) {
            out.push(info);
        }
        true
    })?;
    Ok(out)
}

/// Raw per-bucket config record (policy, lifecycle, website, ...).
pub fn get_bucket_config(rtx: &ReadTxn, ks: Keyspace, bucket: &str) -> Result<Option<Vec<u8>>> {
    rtx.get(ks, bucket.as_bytes())
}

// ── Applier mutations ─────────────────────────────────────────────────────────

/// Insert a bucket record. A replayed create against an existing bucket is a
/// no-op so `created_at` stays immutable.
pub fn apply_create_bucket(txn: &mut WriteTxn<'_>, info: &BucketInfo) -> Result<()> {
    if txn.get(Keyspace::Buckets, info.name.as_bytes())?.is_some() {
        return Ok(());
    }
    txn.put(
        Keyspace::Buckets,
        info.name.as_bytes(),
        &serde_json::to_vec(info).expect("bucket record serializes"),
    )
}

/// Delete a bucket and cascade every record keyed by it: objects, versions,
/// multipart state, per-bucket configs, and version tags.
pub fn apply_delete_bucket(txn: &mut WriteTxn<'_>, name: &str) -> Result<()> {
    txn.delete(Keyspace::Buckets, name.as_bytes())?;
    for ks in BUCKET_CONFIG_KEYSPACES {
        txn.delete(ks, name.as_bytes())?;
    }

    let slash_prefix = format!("{name}/").into_bytes();
    txn.delete_where(Keyspace::Objects, |k, _| k.starts_with(&slash_prefix))?;

    let nul_prefix = format!("{name}\x00").into_bytes();
    txn.delete_where(Keyspace::ObjectVersions, |k, _| k.starts_with(&nul_prefix))?;
    txn.delete_where(Keyspace::VersionTags, |k, _| k.starts_with(&nul_prefix))?;

    // Multipart uploads are keyed by upload id; match on the record body.
    let mut doomed_uploads: Vec<String> = Vec::new();
    txn.for_each(Keyspace::MultipartUploads, |k, v| {
        if let Some(upload) =
            decode_json::<objvault_common::types::MultipartUpload>(Keyspace::MultipartUploads, k, v)
        {
            if upload.bucket == name {
                doomed_uploads.push(upload.upload_id);
            }
        }
        true
    })?;
    for upload_id in doomed_uploads {
        crate::object::apply_delete_multipart_upload(txn, &upload_id)?;
    }
    Ok(())
}

pub fn apply_put_bucket_config(
    txn: &mut WriteTxn<'_>,
    ks: Keyspace,
    bucket: &str,
    body: &[u8],
) -> Result<()> {
    txn.put(ks, bucket.as_bytes(), body)
}

pub fn apply_delete_bucket_config(txn: &mut WriteTxn<'_>, ks: Keyspace, bucket: &str) -> Result<()> {
    txn.delete(ks, bucket.as_bytes())?;
    Ok(())
}

/// Update one field of the bucket record via a closure. Missing buckets are a
/// no-op (the handler validated existence before submission; a replica
/// replaying against a snapshot taken after the delete must not fail).
fn update_bucket(
    txn: &mut WriteTxn<'_>,
    name: &str,
    f: impl FnOnce(&mut BucketInfo),
) -> Result<()> {
    let Some(raw) = txn.get(Keyspace::Buckets, name.as_bytes())? else {
        return Ok(());
    };
    let Some(mut info) = decode_json::<BucketInfo>(Keyspace::Buckets, name.as_bytes(), &raw) else {
        return Ok(());
    };
    f(&mut info);
    txn.put(
        Keyspace::Buckets,
        name.as_bytes(),
        &serde_json::to_vec(&info).expect("bucket record serializes"),
    )
}

pub fn apply_set_versioning(
    txn: &mut WriteTxn<'_>,
    name: &str,
    status: VersioningStatus,
) -> Result<()> {
    update_bucket(txn, name, |info| info.versioning = status)
}

pub fn apply_set_quota(
    txn: &mut WriteTxn<'_>,
    name: &str,
    max_size_bytes: u64,
    max_objects: u64,
    fifo: bool,
) -> Result<()> {
    update_bucket(txn, name, |info| {
        info.max_size_bytes = max_size_bytes;
        info.max_objects = max_objects;
        info.fifo_quota = fifo;
    })
}

pub fn apply_set_bucket_tags(
    txn: &mut WriteTxn<'_>,
    name: &str,
    tags: std::collections::HashMap<String, String>,
) -> Result<()> {
    update_bucket(txn, name, |info| info.tags = tags)
}

pub fn apply_set_default_retention(
    txn: &mut WriteTxn<'_>,
    name: &str,
    retention: Option<DefaultRetention>,
) -> Result<()> {
    update_bucket(txn, name, |info| info.default_retention = retention)
}

pub fn apply_set_object_lock_config(
    txn: &mut WriteTxn<'_>,
    name: &str,
    enabled: bool,
    retention: Option<DefaultRetention>,
) -> Result<()> {
    update_bucket(txn, name, |info| {
        info.object_lock_enabled = enabled;
        info.default_retention = retention;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("meta.redb")).unwrap();
        (dir, store)
    }

    fn bucket(name: &str) -> BucketInfo {
        BucketInfo {
            name: name.to_string(),
            created_at: 1_700_000_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_is_idempotent_and_preserves_created_at() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        apply_create_bucket(&mut txn, &bucket("b")).unwrap();
        let mut again = bucket("b");
        again.created_at = 42;
        apply_create_bucket(&mut txn, &again).unwrap();
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        let info = get_bucket(&rtx, "b").unwrap().unwrap();
        assert_eq!(info.created_at, 1_700_000_000);
    }

    #[test]
    fn test_versioning_update() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        apply_create_bucket(&mut txn, &bucket("b")).unwrap();
        apply_set_versioning(&mut txn, "b", VersioningStatus::Enabled).unwrap();
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        let info = get_bucket(&rtx, "b").unwrap().unwrap();
        assert_eq!(info.versioning, VersioningStatus::Enabled);
    }

    #[test]
    fn test_delete_bucket_cascades() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        apply_create_bucket(&mut txn, &bucket("b")).unwrap();
        txn.put(Keyspace::BucketPolicies, b"b", b"{}").unwrap();
        txn.put(Keyspace::Objects, b"b/k", b"{}").unwrap();
        txn.put(Keyspace::ObjectVersions, b"b\x00k\x00v1", b"{}").unwrap();
        txn.put(Keyspace::Objects, b"bee/k", b"{}").unwrap();
        apply_delete_bucket(&mut txn, "b").unwrap();
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        assert!(get_bucket(&rtx, "b").unwrap().is_none());
        assert!(rtx.get(Keyspace::BucketPolicies, b"b").unwrap().is_none());
        assert!(rtx.get(Keyspace::Objects, b"b/k").unwrap().is_none());
        assert!(rtx.get(Keyspace::ObjectVersions, b"b\x00k\x00v1").unwrap().is_none());
        // A bucket sharing the prefix is untouched.
        assert!(rtx.get(Keyspace::Objects, b"bee/k").unwrap().is_some());
    }
}
