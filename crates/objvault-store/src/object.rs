//! Typed object, version, and multipart record access.
//!
//! The `objects` keyspace holds one latest-pointer record per live key; the
//! full version history lives in `object_versions`. The `apply_*` mutations
//! keep the two coupled: at most one version of a `(bucket, key)` carries
//! `is_latest`, and the latest pointer is always a copy of that record.

use crate::error::Result;
use crate::store::{decode_json, ReadTxn, WriteTxn};
use crate::tables::{self, Keyspace};
use objvault_common::types::{MultipartUpload, ObjectMeta, PartInfo, VersionTag};

pub fn get_object(rtx: &ReadTxn, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
    let k = tables::object_key(bucket, key);
    Ok(rtx
        .get(Keyspace::Objects, &k)?
        .and_then(|v| decode_json(Keyspace::Objects, &k, &v)))
}

pub fn get_version(
    rtx: &ReadTxn,
    bucket: &str,
    key: &str,
    version_id: &str,
) -> Result<Option<ObjectMeta>> {
    let k = tables::version_key(bucket, key, version_id);
    Ok(rtx
        .get(Keyspace::ObjectVersions, &k)?
        .and_then(|v| decode_json(Keyspace::ObjectVersions, &k, &v)))
}

/// Every version of one `(bucket, key)`, newest first.
pub fn list_versions(rtx: &ReadTxn, bucket: &str, key: &str) -> Result<Vec<ObjectMeta>> {
    let prefix = tables::version_prefix(bucket, key);
    let mut out: Vec<ObjectMeta> = Vec::new();
    rtx.range(Keyspace::ObjectVersions, &prefix, |k, v| {
        if !k.starts_with(&prefix) {
            return false;
        }
        if let Some(meta) = decode_json(Keyspace::ObjectVersions, k, v) {
            out.push(meta);
        }
        true
    })?;
    out.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| b.version_id.cmp(&a.version_id))
    });
    Ok(out)
}

/// Every version in a bucket, grouped by key in table order (for `?versions`).
pub fn list_bucket_versions(rtx: &ReadTxn, bucket: &str) -> Result<Vec<ObjectMeta>> {
    let prefix = format!("{bucket}\x00").into_bytes();
    let mut out = Vec::new();
    rtx.range(Keyspace::ObjectVersions, &prefix, |k, v| {
        if !k.starts_with(&prefix) {
            return false;
        }
        if let Some(meta) = decode_json(Keyspace::ObjectVersions, k, v) {
            out.push(meta);
        }
        true
    })?;
    Ok(out)
}

// ── Applier mutations ─────────────────────────────────────────────────────────

fn encode(meta: &ObjectMeta) -> Vec<u8> {
    serde_json::to_vec(meta).expect("object record serializes")
}

/// Write the latest pointer for a non-versioned object.
pub fn apply_put_object_meta(txn: &mut WriteTxn<'_>, meta: &ObjectMeta) -> Result<()> {
    txn.put(
        Keyspace::Objects,
        &tables::object_key(&meta.bucket, &meta.key),
        &encode(meta),
    )
}

/// Remove the latest pointer.
pub fn apply_delete_object_meta(txn: &mut WriteTxn<'_>, bucket: &str, key: &str) -> Result<()> {
    txn.delete(Keyspace::Objects, &tables::object_key(bucket, key))?;
    Ok(())
}

/// Insert a version record. When it carries `is_latest`, the previous latest
/// version is demoted and the `objects` pointer becomes a copy of this record
/// (delete markers included; reads interpret the flag).
pub fn apply_put_object_version(txn: &mut WriteTxn<'_>, meta: &ObjectMeta) -> Result<()> {
    let version_id = meta.version_id.as_deref().unwrap_or("null");

    if meta.is_latest {
        demote_latest(txn, &meta.bucket, &meta.key, version_id)?;
        txn.put(
            Keyspace::Objects,
            &tables::object_key(&meta.bucket, &meta.key),
            &encode(meta),
        )?;
    }

    txn.put(
        Keyspace::ObjectVersions,
        &tables::version_key(&meta.bucket, &meta.key, version_id),
        &encode(meta),
    )
}

/// Clear `is_latest` on every version of `(bucket, key)` except `keep`.
fn demote_latest(txn: &mut WriteTxn<'_>, bucket: &str, key: &str, keep: &str) -> Result<()> {
    let prefix = tables::version_prefix(bucket, key);
    let mut updates: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    txn.range(Keyspace::ObjectVersions, &prefix, |k, v| {
        if !k.starts_with(&prefix) {
            return false;
        }
        if let Some(mut meta) = decode_json::<ObjectMeta>(Keyspace::ObjectVersions, k, v) {
            if meta.is_latest && meta.version_id.as_deref().unwrap_or("null") != keep {
                meta.is_latest = false;
                updates.push((k.to_vec(), encode(&meta)));
            }
        }
        true
    })?;
    for (k, v) in updates {
        txn.put(Keyspace::ObjectVersions, &k, &v)?;
    }
    Ok(())
}

/// Permanently remove one version. If it was the latest, the newest remaining
/// version is promoted (deterministically by last_modified, then version id)
/// and the latest pointer follows; with no versions left the pointer is
/// removed.
pub fn apply_delete_object_version(
    txn: &mut WriteTxn<'_>,
    bucket: &str,
    key: &str,
    version_id: &str,
) -> Result<()> {
    let vk = tables::version_key(bucket, key, version_id);
    let was_latest = txn
        .get(Keyspace::ObjectVersions, &vk)?
        .and_then(|v| decode_json::<ObjectMeta>(Keyspace::ObjectVersions, &vk, &v))
        .is_some_and(|m| m.is_latest);
    txn.delete(Keyspace::ObjectVersions, &vk)?;

    if was_latest {
        promote_newest(txn, bucket, key)?;
    }
    Ok(())
}

/// Mark an existing version as latest and point `objects` at it.
pub fn apply_set_latest_version(
    txn: &mut WriteTxn<'_>,
    bucket: &str,
    key: &str,
    version_id: &str,
) -> Result<()> {
    let vk = tables::version_key(bucket, key, version_id);
    let Some(raw) = txn.get(Keyspace::ObjectVersions, &vk)? else {
        return Ok(());
    };
    let Some(mut meta) = decode_json::<ObjectMeta>(Keyspace::ObjectVersions, &vk, &raw) else {
        return Ok(());
    };
    demote_latest(txn, bucket, key, version_id)?;
    meta.is_latest = true;
    txn.put(Keyspace::ObjectVersions, &vk, &encode(&meta))?;
    txn.put(Keyspace::Objects, &tables::object_key(bucket, key), &encode(&meta))
}

fn promote_newest(txn: &mut WriteTxn<'_>, bucket: &str, key: &str) -> Result<()> {
    let prefix = tables::version_prefix(bucket, key);
    let mut versions: Vec<ObjectMeta> = Vec::new();
    txn.range(Keyspace::ObjectVersions, &prefix, |k, v| {
        if !k.starts_with(&prefix) {
            return false;
        }
        if let Some(meta) = decode_json(Keyspace::ObjectVersions, k, v) {
            versions.push(meta);
        }
        true
    })?;

    let Some(mut newest) = versions.into_iter().max_by(|a, b| {
        a.last_modified
            .cmp(&b.last_modified)
            .then_with(|| a.version_id.cmp(&b.version_id))
    }) else {
        txn.delete(Keyspace::Objects, &tables::object_key(bucket, key))?;
        return Ok(());
    };

    newest.is_latest = true;
    let vid = newest.version_id.clone().unwrap_or_else(|| "null".into());
    txn.put(
        Keyspace::ObjectVersions,
        &tables::version_key(bucket, key, &vid),
        &encode(&newest),
    )?;
    txn.put(Keyspace::Objects, &tables::object_key(bucket, key), &encode(&newest))
}

/// Update a version record (and the latest pointer when it shadows that
/// version) via a closure. Used for tags, legal hold, retention, tier, and
/// access-time updates.
pub fn apply_update_object(
    txn: &mut WriteTxn<'_>,
    bucket: &str,
    key: &str,
    version_id: Option<&str>,
    f: impl Fn(&mut ObjectMeta),
) -> Result<()> {
    let ok = tables::object_key(bucket, key);
    let latest = txn
        .get(Keyspace::Objects, &ok)?
        .and_then(|v| decode_json::<ObjectMeta>(Keyspace::Objects, &ok, &v));

    // Resolve the target version: explicit id, else the latest's id.
    let target_vid = version_id
        .map(str::to_string)
        .or_else(|| latest.as_ref().map(|m| m.version_id.clone().unwrap_or_else(|| "null".into())));

    if let Some(vid) = &target_vid {
        let vk = tables::version_key(bucket, key, vid);
        if let Some(mut meta) = txn
            .get(Keyspace::ObjectVersions, &vk)?
            .and_then(|v| decode_json::<ObjectMeta>(Keyspace::ObjectVersions, &vk, &v))
        {
            f(&mut meta);
            txn.put(Keyspace::ObjectVersions, &vk, &encode(&meta))?;
        }
    }

    if let Some(mut meta) = latest {
        let latest_vid = meta.version_id.clone().unwrap_or_else(|| "null".into());
        if target_vid.as_deref().is_none_or(|vid| vid == latest_vid) {
            f(&mut meta);
            txn.put(Keyspace::Objects, &ok, &encode(&meta))?;
        }
    }
    Ok(())
}

/// Fold a batch of access timestamps into the latest pointers. Entries for
/// vanished objects are dropped.
pub fn apply_batch_access_times(
    txn: &mut WriteTxn<'_>,
    entries: &[(String, String, i64)],
) -> Result<()> {
    for (bucket, key, ts) in entries {
        let ok = tables::object_key(bucket, key);
        if let Some(mut meta) = txn
            .get(Keyspace::Objects, &ok)?
            .and_then(|v| decode_json::<ObjectMeta>(Keyspace::Objects, &ok, &v))
        {
            meta.last_access = *ts;
            txn.put(Keyspace::Objects, &ok, &encode(&meta))?;
        }
    }
    Ok(())
}

// ── Multipart ─────────────────────────────────────────────────────────────────

pub fn get_upload(rtx: &ReadTxn, upload_id: &str) -> Result<Option<MultipartUpload>> {
    Ok(rtx
        .get(Keyspace::MultipartUploads, upload_id.as_bytes())?
        .and_then(|v| decode_json(Keyspace::MultipartUploads, upload_id.as_bytes(), &v)))
}

pub fn list_uploads(rtx: &ReadTxn, bucket: &str) -> Result<Vec<MultipartUpload>> {
    let mut out: Vec<MultipartUpload> = Vec::new();
    rtx.for_each(Keyspace::MultipartUploads, |k, v| {
        if let Some(upload) = decode_json::<MultipartUpload>(Keyspace::MultipartUploads, k, v) {
            if upload.bucket == bucket {
                out.push(upload);
            }
        }
        true
    })?;
    out.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.upload_id.cmp(&b.upload_id)));
    Ok(out)
}

/// Parts of one upload in part-number order (the key format sorts them).
pub fn list_parts(rtx: &ReadTxn, upload_id: &str) -> Result<Vec<PartInfo>> {
    let prefix = tables::part_prefix(upload_id);
    let mut out = Vec::new();
    rtx.range(Keyspace::MultipartParts, &prefix, |k, v| {
        if !k.starts_with(&prefix) {
            return false;
        }
        if let Some(part) = decode_json(Keyspace::MultipartParts, k, v) {
            out.push(part);
        }
        true
    })?;
    Ok(out)
}

pub fn apply_create_multipart_upload(txn: &mut WriteTxn<'_>, upload: &MultipartUpload) -> Result<()> {
    txn.put(
        Keyspace::MultipartUploads,
        upload.upload_id.as_bytes(),
        &serde_json::to_vec(upload).expect("upload record serializes"),
    )
}

/// Remove an upload record and purge its parts (Complete and Abort share this).
pub fn apply_delete_multipart_upload(txn: &mut WriteTxn<'_>, upload_id: &str) -> Result<()> {
    txn.delete(Keyspace::MultipartUploads, upload_id.as_bytes())?;
    let prefix = tables::part_prefix(upload_id);
    txn.delete_where(Keyspace::MultipartParts, |k, _| k.starts_with(&prefix))?;
    Ok(())
}

pub fn apply_put_part(txn: &mut WriteTxn<'_>, upload_id: &str, part: &PartInfo) -> Result<()> {
    txn.put(
        Keyspace::MultipartParts,
        &tables::part_key(upload_id, part.part_number),
        &serde_json::to_vec(part).expect("part record serializes"),
    )
}

// ── Version tags ──────────────────────────────────────────────────────────────

pub fn get_version_tag(
    rtx: &ReadTxn,
    bucket: &str,
    key: &str,
    tag: &str,
) -> Result<Option<VersionTag>> {
    let k = tables::version_tag_key(bucket, key, tag);
    Ok(rtx
        .get(Keyspace::VersionTags, &k)?
        .and_then(|v| decode_json(Keyspace::VersionTags, &k, &v)))
}

pub fn list_version_tags(rtx: &ReadTxn, bucket: &str, key: &str) -> Result<Vec<VersionTag>> {
    let prefix = tables::version_prefix(bucket, key);
    let mut out = Vec::new();
    rtx.range(Keyspace::VersionTags, &prefix, |k, v| {
        if !k.starts_with(&prefix) {
            return false;
        }
        if let Some(tag) = decode_json(Keyspace::VersionTags, k, v) {
            out.push(tag);
        }
        true
    })?;
    Ok(out)
}

pub fn apply_put_version_tag(
    txn: &mut WriteTxn<'_>,
    bucket: &str,
    key: &str,
    tag: &VersionTag,
) -> Result<()> {
    txn.put(
        Keyspace::VersionTags,
        &tables::version_tag_key(bucket, key, &tag.tag),
        &serde_json::to_vec(tag).expect("version tag serializes"),
    )
}

pub fn apply_delete_version_tag(
    txn: &mut WriteTxn<'_>,
    bucket: &str,
    key: &str,
    tag: &str,
) -> Result<()> {
    txn.delete(Keyspace::VersionTags, &tables::version_tag_key(bucket, key, tag))?;
    Ok(())
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

    fn version(bucket: &str, key: &str, vid: &str, modified: i64) -> ObjectMeta {
        ObjectMeta {
            bucket: bucket.into(),
            key: key.into(),
            content_type: "application/octet-stream".into(),
            etag: "\"d41d8cd98f00b204e9800998ecf8427e\"".into(),
            last_modified: modified,
            version_id: Some(vid.into()),
            is_latest: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_latest_invariant() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        apply_put_object_version(&mut txn, &version("b", "k", "v1", 10)).unwrap();
        apply_put_object_version(&mut txn, &version("b", "k", "v2", 20)).unwrap();
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        let versions = list_versions(&rtx, "b", "k").unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions.iter().filter(|v| v.is_latest).count(), 1);

        let latest = get_object(&rtx, "b", "k").unwrap().unwrap();
        assert_eq!(latest.version_id.as_deref(), Some("v2"));
        assert!(latest.is_latest);
    }

    #[test]
    fn test_latest_pointer_matches_version_record() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        apply_put_object_version(&mut txn, &version("b", "k", "v1", 10)).unwrap();
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        let pointer = rtx.get(Keyspace::Objects, &tables::object_key("b", "k")).unwrap().unwrap();
        let record = rtx
            .get(Keyspace::ObjectVersions, &tables::version_key("b", "k", "v1"))
            .unwrap()
            .unwrap();
        assert_eq!(pointer, record);
    }

    #[test]
    fn test_delete_latest_promotes_previous() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        apply_put_object_version(&mut txn, &version("b", "k", "v1", 10)).unwrap();
        apply_put_object_version(&mut txn, &version("b", "k", "v2", 20)).unwrap();
        apply_delete_object_version(&mut txn, "b", "k", "v2").unwrap();
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        let latest = get_object(&rtx, "b", "k").unwrap().unwrap();
        assert_eq!(latest.version_id.as_deref(), Some("v1"));
        assert!(latest.is_latest);
    }

    #[test]
    fn test_delete_last_version_clears_pointer() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        apply_put_object_version(&mut txn, &version("b", "k", "v1", 10)).unwrap();
        apply_delete_object_version(&mut txn, "b", "k", "v1").unwrap();
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        assert!(get_object(&rtx, "b", "k").unwrap().is_none());
        assert!(list_versions(&rtx, "b", "k").unwrap().is_empty());
    }

    #[test]
    fn test_delete_marker_becomes_latest_pointer() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        apply_put_object_version(&mut txn, &version("b", "k", "v1", 10)).unwrap();
        let mut marker = version("b", "k", "v2", 20);
        marker.delete_marker = true;
        marker.etag = String::new();
        apply_put_object_version(&mut txn, &marker).unwrap();
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        let latest = get_object(&rtx, "b", "k").unwrap().unwrap();
        assert!(latest.delete_marker);
        let v1 = get_version(&rtx, "b", "k", "v1").unwrap().unwrap();
        assert!(!v1.is_latest);
    }

    #[test]
    fn test_update_object_touches_version_and_pointer() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write().unwrap();
        apply_put_object_version(&mut txn, &version("b", "k", "v1", 10)).unwrap();
        apply_update_object(&mut txn, "b", "k", None, |m| m.legal_hold = true).unwrap();
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        assert!(get_object(&rtx, "b", "k").unwrap().unwrap().legal_hold);
        assert!(get_version(&rtx, "b", "k", "v1").unwrap().unwrap().legal_hold);
    }

    #[test]
    fn test_multipart_lifecycle() {
        let (_dir, store) = temp_store();
        let upload = MultipartUpload {
            upload_id: "aabbccdd".into(),
            bucket: "b".into(),
            key: "k".into(),
            content_type: "text/plain".into(),
            created_at: 1,
            ..Default::default()
        };

        let mut txn = store.begin_write().unwrap();
        apply_create_multipart_upload(&mut txn, &upload).unwrap();
        for n in [2u32, 1, 10] {
            apply_put_part(
                &mut txn,
                "aabbccdd",
                &PartInfo {
                    part_number: n,
                    etag: format!("\"etag{n}\""),
                    size: 3,
                },
            )
            .unwrap();
        }
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        let parts = list_parts(&rtx, "aabbccdd").unwrap();
        let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 10]);
        drop(rtx);

        let mut txn = store.begin_write().unwrap();
        apply_delete_multipart_upload(&mut txn, "aabbccdd").unwrap();
        txn.commit().unwrap();

        let rtx = store.begin_read().unwrap();
        assert!(get_upload(&rtx, "aabbccdd").unwrap().is_none());
        assert!(list_parts(&rtx, "aabbccdd").unwrap().is_empty());
    }
}
