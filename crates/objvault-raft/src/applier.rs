//! Command applier: turns committed command bytes into local mutations.
//!
//! Runs on every node, in log order. Each command executes inside a single
//! write transaction that also appends the envelope to the change log, so a
//! crash never leaves a half-applied command and local tailers observe the
//! same sequence on every replica.
//!
//! Determinism rules: no wall-clock reads (timestamps ride in the payload)
//! and no locally allocated sequences except the change-log append itself,
//! which advances identically everywhere because commands arrive in one
//! order. A command that fails to decode is logged and skipped; replication
//! must never halt on a bad record.

use crate::codec::{Command, CodecError};
use objvault_store::{bucket, iam, object, system, Keyspace, Store, StoreError, WriteTxn};
use std::sync::Arc;
use tracing::{debug, error};

/// Applies committed commands to the local store.
#[derive(Clone)]
pub struct Applier {
    store: Arc<Store>,
}

impl Applier {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// The store this applier mutates.
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Apply one committed envelope. Returns the local count for counting
    /// commands (pruned keys, trimmed records), 0 otherwise.
    ///
    /// Decode failures return `Ok(0)` after logging: the log index must
    /// advance past a corrupt record.
    pub fn apply(&self, bytes: &[u8]) -> Result<u64, StoreError> {
        let cmd = match Command::decode(bytes) {
            Ok(cmd) => cmd,
            Err(CodecError::UnknownTag(t)) => {
                error!(tag = t, "skipping command with unknown tag");
                return Ok(0);
            }
            Err(CodecError::Envelope(e)) => {
                error!(error = %e, "skipping undecodable command");
                return Ok(0);
            }
        };

        let mut txn = self.store.begin_write()?;
        txn.append_change_log(bytes)?;
        let count = dispatch(&mut txn, &cmd)?;
        txn.commit()?;
        debug!(tag = cmd.tag(), "applied command");
        Ok(count)
    }
}

fn dispatch(txn: &mut WriteTxn<'_>, cmd: &Command) -> Result<u64, StoreError> {
    match cmd {
        Command::CreateBucket(info) => bucket::apply_create_bucket(txn, info)?,
        Command::DeleteBucket(p) => bucket::apply_delete_bucket(txn, &p.name)?,
        Command::PutBucketPolicy(p) => {
            bucket::apply_put_bucket_config(txn, Keyspace::BucketPolicies, &p.bucket, p.config.as_bytes())?;
        }
        Command::DeleteBucketPolicy(p) => {
            bucket::apply_delete_bucket_config(txn, Keyspace::BucketPolicies, &p.name)?;
        }
        Command::PutBucketQuota(p) => {
            bucket::apply_set_quota(txn, &p.bucket, p.max_size_bytes, p.max_objects, p.fifo)?;
        }
        Command::PutBucketTags(p) => bucket::apply_set_bucket_tags(txn, &p.bucket, p.tags.clone())?,
        Command::PutBucketDefaultRetention(p) => {
            bucket::apply_set_default_retention(txn, &p.bucket, p.retention)?;
        }
        Command::PutObjectLockConfig(p) => {
            bucket::apply_set_object_lock_config(txn, &p.bucket, p.enabled, p.retention)?;
        }
        Command::SetBucketVersioning(p) => bucket::apply_set_versioning(txn, &p.bucket, p.status)?,
        Command::PutLifecycleRules(p) => {
            bucket::apply_put_bucket_config(txn, Keyspace::LifecycleRules, &p.bucket, p.config.as_bytes())?;
        }
        Command::DeleteLifecycleRules(p) => {
            bucket::apply_delete_bucket_config(txn, Keyspace::LifecycleRules, &p.name)?;
        }
        Command::PutWebsiteConfig(p) => {
            bucket::apply_put_bucket_config(txn, Keyspace::WebsiteConfigs, &p.bucket, p.config.as_bytes())?;
        }
        Command::DeleteWebsiteConfig(p) => {
            bucket::apply_delete_bucket_config(txn, Keyspace::WebsiteConfigs, &p.name)?;
        }
        Command::PutCorsConfig(p) => {
            bucket::apply_put_bucket_config(txn, Keyspace::CorsConfigs, &p.bucket, p.config.as_bytes())?;
        }
        Command::DeleteCorsConfig(p) => {
            bucket::apply_delete_bucket_config(txn, Keyspace::CorsConfigs, &p.name)?;
        }
        Command::PutNotificationConfig(p) => {
            bucket::apply_put_bucket_config(txn, Keyspace::NotificationConfigs, &p.bucket, p.config.as_bytes())?;
        }
        Command::DeleteNotificationConfig(p) => {
            bucket::apply_delete_bucket_config(txn, Keyspace::NotificationConfigs, &p.name)?;
        }
        Command::PutLambdaTrigger(p) => {
            bucket::apply_put_bucket_config(txn, Keyspace::LambdaTriggers, &p.bucket, p.config.as_bytes())?;
        }
        Command::DeleteLambdaTrigger(p) => {
            bucket::apply_delete_bucket_config(txn, Keyspace::LambdaTriggers, &p.name)?;
        }
        Command::PutEncryptionConfig(p) => {
            bucket::apply_put_bucket_config(txn, Keyspace::EncryptionConfigs, &p.bucket, p.config.as_bytes())?;
        }
        Command::DeleteEncryptionConfig(p) => {
            bucket::apply_delete_bucket_config(txn, Keyspace::EncryptionConfigs, &p.name)?;
        }
        Command::PutPublicAccessBlock(p) => {
            bucket::apply_put_bucket_config(txn, Keyspace::PublicAccessBlocks, &p.bucket, p.config.as_bytes())?;
        }
        Command::DeletePublicAccessBlock(p) => {
            bucket::apply_delete_bucket_config(txn, Keyspace::PublicAccessBlocks, &p.name)?;
        }
        Command::PutLoggingConfig(p) => {
            bucket::apply_put_bucket_config(txn, Keyspace::LoggingConfigs, &p.bucket, p.config.as_bytes())?;
        }
        Command::DeleteLoggingConfig(p) => {
            bucket::apply_delete_bucket_config(txn, Keyspace::LoggingConfigs, &p.name)?;
        }
        Command::PutObjectMeta(meta) => object::apply_put_object_meta(txn, meta)?,
        Command::DeleteObjectMeta(p) => object::apply_delete_object_meta(txn, &p.bucket, &p.key)?,
        Command::PutObjectTags(p) => {
            object::apply_update_object(txn, &p.bucket, &p.key, p.version_id.as_deref(), |m| {
                m.tags = p.tags.clone();
            })?;
        }
        Command::PutObjectVersion(meta) => object::apply_put_object_version(txn, meta)?,
        Command::DeleteObjectVersion(p) => {
            object::apply_delete_object_version(txn, &p.bucket, &p.key, &p.version_id)?;
        }
        Command::SetLatestVersion(p) => {
            object::apply_set_latest_version(txn, &p.bucket, &p.key, &p.version_id)?;
        }
        Command::SetObjectLegalHold(p) => {
            object::apply_update_object(txn, &p.bucket, &p.key, p.version_id.as_deref(), |m| {
                m.legal_hold = p.legal_hold;
            })?;
        }
        Command::SetObjectRetention(p) => {
            object::apply_update_object(txn, &p.bucket, &p.key, p.version_id.as_deref(), |m| {
                m.retention_mode = p.mode;
                m.retention_until = p.retain_until;
            })?;
        }
        Command::SetStorageTier(p) => {
            object::apply_update_object(txn, &p.bucket, &p.key, None, |m| {
                m.storage_tier = p.tier;
            })?;
        }
        Command::CreateMultipartUpload(upload) => {
            object::apply_create_multipart_upload(txn, upload)?;
        }
        Command::DeleteMultipartUpload { upload_id } => {
            object::apply_delete_multipart_upload(txn, upload_id)?;
        }
        Command::PutPart(p) => object::apply_put_part(txn, &p.upload_id, &p.part)?,
        Command::CreateAccessKey(key) => iam::apply_create_access_key(txn, key)?,
        Command::DeleteAccessKey { access_key } => iam::apply_delete_access_key(txn, access_key)?,
        Command::PruneExpiredAccessKeys { now } => {
            return iam::apply_prune_expired_access_keys(txn, *now);
        }
        Command::CreateIamUser(user) => iam::apply_create_user(txn, user)?,
        Command::DeleteIamUser { user_id } => iam::apply_delete_user(txn, user_id)?,
        Command::CreateIamGroup(group) => iam::apply_create_group(txn, group)?,
        Command::DeleteIamGroup { name } => iam::apply_delete_group(txn, name)?,
        Command::CreateIamPolicy(policy) => iam::apply_create_policy(txn, policy)?,
        Command::DeleteIamPolicy { name } => iam::apply_delete_policy(txn, name)?,
        Command::AttachUserPolicy(p) => {
            iam::apply_attach_user_policy(txn, &p.user_id, &p.policy_name)?;
        }
        Command::AppendAudit(entry) => system::apply_append_audit(txn, entry)?,
        Command::PruneAudit { before_nanos } => {
            return system::apply_prune_audit(txn, *before_nanos);
        }
        Command::PutVersionTag(p) => object::apply_put_version_tag(txn, &p.bucket, &p.key, &p.tag)?,
        Command::DeleteVersionTag(p) => {
            object::apply_delete_version_tag(txn, &p.bucket, &p.key, &p.tag)?;
        }
        Command::EnqueueReplication(event) => system::apply_enqueue_replication(txn, event)?,
        Command::DequeueReplication { id } => system::apply_dequeue_replication(txn, *id)?,
        Command::SetReplicationStatus(status) => system::apply_set_replication_status(txn, status)?,
        Command::TrimChangeLog { before_seq } => {
            return txn.trim_change_log(*before_seq);
        }
        Command::BatchAccessTimes(p) => object::apply_batch_access_times(txn, &p.entries)?,
        Command::SetVectorClock(p) => {
            object::apply_update_object(txn, &p.bucket, &p.key, Some(&p.version_id), |m| {
                m.vector_clock = Some(p.clock.clone());
            })?;
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BucketRef, VersioningPayload};
    use objvault_common::types::{BucketInfo, ObjectMeta, VersioningStatus};
    use objvault_store::Keyspace;

    fn temp_applier() -> (tempfile::TempDir, Applier) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("meta.redb")).unwrap());
        (dir, Applier::new(store))
    }

    fn commands() -> Vec<Command> {
        vec![
            Command::CreateBucket(BucketInfo {
                name: "b".into(),
                created_at: 100,
                ..Default::default()
            }),
            Command::SetBucketVersioning(VersioningPayload {
                bucket: "b".into(),
                status: VersioningStatus::Enabled,
            }),
            Command::PutObjectVersion(Box::new(ObjectMeta {
                bucket: "b".into(),
                key: "k".into(),
                content_type: "text/plain".into(),
                etag: "\"e1\"".into(),
                size: 2,
                last_modified: 200,
                version_id: Some("v1".into()),
                is_latest: true,
                ..Default::default()
            })),
            Command::PutObjectVersion(Box::new(ObjectMeta {
                bucket: "b".into(),
                key: "k".into(),
                content_type: "text/plain".into(),
                etag: "\"e2\"".into(),
                size: 2,
                last_modified: 300,
                version_id: Some("v2".into()),
                is_latest: true,
                ..Default::default()
            })),
            Command::DeleteObjectVersion(crate::codec::VersionRef {
                bucket: "b".into(),
                key: "k".into(),
                version_id: "v2".into(),
            }),
        ]
    }

    #[test]
    fn test_replay_converges() {
        // The same command sequence applied to two empty stores must yield
        // identical keyspace contents.
        let (_d1, a) = temp_applier();
        let (_d2, b) = temp_applier();
        for cmd in commands() {
            a.apply(&cmd.encode()).unwrap();
            b.apply(&cmd.encode()).unwrap();
        }

        let mut snap_a = Vec::new();
        let mut snap_b = Vec::new();
        a.store().write_snapshot(&mut snap_a).unwrap();
        b.store().write_snapshot(&mut snap_b).unwrap();
        assert_eq!(snap_a, snap_b);
    }

    #[test]
    fn test_corrupt_command_skipped() {
        let (_dir, applier) = temp_applier();
        assert_eq!(applier.apply(b"garbage").unwrap(), 0);
        assert_eq!(applier.apply(br#"{"t":26,"d":{}}"#).unwrap(), 0);
    }

    #[test]
    fn test_change_log_records_envelope_verbatim() {
        let (_dir, applier) = temp_applier();
        let cmd = Command::DeleteBucket(BucketRef { name: "b".into() });
        let bytes = cmd.encode();
        applier.apply(&bytes).unwrap();

        let log = applier.store().read_change_log(0, 10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1, bytes);
    }

    #[test]
    fn test_counting_command_returns_count() {
        let (_dir, applier) = temp_applier();
        applier
            .apply(
                &Command::CreateAccessKey(objvault_common::types::AccessKey {
                    access_key: "STS".into(),
                    expires_at: 10,
                    ..Default::default()
                })
                .encode(),
            )
            .unwrap();
        let pruned = applier
            .apply(&Command::PruneExpiredAccessKeys { now: 100 }.encode())
            .unwrap();
        assert_eq!(pruned, 1);
    }

    #[test]
    fn test_applied_mutation_visible() {
        let (_dir, applier) = temp_applier();
        for cmd in commands() {
            applier.apply(&cmd.encode()).unwrap();
        }
        let rtx = applier.store().begin_read().unwrap();
        let latest = objvault_store::object::get_object(&rtx, "b", "k").unwrap().unwrap();
        assert_eq!(latest.version_id.as_deref(), Some("v1"));
        assert_eq!(rtx.len(Keyspace::ObjectVersions).unwrap(), 1);
    }
}
