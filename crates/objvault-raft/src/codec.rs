//! Command codec: the tagged envelope every metadata mutation travels in.
//!
//! The envelope is JSON: `{"t": <u16>, "d": <payload>}`. Tags are part of the
//! wire contract and MUST remain stable across releases; this module is the
//! single definition of the tag table. New commands append new tags; existing
//! tags are never renumbered or reused.

use objvault_common::types::{
    AccessKey, AuditEntry, BucketInfo, DefaultRetention, IamGroup, IamPolicyRecord, IamUser,
    MultipartUpload, ObjectMeta, PartInfo, ReplicationEvent, ReplicationStatus, RetentionMode,
    StorageTier, VersionTag, VersioningStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Stable command tags. Tag 26 is reserved (retired command).
pub mod tag {
    pub const CREATE_BUCKET: u16 = 1;
    pub const DELETE_BUCKET: u16 = 2;
    pub const PUT_BUCKET_POLICY: u16 = 3;
    pub const DELETE_BUCKET_POLICY: u16 = 4;
    pub const PUT_BUCKET_QUOTA: u16 = 5;
    pub const PUT_BUCKET_TAGS: u16 = 6;
    pub const PUT_BUCKET_DEFAULT_RETENTION: u16 = 7;
    pub const PUT_OBJECT_LOCK_CONFIG: u16 = 8;
    pub const SET_BUCKET_VERSIONING: u16 = 9;
    pub const PUT_LIFECYCLE_RULES: u16 = 10;
    pub const DELETE_LIFECYCLE_RULES: u16 = 11;
    pub const PUT_WEBSITE_CONFIG: u16 = 12;
    pub const DELETE_WEBSITE_CONFIG: u16 = 13;
    pub const PUT_CORS_CONFIG: u16 = 14;
    pub const DELETE_CORS_CONFIG: u16 = 15;
    pub const PUT_NOTIFICATION_CONFIG: u16 = 16;
    pub const DELETE_NOTIFICATION_CONFIG: u16 = 17;
    pub const PUT_LAMBDA_TRIGGER: u16 = 18;
    pub const DELETE_LAMBDA_TRIGGER: u16 = 19;
    pub const PUT_ENCRYPTION_CONFIG: u16 = 20;
    pub const DELETE_ENCRYPTION_CONFIG: u16 = 21;
    pub const PUT_PUBLIC_ACCESS_BLOCK: u16 = 22;
    pub const DELETE_PUBLIC_ACCESS_BLOCK: u16 = 23;
    pub const PUT_LOGGING_CONFIG: u16 = 24;
    pub const DELETE_LOGGING_CONFIG: u16 = 25;
    pub const PUT_OBJECT_META: u16 = 27;
    pub const DELETE_OBJECT_META: u16 = 28;
    pub const PUT_OBJECT_TAGS: u16 = 29;
    pub const PUT_OBJECT_VERSION: u16 = 30;
    pub const DELETE_OBJECT_VERSION: u16 = 31;
    pub const SET_LATEST_VERSION: u16 = 32;
    pub const SET_OBJECT_LEGAL_HOLD: u16 = 33;
    pub const SET_OBJECT_RETENTION: u16 = 34;
    pub const SET_STORAGE_TIER: u16 = 35;
    pub const CREATE_MULTIPART_UPLOAD: u16 = 36;
    pub const DELETE_MULTIPART_UPLOAD: u16 = 37;
    pub const PUT_PART: u16 = 38;
    pub const CREATE_ACCESS_KEY: u16 = 39;
    pub const DELETE_ACCESS_KEY: u16 = 40;
    pub const PRUNE_EXPIRED_ACCESS_KEYS: u16 = 41;
    pub const CREATE_IAM_USER: u16 = 42;
    pub const DELETE_IAM_USER: u16 = 43;
    pub const CREATE_IAM_GROUP: u16 = 44;
    pub const DELETE_IAM_GROUP: u16 = 45;
    pub const CREATE_IAM_POLICY: u16 = 46;
    pub const DELETE_IAM_POLICY: u16 = 47;
    pub const ATTACH_USER_POLICY: u16 = 48;
    pub const APPEND_AUDIT: u16 = 49;
    pub const PRUNE_AUDIT: u16 = 50;
    pub const PUT_VERSION_TAG: u16 = 51;
    pub const DELETE_VERSION_TAG: u16 = 52;
    pub const ENQUEUE_REPLICATION: u16 = 53;
    pub const DEQUEUE_REPLICATION: u16 = 54;
    pub const SET_REPLICATION_STATUS: u16 = 55;
    pub const TRIM_CHANGE_LOG: u16 = 56;
    pub const BATCH_ACCESS_TIMES: u16 = 57;
    pub const SET_VECTOR_CLOCK: u16 = 58;
}

/// Codec failures. Unknown tags get their own variant so the applier can
/// skip-and-log without conflating them with malformed JSON.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed command envelope: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error("unknown command tag: {0}")]
    UnknownTag(u16),
}

// ── Payload shapes ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRef {
    pub bucket: String,
    pub key: String,
    pub version_id: String,
}

/// Raw per-bucket configuration body (policy JSON, lifecycle XML, ...)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPayload {
    pub bucket: String,
    pub config: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPayload {
    pub bucket: String,
    pub max_size_bytes: u64,
    pub max_objects: u64,
    pub fifo: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketTagsPayload {
    pub bucket: String,
    pub tags: HashMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultRetentionPayload {
    pub bucket: String,
    pub retention: Option<DefaultRetention>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLockConfigPayload {
    pub bucket: String,
    pub enabled: bool,
    pub retention: Option<DefaultRetention>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersioningPayload {
    pub bucket: String,
    pub status: VersioningStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTagsPayload {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
    pub tags: HashMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalHoldPayload {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
    pub legal_hold: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPayload {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
    pub mode: Option<RetentionMode>,
    pub retain_until: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageTierPayload {
    pub bucket: String,
    pub key: String,
    pub tier: StorageTier,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PutPartPayload {
    pub upload_id: String,
    pub part: PartInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachPolicyPayload {
    pub user_id: String,
    pub policy_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionTagPayload {
    pub bucket: String,
    pub key: String,
    pub tag: VersionTag,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteVersionTagPayload {
    pub bucket: String,
    pub key: String,
    pub tag: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTimesPayload {
    /// `(bucket, key, unix_seconds)` triples, coalesced by the batcher
    pub entries: Vec<(String, String, i64)>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClockPayload {
    pub bucket: String,
    pub key: String,
    pub version_id: String,
    pub clock: Vec<u8>,
}

// ── Command ───────────────────────────────────────────────────────────────────

/// Every replicated metadata mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateBucket(BucketInfo),
    DeleteBucket(BucketRef),
    PutBucketPolicy(ConfigPayload),
    DeleteBucketPolicy(BucketRef),
    PutBucketQuota(QuotaPayload),
    PutBucketTags(BucketTagsPayload),
    PutBucketDefaultRetention(DefaultRetentionPayload),
    PutObjectLockConfig(ObjectLockConfigPayload),
    SetBucketVersioning(VersioningPayload),
    PutLifecycleRules(ConfigPayload),
    DeleteLifecycleRules(BucketRef),
    PutWebsiteConfig(ConfigPayload),
    DeleteWebsiteConfig(BucketRef),
    PutCorsConfig(ConfigPayload),
    DeleteCorsConfig(BucketRef),
    PutNotificationConfig(ConfigPayload),
    DeleteNotificationConfig(BucketRef),
    PutLambdaTrigger(ConfigPayload),
    DeleteLambdaTrigger(BucketRef),
    PutEncryptionConfig(ConfigPayload),
    DeleteEncryptionConfig(BucketRef),
    PutPublicAccessBlock(ConfigPayload),
    DeletePublicAccessBlock(BucketRef),
    PutLoggingConfig(ConfigPayload),
    DeleteLoggingConfig(BucketRef),
    PutObjectMeta(Box<ObjectMeta>),
    DeleteObjectMeta(ObjectRef),
    PutObjectTags(ObjectTagsPayload),
    PutObjectVersion(Box<ObjectMeta>),
    DeleteObjectVersion(VersionRef),
    SetLatestVersion(VersionRef),
    SetObjectLegalHold(LegalHoldPayload),
    SetObjectRetention(RetentionPayload),
    SetStorageTier(StorageTierPayload),
    CreateMultipartUpload(MultipartUpload),
    DeleteMultipartUpload { upload_id: String },
    PutPart(PutPartPayload),
    CreateAccessKey(AccessKey),
    DeleteAccessKey { access_key: String },
    PruneExpiredAccessKeys { now: i64 },
    CreateIamUser(IamUser),
    DeleteIamUser { user_id: String },
    CreateIamGroup(IamGroup),
    DeleteIamGroup { name: String },
    CreateIamPolicy(IamPolicyRecord),
    DeleteIamPolicy { name: String },
    AttachUserPolicy(AttachPolicyPayload),
    AppendAudit(AuditEntry),
    PruneAudit { before_nanos: u64 },
    PutVersionTag(VersionTagPayload),
    DeleteVersionTag(DeleteVersionTagPayload),
    EnqueueReplication(ReplicationEvent),
    DequeueReplication { id: u64 },
    SetReplicationStatus(ReplicationStatus),
    TrimChangeLog { before_seq: u64 },
    BatchAccessTimes(AccessTimesPayload),
    SetVectorClock(VectorClockPayload),
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    t: u16,
    d: serde_json::Value,
}

macro_rules! payload {
    ($v:expr) => {
        serde_json::to_value($v).expect("command payload serializes")
    };
}

#[derive(Serialize, Deserialize)]
struct UploadIdPayload {
    upload_id: String,
}

#[derive(Serialize, Deserialize)]
struct AccessKeyRef {
    access_key: String,
}

#[derive(Serialize, Deserialize)]
struct NowPayload {
    now: i64,
}

#[derive(Serialize, Deserialize)]
struct UserIdPayload {
    user_id: String,
}

#[derive(Serialize, Deserialize)]
struct NamePayload {
    name: String,
}

#[derive(Serialize, Deserialize)]
struct BeforeNanosPayload {
    before_nanos: u64,
}

#[derive(Serialize, Deserialize)]
struct IdPayload {
    id: u64,
}

#[derive(Serialize, Deserialize)]
struct BeforeSeqPayload {
    before_seq: u64,
}

impl Command {
    /// The stable wire tag of this command.
    #[must_use]
    pub fn tag(&self) -> u16 {
        match self {
            Command::CreateBucket(_) => tag::CREATE_BUCKET,
            Command::DeleteBucket(_) => tag::DELETE_BUCKET,
            Command::PutBucketPolicy(_) => tag::PUT_BUCKET_POLICY,
            Command::DeleteBucketPolicy(_) => tag::DELETE_BUCKET_POLICY,
            Command::PutBucketQuota(_) => tag::PUT_BUCKET_QUOTA,
            Command::PutBucketTags(_) => tag::PUT_BUCKET_TAGS,
            Command::PutBucketDefaultRetention(_) => tag::PUT_BUCKET_DEFAULT_RETENTION,
            Command::PutObjectLockConfig(_) => tag::PUT_OBJECT_LOCK_CONFIG,
            Command::SetBucketVersioning(_) => tag::SET_BUCKET_VERSIONING,
            Command::PutLifecycleRules(_) => tag::PUT_LIFECYCLE_RULES,
            Command::DeleteLifecycleRules(_) => tag::DELETE_LIFECYCLE_RULES,
            Command::PutWebsiteConfig(_) => tag::PUT_WEBSITE_CONFIG,
            Command::DeleteWebsiteConfig(_) => tag::DELETE_WEBSITE_CONFIG,
            Command::PutCorsConfig(_) => tag::PUT_CORS_CONFIG,
            Command::DeleteCorsConfig(_) => tag::DELETE_CORS_CONFIG,
            Command::PutNotificationConfig(_) => tag::PUT_NOTIFICATION_CONFIG,
            Command::DeleteNotificationConfig(_) => tag::DELETE_NOTIFICATION_CONFIG,
            Command::PutLambdaTrigger(_) => tag::PUT_LAMBDA_TRIGGER,
            Command::DeleteLambdaTrigger(_) => tag::DELETE_LAMBDA_TRIGGER,
            Command::PutEncryptionConfig(_) => tag::PUT_ENCRYPTION_CONFIG,
            Command::DeleteEncryptionConfig(_) => tag::DELETE_ENCRYPTION_CONFIG,
            Command::PutPublicAccessBlock(_) => tag::PUT_PUBLIC_ACCESS_BLOCK,
            Command::DeletePublicAccessBlock(_) => tag::DELETE_PUBLIC_ACCESS_BLOCK,
            Command::PutLoggingConfig(_) => tag::PUT_LOGGING_CONFIG,
            Command::DeleteLoggingConfig(_) => tag::DELETE_LOGGING_CONFIG,
            Command::PutObjectMeta(_) => tag::PUT_OBJECT_META,
            Command::DeleteObjectMeta(_) => tag::DELETE_OBJECT_META,
            Command::PutObjectTags(_) => tag::PUT_OBJECT_TAGS,
            Command::PutObjectVersion(_) => tag::PUT_OBJECT_VERSION,
            Command::DeleteObjectVersion(_) => tag::DELETE_OBJECT_VERSION,
            Command::SetLatestVersion(_) => tag::SET_LATEST_VERSION,
            Command::SetObjectLegalHold(_) => tag::SET_OBJECT_LEGAL_HOLD,
            Command::SetObjectRetention(_) => tag::SET_OBJECT_RETENTION,
            Command::SetStorageTier(_) => tag::SET_STORAGE_TIER,
            Command::CreateMultipartUpload(_) => tag::CREATE_MULTIPART_UPLOAD,
            Command::DeleteMultipartUpload { .. } => tag::DELETE_MULTIPART_UPLOAD,
            Command::PutPart(_) => tag::PUT_PART,
            Command::CreateAccessKey(_) => tag::CREATE_ACCESS_KEY,
            Command::DeleteAccessKey { .. } => tag::DELETE_ACCESS_KEY,
            Command::PruneExpiredAccessKeys { .. } => tag::PRUNE_EXPIRED_ACCESS_KEYS,
            Command::CreateIamUser(_) => tag::CREATE_IAM_USER,
            Command::DeleteIamUser { .. } => tag::DELETE_IAM_USER,
            Command::CreateIamGroup(_) => tag::CREATE_IAM_GROUP,
            Command::DeleteIamGroup { .. } => tag::DELETE_IAM_GROUP,
            Command::CreateIamPolicy(_) => tag::CREATE_IAM_POLICY,
            Command::DeleteIamPolicy { .. } => tag::DELETE_IAM_POLICY,
            Command::AttachUserPolicy(_) => tag::ATTACH_USER_POLICY,
            Command::AppendAudit(_) => tag::APPEND_AUDIT,
            Command::PruneAudit { .. } => tag::PRUNE_AUDIT,
            Command::PutVersionTag(_) => tag::PUT_VERSION_TAG,
            Command::DeleteVersionTag(_) => tag::DELETE_VERSION_TAG,
            Command::EnqueueReplication(_) => tag::ENQUEUE_REPLICATION,
            Command::DequeueReplication { .. } => tag::DEQUEUE_REPLICATION,
            Command::SetReplicationStatus(_) => tag::SET_REPLICATION_STATUS,
            Command::TrimChangeLog { .. } => tag::TRIM_CHANGE_LOG,
            Command::BatchAccessTimes(_) => tag::BATCH_ACCESS_TIMES,
            Command::SetVectorClock(_) => tag::SET_VECTOR_CLOCK,
        }
    }

    /// Encode as the `{"t", "d"}` envelope.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let d = match self {
            Command::CreateBucket(p) => payload!(p),
            Command::DeleteBucket(p) => payload!(p),
            Command::PutBucketPolicy(p) => payload!(p),
            Command::DeleteBucketPolicy(p) => payload!(p),
            Command::PutBucketQuota(p) => payload!(p),
            Command::PutBucketTags(p) => payload!(p),
            Command::PutBucketDefaultRetention(p) => payload!(p),
            Command::PutObjectLockConfig(p) => payload!(p),
            Command::SetBucketVersioning(p) => payload!(p),
            Command::PutLifecycleRules(p) => payload!(p),
            Command::DeleteLifecycleRules(p) => payload!(p),
            Command::PutWebsiteConfig(p) => payload!(p),
            Command::DeleteWebsiteConfig(p) => payload!(p),
            Command::PutCorsConfig(p) => payload!(p),
            Command::DeleteCorsConfig(p) => payload!(p),
            Command::PutNotificationConfig(p) => payload!(p),
            Command::DeleteNotificationConfig(p) => payload!(p),
            Command::PutLambdaTrigger(p) => payload!(p),
            Command::DeleteLambdaTrigger(p) => payload!(p),
            Command::PutEncryptionConfig(p) => payload!(p),
            Command::DeleteEncryptionConfig(p) => payload!(p),
            Command::PutPublicAccessBlock(p) => payload!(p),
            Command::DeletePublicAccessBlock(p) => payload!(p),
            Command::PutLoggingConfig(p) => payload!(p),
            Command::DeleteLoggingConfig(p) => payload!(p),
            Command::PutObjectMeta(p) => payload!(p),
            Command::DeleteObjectMeta(p) => payload!(p),
            Command::PutObjectTags(p) => payload!(p),
            Command::PutObjectVersion(p) => payload!(p),
            Command::DeleteObjectVersion(p) => payload!(p),
            Command::SetLatestVersion(p) => payload!(p),
            Command::SetObjectLegalHold(p) => payload!(p),
            Command::SetObjectRetention(p) => payload!(p),
            Command::SetStorageTier(p) => payload!(p),
            Command::CreateMultipartUpload(p) => payload!(p),
            Command::DeleteMultipartUpload { upload_id } => payload!(UploadIdPayload {
                upload_id: upload_id.clone()
            }),
            Command::PutPart(p) => payload!(p),
            Command::CreateAccessKey(p) => payload!(p),
            Command::DeleteAccessKey { access_key } => payload!(AccessKeyRef {
                access_key: access_key.clone()
            }),
            Command::PruneExpiredAccessKeys { now } => payload!(NowPayload { now: *now }),
            Command::CreateIamUser(p) => payload!(p),
            Command::DeleteIamUser { user_id } => payload!(UserIdPayload {
                user_id: user_id.clone()
            }),
            Command::CreateIamGroup(p) => payload!(p),
            Command::DeleteIamGroup { name } => payload!(NamePayload { name: name.clone() }),
            Command::CreateIamPolicy(p) => payload!(p),
            Command::DeleteIamPolicy { name } => payload!(NamePayload { name: name.clone() }),
            Command::AttachUserPolicy(p) => payload!(p),
            Command::AppendAudit(p) => payload!(p),
            Command::PruneAudit { before_nanos } => payload!(BeforeNanosPayload {
                before_nanos: *before_nanos
            }),
            Command::PutVersionTag(p) => payload!(p),
            Command::DeleteVersionTag(p) => payload!(p),
            Command::EnqueueReplication(p) => payload!(p),
            Command::DequeueReplication { id } => payload!(IdPayload { id: *id }),
            Command::SetReplicationStatus(p) => payload!(p),
            Command::TrimChangeLog { before_seq } => payload!(BeforeSeqPayload {
                before_seq: *before_seq
            }),
            Command::BatchAccessTimes(p) => payload!(p),
            Command::SetVectorClock(p) => payload!(p),
        };
        serde_json::to_vec(&Envelope { t: self.tag(), d }).expect("envelope serializes")
    }

    /// Decode an envelope back into a command.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let env: Envelope = serde_json::from_slice(bytes)?;
        let d = env.d;
        let cmd = match env.t {
            tag::CREATE_BUCKET => Command::CreateBucket(serde_json::from_value(d)?),
            tag::DELETE_BUCKET => Command::DeleteBucket(serde_json::from_value(d)?),
            tag::PUT_BUCKET_POLICY => Command::PutBucketPolicy(serde_json::from_value(d)?),
            tag::DELETE_BUCKET_POLICY => Command::DeleteBucketPolicy(serde_json::from_value(d)?),
            tag::PUT_BUCKET_QUOTA => Command::PutBucketQuota(serde_json::from_value(d)?),
            tag::PUT_BUCKET_TAGS => Command::PutBucketTags(serde_json::from_value(d)?),
            tag::PUT_BUCKET_DEFAULT_RETENTION => {
                Command::PutBucketDefaultRetention(serde_json::from_value(d)?)
            }
            tag::PUT_OBJECT_LOCK_CONFIG => Command::PutObjectLockConfig(serde_json::from_value(d)?),
            tag::SET_BUCKET_VERSIONING => Command::SetBucketVersioning(serde_json::from_value(d)?),
            tag::PUT_LIFECYCLE_RULES => Command::PutLifecycleRules(serde_json::from_value(d)?),
            tag::DELETE_LIFECYCLE_RULES => Command::DeleteLifecycleRules(serde_json::from_value(d)?),
            tag::PUT_WEBSITE_CONFIG => Command::PutWebsiteConfig(serde_json::from_value(d)?),
            tag::DELETE_WEBSITE_CONFIG => Command::DeleteWebsiteConfig(serde_json::from_value(d)?),
            tag::PUT_CORS_CONFIG => Command::PutCorsConfig(serde_json::from_value(d)?),
            tag::DELETE_CORS_CONFIG => Command::DeleteCorsConfig(serde_json::from_value(d)?),
            tag::PUT_NOTIFICATION_CONFIG => {
                Command::PutNotificationConfig(serde_json::from_value(d)?)
            }
            tag::DELETE_NOTIFICATION_CONFIG => {
                Command::DeleteNotificationConfig(serde_json::from_value(d)?)
            }
            tag::PUT_LAMBDA_TRIGGER => Command::PutLambdaTrigger(serde_json::from_value(d)?),
            tag::DELETE_LAMBDA_TRIGGER => Command::DeleteLambdaTrigger(serde_json::from_value(d)?),
            tag::PUT_ENCRYPTION_CONFIG => Command::PutEncryptionConfig(serde_json::from_value(d)?),
            tag::DELETE_ENCRYPTION_CONFIG => {
                Command::DeleteEncryptionConfig(serde_json::from_value(d)?)
            }
            tag::PUT_PUBLIC_ACCESS_BLOCK => {
                Command::PutPublicAccessBlock(serde_json::from_value(d)?)
            }
            tag::DELETE_PUBLIC_ACCESS_BLOCK => {
                Command::DeletePublicAccessBlock(serde_json::from_value(d)?)
            }
            tag::PUT_LOGGING_CONFIG => Command::PutLoggingConfig(serde_json::from_value(d)?),
            tag::DELETE_LOGGING_CONFIG => Command::DeleteLoggingConfig(serde_json::from_value(d)?),
            tag::PUT_OBJECT_META => Command::PutObjectMeta(serde_json::from_value(d)?),
            tag::DELETE_OBJECT_META => Command::DeleteObjectMeta(serde_json::from_value(d)?),
            tag::PUT_OBJECT_TAGS => Command::PutObjectTags(serde_json::from_value(d)?),
            tag::PUT_OBJECT_VERSION => Command::PutObjectVersion(serde_json::from_value(d)?),
            tag::DELETE_OBJECT_VERSION => Command::DeleteObjectVersion(serde_json::from_value(d)?),
            tag::SET_LATEST_VERSION => Command::SetLatestVersion(serde_json::from_value(d)?),
            tag::SET_OBJECT_LEGAL_HOLD => Command::SetObjectLegalHold(serde_json::from_value(d)?),
            tag::SET_OBJECT_RETENTION => Command::SetObjectRetention(serde_json::from_value(d)?),
            tag::SET_STORAGE_TIER => Command::SetStorageTier(serde_json::from_value(d)?),
            tag::CREATE_MULTIPART_UPLOAD => {
                Command::CreateMultipartUpload(serde_json::from_value(d)?)
            }
            tag::DELETE_MULTIPART_UPLOAD => {
                let p: UploadIdPayload = serde_json::from_value(d)?;
                Command::DeleteMultipartUpload {
                    upload_id: p.upload_id,
                }
            }
            tag::PUT_PART => Command::PutPart(serde_json::from_value(d)?),
            tag::CREATE_ACCESS_KEY => Command::CreateAccessKey(serde_json::from_value(d)?),
            tag::DELETE_ACCESS_KEY => {
                let p: AccessKeyRef = serde_json::from_value(d)?;
                Command::DeleteAccessKey {
                    access_key: p.access_key,
                }
            }
            tag::PRUNE_EXPIRED_ACCESS_KEYS => {
                let p: NowPayload = serde_json::from_value(d)?;
                Command::PruneExpiredAccessKeys { now: p.now }
            }
            tag::CREATE_IAM_USER => Command::CreateIamUser(serde_json::from_value(d)?),
            tag::DELETE_IAM_USER => {
                let p: UserIdPayload = serde_json::from_value(d)?;
                Command::DeleteIamUser { user_id: p.user_id }
            }
            tag::CREATE_IAM_GROUP => Command::CreateIamGroup(serde_json::from_value(d)?),
            tag::DELETE_IAM_GROUP => {
                let p: NamePayload = serde_json::from_value(d)?;
                Command::DeleteIamGroup { name: p.name }
            }
            tag::CREATE_IAM_POLICY => Command::CreateIamPolicy(serde_json::from_value(d)?),
            tag::DELETE_IAM_POLICY => {
                let p: NamePayload = serde_json::from_value(d)?;
                Command::DeleteIamPolicy { name: p.name }
            }
            tag::ATTACH_USER_POLICY => Command::AttachUserPolicy(serde_json::from_value(d)?),
            tag::APPEND_AUDIT => Command::AppendAudit(serde_json::from_value(d)?),
            tag::PRUNE_AUDIT => {
                let p: BeforeNanosPayload = serde_json::from_value(d)?;
                Command::PruneAudit {
                    before_nanos: p.before_nanos,
                }
            }
            tag::PUT_VERSION_TAG => Command::PutVersionTag(serde_json::from_value(d)?),
            tag::DELETE_VERSION_TAG => Command::DeleteVersionTag(serde_json::from_value(d)?),
            tag::ENQUEUE_REPLICATION => Command::EnqueueReplication(serde_json::from_value(d)?),
            tag::DEQUEUE_REPLICATION => {
                let p: IdPayload = serde_json::from_value(d)?;
                Command::DequeueReplication { id: p.id }
            }
            tag::SET_REPLICATION_STATUS => {
                Command::SetReplicationStatus(serde_json::from_value(d)?)
            }
            tag::TRIM_CHANGE_LOG => {
                let p: BeforeSeqPayload = serde_json::from_value(d)?;
                Command::TrimChangeLog {
                    before_seq: p.before_seq,
                }
            }
            tag::BATCH_ACCESS_TIMES => Command::BatchAccessTimes(serde_json::from_value(d)?),
            tag::SET_VECTOR_CLOCK => Command::SetVectorClock(serde_json::from_value(d)?),
            other => return Err(CodecError::UnknownTag(other)),
        };
        Ok(cmd)
    }
}
