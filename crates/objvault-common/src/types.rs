//! Core type definitions for ObjVault
//!
//! This module defines the record shapes persisted in the metadata keyspaces.
//! All records serialize as JSON; the same encoding is used for replicated
//! command payloads, so field names here are part of the wire contract.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Bucket versioning state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningStatus {
    /// Versioning has never been enabled on the bucket
    #[default]
    #[serde(rename = "")]
    Unversioned,
    Enabled,
    Suspended,
}

impl VersioningStatus {
    /// Parse the `<Status>` value of a VersioningConfiguration document
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Enabled" => Some(Self::Enabled),
            "Suspended" => Some(Self::Suspended),
            "" => Some(Self::Unversioned),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unversioned => "",
            Self::Enabled => "Enabled",
            Self::Suspended => "Suspended",
        }
    }
}

/// Object-lock retention mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RetentionMode {
    Governance,
    Compliance,
}

impl RetentionMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GOVERNANCE" => Some(Self::Governance),
            "COMPLIANCE" => Some(Self::Compliance),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Governance => "GOVERNANCE",
            Self::Compliance => "COMPLIANCE",
        }
    }
}

impl fmt::Display for RetentionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default retention applied to new objects in a bucket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultRetention {
    pub mode: RetentionMode,
    pub days: u32,
}

/// Storage tier for an object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    #[default]
    Hot,
    Cold,
}

/// Bucket metadata record (`buckets` keyspace)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    /// Creation time, unix seconds. Immutable after create.
    pub created_at: i64,
    /// Size quota in bytes, 0 = unlimited
    #[serde(default)]
    pub max_size_bytes: u64,
    /// Object count quota, 0 = unlimited
    #[serde(default)]
    pub max_objects: u64,
    /// Evict oldest objects instead of rejecting when the size quota is hit
    #[serde(default)]
    pub fifo_quota: bool,
    #[serde(default)]
    pub versioning: VersioningStatus,
    /// Object Lock enabled at bucket creation or via PutObjectLockConfiguration
    #[serde(default)]
    pub object_lock_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_retention: Option<DefaultRetention>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

/// Checksums recorded for an object, base64-encoded
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32c: Option<String>,
}

impl ChecksumSet {
    /// True if no checksum was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sha256.is_none() && self.sha1.is_none() && self.crc32.is_none() && self.crc32c.is_none()
    }
}

/// HTTP metadata echoed back on GET/HEAD responses
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_redirect_location: Option<String>,
}

impl HttpMetadata {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content_encoding.is_none()
            && self.content_disposition.is_none()
            && self.cache_control.is_none()
            && self.content_language.is_none()
            && self.website_redirect_location.is_none()
    }
}

/// Object metadata record (`objects` and `object_versions` keyspaces)
///
/// The `objects` record for a key is always a copy of the newest
/// non-deleted version record (the latest pointer), or of a delete-marker
/// record after a versioned DELETE.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    /// Strong ETag: quoted MD5 hex, or `"<hex>-<n>"` for multipart objects
    pub etag: String,
    pub size: u64,
    /// Unix seconds
    pub last_modified: i64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default)]
    pub is_latest: bool,
    #[serde(default)]
    pub delete_marker: bool,
    #[serde(default)]
    pub legal_hold: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_mode: Option<RetentionMode>,
    /// Unix seconds; 0 when no retention is set
    #[serde(default)]
    pub retention_until: i64,
    #[serde(default)]
    pub storage_tier: StorageTier,
    /// Unix seconds of the last read, maintained by the access-time batcher
    #[serde(default)]
    pub last_access: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_clock: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub user_metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HttpMetadata::is_empty")]
    pub http_metadata: HttpMetadata,
    #[serde(default, skip_serializing_if = "ChecksumSet::is_empty")]
    pub checksums: ChecksumSet,
    /// Number of parts for multipart objects, 0 otherwise
    #[serde(default)]
    pub parts_count: u32,
    /// Cumulative end offset of each part; last entry equals `size`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub part_boundaries: Vec<u64>,
}

impl ObjectMeta {
    /// The version id to report in `X-Amz-Version-Id` headers, hiding the
    /// reserved `"null"` id used for versioning-suspended writes.
    #[must_use]
    pub fn reported_version_id(&self) -> Option<&str> {
        match self.version_id.as_deref() {
            Some("null") | None => None,
            other => other,
        }
    }
}

/// In-progress multipart upload (`multipart_uploads` keyspace)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MultipartUpload {
    /// 16 random bytes, hex encoded
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    /// Unix seconds
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub user_metadata: HashMap<String, String>,
}

/// A single uploaded part (`multipart_parts` keyspace)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartInfo {
    /// 1..=10000
    pub part_number: u32,
    /// Quoted MD5 hex of the part body
    pub etag: String,
    pub size: u64,
}

/// Credential record (`access_keys` keyspace)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessKey {
    pub access_key: String,
    pub secret_key: String,
    /// Unix seconds
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Unix seconds; >0 marks an STS key eligible for pruning
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// STS keys inherit policies from the originating user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_user_id: Option<String>,
    /// CIDR blocks this key may be used from, in addition to global rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_cidrs: Vec<String>,
}

impl AccessKey {
    /// True if this is an STS key that has passed its expiration
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at > 0 && now > self.expires_at
    }
}

/// IAM user record (`iam_users` keyspace)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IamUser {
    pub user_id: String,
    /// Unix seconds
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_cidrs: Vec<String>,
}

/// IAM group record (`iam_groups` keyspace)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IamGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

/// Named IAM policy record (`iam_policies` keyspace)
///
/// The document is kept as raw JSON; parsing happens at evaluation time so a
/// corrupt document disables a policy without poisoning the keyspace.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IamPolicyRecord {
    pub name: String,
    pub document: String,
    /// Unix seconds
    pub created_at: i64,
}

/// Audit trail record (`audit_trail` keyspace, keyed by unix nanos)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unix nanoseconds, same value as the record key
    pub timestamp: u64,
    pub access_key: String,
    pub action: String,
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
}

/// Kind of replication event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationOp {
    Put,
    Delete,
}

/// Pending replication work item (`replication_queue` keyspace)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplicationEvent {
    /// Sequence assigned by the leader before submission
    pub id: u64,
    pub op: ReplicationOp,
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    /// Unix seconds
    pub created_at: i64,
}

/// Per-peer replication progress (`replication_status` keyspace)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicationStatus {
    pub peer: String,
    pub last_sequence: u64,
    /// Unix seconds of the last successful dispatch
    pub last_success: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Named tag on an object version (`version_tags` keyspace)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionTag {
    pub tag: String,
    pub version_id: String,
    /// Unix seconds
    pub created_at: i64,
}

/// Validate an S3 bucket name: 3-63 characters of `[a-z0-9.-]`.
pub fn validate_bucket_name(name: &str) -> std::result::Result<(), String> {
    if name.len() < 3 || name.len() > 63 {
        return Err(format!(
            "bucket name must be 3-63 characters, got {}",
            name.len()
        ));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '.' && *c != '-')
    {
        return Err(format!("bucket name contains invalid character: {c:?}"));
    }
    Ok(())
}
