//! Redb table definitions for the metadata keyspaces.
//!
//! Every keyspace maps opaque byte keys to opaque byte values; record
//! encoding (JSON) is decided at the call sites. The `SEQUENCES` table backs
//! the per-keyspace sequence allocators and is not itself a keyspace.

use redb::TableDefinition;

// S3 metadata
pub const BUCKETS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("buckets");
pub const BUCKET_POLICIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("bucket_policies");
// Key: "<bucket>/<key>", the latest pointer
pub const OBJECTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("objects");
// Key: "<bucket>\x00<key>\x00<version_id>"
pub const OBJECT_VERSIONS: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("object_versions");
pub const MULTIPART_UPLOADS: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("multipart_uploads");
// Key: "<upload_id>/<part_number:05>"
pub const MULTIPART_PARTS: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("multipart_parts");

// IAM
pub const ACCESS_KEYS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("access_keys");
pub const IAM_USERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("iam_users");
pub const IAM_GROUPS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("iam_groups");
pub const IAM_POLICIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("iam_policies");

// Operational
// Key: big-endian unix nanos
pub const AUDIT_TRAIL: TableDefinition<&[u8], &[u8]> = TableDefinition::new("audit_trail");
// Key: big-endian u64 sequence
pub const REPLICATION_QUEUE: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("replication_queue");
pub const REPLICATION_STATUS: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("replication_status");

// Per-bucket configuration, one record per bucket
pub const LIFECYCLE_RULES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("lifecycle_rules");
pub const WEBSITE_CONFIGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("website_configs");
pub const CORS_CONFIGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("cors_configs");
pub const NOTIFICATION_CONFIGS: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("notification_configs");
pub const LAMBDA_TRIGGERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("lambda_triggers");
pub const ENCRYPTION_CONFIGS: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("encryption_configs");
pub const PUBLIC_ACCESS_BLOCKS: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("public_access_blocks");
pub const LOGGING_CONFIGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("logging_configs");

// Key: "<bucket>\x00<key>\x00<tag>"
pub const VERSION_TAGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("version_tags");

// Key: big-endian u64 sequence, value: command envelope verbatim
pub const CHANGE_LOG: TableDefinition<&[u8], &[u8]> = TableDefinition::new("change_log");

// Internal: keyspace name -> last allocated sequence (u64 big-endian)
pub const SEQUENCES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("__sequences");

/// A named keyspace. The enum is closed so snapshots can walk every keyspace
/// in a deterministic (declaration) order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Keyspace {
    Buckets,
    BucketPolicies,
    Objects,
    ObjectVersions,
    MultipartUploads,
    MultipartParts,
    AccessKeys,
    IamUsers,
    IamGroups,
    IamPolicies,
    AuditTrail,
    ReplicationQueue,
    ReplicationStatus,
    LifecycleRules,
    WebsiteConfigs,
    CorsConfigs,
    NotificationConfigs,
    LambdaTriggers,
    EncryptionConfigs,
    PublicAccessBlocks,
    LoggingConfigs,
    VersionTags,
    ChangeLog,
}

impl Keyspace {
    /// Every keyspace, in snapshot emission order.
    pub const ALL: [Keyspace; 23] = [
        Keyspace::Buckets,
        Keyspace::BucketPolicies,
        Keyspace::Objects,
        Keyspace::ObjectVersions,
        Keyspace::MultipartUploads,
        Keyspace::MultipartParts,
        Keyspace::AccessKeys,
        Keyspace::IamUsers,
        Keyspace::IamGroups,
        Keyspace::IamPolicies,
        Keyspace::AuditTrail,
        Keyspace::ReplicationQueue,
        Keyspace::ReplicationStatus,
        Keyspace::LifecycleRules,
        Keyspace::WebsiteConfigs,
        Keyspace::CorsConfigs,
        Keyspace::NotificationConfigs,
        Keyspace::LambdaTriggers,
        Keyspace::EncryptionConfigs,
        Keyspace::PublicAccessBlocks,
        Keyspace::LoggingConfigs,
        Keyspace::VersionTags,
        Keyspace::ChangeLog,
    ];

    /// The redb table backing this keyspace
    #[must_use]
    pub fn table(&self) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
        match self {
            Keyspace::Buckets => BUCKETS,
            Keyspace::BucketPolicies => BUCKET_POLICIES,
            Keyspace::Objects => OBJECTS,
            Keyspace::ObjectVersions => OBJECT_VERSIONS,
            Keyspace::MultipartUploads => MULTIPART_UPLOADS,
            Keyspace::MultipartParts => MULTIPART_PARTS,
            Keyspace::AccessKeys => ACCESS_KEYS,
            Keyspace::IamUsers => IAM_USERS,
            Keyspace::IamGroups => IAM_GROUPS,
            Keyspace::IamPolicies => IAM_POLICIES,
            Keyspace::AuditTrail => AUDIT_TRAIL,
            Keyspace::ReplicationQueue => REPLICATION_QUEUE,
            Keyspace::ReplicationStatus => REPLICATION_STATUS,
            Keyspace::LifecycleRules => LIFECYCLE_RULES,
            Keyspace::WebsiteConfigs => WEBSITE_CONFIGS,
            Keyspace::CorsConfigs => CORS_CONFIGS,
            Keyspace::NotificationConfigs => NOTIFICATION_CONFIGS,
            Keyspace::LambdaTriggers => LAMBDA_TRIGGERS,
            Keyspace::EncryptionConfigs => ENCRYPTION_CONFIGS,
            Keyspace::PublicAccessBlocks => PUBLIC_ACCESS_BLOCKS,
            Keyspace::LoggingConfigs => LOGGING_CONFIGS,
            Keyspace::VersionTags => VERSION_TAGS,
            Keyspace::ChangeLog => CHANGE_LOG,
        }
    }

    /// Name as emitted in the snapshot stream
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Keyspace::Buckets => "buckets",
            Keyspace::BucketPolicies => "bucket_policies",
            Keyspace::Objects => "objects",
            Keyspace::ObjectVersions => "object_versions",
            Keyspace::MultipartUploads => "multipart_uploads",
            Keyspace::MultipartParts => "multipart_parts",
            Keyspace::AccessKeys => "access_keys",
            Keyspace::IamUsers => "iam_users",
            Keyspace::IamGroups => "iam_groups",
            Keyspace::IamPolicies => "iam_policies",
            Keyspace::AuditTrail => "audit_trail",
            Keyspace::ReplicationQueue => "replication_queue",
            Keyspace::ReplicationStatus => "replication_status",
            Keyspace::LifecycleRules => "lifecycle_rules",
            Keyspace::WebsiteConfigs => "website_configs",
            Keyspace::CorsConfigs => "cors_configs",
            Keyspace::NotificationConfigs => "notification_configs",
            Keyspace::LambdaTriggers => "lambda_triggers",
            Keyspace::EncryptionConfigs => "encryption_configs",
            Keyspace::PublicAccessBlocks => "public_access_blocks",
            Keyspace::LoggingConfigs => "logging_configs",
            Keyspace::VersionTags => "version_tags",
            Keyspace::ChangeLog => "change_log",
        }
    }

    /// Reverse lookup for snapshot restore
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|ks| ks.name() == name)
    }
}

// ── Key builders ──────────────────────────────────────────────────────────────

/// `objects` key: `<bucket>/<key>`
#[must_use]
pub fn object_key(bucket: &str, key: &str) -> Vec<u8> {
    format!("{bucket}/{key}").into_bytes()
}

/// `object_versions` key: `<bucket>\x00<key>\x00<version_id>`
#[must_use]
pub fn version_key(bucket: &str, key: &str, version_id: &str) -> Vec<u8> {
    format!("{bucket}\x00{key}\x00{version_id}").into_bytes()
}

/// Prefix selecting every version of one `(bucket, key)`
#[must_use]
pub fn version_prefix(bucket: &str, key: &str) -> Vec<u8> {
    format!("{bucket}\x00{key}\x00").into_bytes()
}

/// `multipart_parts` key: `<upload_id>/<part_number:05>`
#[must_use]
pub fn part_key(upload_id: &str, part_number: u32) -> Vec<u8> {
    format!("{upload_id}/{part_number:05}").into_bytes()
}

/// Prefix selecting every part of one upload
#[must_use]
pub fn part_prefix(upload_id: &str) -> Vec<u8> {
    format!("{upload_id}/").into_bytes()
}

/// `version_tags` key: `<bucket>\x00<key>\x00<tag>`
#[must_use]
pub fn version_tag_key(bucket: &str, key: &str, tag: &str) -> Vec<u8> {
    format!("{bucket}\x00{key}\x00{tag}").into_bytes()
}

/// Big-endian u64 key for sequenced keyspaces
#[must_use]
pub fn sequence_key(seq: u64) -> [u8; 8] {
    seq.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_names_unique() {
        let mut names: Vec<_> = Keyspace::ALL.iter().map(|ks| ks.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Keyspace::ALL.len());
    }

    #[test]
    fn test_from_name_roundtrip() {
        for ks in Keyspace::ALL {
            assert_eq!(Keyspace::from_name(ks.name()), Some(ks));
        }
        assert_eq!(Keyspace::from_name("nope"), None);
    }

    #[test]
    fn test_part_key_sorts_numerically() {
        assert!(part_key("u", 2) < part_key("u", 10));
        assert!(part_key("u", 9999) < part_key("u", 10000));
    }

    #[test]
    fn test_sequence_key_sorts() {
        assert!(sequence_key(1) < sequence_key(2));
        assert!(sequence_key(255) < sequence_key(256));
    }
}
