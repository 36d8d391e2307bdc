//! Common types and utilities for ObjVault
//!
//! This crate defines the record types stored in the metadata plane, the
//! shared error type with S3 code/status mappings, server configuration,
//! and checksum helpers used by the write and read paths.

pub mod checksum;
pub mod config;
pub mod error;
pub mod types;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use types::{
    AccessKey, AuditEntry, BucketInfo, ChecksumSet, DefaultRetention, HttpMetadata, IamGroup,
    IamPolicyRecord, IamUser, MultipartUpload, ObjectMeta, PartInfo, ReplicationEvent,
    ReplicationStatus, RetentionMode, StorageTier, VersionTag, VersioningStatus,
};
