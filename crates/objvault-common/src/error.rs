//! Error types for ObjVault
//!
//! This module defines the common error type used throughout the system.

use thiserror::Error;

/// Common result type for ObjVault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for ObjVault
#[derive(Debug, Error)]
pub enum Error {
    // Storage errors
    #[error("disk I/O error: {0}")]
    DiskIo(#[from] std::io::Error),

    #[error("metadata store busy")]
    StoreBusy,

    #[error("storage error: {0}")]
    Storage(String),

    // Metadata errors
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("invalid bucket state: {0}")]
    InvalidBucketState(String),

    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("no such version: {version_id}")]
    NoSuchVersion { version_id: String },

    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),

    // S3 API errors
    #[error("access denied")]
    AccessDenied,

    #[error("invalid access key")]
    InvalidAccessKey,

    #[error("signature mismatch")]
    SignatureDoesNotMatch,

    #[error("credentials expired")]
    CredentialsExpired,

    #[error("request time too skewed")]
    RequestTimeTooSkewed,

    #[error("presigned URL expired")]
    PresignedUrlExpired,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("not modified")]
    NotModified,

    #[error("entity too large: max {max_size} bytes")]
    EntityTooLarge { max_size: u64 },

    #[error("quota exceeded for bucket {0}")]
    QuotaExceeded(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    BadDigest { expected: String, actual: String },

    #[error("malformed XML")]
    MalformedXml,

    #[error("range not satisfiable")]
    InvalidRange,

    // Multipart upload errors
    #[error("no such upload: {upload_id}")]
    NoSuchUpload { upload_id: String },

    #[error("invalid part: {part_number}")]
    InvalidPart { part_number: u32 },

    #[error("invalid part order")]
    InvalidPartOrder,

    // Consensus errors
    #[error("not the leader")]
    NotLeader { leader_hint: Option<String> },

    #[error("apply timed out")]
    ApplyTimeout,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BucketNotFound(_)
                | Self::ObjectNotFound { .. }
                | Self::NoSuchVersion { .. }
                | Self::NoSuchUpload { .. }
        )
    }

    /// Get HTTP status code for S3 API compatibility
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 304 Not Modified
            Self::NotModified => 304,

            // 400 Bad Request
            Self::InvalidArgument(_)
            | Self::InvalidBucketName(_)
            | Self::BadDigest { .. }
            | Self::MalformedXml
            | Self::EntityTooLarge { .. }
            | Self::InvalidPart { .. }
            | Self::InvalidPartOrder => 400,

            // 403 Forbidden
            Self::AccessDenied
            | Self::InvalidAccessKey
            | Self::SignatureDoesNotMatch
            | Self::CredentialsExpired
            | Self::RequestTimeTooSkewed
            | Self::PresignedUrlExpired
            | Self::QuotaExceeded(_) => 403,

            // 404 Not Found
            Self::BucketNotFound(_)
            | Self::ObjectNotFound { .. }
            | Self::NoSuchVersion { .. }
            | Self::NoSuchUpload { .. } => 404,

            // 405 Method Not Allowed
            Self::MethodNotAllowed(_) => 405,

            // 409 Conflict
            Self::BucketAlreadyExists(_)
            | Self::BucketNotEmpty(_)
            | Self::InvalidBucketState(_) => 409,

            // 412 Precondition Failed
            Self::PreconditionFailed(_) => 412,

            // 416 Range Not Satisfiable
            Self::InvalidRange => 416,

            // 500 Internal Server Error
            Self::Internal(_) | Self::DiskIo(_) | Self::Storage(_) | Self::Serialization(_) => 500,

            // 503 Service Unavailable
            Self::NotLeader { .. }
            | Self::ApplyTimeout
            | Self::StoreBusy
            | Self::ServiceUnavailable(_) => 503,
        }
    }

    /// Get S3 error code for API compatibility
    #[must_use]
    pub fn s3_error_code(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::InvalidAccessKey => "InvalidAccessKeyId",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            Self::CredentialsExpired => "ExpiredToken",
            Self::RequestTimeTooSkewed => "RequestTimeTooSkewed",
            Self::PresignedUrlExpired => "AccessDenied",
            Self::QuotaExceeded(_) => "QuotaExceeded",
            Self::BucketNotFound(_) => "NoSuchBucket",
            Self::BucketAlreadyExists(_) => "BucketAlreadyExists",
            Self::BucketNotEmpty(_) => "BucketNotEmpty",
            Self::InvalidBucketState(_) => "InvalidBucketState",
            Self::ObjectNotFound { .. } => "NoSuchKey",
            Self::NoSuchVersion { .. } => "NoSuchVersion",
            Self::InvalidBucketName(_) => "InvalidBucketName",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::MethodNotAllowed(_) => "MethodNotAllowed",
            Self::PreconditionFailed(_) => "PreconditionFailed",
            Self::NotModified => "NotModified",
            Self::EntityTooLarge { .. } => "EntityTooLarge",
            Self::BadDigest { .. } => "BadDigest",
            Self::MalformedXml => "MalformedXML",
            Self::InvalidRange => "InvalidRange",
            Self::NoSuchUpload { .. } => "NoSuchUpload",
            Self::InvalidPart { .. } => "InvalidPart",
            Self::InvalidPartOrder => "InvalidPartOrder",
            Self::NotLeader { .. } | Self::ApplyTimeout | Self::ServiceUnavailable(_) => {
                "ServiceUnavailable"
            }
            Self::StoreBusy => "SlowDown",
            _ => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(Error::BucketNotFound("test".into()).is_not_found());
        assert!(Error::ObjectNotFound {
            bucket: "b".into(),
            key: "k".into()
        }
        .is_not_found());
        assert!(!Error::AccessDenied.is_not_found());
    }

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::AccessDenied.http_status_code(), 403);
        assert_eq!(Error::BucketNotFound("test".into()).http_status_code(), 404);
        assert_eq!(Error::InvalidRange.http_status_code(), 416);
        assert_eq!(
            Error::NotLeader { leader_hint: None }.http_status_code(),
            503
        );
        assert_eq!(Error::Internal("test".into()).http_status_code(), 500);
    }

    #[test]
    fn test_error_s3_code() {
        assert_eq!(
            Error::BucketNotFound("b".into()).s3_error_code(),
            "NoSuchBucket"
        );
        assert_eq!(Error::MalformedXml.s3_error_code(), "MalformedXML");
        assert_eq!(
            Error::QuotaExceeded("b".into()).s3_error_code(),
            "QuotaExceeded"
        );
    }
}
