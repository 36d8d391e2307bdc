//! Authentication error types

use thiserror::Error;

/// Errors from request authentication and authorization
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization")]
    MissingAuth,

    #[error("invalid authorization header")]
    InvalidAuthHeader,

    #[error("unknown access key: {0}")]
    UnknownAccessKey(String),

    #[error("credentials expired")]
    CredentialsExpired,

    #[error("request time too skewed")]
    RequestTimeTooSkewed,

    #[error("presigned URL expired")]
    PresignedUrlExpired,

    #[error("invalid expires value: {0}")]
    InvalidExpires(String),

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("missing signed header: {0}")]
    MissingSignedHeader(String),

    #[error("invalid date format")]
    InvalidDateFormat,

    #[error("source address rejected")]
    IpRejected,

    #[error("access denied")]
    AccessDenied,

    #[error("credential lookup failed: {0}")]
    Lookup(String),
}

impl From<AuthError> for objvault_common::Error {
    fn from(e: AuthError) -> Self {
        use objvault_common::Error;
        match e {
            AuthError::UnknownAccessKey(_) => Error::InvalidAccessKey,
            AuthError::CredentialsExpired => Error::CredentialsExpired,
            AuthError::RequestTimeTooSkewed => Error::RequestTimeTooSkewed,
            AuthError::PresignedUrlExpired => Error::PresignedUrlExpired,
            AuthError::InvalidExpires(msg) => Error::InvalidArgument(msg),
            AuthError::SignatureMismatch => Error::SignatureDoesNotMatch,
            AuthError::Lookup(msg) => Error::ServiceUnavailable(msg),
            AuthError::MissingAuth
            | AuthError::InvalidAuthHeader
            | AuthError::MissingSignedHeader(_)
            | AuthError::InvalidDateFormat
            | AuthError::IpRejected
            | AuthError::AccessDenied => Error::AccessDenied,
        }
    }
}
