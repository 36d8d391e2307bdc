//! Engine error types

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors from the byte engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("object not found")]
    NotFound,

    #[error("bucket directory not found")]
    BucketNotFound,

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for objvault_common::Error {
    fn from(e: EngineError) -> Self {
        use objvault_common::Error;
        match e {
            EngineError::NotFound | EngineError::BucketNotFound => {
                // Callers with bucket/key context map this more precisely;
                // this conversion is the coarse fallback.
                Error::Internal("object bytes missing".to_string())
            }
            EngineError::InvalidKey(msg) => Error::InvalidArgument(msg),
            EngineError::Io(e) => Error::DiskIo(e),
        }
    }
}
