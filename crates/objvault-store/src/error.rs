//! Store error types

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from the metadata store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write slot could not be acquired within the bounded wait
    #[error("metadata store busy")]
    Busy,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(e: redb::TableError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(e: redb::StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(e: redb::CommitError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<StoreError> for objvault_common::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Busy => objvault_common::Error::StoreBusy,
            StoreError::Io(e) => objvault_common::Error::DiskIo(e),
            other => objvault_common::Error::Storage(other.to_string()),
        }
    }
}
