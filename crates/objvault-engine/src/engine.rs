//! The byte-engine capability contract.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncSeek};

/// A seekable, closeable object reader.
pub trait ObjectReader: AsyncRead + AsyncSeek + Send + Unpin {}
impl<T: AsyncRead + AsyncSeek + Send + Unpin> ObjectReader for T {}

/// One entry from an engine listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineObject {
    pub key: String,
    pub size: u64,
    /// Unix seconds from the filesystem, advisory only
    pub modified: i64,
}

/// Capabilities the core requires from the bytes-on-disk engine.
///
/// The engine is authoritative for bytes and transient for listings:
/// metadata records, not directory walks, decide what an object *is*.
#[async_trait]
pub trait ByteEngine: Send + Sync {
    async fn create_bucket_dir(&self, bucket: &str) -> Result<()>;
    async fn delete_bucket_dir(&self, bucket: &str) -> Result<()>;

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()>;
    /// Returns a seekable reader and the object size.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<(Box<dyn ObjectReader>, u64)>;
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool>;
    async fn object_size(&self, bucket: &str, key: &str) -> Result<u64>;

    /// List up to `max` keys after `start_after` matching `prefix`, in key
    /// order. A `max` of 0 means unlimited.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        start_after: &str,
        max: usize,
    ) -> Result<Vec<EngineObject>>;

    /// Total bytes and object count currently stored for a bucket.
    async fn bucket_size(&self, bucket: &str) -> Result<(u64, u64)>;

    /// Absolute path of an object's bytes (diagnostics, TAR extraction).
    fn object_path(&self, bucket: &str, key: &str) -> PathBuf;
    fn data_dir(&self) -> &Path;

    // Versioned variants: bytes stored per version id.
    async fn put_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
        data: Bytes,
    ) -> Result<()>;
    async fn get_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<(Box<dyn ObjectReader>, u64)>;
    async fn delete_object_version(&self, bucket: &str, key: &str, version_id: &str) -> Result<()>;

    /// Make a version's bytes the plain-path (latest) bytes, so listings and
    /// size accounting see the live object without a second upload.
    async fn promote_version(&self, bucket: &str, key: &str, version_id: &str) -> Result<()>;

    // Multipart staging: one directory per upload, destroyed on
    // Complete/Abort.
    async fn create_upload_dir(&self, upload_id: &str) -> Result<()>;
    async fn put_part_file(&self, upload_id: &str, part_number: u32, data: Bytes) -> Result<()>;
    async fn read_part_file(&self, upload_id: &str, part_number: u32) -> Result<Bytes>;
    /// Concatenate staged parts (in the given order) into the final object
    /// bytes; returns the total size. Missing parts fail before any write.
    async fn compose_parts(
        &self,
        upload_id: &str,
        part_numbers: &[u32],
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<u64>;
    async fn delete_upload_dir(&self, upload_id: &str) -> Result<()>;
}
