//! Filesystem engine: buckets are directories, objects are files.
//!
//! Layout under the data dir:
//!
//! ```text
//! <data>/<bucket>/<key...>                   unversioned / latest bytes
//! <data>/<bucket>/.versions/<key...>/<vid>   per-version bytes
//! <data>/.uploads/<upload-id>/part-NNNNN     multipart staging
//! ```
//!
//! Keys may contain `/` and map to nested directories; `.` path components
//! that would escape the bucket are rejected before touching the disk.

use crate::engine::{ByteEngine, EngineObject, ObjectReader};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const VERSIONS_DIR: &str = ".versions";
const UPLOADS_DIR: &str = ".uploads";

/// Filesystem-backed byte engine
pub struct FsEngine {
    data_dir: PathBuf,
}

impl FsEngine {
    /// Open the engine rooted at `data_dir`, creating it if needed.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        std::fs::create_dir_all(data_dir.join(UPLOADS_DIR))?;
        Ok(Self { data_dir })
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.data_dir.join(bucket)
    }

    fn key_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        Ok(self.bucket_path(bucket).join(safe_key(key)?))
    }

    fn version_path(&self, bucket: &str, key: &str, version_id: &str) -> Result<PathBuf> {
        if version_id.is_empty() || version_id.contains(['/', '\\']) {
            return Err(EngineError::InvalidKey(format!(
                "invalid version id: {version_id:?}"
            )));
        }
        Ok(self
            .bucket_path(bucket)
            .join(VERSIONS_DIR)
            .join(safe_key(key)?)
            .join(version_id))
    }

    fn upload_path(&self, upload_id: &str) -> Result<PathBuf> {
        if upload_id.is_empty() || !upload_id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(EngineError::InvalidKey(format!(
                "invalid upload id: {upload_id:?}"
            )));
        }
        Ok(self.data_dir.join(UPLOADS_DIR).join(upload_id))
    }

    fn part_path(&self, upload_id: &str, part_number: u32) -> Result<PathBuf> {
        Ok(self.upload_path(upload_id)?.join(format!("part-{part_number:05}")))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn open_file(&self, path: &Path) -> Result<(Box<dyn ObjectReader>, u64)> {
        let file = tokio::fs::File::open(path).await.map_err(not_found)?;
        let size = file.metadata().await?.len();
        Ok((Box::new(file), size))
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn not_found(e: std::io::Error) -> EngineError {
    if e.kind() == ErrorKind::NotFound {
        EngineError::NotFound
    } else {
        EngineError::Io(e)
    }
}

/// Validate a key for filesystem use: no NUL, no absolute paths, no `..`
/// components, nothing that collides with the internal trees.
fn safe_key(key: &str) -> Result<&Path> {
    if key.is_empty() || key.contains('\0') {
        return Err(EngineError::InvalidKey("empty key or NUL byte".into()));
    }
    let path = Path::new(key);
    for component in path.components() {
        match component {
            Component::Normal(c) => {
                if c == VERSIONS_DIR || c == UPLOADS_DIR {
                    return Err(EngineError::InvalidKey(format!(
                        "key uses reserved component: {key}"
                    )));
                }
            }
            _ => return Err(EngineError::InvalidKey(format!("unsafe key: {key}"))),
        }
    }
    Ok(path)
}

#[async_trait]
impl ByteEngine for FsEngine {
    async fn create_bucket_dir(&self, bucket: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.bucket_path(bucket)).await?;
        Ok(())
    }

    async fn delete_bucket_dir(&self, bucket: &str) -> Result<()> {
        match tokio::fs::remove_dir_all(self.bucket_path(bucket)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let path = self.key_path(bucket, key)?;
        debug!(bucket, key, size = data.len(), "writing object bytes");
        self.write_file(&path, data).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<(Box<dyn ObjectReader>, u64)> {
        let path = self.key_path(bucket, key)?;
        self.open_file(&path).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.key_path(bucket, key)?;
        self.remove_file(&path).await
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let path = self.key_path(bucket, key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn object_size(&self, bucket: &str, key: &str) -> Result<u64> {
        let path = self.key_path(bucket, key)?;
        let meta = tokio::fs::metadata(&path).await.map_err(not_found)?;
        Ok(meta.len())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        start_after: &str,
        max: usize,
    ) -> Result<Vec<EngineObject>> {
        let root = self.bucket_path(bucket);
        if !tokio::fs::try_exists(&root).await? {
            return Err(EngineError::BucketNotFound);
        }

        let mut out = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let name = entry.file_name();
                if path.parent() == Some(root.as_path())
                    && (name == VERSIONS_DIR || name == UPLOADS_DIR)
                {
                    continue;
                }
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    let Ok(rel) = path.strip_prefix(&root) else {
                        continue;
                    };
                    let key = rel.to_string_lossy().replace('\\', "/");
                    if !key.starts_with(prefix) || key.as_str() <= start_after {
                        continue;
                    }
                    let meta = entry.metadata().await?;
                    let modified = meta
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                        .map_or(0, |d| d.as_secs() as i64);
                    out.push(EngineObject {
                        key,
                        size: meta.len(),
                        modified,
                    });
                }
            }
        }

        out.sort_by(|a, b| a.key.cmp(&b.key));
        if max > 0 {
            out.truncate(max);
        }
        Ok(out)
    }

    async fn bucket_size(&self, bucket: &str) -> Result<(u64, u64)> {
        let objects = match self.list_objects(bucket, "", "", 0).await {
            Ok(objects) => objects,
            Err(EngineError::BucketNotFound) => return Ok((0, 0)),
            Err(e) => return Err(e),
        };
        let bytes = objects.iter().map(|o| o.size).sum();
        Ok((bytes, objects.len() as u64))
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_path(bucket).join(key)
    }

    fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    async fn put_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
        data: Bytes,
    ) -> Result<()> {
        let path = self.version_path(bucket, key, version_id)?;
        self.write_file(&path, data).await
    }

    async fn get_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<(Box<dyn ObjectReader>, u64)> {
        let path = self.version_path(bucket, key, version_id)?;
        self.open_file(&path).await
    }

    async fn delete_object_version(&self, bucket: &str, key: &str, version_id: &str) -> Result<()> {
        let path = self.version_path(bucket, key, version_id)?;
        self.remove_file(&path).await
    }

    async fn promote_version(&self, bucket: &str, key: &str, version_id: &str) -> Result<()> {
        let src = self.version_path(bucket, key, version_id)?;
        let dest = self.key_path(bucket, key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, &dest).await.map_err(not_found)?;
        Ok(())
    }

    async fn create_upload_dir(&self, upload_id: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.upload_path(upload_id)?).await?;
        Ok(())
    }

    async fn put_part_file(&self, upload_id: &str, part_number: u32, data: Bytes) -> Result<()> {
        let path = self.part_path(upload_id, part_number)?;
        self.write_file(&path, data).await
    }

    async fn read_part_file(&self, upload_id: &str, part_number: u32) -> Result<Bytes> {
        let path = self.part_path(upload_id, part_number)?;
        let data = tokio::fs::read(&path).await.map_err(not_found)?;
        Ok(Bytes::from(data))
    }

    async fn compose_parts(
        &self,
        upload_id: &str,
        part_numbers: &[u32],
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<u64> {
        // Verify every staged part exists before writing anything.
        for n in part_numbers {
            let path = self.part_path(upload_id, *n)?;
            if !tokio::fs::try_exists(&path).await? {
                return Err(EngineError::NotFound);
            }
        }

        let dest = match version_id {
            Some(vid) => self.version_path(bucket, key, vid)?,
            None => self.key_path(bucket, key)?,
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut out = tokio::fs::File::create(&dest).await?;
        let mut total = 0u64;
        for n in part_numbers {
            let path = self.part_path(upload_id, *n)?;
            let mut part = tokio::fs::File::open(&path).await?;
            total += tokio::io::copy(&mut part, &mut out).await?;
        }
        out.flush().await?;
        debug!(upload_id, bucket, key, total, "composed multipart object");
        Ok(total)
    }

    async fn delete_upload_dir(&self, upload_id: &str) -> Result<()> {
        let path = self.upload_path(upload_id)?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(upload_id, error = %e, "failed to remove staging directory");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    fn temp_engine() -> (tempfile::TempDir, FsEngine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = FsEngine::open(dir.path()).unwrap();
        (dir, engine)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, engine) = temp_engine();
        engine.create_bucket_dir("b").await.unwrap();
        engine
            .put_object("b", "dir/file.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let (mut reader, size) = engine.get_object("b", "dir/file.txt").await.unwrap();
        assert_eq!(size, 5);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
    }

    #[tokio::test]
    async fn test_reader_is_seekable() {
        let (_dir, engine) = temp_engine();
        engine.create_bucket_dir("b").await.unwrap();
        engine
            .put_object("b", "k", Bytes::from_static(b"0123456789"))
            .await
            .unwrap();

        let (mut reader, _) = engine.get_object("b", "k").await.unwrap();
        reader.seek(std::io::SeekFrom::Start(2)).await.unwrap();
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"2345");
    }

    #[tokio::test]
    async fn test_missing_object_not_found() {
        let (_dir, engine) = temp_engine();
        engine.create_bucket_dir("b").await.unwrap();
        assert!(matches!(
            engine.get_object("b", "nope").await,
            Err(EngineError::NotFound)
        ));
        assert!(!engine.object_exists("b", "nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let (_dir, engine) = temp_engine();
        engine.create_bucket_dir("b").await.unwrap();
        for key in ["../escape", "a/../../b", "/absolute", "has\0nul"] {
            assert!(matches!(
                engine.put_object("b", key, Bytes::new()).await,
                Err(EngineError::InvalidKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_versioned_bytes_are_distinct() {
        let (_dir, engine) = temp_engine();
        engine.create_bucket_dir("b").await.unwrap();
        engine
            .put_object_version("b", "k", "v1", Bytes::from_static(b"one"))
            .await
            .unwrap();
        engine
            .put_object_version("b", "k", "v2", Bytes::from_static(b"two"))
            .await
            .unwrap();

        let (mut r, size) = engine.get_object_version("b", "k", "v1").await.unwrap();
        assert_eq!(size, 3);
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"one");

        engine.delete_object_version("b", "k", "v1").await.unwrap();
        assert!(engine.get_object_version("b", "k", "v1").await.is_err());
        assert!(engine.get_object_version("b", "k", "v2").await.is_ok());
    }

    #[tokio::test]
    async fn test_promote_version_updates_plain_path() {
        let (_dir, engine) = temp_engine();
        engine.create_bucket_dir("b").await.unwrap();
        engine
            .put_object_version("b", "k", "v1", Bytes::from_static(b"one"))
            .await
            .unwrap();
        engine.promote_version("b", "k", "v1").await.unwrap();

        let (mut r, size) = engine.get_object("b", "k").await.unwrap();
        assert_eq!(size, 3);
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"one");

        assert!(matches!(
            engine.promote_version("b", "k", "missing").await,
            Err(EngineError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_listing_skips_internal_trees() {
        let (_dir, engine) = temp_engine();
        engine.create_bucket_dir("b").await.unwrap();
        engine.put_object("b", "a.txt", Bytes::from_static(b"a")).await.unwrap();
        engine.put_object("b", "sub/b.txt", Bytes::from_static(b"bb")).await.unwrap();
        engine
            .put_object_version("b", "a.txt", "v1", Bytes::from_static(b"a"))
            .await
            .unwrap();

        let listed = engine.list_objects("b", "", "", 0).await.unwrap();
        let keys: Vec<&str> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "sub/b.txt"]);

        let (bytes, count) = engine.bucket_size("b").await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(bytes, 3);
    }

    #[tokio::test]
    async fn test_listing_prefix_and_pagination() {
        let (_dir, engine) = temp_engine();
        engine.create_bucket_dir("b").await.unwrap();
        for key in ["logs/1", "logs/2", "logs/3", "other"] {
            engine.put_object("b", key, Bytes::from_static(b"x")).await.unwrap();
        }

        let page = engine.list_objects("b", "logs/", "logs/1", 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].key, "logs/2");
    }

    #[tokio::test]
    async fn test_multipart_compose() {
        let (_dir, engine) = temp_engine();
        engine.create_bucket_dir("b").await.unwrap();
        engine.create_upload_dir("deadbeef").await.unwrap();
        engine
            .put_part_file("deadbeef", 1, Bytes::from_static(b"AAA"))
            .await
            .unwrap();
        engine
            .put_part_file("deadbeef", 2, Bytes::from_static(b"BBBB"))
            .await
            .unwrap();

        // A referenced part that was never staged fails before any write.
        assert!(engine
            .compose_parts("deadbeef", &[1, 3], "b", "k", None)
            .await
            .is_err());
        assert!(!engine.object_exists("b", "k").await.unwrap());

        let total = engine
            .compose_parts("deadbeef", &[1, 2], "b", "k", None)
            .await
            .unwrap();
        assert_eq!(total, 7);

        engine.delete_upload_dir("deadbeef").await.unwrap();
        assert!(engine.read_part_file("deadbeef", 1).await.is_err());

        let (mut r, _) = engine.get_object("b", "k").await.unwrap();
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"AAABBBB");
    }
}
