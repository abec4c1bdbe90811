//! Filesystem storage backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use docpress_core::{Error, Result};

use crate::{ObjectMeta, ObjectStore, PresignOptions, PutOptions};

/// Filesystem implementation of [`ObjectStore`].
///
/// Keys map directly to paths under the base directory. Writes are atomic:
/// data lands in a temp file that is renamed into place.
pub struct FilesystemStore {
    base_path: PathBuf,
}

impl FilesystemStore {
    /// Create a new filesystem store rooted at the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, key: &str) -> Result<PathBuf> {
        // Keys are relative layout paths; reject traversal outside the root.
        let path = Path::new(key);
        if path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Error::InvalidInput(format!("invalid object key: {key}")));
        }
        Ok(self.base_path.join(path))
    }

    /// Validate that the store can write, read, and delete files.
    ///
    /// Performs a full round-trip at startup to catch filesystem issues
    /// (overlayfs quirks, permission errors, missing directories) early.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join(".health-check");
        let test_file = test_dir.join("test.bin");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await; // Best-effort cleanup

        Ok(())
    }

    fn not_found(key: &str) -> Error {
        Error::NotFound(format!("object {key}"))
    }
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    async fn stat(&self, key: &str) -> Result<ObjectMeta> {
        let path = self.full_path(key)?;
        let meta = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Self::not_found(key)
            } else {
                Error::Io(e)
            }
        })?;

        let last_modified = meta
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t));

        Ok(ObjectMeta {
            size: meta.len(),
            last_modified,
            etag: None,
            content_type: None,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.full_path(key)?;
        fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Self::not_found(key)
            } else {
                Error::Io(e)
            }
        })
    }

    async fn get_to_path(&self, key: &str, dest: &Path) -> Result<()> {
        let src = self.full_path(key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&src, dest).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Self::not_found(key)
            } else {
                Error::Io(e)
            }
        })?;
        Ok(())
    }

    async fn put(&self, key: &str, data: &[u8], _options: &PutOptions) -> Result<()> {
        let full_path = self.full_path(key)?;
        debug!(
            subsystem = "storage",
            component = "filesystem",
            key,
            size = data.len(),
            "put object"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "create_dir_all failed");
                Error::Io(e)
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("partial");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "rename failed");
            Error::Io(e)
        })?;

        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let src_path = self.full_path(src)?;
        let dst_path = self.full_path(dst)?;
        if let Some(parent) = dst_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&src_path, &dst_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Self::not_found(src)
            } else {
                Error::Io(e)
            }
        })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.full_path(key)?;
        if fs::try_exists(&path).await? {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.full_path(key)?;
        Ok(fs::try_exists(path).await?)
    }

    async fn presign(&self, key: &str, options: &PresignOptions) -> Result<String> {
        // Local files have no signing authority; the URL is the path itself.
        // Only GET makes sense against a local backend.
        if options.method != "GET" {
            return Err(Error::InvalidInput(format!(
                "filesystem store cannot presign {} requests",
                options.method
            )));
        }
        let path = self.full_path(key)?;
        Ok(format!("file://{}", path.display()))
    }
}
