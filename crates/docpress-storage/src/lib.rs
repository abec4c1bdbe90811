//! # docpress-storage
//!
//! Object storage seam for docpress.
//!
//! The engine consumes the narrow [`ObjectStore`] trait; remote transfer
//! mechanics (multipart thresholds, retries against the provider) are the
//! backend's concern. [`FilesystemStore`] implements the trait over a local
//! directory for embedding and tests.

mod filesystem;

pub use filesystem::FilesystemStore;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docpress_core::Result;

/// Metadata for a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time, when the backend tracks one.
    pub last_modified: Option<DateTime<Utc>>,
    /// Entity tag, when the backend provides one.
    pub etag: Option<String>,
    /// MIME type recorded at upload, when the backend tracks one.
    pub content_type: Option<String>,
}

/// Options for object uploads.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// MIME type to record with the object.
    pub content_type: Option<String>,
    /// Backend-specific access control tag.
    pub acl: Option<String>,
}

/// Options for presigned URL generation.
#[derive(Debug, Clone)]
pub struct PresignOptions {
    /// HTTP method the URL authorizes ("GET", "PUT").
    pub method: String,
    /// How long the URL stays valid.
    pub expires: Duration,
    /// MIME type constraint for uploads.
    pub content_type: Option<String>,
}

/// Storage backend trait for blob operations.
///
/// Allows abstracting over filesystem, S3, or other storage providers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Object metadata, or `Error::NotFound` when the key is absent.
    async fn stat(&self, key: &str) -> Result<ObjectMeta>;

    /// Fetch an object fully into memory.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Stream an object to a local path without buffering it in memory.
    async fn get_to_path(&self, key: &str, path: &Path) -> Result<()>;

    /// Upload an object.
    async fn put(&self, key: &str, data: &[u8], options: &PutOptions) -> Result<()>;

    /// Server-side copy of an object to a new key.
    async fn copy(&self, src: &str, dst: &str) -> Result<()>;

    /// Delete an object. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Whether an object exists at the key.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Generate a presigned URL for direct client access.
    async fn presign(&self, key: &str, options: &PresignOptions) -> Result<String>;
}

/// Archive-side key for an original blob key.
///
/// The `documents/` → `archive/` rewrite is a convention of the blob layout,
/// not a guarantee; it lives here so callers never substring-rewrite inline.
pub fn archive_key(key: &str) -> String {
    match key.strip_prefix("documents/") {
        Some(rest) => format!("archive/{rest}"),
        None => format!("archive/{key}"),
    }
}
