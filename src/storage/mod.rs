//! Artifact storage backends.
//!
//! The execution side addresses artifacts by key, the file names the
//! dump stage produces, optionally under a job-scoped folder. A backend
//! binds those keys to one storage target. Local disk and S3 are
//! implemented; the cloud-blob kinds are declared in the model but
//! constructing a backend for them fails until they land.

pub mod local;
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{AppError, Result};
use crate::models::target::{StorageKind, StorageTarget};

/// Storage backend trait.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store content under the given key.
    async fn put(&self, key: &str, content: Bytes) -> Result<()>;

    /// Retrieve content by key.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Check if the key exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete content by key.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Build the backend for one storage target row.
pub fn for_target(target: &StorageTarget) -> Result<Arc<dyn StorageBackend>> {
    match target.kind {
        StorageKind::Local => {
            let path = target.local_path.as_deref().ok_or_else(|| {
                AppError::Validation(format!(
                    "storage target '{}' has no local path configured",
                    target.name
                ))
            })?;
            Ok(Arc::new(local::LocalStorage::new(path)))
        }
        StorageKind::S3 => Ok(Arc::new(s3::S3Storage::for_target(target)?)),
        StorageKind::AzureBlob | StorageKind::GoogleCloud => Err(AppError::Validation(format!(
            "storage kind '{}' is not supported yet",
            target.kind
        ))),
    }
}
