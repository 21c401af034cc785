//! Local filesystem storage backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::StorageBackend;
use crate::error::{AppError, Result};

/// Filesystem-based storage backend rooted at the target's path.
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Resolve a key below the base path. Keys are relative slash
    /// paths; anything that could escape the root is rejected.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || Path::new(key).is_absolute()
            || key
                .split('/')
                .any(|part| part.is_empty() || part == "." || part == "..")
        {
            return Err(AppError::Validation(format!("invalid storage key '{key}'")));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn put(&self, key: &str, content: Bytes) -> Result<()> {
        let path = self.resolve(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.resolve(key)?;
        let content = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("Storage key not found: {}", key))
            } else {
                AppError::Storage(format!("Failed to read {}: {}", key, e))
            }
        })?;
        Ok(Bytes::from(content))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        Ok(path.exists())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete {}: {}", key, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_root() -> PathBuf {
        std::env::temp_dir().join(format!("backup-store-test-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_put_get_exists_delete_roundtrip() {
        let root = scratch_root();
        let storage = LocalStorage::new(&root);

        let key = "job-1/app.users-data.sql.xz.enc";
        storage
            .put(key, Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert!(storage.exists(key).await.unwrap());
        assert_eq!(storage.get(key).await.unwrap(), Bytes::from_static(b"payload"));

        storage.delete(key).await.unwrap();
        assert!(!storage.exists(key).await.unwrap());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let root = scratch_root();
        let storage = LocalStorage::new(&root);

        let err = storage.get("absent.sql.xz.enc").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let storage = LocalStorage::new("/var/backups");

        for key in ["../etc/passwd", "/abs/path", "a//b", "", "a/./b"] {
            let err = storage.get(key).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "key: {key}");
        }
    }
}
