//! Target management rules.
//!
//! Database and storage targets are immutable once created, so the
//! service only guards creation and deletion. Storage targets get a
//! verification probe that exercises the configured backend end to end.

use bytes::Bytes;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::target::{DatabaseTarget, StorageKind, StorageTarget};
use crate::storage;
use crate::store::{EngineStore, NewDatabaseTarget, NewStorageTarget};

pub struct TargetService {
    store: Arc<dyn EngineStore>,
}

impl TargetService {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    pub async fn create_database_target(&self, new: NewDatabaseTarget) -> Result<DatabaseTarget> {
        if new.name.trim().is_empty() {
            return Err(AppError::Validation(
                "database target name must not be empty".to_string(),
            ));
        }
        if new.host.trim().is_empty() {
            return Err(AppError::Validation(
                "database target host must not be empty".to_string(),
            ));
        }
        if !(1..=65535).contains(&new.port) {
            return Err(AppError::Validation(format!(
                "invalid port {} for database target '{}'",
                new.port, new.name
            )));
        }
        self.store.create_database_target(new).await
    }

    pub async fn get_database_target(&self, id: Uuid) -> Result<DatabaseTarget> {
        self.store.get_database_target(id).await
    }

    pub async fn list_database_targets(&self) -> Result<Vec<DatabaseTarget>> {
        self.store.list_database_targets().await
    }

    pub async fn delete_database_target(&self, id: Uuid) -> Result<()> {
        self.store.delete_database_target(id).await
    }

    pub async fn create_storage_target(&self, new: NewStorageTarget) -> Result<StorageTarget> {
        if new.name.trim().is_empty() {
            return Err(AppError::Validation(
                "storage target name must not be empty".to_string(),
            ));
        }
        match new.kind {
            StorageKind::Local => {
                if new.local_path.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(AppError::Validation(format!(
                        "local storage target '{}' requires a local path",
                        new.name
                    )));
                }
            }
            StorageKind::S3 => {
                if new.s3_bucket.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(AppError::Validation(format!(
                        "s3 storage target '{}' requires a bucket",
                        new.name
                    )));
                }
            }
            // Declared kinds without a backend; creation is allowed,
            // verification and job execution reject them.
            StorageKind::AzureBlob | StorageKind::GoogleCloud => {}
        }
        self.store.create_storage_target(new).await
    }

    pub async fn get_storage_target(&self, id: Uuid) -> Result<StorageTarget> {
        self.store.get_storage_target(id).await
    }

    pub async fn list_storage_targets(&self) -> Result<Vec<StorageTarget>> {
        self.store.list_storage_targets().await
    }

    pub async fn delete_storage_target(&self, id: Uuid) -> Result<()> {
        self.store.delete_storage_target(id).await
    }

    /// Write, read back, and delete a probe object on the target's
    /// backend. Any failure surfaces as the backend's own error.
    pub async fn verify_storage_target(&self, id: Uuid) -> Result<StorageTarget> {
        let target = self.store.get_storage_target(id).await?;
        let backend = storage::for_target(&target)?;

        let key = format!(".verify-{}", Uuid::new_v4());
        let probe = Bytes::from_static(b"dumpkeeper storage verification probe");

        backend.put(&key, probe.clone()).await?;
        let read_back = backend.get(&key).await?;
        // Delete before comparing so a mismatch does not strand the probe.
        backend.delete(&key).await?;

        if read_back != probe {
            return Err(AppError::Storage(format!(
                "storage target '{}' returned corrupted probe data",
                target.name
            )));
        }

        tracing::info!(target = %target.name, kind = %target.kind, "Storage target verified");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn service() -> TargetService {
        TargetService::new(Arc::new(MemoryStore::new()))
    }

    fn db_target(name: &str, port: i32) -> NewDatabaseTarget {
        NewDatabaseTarget {
            name: name.to_string(),
            host: "db.internal".to_string(),
            port,
            username: "backup".to_string(),
            password: "secret".to_string(),
        }
    }

    fn storage_target(name: &str, kind: StorageKind) -> NewStorageTarget {
        NewStorageTarget {
            name: name.to_string(),
            kind,
            local_path: None,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            s3_access_key: None,
            s3_secret_key: None,
        }
    }

    #[tokio::test]
    async fn test_create_database_target_rejects_bad_port() {
        let service = service();

        let err = service
            .create_database_target(db_target("primary", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service
            .create_database_target(db_target("primary", 70000))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let created = service
            .create_database_target(db_target("primary", 3306))
            .await
            .unwrap();
        assert_eq!(created.port, 3306);
    }

    #[tokio::test]
    async fn test_local_storage_target_requires_path() {
        let service = service();

        let err = service
            .create_storage_target(storage_target("vault", StorageKind::Local))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut new = storage_target("vault", StorageKind::Local);
        new.local_path = Some("/var/backups".to_string());
        let created = service.create_storage_target(new).await.unwrap();
        assert_eq!(created.kind, StorageKind::Local);
    }

    #[tokio::test]
    async fn test_s3_storage_target_requires_bucket() {
        let service = service();

        let err = service
            .create_storage_target(storage_target("offsite", StorageKind::S3))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut new = storage_target("offsite", StorageKind::S3);
        new.s3_bucket = Some("backups".to_string());
        let created = service.create_storage_target(new).await.unwrap();
        assert_eq!(created.s3_bucket.as_deref(), Some("backups"));
    }

    #[tokio::test]
    async fn test_verify_round_trips_local_backend() {
        let service = service();

        let scratch = std::env::temp_dir().join(format!("dumpkeeper-verify-{}", Uuid::new_v4()));
        let mut new = storage_target("vault", StorageKind::Local);
        new.local_path = Some(scratch.to_string_lossy().into_owned());
        let created = service.create_storage_target(new).await.unwrap();

        let verified = service.verify_storage_target(created.id).await.unwrap();
        assert_eq!(verified.id, created.id);

        std::fs::remove_dir_all(&scratch).ok();
    }

    #[tokio::test]
    async fn test_verify_rejects_unimplemented_kind() {
        let service = service();

        let created = service
            .create_storage_target(storage_target("cold", StorageKind::AzureBlob))
            .await
            .unwrap();

        let err = service.verify_storage_target(created.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
