//! Database and storage target models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// MySQL server a plan backs up from or restores into.
///
/// Credentials are stored for the dump tool's use; they are skipped in
/// serialized responses and redacted from debug output.
#[derive(Clone, FromRow, Serialize, ToSchema)]
pub struct DatabaseTarget {
    pub id: Uuid,
    pub name: String,
    pub host: String,
    pub port: i32,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseTarget")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Storage backend kind enum.
///
/// Local and S3 are implemented; the cloud-blob kinds are accepted by
/// the model but constructing a backend for them fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "storage_kind", rename_all = "snake_case")]
pub enum StorageKind {
    Local,
    S3,
    AzureBlob,
    GoogleCloud,
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::Local => write!(f, "local"),
            StorageKind::S3 => write!(f, "s3"),
            StorageKind::AzureBlob => write!(f, "azure_blob"),
            StorageKind::GoogleCloud => write!(f, "google_cloud"),
        }
    }
}

/// Destination for backup artifacts.
///
/// Variant-specific settings live in nullable columns; which ones are
/// required depends on `kind` and is validated at creation time.
#[derive(Clone, FromRow, Serialize, ToSchema)]
pub struct StorageTarget {
    pub id: Uuid,
    pub name: String,
    pub kind: StorageKind,
    pub local_path: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    #[serde(skip_serializing)]
    pub s3_secret_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for StorageTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageTarget")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("local_path", &self.local_path)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_access_key", &self.s3_access_key)
            .field(
                "s3_secret_key",
                &self.s3_secret_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}
