//! S3 storage backend using the rust-s3 crate.
//!
//! Works against AWS S3 and S3-compatible services (MinIO and friends).
//! A custom endpoint on the target switches the client to path-style
//! addressing. Credentials come from the target row when present and
//! fall back to the ambient chain (env vars, profiles, instance roles).

use async_trait::async_trait;
use bytes::Bytes;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;

use super::StorageBackend;
use crate::error::{AppError, Result};
use crate::models::target::StorageTarget;

/// S3-compatible storage backend bound to one bucket.
pub struct S3Storage {
    bucket: Box<Bucket>,
}

impl S3Storage {
    /// Build a client for one storage target row.
    pub fn for_target(target: &StorageTarget) -> Result<Self> {
        let bucket_name = target.s3_bucket.as_deref().ok_or_else(|| {
            AppError::Validation(format!(
                "storage target '{}' has no S3 bucket configured",
                target.name
            ))
        })?;

        let region_name = target
            .s3_region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());
        let region = match &target.s3_endpoint {
            Some(endpoint) => Region::Custom {
                region: region_name,
                endpoint: endpoint.clone(),
            },
            None => region_name
                .parse()
                .map_err(|_| AppError::Config(format!("Invalid S3 region: {}", region_name)))?,
        };

        let credentials = match (&target.s3_access_key, &target.s3_secret_key) {
            (Some(ak), Some(sk)) => Credentials::new(Some(ak), Some(sk), None, None, None)
                .map_err(|e| AppError::Config(format!("Invalid S3 credentials: {}", e)))?,
            _ => Credentials::default()
                .map_err(|e| AppError::Config(format!("Failed to load AWS credentials: {}", e)))?,
        };

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| AppError::Config(format!("Failed to create S3 bucket handle: {}", e)))?;

        // Path-style access for MinIO compatibility.
        let bucket = if target.s3_endpoint.is_some() {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self { bucket })
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    async fn put(&self, key: &str, content: Bytes) -> Result<()> {
        self.bucket
            .put_object(key, &content)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to put object '{}': {}", key, e)))?;

        tracing::debug!(key = %key, "S3 put object successful");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let response = match self.bucket.get_object(key).await {
            Ok(resp) => resp,
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("404") || err_str.contains("NoSuchKey") {
                    return Err(AppError::NotFound(format!("Storage key not found: {}", key)));
                }
                return Err(AppError::Storage(format!(
                    "Failed to get object '{}': {}",
                    key, e
                )));
            }
        };

        tracing::debug!(key = %key, size = response.bytes().len(), "S3 get object successful");
        Ok(Bytes::from(response.to_vec()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.bucket.head_object(key).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("404")
                    || err_str.contains("NoSuchKey")
                    || err_str.contains("Not Found")
                {
                    Ok(false)
                } else {
                    Err(AppError::Storage(format!(
                        "Failed to check existence of '{}': {}",
                        key, e
                    )))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.bucket
            .delete_object(key)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete object '{}': {}", key, e)))?;

        tracing::debug!(key = %key, "S3 delete object successful");
        Ok(())
    }
}
