//! Storage target management handlers.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::Result;
use crate::models::target::{StorageKind, StorageTarget};
use crate::services::target_service::TargetService;
use crate::store::NewStorageTarget;

#[derive(OpenApi)]
#[openapi(
    paths(
        list_targets,
        create_target,
        get_target,
        delete_target,
        verify_target,
    ),
    components(schemas(CreateStorageTargetPayload, StorageTarget, StorageKind)),
    tags((name = "storage-targets", description = "Destinations for backup artifacts"))
)]
pub struct StorageTargetsApiDoc;

/// Create storage target routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_targets).post(create_target))
        .route("/:id", get(get_target).delete(delete_target))
        .route("/:id/verify", post(verify_target))
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateStorageTargetPayload {
    pub name: String,
    pub kind: StorageKind,
    #[serde(default)]
    pub local_path: Option<String>,
    #[serde(default)]
    pub s3_bucket: Option<String>,
    #[serde(default)]
    pub s3_region: Option<String>,
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    #[serde(default)]
    pub s3_access_key: Option<String>,
    #[serde(default)]
    pub s3_secret_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// List all storage targets
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/storage-targets",
    tag = "storage-targets",
    responses(
        (status = 200, description = "List of storage targets", body = Vec<StorageTarget>),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_targets(State(state): State<SharedState>) -> Result<Json<Vec<StorageTarget>>> {
    let service = TargetService::new(state.store.clone());
    let targets = service.list_storage_targets().await?;
    Ok(Json(targets))
}

/// Register a new storage target
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/storage-targets",
    tag = "storage-targets",
    request_body = CreateStorageTargetPayload,
    responses(
        (status = 200, description = "Storage target created", body = StorageTarget),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Target name already exists"),
        (status = 500, description = "Internal server error")
    )
)]
async fn create_target(
    State(state): State<SharedState>,
    Json(payload): Json<CreateStorageTargetPayload>,
) -> Result<Json<StorageTarget>> {
    let service = TargetService::new(state.store.clone());
    let target = service
        .create_storage_target(NewStorageTarget {
            name: payload.name,
            kind: payload.kind,
            local_path: payload.local_path,
            s3_bucket: payload.s3_bucket,
            s3_region: payload.s3_region,
            s3_endpoint: payload.s3_endpoint,
            s3_access_key: payload.s3_access_key,
            s3_secret_key: payload.s3_secret_key,
        })
        .await?;
    Ok(Json(target))
}

/// Get a storage target by ID
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/storage-targets",
    tag = "storage-targets",
    params(
        ("id" = Uuid, Path, description = "Storage target ID")
    ),
    responses(
        (status = 200, description = "Storage target details", body = StorageTarget),
        (status = 404, description = "Storage target not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn get_target(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StorageTarget>> {
    let service = TargetService::new(state.store.clone());
    let target = service.get_storage_target(id).await?;
    Ok(Json(target))
}

/// Delete a storage target
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/v1/storage-targets",
    tag = "storage-targets",
    params(
        ("id" = Uuid, Path, description = "Storage target ID")
    ),
    responses(
        (status = 204, description = "Storage target deleted"),
        (status = 404, description = "Storage target not found"),
        (status = 409, description = "Target is still referenced by a backup plan"),
        (status = 500, description = "Internal server error")
    )
)]
async fn delete_target(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode> {
    let service = TargetService::new(state.store.clone());
    service.delete_storage_target(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Verify the target with a write/read/delete probe
#[utoipa::path(
    post,
    path = "/{id}/verify",
    context_path = "/api/v1/storage-targets",
    tag = "storage-targets",
    params(
        ("id" = Uuid, Path, description = "Storage target ID")
    ),
    responses(
        (status = 200, description = "Storage target verified", body = StorageTarget),
        (status = 400, description = "Backend is not configured or not supported"),
        (status = 404, description = "Storage target not found"),
        (status = 500, description = "Probe against the backend failed")
    )
)]
async fn verify_target(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StorageTarget>> {
    let service = TargetService::new(state.store.clone());
    let target = service.verify_storage_target(id).await?;
    Ok(Json(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test local payload deserialization
    #[test]
    fn test_create_payload_local() {
        let json = r#"{
            "name": "vault",
            "kind": "Local",
            "local_path": "/var/backups"
        }"#;

        let payload: CreateStorageTargetPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.kind, StorageKind::Local);
        assert_eq!(payload.local_path.as_deref(), Some("/var/backups"));
        assert!(payload.s3_bucket.is_none());
    }

    /// Test s3 payload deserialization with endpoint override
    #[test]
    fn test_create_payload_s3() {
        let json = r#"{
            "name": "offsite",
            "kind": "S3",
            "s3_bucket": "backups",
            "s3_region": "eu-central-1",
            "s3_endpoint": "http://minio.internal:9000",
            "s3_access_key": "AKIA",
            "s3_secret_key": "secret"
        }"#;

        let payload: CreateStorageTargetPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.kind, StorageKind::S3);
        assert_eq!(payload.s3_bucket.as_deref(), Some("backups"));
        assert_eq!(
            payload.s3_endpoint.as_deref(),
            Some("http://minio.internal:9000")
        );
    }

    /// Test payload rejects an unknown kind
    #[test]
    fn test_create_payload_unknown_kind() {
        let json = r#"{"name": "x", "kind": "Tape"}"#;

        let result = serde_json::from_str::<CreateStorageTargetPayload>(json);
        assert!(result.is_err());
    }

    /// Test the secret key never serializes in responses
    #[test]
    fn test_storage_target_response_hides_secret() {
        let target = StorageTarget {
            id: Uuid::new_v4(),
            name: "offsite".to_string(),
            kind: StorageKind::S3,
            local_path: None,
            s3_bucket: Some("backups".to_string()),
            s3_region: Some("us-east-1".to_string()),
            s3_endpoint: None,
            s3_access_key: Some("AKIA".to_string()),
            s3_secret_key: Some("super-secret".to_string()),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&target).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("s3_secret_key"));
        assert!(json.contains("\"s3_bucket\":\"backups\""));
    }
}
