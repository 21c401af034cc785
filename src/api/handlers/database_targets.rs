//! Database target management handlers.

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
use crate::models::catalog::{CatalogObject, ObjectKind};
use crate::models::target::DatabaseTarget;
use crate::services::catalog_service::CatalogService;
use crate::services::target_service::TargetService;
use crate::store::NewDatabaseTarget;

#[derive(OpenApi)]
#[openapi(
    paths(
        list_targets,
        create_target,
        get_target,
        delete_target,
        scan_target,
        list_catalog,
    ),
    components(schemas(CreateDatabaseTargetPayload, DatabaseTarget, CatalogObject, ObjectKind)),
    tags((name = "database-targets", description = "MySQL servers the engine dumps from and restores into"))
)]
pub struct DatabaseTargetsApiDoc;

/// Create database target routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_targets).post(create_target))
        .route("/:id", get(get_target).delete(delete_target))
        .route("/:id/scan", post(scan_target))
        .route("/:id/catalog", get(list_catalog))
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDatabaseTargetPayload {
    pub name: String,
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: i32,
    pub username: String,
    pub password: String,
}

fn default_mysql_port() -> i32 {
    3306
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// List all database targets
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/database-targets",
    tag = "database-targets",
    responses(
        (status = 200, description = "List of database targets", body = Vec<DatabaseTarget>),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_targets(State(state): State<SharedState>) -> Result<Json<Vec<DatabaseTarget>>> {
    let service = TargetService::new(state.store.clone());
    let targets = service.list_database_targets().await?;
    Ok(Json(targets))
}

/// Register a new database target
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/database-targets",
    tag = "database-targets",
    request_body = CreateDatabaseTargetPayload,
    responses(
        (status = 200, description = "Database target created", body = DatabaseTarget),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Target name already exists"),
        (status = 500, description = "Internal server error")
    )
)]
async fn create_target(
    State(state): State<SharedState>,
    Json(payload): Json<CreateDatabaseTargetPayload>,
) -> Result<Json<DatabaseTarget>> {
    let service = TargetService::new(state.store.clone());
    let target = service
        .create_database_target(NewDatabaseTarget {
            name: payload.name,
            host: payload.host,
            port: payload.port,
            username: payload.username,
            password: payload.password,
        })
        .await?;
    Ok(Json(target))
}

/// Get a database target by ID
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/database-targets",
    tag = "database-targets",
    params(
        ("id" = Uuid, Path, description = "Database target ID")
    ),
    responses(
        (status = 200, description = "Database target details", body = DatabaseTarget),
        (status = 404, description = "Database target not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn get_target(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DatabaseTarget>> {
    let service = TargetService::new(state.store.clone());
    let target = service.get_database_target(id).await?;
    Ok(Json(target))
}

/// Delete a database target
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/v1/database-targets",
    tag = "database-targets",
    params(
        ("id" = Uuid, Path, description = "Database target ID")
    ),
    responses(
        (status = 204, description = "Database target deleted"),
        (status = 404, description = "Database target not found"),
        (status = 409, description = "Target is still referenced by a plan"),
        (status = 500, description = "Internal server error")
    )
)]
async fn delete_target(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode> {
    let service = TargetService::new(state.store.clone());
    service.delete_database_target(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Scan the target and refresh its catalog
#[utoipa::path(
    post,
    path = "/{id}/scan",
    context_path = "/api/v1/database-targets",
    tag = "database-targets",
    params(
        ("id" = Uuid, Path, description = "Database target ID")
    ),
    responses(
        (status = 200, description = "Catalog after the scan", body = Vec<CatalogObject>),
        (status = 404, description = "Database target not found"),
        (status = 502, description = "Metadata queries against the target failed"),
        (status = 500, description = "Internal server error")
    )
)]
async fn scan_target(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CatalogObject>>> {
    let service = CatalogService::new(state.store.clone());
    let objects = service.scan_database_target(id).await?;
    Ok(Json(objects))
}

/// List the catalog objects discovered on a target
#[utoipa::path(
    get,
    path = "/{id}/catalog",
    context_path = "/api/v1/database-targets",
    tag = "database-targets",
    params(
        ("id" = Uuid, Path, description = "Database target ID")
    ),
    responses(
        (status = 200, description = "Catalog objects for the target", body = Vec<CatalogObject>),
        (status = 404, description = "Database target not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_catalog(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CatalogObject>>> {
    let service = CatalogService::new(state.store.clone());
    let objects = service.list_catalog_objects(id).await?;
    Ok(Json(objects))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test payload deserialization with the port defaulted
    #[test]
    fn test_create_payload_default_port() {
        let json = r#"{
            "name": "primary",
            "host": "db.internal",
            "username": "backup",
            "password": "secret"
        }"#;

        let payload: CreateDatabaseTargetPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.name, "primary");
        assert_eq!(payload.port, 3306);
    }

    /// Test payload deserialization with an explicit port
    #[test]
    fn test_create_payload_explicit_port() {
        let json = r#"{
            "name": "replica",
            "host": "replica.internal",
            "port": 3307,
            "username": "backup",
            "password": "secret"
        }"#;

        let payload: CreateDatabaseTargetPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.port, 3307);
    }

    /// Test payload rejects missing credentials
    #[test]
    fn test_create_payload_requires_credentials() {
        let json = r#"{"name": "primary", "host": "db.internal"}"#;

        let result = serde_json::from_str::<CreateDatabaseTargetPayload>(json);
        assert!(result.is_err());
    }
}
