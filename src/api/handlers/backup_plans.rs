//! Backup plan management handlers.

use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::Result;
use crate::models::job::{BackupJob, JobStatus};
use crate::models::plan::{BackupItem, BackupPlan, ScheduleKind};
use crate::services::job_service::JobService;
use crate::services::plan_service::{PlanEdit, PlanService};
use crate::store::{JobFilter, NewBackupPlan};

#[derive(OpenApi)]
#[openapi(
    paths(
        list_plans,
        create_plan,
        get_plan,
        update_plan,
        delete_plan,
        list_items,
        set_item_selected,
        run_plan,
        list_jobs,
    ),
    components(schemas(
        CreateBackupPlanPayload,
        UpdateBackupPlanPayload,
        SelectItemPayload,
        BackupPlan,
        BackupItem,
        BackupJob,
        ScheduleKind,
        JobStatus,
    )),
    tags((name = "backup-plans", description = "Backup plans and their item selection"))
)]
pub struct BackupPlansApiDoc;

/// Create backup plan routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_plans).post(create_plan))
        .route(
            "/:id",
            get(get_plan).put(update_plan).delete(delete_plan),
        )
        .route("/:id/items", get(list_items))
        .route("/:id/items/:item_id", patch(set_item_selected))
        .route("/:id/run", post(run_plan))
        .route("/:id/jobs", get(list_jobs))
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBackupPlanPayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub database_target_id: Uuid,
    pub storage_target_id: Uuid,
    pub schedule_kind: ScheduleKind,
    #[serde(default)]
    pub schedule_cron: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Catalog objects to include as selected items, in order.
    #[serde(default)]
    pub catalog_object_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBackupPlanPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schedule_kind: Option<ScheduleKind>,
    #[serde(default)]
    pub schedule_cron: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectItemPayload {
    pub is_selected: bool,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// List all backup plans
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/backup-plans",
    tag = "backup-plans",
    responses(
        (status = 200, description = "List of backup plans", body = Vec<BackupPlan>),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_plans(State(state): State<SharedState>) -> Result<Json<Vec<BackupPlan>>> {
    let service = PlanService::new(state.store.clone());
    let plans = service.list_backup_plans().await?;
    Ok(Json(plans))
}

/// Create a new backup plan
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/backup-plans",
    tag = "backup-plans",
    request_body = CreateBackupPlanPayload,
    responses(
        (status = 200, description = "Backup plan created", body = BackupPlan),
        (status = 400, description = "Validation or schedule parse error"),
        (status = 404, description = "Referenced target or catalog object not found"),
        (status = 409, description = "Plan name already exists"),
        (status = 500, description = "Internal server error")
    )
)]
async fn create_plan(
    State(state): State<SharedState>,
    Json(payload): Json<CreateBackupPlanPayload>,
) -> Result<Json<BackupPlan>> {
    let service = PlanService::new(state.store.clone());
    let plan = service
        .create_backup_plan(NewBackupPlan {
            name: payload.name,
            description: payload.description,
            database_target_id: payload.database_target_id,
            storage_target_id: payload.storage_target_id,
            schedule_kind: payload.schedule_kind,
            schedule_cron: payload.schedule_cron,
            is_active: payload.is_active,
            catalog_object_ids: payload.catalog_object_ids,
        })
        .await?;
    Ok(Json(plan))
}

/// Get a backup plan by ID
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/backup-plans",
    tag = "backup-plans",
    params(
        ("id" = Uuid, Path, description = "Backup plan ID")
    ),
    responses(
        (status = 200, description = "Backup plan details", body = BackupPlan),
        (status = 404, description = "Backup plan not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn get_plan(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BackupPlan>> {
    let service = PlanService::new(state.store.clone());
    let plan = service.get_backup_plan(id).await?;
    Ok(Json(plan))
}

/// Update a backup plan
#[utoipa::path(
    put,
    path = "/{id}",
    context_path = "/api/v1/backup-plans",
    tag = "backup-plans",
    params(
        ("id" = Uuid, Path, description = "Backup plan ID")
    ),
    request_body = UpdateBackupPlanPayload,
    responses(
        (status = 200, description = "Backup plan updated", body = BackupPlan),
        (status = 400, description = "Validation or schedule parse error"),
        (status = 404, description = "Backup plan not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn update_plan(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBackupPlanPayload>,
) -> Result<Json<BackupPlan>> {
    let service = PlanService::new(state.store.clone());
    let plan = service
        .update_backup_plan(
            id,
            PlanEdit {
                name: payload.name,
                description: payload.description,
                schedule_kind: payload.schedule_kind,
                schedule_cron: payload.schedule_cron,
                is_active: payload.is_active,
            },
        )
        .await?;
    Ok(Json(plan))
}

/// Delete a backup plan and its items
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/v1/backup-plans",
    tag = "backup-plans",
    params(
        ("id" = Uuid, Path, description = "Backup plan ID")
    ),
    responses(
        (status = 204, description = "Backup plan deleted"),
        (status = 404, description = "Backup plan not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn delete_plan(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode> {
    let service = PlanService::new(state.store.clone());
    service.delete_backup_plan(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// List the plan's backup items in position order
#[utoipa::path(
    get,
    path = "/{id}/items",
    context_path = "/api/v1/backup-plans",
    tag = "backup-plans",
    params(
        ("id" = Uuid, Path, description = "Backup plan ID")
    ),
    responses(
        (status = 200, description = "Backup items of the plan", body = Vec<BackupItem>),
        (status = 404, description = "Backup plan not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_items(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<BackupItem>>> {
    let service = PlanService::new(state.store.clone());
    let items = service.list_backup_items(id).await?;
    Ok(Json(items))
}

/// Select or deselect one backup item
#[utoipa::path(
    patch,
    path = "/{id}/items/{item_id}",
    context_path = "/api/v1/backup-plans",
    tag = "backup-plans",
    params(
        ("id" = Uuid, Path, description = "Backup plan ID"),
        ("item_id" = Uuid, Path, description = "Backup item ID")
    ),
    request_body = SelectItemPayload,
    responses(
        (status = 200, description = "Backup item updated", body = BackupItem),
        (status = 404, description = "Plan or item not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn set_item_selected(
    State(state): State<SharedState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SelectItemPayload>,
) -> Result<Json<BackupItem>> {
    let service = PlanService::new(state.store.clone());
    let item = service
        .set_backup_item_selected(id, item_id, payload.is_selected)
        .await?;
    Ok(Json(item))
}

/// Queue a run of the plan right now
#[utoipa::path(
    post,
    path = "/{id}/run",
    context_path = "/api/v1/backup-plans",
    tag = "backup-plans",
    params(
        ("id" = Uuid, Path, description = "Backup plan ID")
    ),
    responses(
        (status = 200, description = "Backup job created", body = BackupJob),
        (status = 400, description = "Plan is inactive or has no selected items"),
        (status = 404, description = "Backup plan not found"),
        (status = 409, description = "Plan already has an active job"),
        (status = 500, description = "Internal server error")
    )
)]
async fn run_plan(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BackupJob>> {
    let service = PlanService::new(state.store.clone());
    let job = service.run_backup_plan_now(id).await?;
    Ok(Json(job))
}

/// List the plan's jobs, newest first
#[utoipa::path(
    get,
    path = "/{id}/jobs",
    context_path = "/api/v1/backup-plans",
    tag = "backup-plans",
    params(
        ("id" = Uuid, Path, description = "Backup plan ID")
    ),
    responses(
        (status = 200, description = "Jobs created from the plan", body = Vec<BackupJob>),
        (status = 404, description = "Backup plan not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_jobs(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<BackupJob>>> {
    let plans = PlanService::new(state.store.clone());
    plans.get_backup_plan(id).await?;
    let jobs = JobService::new(state.store.clone());
    let list = jobs
        .list_backup_jobs(JobFilter {
            plan_id: Some(id),
            status: None,
        })
        .await?;
    Ok(Json(list))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test minimal create payload applies defaults
    #[test]
    fn test_create_payload_minimal() {
        let target = Uuid::new_v4();
        let storage = Uuid::new_v4();
        let json = format!(
            r#"{{
                "name": "nightly",
                "database_target_id": "{target}",
                "storage_target_id": "{storage}",
                "schedule_kind": "Repeating",
                "schedule_cron": "0 3 * * *"
            }}"#
        );

        let payload: CreateBackupPlanPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload.name, "nightly");
        assert!(payload.is_active);
        assert!(payload.description.is_none());
        assert!(payload.catalog_object_ids.is_empty());
    }

    /// Test create payload with items and explicit flags
    #[test]
    fn test_create_payload_full() {
        let target = Uuid::new_v4();
        let storage = Uuid::new_v4();
        let object = Uuid::new_v4();
        let json = format!(
            r#"{{
                "name": "one-off",
                "description": "pre-migration snapshot",
                "database_target_id": "{target}",
                "storage_target_id": "{storage}",
                "schedule_kind": "OneTime",
                "is_active": false,
                "catalog_object_ids": ["{object}"]
            }}"#
        );

        let payload: CreateBackupPlanPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload.schedule_kind, ScheduleKind::OneTime);
        assert!(!payload.is_active);
        assert_eq!(payload.catalog_object_ids, vec![object]);
    }

    /// Test update payload with only some fields set
    #[test]
    fn test_update_payload_partial() {
        let json = r#"{"schedule_cron": "30 4 * * *"}"#;

        let payload: UpdateBackupPlanPayload = serde_json::from_str(json).unwrap();
        assert!(payload.name.is_none());
        assert!(payload.schedule_kind.is_none());
        assert_eq!(payload.schedule_cron.as_deref(), Some("30 4 * * *"));
    }

    /// Test empty update payload deserializes
    #[test]
    fn test_update_payload_empty() {
        let payload: UpdateBackupPlanPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.name.is_none());
        assert!(payload.is_active.is_none());
    }

    /// Test item selection payload
    #[test]
    fn test_select_item_payload() {
        let payload: SelectItemPayload = serde_json::from_str(r#"{"is_selected": false}"#).unwrap();
        assert!(!payload.is_selected);
    }
}
