//! Restore plan management handlers.

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
use crate::models::job::RestoreJob;
use crate::models::plan::{RestorePlan, ScheduleKind};
use crate::services::job_service::JobService;
use crate::services::plan_service::{PlanEdit, PlanService};
use crate::store::{JobFilter, NewRestorePlan};

#[derive(OpenApi)]
#[openapi(
    paths(
        list_plans,
        create_plan,
        get_plan,
        update_plan,
        delete_plan,
        run_plan,
        list_jobs,
    ),
    components(schemas(
        CreateRestorePlanPayload,
        UpdateRestorePlanPayload,
        RestorePlan,
        RestoreJob,
    )),
    tags((name = "restore-plans", description = "Restore plans replaying a backup plan's artifacts"))
)]
pub struct RestorePlansApiDoc;

/// Create restore plan routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_plans).post(create_plan))
        .route(
            "/:id",
            get(get_plan).put(update_plan).delete(delete_plan),
        )
        .route("/:id/run", post(run_plan))
        .route("/:id/jobs", get(list_jobs))
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRestorePlanPayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Backup plan whose selected items this plan replays.
    pub source_backup_plan_id: Uuid,
    /// Target the artifacts are restored into.
    pub database_target_id: Uuid,
    pub schedule_kind: ScheduleKind,
    #[serde(default)]
    pub schedule_cron: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRestorePlanPayload {
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

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// List all restore plans
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/restore-plans",
    tag = "restore-plans",
    responses(
        (status = 200, description = "List of restore plans", body = Vec<RestorePlan>),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_plans(State(state): State<SharedState>) -> Result<Json<Vec<RestorePlan>>> {
    let service = PlanService::new(state.store.clone());
    let plans = service.list_restore_plans().await?;
    Ok(Json(plans))
}

/// Create a new restore plan
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/restore-plans",
    tag = "restore-plans",
    request_body = CreateRestorePlanPayload,
    responses(
        (status = 200, description = "Restore plan created", body = RestorePlan),
        (status = 400, description = "Validation or schedule parse error"),
        (status = 404, description = "Source backup plan or database target not found"),
        (status = 409, description = "Plan name already exists"),
        (status = 500, description = "Internal server error")
    )
)]
async fn create_plan(
    State(state): State<SharedState>,
    Json(payload): Json<CreateRestorePlanPayload>,
) -> Result<Json<RestorePlan>> {
    let service = PlanService::new(state.store.clone());
    let plan = service
        .create_restore_plan(NewRestorePlan {
            name: payload.name,
            description: payload.description,
            source_backup_plan_id: payload.source_backup_plan_id,
            database_target_id: payload.database_target_id,
            schedule_kind: payload.schedule_kind,
            schedule_cron: payload.schedule_cron,
            is_active: payload.is_active,
        })
        .await?;
    Ok(Json(plan))
}

/// Get a restore plan by ID
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/restore-plans",
    tag = "restore-plans",
    params(
        ("id" = Uuid, Path, description = "Restore plan ID")
    ),
    responses(
        (status = 200, description = "Restore plan details", body = RestorePlan),
        (status = 404, description = "Restore plan not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn get_plan(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RestorePlan>> {
    let service = PlanService::new(state.store.clone());
    let plan = service.get_restore_plan(id).await?;
    Ok(Json(plan))
}

/// Update a restore plan
#[utoipa::path(
    put,
    path = "/{id}",
    context_path = "/api/v1/restore-plans",
    tag = "restore-plans",
    params(
        ("id" = Uuid, Path, description = "Restore plan ID")
    ),
    request_body = UpdateRestorePlanPayload,
    responses(
        (status = 200, description = "Restore plan updated", body = RestorePlan),
        (status = 400, description = "Validation or schedule parse error"),
        (status = 404, description = "Restore plan not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn update_plan(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRestorePlanPayload>,
) -> Result<Json<RestorePlan>> {
    let service = PlanService::new(state.store.clone());
    let plan = service
        .update_restore_plan(
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

/// Delete a restore plan
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/v1/restore-plans",
    tag = "restore-plans",
    params(
        ("id" = Uuid, Path, description = "Restore plan ID")
    ),
    responses(
        (status = 204, description = "Restore plan deleted"),
        (status = 404, description = "Restore plan not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn delete_plan(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode> {
    let service = PlanService::new(state.store.clone());
    service.delete_restore_plan(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Queue a run of the plan right now
#[utoipa::path(
    post,
    path = "/{id}/run",
    context_path = "/api/v1/restore-plans",
    tag = "restore-plans",
    params(
        ("id" = Uuid, Path, description = "Restore plan ID")
    ),
    responses(
        (status = 200, description = "Restore job created", body = RestoreJob),
        (status = 400, description = "Plan is inactive or its source selection is empty"),
        (status = 404, description = "Restore plan not found"),
        (status = 409, description = "Plan already has an active job"),
        (status = 500, description = "Internal server error")
    )
)]
async fn run_plan(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RestoreJob>> {
    let service = PlanService::new(state.store.clone());
    let job = service.run_restore_plan_now(id).await?;
    Ok(Json(job))
}

/// List the plan's jobs, newest first
#[utoipa::path(
    get,
    path = "/{id}/jobs",
    context_path = "/api/v1/restore-plans",
    tag = "restore-plans",
    params(
        ("id" = Uuid, Path, description = "Restore plan ID")
    ),
    responses(
        (status = 200, description = "Jobs created from the plan", body = Vec<RestoreJob>),
        (status = 404, description = "Restore plan not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_jobs(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RestoreJob>>> {
    let plans = PlanService::new(state.store.clone());
    plans.get_restore_plan(id).await?;
    let jobs = JobService::new(state.store.clone());
    let list = jobs
        .list_restore_jobs(JobFilter {
            plan_id: Some(id),
            status: None,
        })
        .await?;
    Ok(Json(list))
}
