//! Restore job handlers.
//!
//! Mirrors the backup job surface; commands resolve through the backup
//! item the restore replays and the restore plan's destination target.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};
use uuid::Uuid;

use crate::api::handlers::backup_jobs::{AppendLogPayload, ItemCommandResponse, ReportStatusPayload};
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::job::{JobKind, JobStatus, RestoreItem, RestoreJob};
use crate::models::job_log::JobLog;
use crate::services::job_service::JobService;
use crate::store::JobFilter;

#[derive(OpenApi)]
#[openapi(
    paths(
        list_jobs,
        list_runnable,
        get_job,
        report_status,
        retry_job,
        list_items,
        list_logs,
        get_item_command,
        report_item_status,
        retry_item,
        append_item_log,
    ),
    components(schemas(RestoreJob, RestoreItem)),
    tags((name = "restore-jobs", description = "Restore job runs, items, and logs"))
)]
pub struct RestoreJobsApiDoc;

/// Create restore job routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/runnable", get(list_runnable))
        .route("/:id", get(get_job))
        .route("/:id/status", post(report_status))
        .route("/:id/retry", post(retry_job))
        .route("/:id/items", get(list_items))
        .route("/:id/logs", get(list_logs))
        .route("/:id/items/:item_id/command", get(get_item_command))
        .route("/:id/items/:item_id/status", post(report_item_status))
        .route("/:id/items/:item_id/retry", post(retry_item))
        .route("/:id/items/:item_id/logs", post(append_item_log))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RestoreJobListQuery {
    /// Only jobs created from this plan.
    pub plan_id: Option<Uuid>,
    /// Only jobs currently in this status.
    pub status: Option<JobStatus>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// List restore jobs, newest first
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/restore-jobs",
    tag = "restore-jobs",
    params(RestoreJobListQuery),
    responses(
        (status = 200, description = "List of restore jobs", body = Vec<RestoreJob>),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_jobs(
    State(state): State<SharedState>,
    Query(query): Query<RestoreJobListQuery>,
) -> Result<Json<Vec<RestoreJob>>> {
    let service = JobService::new(state.store.clone());
    let jobs = service
        .list_restore_jobs(JobFilter {
            plan_id: query.plan_id,
            status: query.status,
        })
        .await?;
    Ok(Json(jobs))
}

/// List queued jobs whose plan is due, for the executor to claim
#[utoipa::path(
    get,
    path = "/runnable",
    context_path = "/api/v1/restore-jobs",
    tag = "restore-jobs",
    responses(
        (status = 200, description = "Claimable restore jobs", body = Vec<RestoreJob>),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_runnable(State(state): State<SharedState>) -> Result<Json<Vec<RestoreJob>>> {
    let service = JobService::new(state.store.clone());
    let jobs = service.list_runnable_restore_jobs(Utc::now()).await?;
    Ok(Json(jobs))
}

/// Get a restore job by ID
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/restore-jobs",
    tag = "restore-jobs",
    params(
        ("id" = Uuid, Path, description = "Restore job ID")
    ),
    responses(
        (status = 200, description = "Restore job details", body = RestoreJob),
        (status = 404, description = "Restore job not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn get_job(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RestoreJob>> {
    let service = JobService::new(state.store.clone());
    let job = service.get_restore_job(id).await?;
    Ok(Json(job))
}

/// Report the job's run status from the executor
#[utoipa::path(
    post,
    path = "/{id}/status",
    context_path = "/api/v1/restore-jobs",
    tag = "restore-jobs",
    params(
        ("id" = Uuid, Path, description = "Restore job ID")
    ),
    request_body = ReportStatusPayload,
    responses(
        (status = 200, description = "Restore job after the report", body = RestoreJob),
        (status = 404, description = "Restore job not found"),
        (status = 409, description = "Job already finished; retry it instead"),
        (status = 500, description = "Internal server error")
    )
)]
async fn report_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportStatusPayload>,
) -> Result<Json<RestoreJob>> {
    let service = JobService::new(state.store.clone());
    let job = service
        .report_restore_job_status(id, payload.status, payload.error_message)
        .await?;
    Ok(Json(job))
}

/// Queue a faulted or canceled job to run again
#[utoipa::path(
    post,
    path = "/{id}/retry",
    context_path = "/api/v1/restore-jobs",
    tag = "restore-jobs",
    params(
        ("id" = Uuid, Path, description = "Restore job ID")
    ),
    responses(
        (status = 200, description = "Restore job queued again", body = RestoreJob),
        (status = 404, description = "Restore job not found"),
        (status = 409, description = "Job is not in a retryable state"),
        (status = 500, description = "Internal server error")
    )
)]
async fn retry_job(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RestoreJob>> {
    let service = JobService::new(state.store.clone());
    let job = service.retry_restore_job(id).await?;
    Ok(Json(job))
}

/// List the job's items in position order
#[utoipa::path(
    get,
    path = "/{id}/items",
    context_path = "/api/v1/restore-jobs",
    tag = "restore-jobs",
    params(
        ("id" = Uuid, Path, description = "Restore job ID")
    ),
    responses(
        (status = 200, description = "Items of the job", body = Vec<RestoreItem>),
        (status = 404, description = "Restore job not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_items(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RestoreItem>>> {
    let service = JobService::new(state.store.clone());
    let items = service.list_restore_job_items(id).await?;
    Ok(Json(items))
}

/// List the job's log entries, newest first
#[utoipa::path(
    get,
    path = "/{id}/logs",
    context_path = "/api/v1/restore-jobs",
    tag = "restore-jobs",
    params(
        ("id" = Uuid, Path, description = "Restore job ID")
    ),
    responses(
        (status = 200, description = "Log entries for the job", body = Vec<JobLog>),
        (status = 404, description = "Restore job not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_logs(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<JobLog>>> {
    let service = JobService::new(state.store.clone());
    let logs = service.list_job_logs(JobKind::Restore, id).await?;
    Ok(Json(logs))
}

/// Resolve the restore command for one item
#[utoipa::path(
    get,
    path = "/{id}/items/{item_id}/command",
    context_path = "/api/v1/restore-jobs",
    tag = "restore-jobs",
    params(
        ("id" = Uuid, Path, description = "Restore job ID"),
        ("item_id" = Uuid, Path, description = "Restore item ID")
    ),
    responses(
        (status = 200, description = "Resolved restore invocation", body = ItemCommandResponse),
        (status = 400, description = "Target connection settings are invalid"),
        (status = 404, description = "Job or item not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn get_item_command(
    State(state): State<SharedState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ItemCommandResponse>> {
    let service = JobService::new(state.store.clone());
    let command = service
        .restore_item_command(id, item_id, state.config.dump_max_allowed_packet)
        .await?;
    Ok(Json(ItemCommandResponse {
        args: command.args,
        artifact_filename: command.artifact_filename,
    }))
}

/// Report one item's run status from the executor
#[utoipa::path(
    post,
    path = "/{id}/items/{item_id}/status",
    context_path = "/api/v1/restore-jobs",
    tag = "restore-jobs",
    params(
        ("id" = Uuid, Path, description = "Restore job ID"),
        ("item_id" = Uuid, Path, description = "Restore item ID")
    ),
    request_body = ReportStatusPayload,
    responses(
        (status = 200, description = "Item after the report", body = RestoreItem),
        (status = 404, description = "Job or item not found"),
        (status = 409, description = "Item already finished; retry it instead"),
        (status = 500, description = "Internal server error")
    )
)]
async fn report_item_status(
    State(state): State<SharedState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ReportStatusPayload>,
) -> Result<Json<RestoreItem>> {
    let service = JobService::new(state.store.clone());
    let item = service.get_restore_item(item_id).await?;
    if item.job_id != id {
        return Err(AppError::NotFound(format!(
            "Restore item {item_id} not found on job {id}"
        )));
    }
    let updated = service
        .report_restore_item_status(item_id, payload.status, payload.error_message)
        .await?;
    Ok(Json(updated))
}

/// Queue a faulted or canceled item to run again
#[utoipa::path(
    post,
    path = "/{id}/items/{item_id}/retry",
    context_path = "/api/v1/restore-jobs",
    tag = "restore-jobs",
    params(
        ("id" = Uuid, Path, description = "Restore job ID"),
        ("item_id" = Uuid, Path, description = "Restore item ID")
    ),
    responses(
        (status = 200, description = "Item queued again", body = RestoreItem),
        (status = 404, description = "Job or item not found"),
        (status = 409, description = "Item is not in a retryable state"),
        (status = 500, description = "Internal server error")
    )
)]
async fn retry_item(
    State(state): State<SharedState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RestoreItem>> {
    let service = JobService::new(state.store.clone());
    let item = service.get_restore_item(item_id).await?;
    if item.job_id != id {
        return Err(AppError::NotFound(format!(
            "Restore item {item_id} not found on job {id}"
        )));
    }
    let updated = service.retry_restore_item(item_id).await?;
    Ok(Json(updated))
}

/// Append an executor log entry for one item
#[utoipa::path(
    post,
    path = "/{id}/items/{item_id}/logs",
    context_path = "/api/v1/restore-jobs",
    tag = "restore-jobs",
    params(
        ("id" = Uuid, Path, description = "Restore job ID"),
        ("item_id" = Uuid, Path, description = "Restore item ID")
    ),
    request_body = AppendLogPayload,
    responses(
        (status = 200, description = "Log entry recorded", body = JobLog),
        (status = 404, description = "Job or item not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn append_item_log(
    State(state): State<SharedState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<AppendLogPayload>,
) -> Result<Json<JobLog>> {
    let service = JobService::new(state.store.clone());
    let item = service.get_restore_item(item_id).await?;
    if item.job_id != id {
        return Err(AppError::NotFound(format!(
            "Restore item {item_id} not found on job {id}"
        )));
    }
    let entry = service
        .append_item_log(
            JobKind::Restore,
            id,
            item_id,
            payload.severity,
            payload.title,
            payload.message,
        )
        .await?;
    Ok(Json(entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test list query carries both filters
    #[test]
    fn test_restore_job_list_query_full() {
        let plan = Uuid::new_v4();
        let json = format!(r#"{{"plan_id": "{plan}", "status": "RanToCompletion"}}"#);

        let query: RestoreJobListQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(query.plan_id, Some(plan));
        assert_eq!(query.status, Some(JobStatus::RanToCompletion));
    }

    /// Test empty list query
    #[test]
    fn test_restore_job_list_query_empty() {
        let query: RestoreJobListQuery = serde_json::from_str("{}").unwrap();
        assert!(query.plan_id.is_none());
        assert!(query.status.is_none());
    }
}
