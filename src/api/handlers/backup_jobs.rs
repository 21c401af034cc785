//! Backup job handlers.
//!
//! The read and report surface for the execution side: queued work
//! discovery, per-item dump commands, status reports, retries, and the
//! job log.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::job::{BackupItemStatus, BackupJob, JobKind, JobStatus};
use crate::models::job_log::{JobLog, LogSeverity};
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
    components(schemas(
        ReportStatusPayload,
        AppendLogPayload,
        ItemCommandResponse,
        BackupJob,
        BackupItemStatus,
        JobLog,
        JobStatus,
        JobKind,
        LogSeverity,
    )),
    tags((name = "backup-jobs", description = "Backup job runs, item statuses, and logs"))
)]
pub struct BackupJobsApiDoc;

/// Create backup job routes.
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

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct JobListQuery {
    /// Only jobs created from this plan.
    pub plan_id: Option<Uuid>,
    /// Only jobs currently in this status.
    pub status: Option<JobStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportStatusPayload {
    pub status: JobStatus,
    /// Recorded verbatim; omit it to clear a previous error.
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AppendLogPayload {
    pub severity: LogSeverity,
    pub title: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemCommandResponse {
    /// Argument vector for the external dump tool, in order.
    pub args: Vec<String>,
    /// Filename the artifact is stored under on the storage target.
    pub artifact_filename: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// List backup jobs, newest first
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/backup-jobs",
    tag = "backup-jobs",
    params(JobListQuery),
    responses(
        (status = 200, description = "List of backup jobs", body = Vec<BackupJob>),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_jobs(
    State(state): State<SharedState>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<BackupJob>>> {
    let service = JobService::new(state.store.clone());
    let jobs = service
        .list_backup_jobs(JobFilter {
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
    context_path = "/api/v1/backup-jobs",
    tag = "backup-jobs",
    responses(
        (status = 200, description = "Claimable backup jobs", body = Vec<BackupJob>),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_runnable(State(state): State<SharedState>) -> Result<Json<Vec<BackupJob>>> {
    let service = JobService::new(state.store.clone());
    let jobs = service.list_runnable_backup_jobs(Utc::now()).await?;
    Ok(Json(jobs))
}

/// Get a backup job by ID
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/backup-jobs",
    tag = "backup-jobs",
    params(
        ("id" = Uuid, Path, description = "Backup job ID")
    ),
    responses(
        (status = 200, description = "Backup job details", body = BackupJob),
        (status = 404, description = "Backup job not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn get_job(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BackupJob>> {
    let service = JobService::new(state.store.clone());
    let job = service.get_backup_job(id).await?;
    Ok(Json(job))
}

/// Report the job's run status from the executor
#[utoipa::path(
    post,
    path = "/{id}/status",
    context_path = "/api/v1/backup-jobs",
    tag = "backup-jobs",
    params(
        ("id" = Uuid, Path, description = "Backup job ID")
    ),
    request_body = ReportStatusPayload,
    responses(
        (status = 200, description = "Backup job after the report", body = BackupJob),
        (status = 404, description = "Backup job not found"),
        (status = 409, description = "Job already finished; retry it instead"),
        (status = 500, description = "Internal server error")
    )
)]
async fn report_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportStatusPayload>,
) -> Result<Json<BackupJob>> {
    let service = JobService::new(state.store.clone());
    let job = service
        .report_backup_job_status(id, payload.status, payload.error_message)
        .await?;
    Ok(Json(job))
}

/// Queue a faulted or canceled job to run again
#[utoipa::path(
    post,
    path = "/{id}/retry",
    context_path = "/api/v1/backup-jobs",
    tag = "backup-jobs",
    params(
        ("id" = Uuid, Path, description = "Backup job ID")
    ),
    responses(
        (status = 200, description = "Backup job queued again", body = BackupJob),
        (status = 404, description = "Backup job not found"),
        (status = 409, description = "Job is not in a retryable state"),
        (status = 500, description = "Internal server error")
    )
)]
async fn retry_job(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BackupJob>> {
    let service = JobService::new(state.store.clone());
    let job = service.retry_backup_job(id).await?;
    Ok(Json(job))
}

/// List the job's item statuses in position order
#[utoipa::path(
    get,
    path = "/{id}/items",
    context_path = "/api/v1/backup-jobs",
    tag = "backup-jobs",
    params(
        ("id" = Uuid, Path, description = "Backup job ID")
    ),
    responses(
        (status = 200, description = "Item statuses of the job", body = Vec<BackupItemStatus>),
        (status = 404, description = "Backup job not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_items(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<BackupItemStatus>>> {
    let service = JobService::new(state.store.clone());
    let items = service.list_backup_job_items(id).await?;
    Ok(Json(items))
}

/// List the job's log entries, newest first
#[utoipa::path(
    get,
    path = "/{id}/logs",
    context_path = "/api/v1/backup-jobs",
    tag = "backup-jobs",
    params(
        ("id" = Uuid, Path, description = "Backup job ID")
    ),
    responses(
        (status = 200, description = "Log entries for the job", body = Vec<JobLog>),
        (status = 404, description = "Backup job not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn list_logs(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<JobLog>>> {
    let service = JobService::new(state.store.clone());
    let logs = service.list_job_logs(JobKind::Backup, id).await?;
    Ok(Json(logs))
}

/// Resolve the dump command for one item
#[utoipa::path(
    get,
    path = "/{id}/items/{item_id}/command",
    context_path = "/api/v1/backup-jobs",
    tag = "backup-jobs",
    params(
        ("id" = Uuid, Path, description = "Backup job ID"),
        ("item_id" = Uuid, Path, description = "Backup item status ID")
    ),
    responses(
        (status = 200, description = "Resolved dump invocation", body = ItemCommandResponse),
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
        .backup_item_command(id, item_id, state.config.dump_max_allowed_packet)
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
    context_path = "/api/v1/backup-jobs",
    tag = "backup-jobs",
    params(
        ("id" = Uuid, Path, description = "Backup job ID"),
        ("item_id" = Uuid, Path, description = "Backup item status ID")
    ),
    request_body = ReportStatusPayload,
    responses(
        (status = 200, description = "Item status after the report", body = BackupItemStatus),
        (status = 404, description = "Job or item not found"),
        (status = 409, description = "Item already finished; retry it instead"),
        (status = 500, description = "Internal server error")
    )
)]
async fn report_item_status(
    State(state): State<SharedState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ReportStatusPayload>,
) -> Result<Json<BackupItemStatus>> {
    let service = JobService::new(state.store.clone());
    let item = service.get_backup_item_status(item_id).await?;
    if item.job_id != id {
        return Err(AppError::NotFound(format!(
            "Backup item status {item_id} not found on job {id}"
        )));
    }
    let updated = service
        .report_backup_item_status(item_id, payload.status, payload.error_message)
        .await?;
    Ok(Json(updated))
}

/// Queue a faulted or canceled item to run again
#[utoipa::path(
    post,
    path = "/{id}/items/{item_id}/retry",
    context_path = "/api/v1/backup-jobs",
    tag = "backup-jobs",
    params(
        ("id" = Uuid, Path, description = "Backup job ID"),
        ("item_id" = Uuid, Path, description = "Backup item status ID")
    ),
    responses(
        (status = 200, description = "Item queued again", body = BackupItemStatus),
        (status = 404, description = "Job or item not found"),
        (status = 409, description = "Item is not in a retryable state"),
        (status = 500, description = "Internal server error")
    )
)]
async fn retry_item(
    State(state): State<SharedState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<BackupItemStatus>> {
    let service = JobService::new(state.store.clone());
    let item = service.get_backup_item_status(item_id).await?;
    if item.job_id != id {
        return Err(AppError::NotFound(format!(
            "Backup item status {item_id} not found on job {id}"
        )));
    }
    let updated = service.retry_backup_item(item_id).await?;
    Ok(Json(updated))
}

/// Append an executor log entry for one item
#[utoipa::path(
    post,
    path = "/{id}/items/{item_id}/logs",
    context_path = "/api/v1/backup-jobs",
    tag = "backup-jobs",
    params(
        ("id" = Uuid, Path, description = "Backup job ID"),
        ("item_id" = Uuid, Path, description = "Backup item status ID")
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
    let item = service.get_backup_item_status(item_id).await?;
    if item.job_id != id {
        return Err(AppError::NotFound(format!(
            "Backup item status {item_id} not found on job {id}"
        )));
    }
    let entry = service
        .append_item_log(
            JobKind::Backup,
            id,
            item_id,
            payload.severity,
            payload.title,
            payload.message,
        )
        .await?;
    Ok(Json(entry))
}
