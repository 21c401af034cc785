//! Job and item status models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Job status enum, shared by jobs and their item statuses.
///
/// Lifecycle: Created -> WaitingToRun -> Running -> one of
/// RanToCompletion, Faulted, Canceled. `completed_at` is set exactly
/// when the status is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    WaitingToRun,
    Running,
    RanToCompletion,
    Faulted,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::RanToCompletion | JobStatus::Faulted | JobStatus::Canceled
        )
    }

    /// Only failed terminal states accept a manual retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobStatus::Faulted | JobStatus::Canceled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Created => write!(f, "created"),
            JobStatus::WaitingToRun => write!(f, "waiting_to_run"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::RanToCompletion => write!(f, "ran_to_completion"),
            JobStatus::Faulted => write!(f, "faulted"),
            JobStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// Discriminates the two job families where they share a table (logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "job_kind", rename_all = "snake_case")]
pub enum JobKind {
    Backup,
    Restore,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Backup => write!(f, "backup"),
            JobKind::Restore => write!(f, "restore"),
        }
    }
}

/// Backup job entity.
///
/// `has_triggered_restore` is the level-trigger guard: the orchestrator
/// only fans completed jobs out to triggered restore plans while it is
/// still false.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct BackupJob {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub status: JobStatus,
    pub has_triggered_restore: bool,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Restore job entity.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct RestoreJob {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub status: JobStatus,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Per-object execution record inside a backup job.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct BackupItemStatus {
    pub id: Uuid,
    pub job_id: Uuid,
    pub catalog_object_id: Uuid,
    pub position: i32,
    pub status: JobStatus,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Per-object execution record inside a restore job.
///
/// References the backup item it replays rather than the catalog object;
/// the catalog object is reached through the backup item.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct RestoreItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub backup_item_id: Uuid,
    pub position: i32,
    pub status: JobStatus,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
