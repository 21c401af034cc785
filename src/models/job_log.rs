//! Append-only job log model.

use crate::models::job::JobKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Log severity enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "log_severity", rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogSeverity::Info => write!(f, "info"),
            LogSeverity::Warning => write!(f, "warning"),
            LogSeverity::Error => write!(f, "error"),
        }
    }
}

/// Job log entry entity.
///
/// Written by the orchestrator for its decisions and by the execution
/// collaborator for tool output. Entries are append-only and read in
/// descending `logged_at` order; `item_status_id` is set when the entry
/// belongs to a single item rather than the job as a whole.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct JobLog {
    pub id: Uuid,
    pub job_kind: JobKind,
    pub job_id: Uuid,
    pub item_status_id: Option<Uuid>,
    pub severity: LogSeverity,
    pub title: String,
    pub message: String,
    pub logged_at: DateTime<Utc>,
}
