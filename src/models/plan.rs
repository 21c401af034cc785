//! Backup and restore plan models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Schedule kind enum.
///
/// OneTime plans run once, five minutes after creation. Repeating plans
/// follow a cron expression. Triggered plans are never self-scheduled;
/// they fire when their source backup plan completes a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "schedule_kind", rename_all = "snake_case")]
pub enum ScheduleKind {
    OneTime,
    Repeating,
    Triggered,
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleKind::OneTime => write!(f, "one_time"),
            ScheduleKind::Repeating => write!(f, "repeating"),
            ScheduleKind::Triggered => write!(f, "triggered"),
        }
    }
}

/// Backup plan entity.
///
/// `next_run` is NULL exactly when the plan has not been evaluated since
/// its last completed run cycle; the orchestrator picks plans up from
/// that state and persists the computed time when it creates a job.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct BackupPlan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub database_target_id: Uuid,
    pub storage_target_id: Uuid,
    pub schedule_kind: ScheduleKind,
    pub schedule_cron: Option<String>,
    pub is_active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Backup item entity: one selectable catalog object within a plan.
///
/// `position` fixes the iteration order; job item statuses are created
/// in this order.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct BackupItem {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub catalog_object_id: Uuid,
    pub is_selected: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// Restore plan entity.
///
/// Carries no item selection of its own: restore jobs materialize their
/// items from the source backup plan's selected items at creation time.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct RestorePlan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub source_backup_plan_id: Uuid,
    pub database_target_id: Uuid,
    pub schedule_kind: ScheduleKind,
    pub schedule_cron: Option<String>,
    pub is_active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
