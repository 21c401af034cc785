//! Persistent store boundary.
//!
//! Everything the engine persists goes through [`EngineStore`]: targets,
//! the catalog, plans and their item selections, jobs with their item
//! statuses, and append-only job logs. The orchestrator and the API
//! handlers depend on the trait, not on a concrete database, so the
//! whole engine runs against [`memory::MemoryStore`] under test and
//! [`postgres::PgStore`] in production.

pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::models::catalog::CatalogObject;
use crate::models::job::{
    BackupItemStatus, BackupJob, JobKind, JobStatus, RestoreItem, RestoreJob,
};
use crate::models::job_log::{JobLog, LogSeverity};
use crate::models::plan::{BackupItem, BackupPlan, RestorePlan, ScheduleKind};
use crate::models::target::{DatabaseTarget, StorageKind, StorageTarget};
use crate::scanner::ScannedObject;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Fields for a new database target.
#[derive(Debug, Clone)]
pub struct NewDatabaseTarget {
    pub name: String,
    pub host: String,
    pub port: i32,
    pub username: String,
    pub password: String,
}

/// Fields for a new storage target.
#[derive(Debug, Clone)]
pub struct NewStorageTarget {
    pub name: String,
    pub kind: StorageKind,
    pub local_path: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
}

/// Fields for a new backup plan. `catalog_object_ids` become the plan's
/// backup items, all selected, in the given order.
#[derive(Debug, Clone)]
pub struct NewBackupPlan {
    pub name: String,
    pub description: Option<String>,
    pub database_target_id: Uuid,
    pub storage_target_id: Uuid,
    pub schedule_kind: ScheduleKind,
    pub schedule_cron: Option<String>,
    pub is_active: bool,
    pub catalog_object_ids: Vec<Uuid>,
}

/// Fields for a new restore plan.
#[derive(Debug, Clone)]
pub struct NewRestorePlan {
    pub name: String,
    pub description: Option<String>,
    pub source_backup_plan_id: Uuid,
    pub database_target_id: Uuid,
    pub schedule_kind: ScheduleKind,
    pub schedule_cron: Option<String>,
    pub is_active: bool,
}

/// Mutable plan fields, written as one unit.
///
/// `next_run` is included because schedule edits recompute it; the
/// service layer decides the value, the store just writes it.
#[derive(Debug, Clone)]
pub struct PlanUpdate {
    pub name: String,
    pub description: Option<String>,
    pub schedule_kind: ScheduleKind,
    pub schedule_cron: Option<String>,
    pub is_active: bool,
    pub next_run: Option<DateTime<Utc>>,
}

/// Mutable run-state fields of a job or item status, written as one
/// unit. The job service computes these per state-machine operation.
#[derive(Debug, Clone)]
pub struct RunStateUpdate {
    pub status: JobStatus,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Optional filters for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub plan_id: Option<Uuid>,
    pub status: Option<JobStatus>,
}

/// Fields for a new job log entry.
#[derive(Debug, Clone)]
pub struct NewJobLog {
    pub job_kind: JobKind,
    pub job_id: Uuid,
    pub item_status_id: Option<Uuid>,
    pub severity: LogSeverity,
    pub title: String,
    pub message: String,
}

/// The store boundary.
#[async_trait]
pub trait EngineStore: Send + Sync {
    // Database targets

    async fn create_database_target(&self, new: NewDatabaseTarget) -> Result<DatabaseTarget>;
    async fn get_database_target(&self, id: Uuid) -> Result<DatabaseTarget>;
    async fn list_database_targets(&self) -> Result<Vec<DatabaseTarget>>;
    /// Removes the target and its catalog. Fails with Conflict while any
    /// plan still references the target.
    async fn delete_database_target(&self, id: Uuid) -> Result<()>;

    // Storage targets

    async fn create_storage_target(&self, new: NewStorageTarget) -> Result<StorageTarget>;
    async fn get_storage_target(&self, id: Uuid) -> Result<StorageTarget>;
    async fn list_storage_targets(&self) -> Result<Vec<StorageTarget>>;
    /// Fails with Conflict while any backup plan references the target.
    async fn delete_storage_target(&self, id: Uuid) -> Result<()>;

    // Catalog

    /// Fold a scan result into the target's catalog: new identities are
    /// inserted, existing ones keep their id and refresh engine/rows.
    /// Objects absent from the scan are kept (plans may reference them).
    async fn upsert_catalog_objects(
        &self,
        database_target_id: Uuid,
        objects: Vec<ScannedObject>,
    ) -> Result<Vec<CatalogObject>>;
    async fn list_catalog_objects(&self, database_target_id: Uuid) -> Result<Vec<CatalogObject>>;
    async fn get_catalog_object(&self, id: Uuid) -> Result<CatalogObject>;

    // Backup plans

    async fn create_backup_plan(&self, new: NewBackupPlan) -> Result<BackupPlan>;
    async fn get_backup_plan(&self, id: Uuid) -> Result<BackupPlan>;
    async fn list_backup_plans(&self) -> Result<Vec<BackupPlan>>;
    async fn update_backup_plan(&self, id: Uuid, update: PlanUpdate) -> Result<BackupPlan>;
    /// Cascades to items, jobs, dependent restore plans, and their logs.
    async fn delete_backup_plan(&self, id: Uuid) -> Result<()>;
    /// Active plans whose `next_run` is NULL, i.e. awaiting evaluation.
    async fn list_unscheduled_backup_plans(&self) -> Result<Vec<BackupPlan>>;
    async fn set_backup_plan_next_run(
        &self,
        id: Uuid,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<()>;
    /// Record a completed run cycle: `last_run` set, `next_run` cleared.
    async fn complete_backup_plan_cycle(&self, id: Uuid, last_run: DateTime<Utc>) -> Result<()>;

    // Backup items

    async fn list_backup_items(&self, plan_id: Uuid) -> Result<Vec<BackupItem>>;
    async fn list_selected_backup_items(&self, plan_id: Uuid) -> Result<Vec<BackupItem>>;
    async fn get_backup_item(&self, id: Uuid) -> Result<BackupItem>;
    async fn set_backup_item_selected(
        &self,
        plan_id: Uuid,
        item_id: Uuid,
        is_selected: bool,
    ) -> Result<BackupItem>;

    // Restore plans

    async fn create_restore_plan(&self, new: NewRestorePlan) -> Result<RestorePlan>;
    async fn get_restore_plan(&self, id: Uuid) -> Result<RestorePlan>;
    async fn list_restore_plans(&self) -> Result<Vec<RestorePlan>>;
    async fn update_restore_plan(&self, id: Uuid, update: PlanUpdate) -> Result<RestorePlan>;
    async fn delete_restore_plan(&self, id: Uuid) -> Result<()>;
    /// Active non-Triggered plans whose `next_run` is NULL.
    async fn list_unscheduled_restore_plans(&self) -> Result<Vec<RestorePlan>>;
    /// Active Triggered plans fed by the given backup plan.
    async fn list_triggered_restore_plans(
        &self,
        source_backup_plan_id: Uuid,
    ) -> Result<Vec<RestorePlan>>;
    async fn set_restore_plan_next_run(
        &self,
        id: Uuid,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn complete_restore_plan_cycle(&self, id: Uuid, last_run: DateTime<Utc>) -> Result<()>;

    // Backup jobs

    /// Insert a job in `Created` with one `WaitingToRun` item status per
    /// given backup item, in order, atomically.
    async fn create_backup_job(&self, plan_id: Uuid, items: &[BackupItem]) -> Result<BackupJob>;
    async fn get_backup_job(&self, id: Uuid) -> Result<BackupJob>;
    async fn list_backup_jobs(&self, filter: JobFilter) -> Result<Vec<BackupJob>>;
    async fn has_active_backup_job(&self, plan_id: Uuid) -> Result<bool>;
    /// Jobs ready for the execution side to claim: pre-execution status
    /// on a plan that is due at `now`.
    async fn list_runnable_backup_jobs(&self, now: DateTime<Utc>) -> Result<Vec<BackupJob>>;
    /// Completed jobs that have not fanned out to triggered restores.
    async fn list_completed_untriggered_backup_jobs(&self) -> Result<Vec<BackupJob>>;
    async fn mark_backup_job_triggered(&self, id: Uuid) -> Result<()>;
    async fn update_backup_job_state(&self, id: Uuid, update: RunStateUpdate)
        -> Result<BackupJob>;

    // Restore jobs

    /// Insert a restore job in `Created` with one `WaitingToRun` restore
    /// item per given source backup item, in order, atomically.
    async fn create_restore_job(
        &self,
        plan_id: Uuid,
        source_items: &[BackupItem],
    ) -> Result<RestoreJob>;
    async fn get_restore_job(&self, id: Uuid) -> Result<RestoreJob>;
    async fn list_restore_jobs(&self, filter: JobFilter) -> Result<Vec<RestoreJob>>;
    async fn has_active_restore_job(&self, plan_id: Uuid) -> Result<bool>;
    async fn list_runnable_restore_jobs(&self, now: DateTime<Utc>) -> Result<Vec<RestoreJob>>;
    async fn update_restore_job_state(
        &self,
        id: Uuid,
        update: RunStateUpdate,
    ) -> Result<RestoreJob>;

    // Item statuses

    async fn list_backup_item_statuses(&self, job_id: Uuid) -> Result<Vec<BackupItemStatus>>;
    async fn get_backup_item_status(&self, id: Uuid) -> Result<BackupItemStatus>;
    async fn update_backup_item_state(
        &self,
        id: Uuid,
        update: RunStateUpdate,
    ) -> Result<BackupItemStatus>;
    async fn list_restore_items(&self, job_id: Uuid) -> Result<Vec<RestoreItem>>;
    async fn get_restore_item(&self, id: Uuid) -> Result<RestoreItem>;
    async fn update_restore_item_state(
        &self,
        id: Uuid,
        update: RunStateUpdate,
    ) -> Result<RestoreItem>;

    // Job logs

    async fn append_job_log(&self, entry: NewJobLog) -> Result<JobLog>;
    /// Entries for one job, newest first.
    async fn list_job_logs(&self, job_kind: JobKind, job_id: Uuid) -> Result<Vec<JobLog>>;
}
