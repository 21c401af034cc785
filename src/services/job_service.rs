//! Run-state transitions for jobs and item statuses.
//!
//! The execution side reports what happened; this service decides what
//! the new run state looks like and records a log line for every
//! visible transition. Job status is never derived from item statuses.
//! The two retry operations differ on purpose: a job retry keeps the
//! recorded error for operators to read while the job waits, an item
//! retry clears it and, when the parent job already faulted, reopens
//! the parent so the executor picks the item back up.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dump::{self, DumpContext};
use crate::error::{AppError, Result};
use crate::models::job::{BackupItemStatus, BackupJob, JobKind, JobStatus, RestoreItem, RestoreJob};
use crate::models::job_log::{JobLog, LogSeverity};
use crate::store::{EngineStore, JobFilter, NewJobLog, RunStateUpdate};

/// A resolved invocation for one item: the argument vector for the
/// external dump tool and the artifact filename the result lives under.
#[derive(Debug, Clone)]
pub struct ItemCommand {
    pub args: Vec<String>,
    pub artifact_filename: String,
}

/// Compute the run state after a reported status change.
///
/// Any non-terminal run may move to any status; ordering discipline
/// belongs to the execution side. Terminal runs only leave through the
/// retry operations, so reporting onto one is a conflict. `started_at`
/// is pinned at the first `Running` report and `completed_at` exists
/// exactly while the run is terminal.
pub fn transition(
    current: JobStatus,
    started_at: Option<DateTime<Utc>>,
    retry_count: i32,
    next: JobStatus,
    error_message: Option<String>,
    now: DateTime<Utc>,
) -> Result<RunStateUpdate> {
    if current.is_terminal() {
        return Err(AppError::Conflict(format!(
            "run already finished as {current}; retry it instead of reporting {next}"
        )));
    }
    let started_at = match started_at {
        Some(ts) => Some(ts),
        None if next == JobStatus::Running => Some(now),
        None => None,
    };
    Ok(RunStateUpdate {
        status: next,
        retry_count,
        error_message,
        started_at,
        completed_at: if next.is_terminal() { Some(now) } else { None },
    })
}

pub struct JobService {
    store: Arc<dyn EngineStore>,
}

impl JobService {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    // ---------- queries ----------

    pub async fn get_backup_job(&self, id: Uuid) -> Result<BackupJob> {
        self.store.get_backup_job(id).await
    }

    pub async fn list_backup_jobs(&self, filter: JobFilter) -> Result<Vec<BackupJob>> {
        self.store.list_backup_jobs(filter).await
    }

    /// Queued backup jobs whose plan is due. This is the executor's
    /// work feed.
    pub async fn list_runnable_backup_jobs(&self, now: DateTime<Utc>) -> Result<Vec<BackupJob>> {
        self.store.list_runnable_backup_jobs(now).await
    }

    pub async fn list_backup_job_items(&self, job_id: Uuid) -> Result<Vec<BackupItemStatus>> {
        self.store.get_backup_job(job_id).await?;
        self.store.list_backup_item_statuses(job_id).await
    }

    pub async fn get_backup_item_status(&self, id: Uuid) -> Result<BackupItemStatus> {
        self.store.get_backup_item_status(id).await
    }

    pub async fn get_restore_job(&self, id: Uuid) -> Result<RestoreJob> {
        self.store.get_restore_job(id).await
    }

    pub async fn list_restore_jobs(&self, filter: JobFilter) -> Result<Vec<RestoreJob>> {
        self.store.list_restore_jobs(filter).await
    }

    pub async fn list_runnable_restore_jobs(&self, now: DateTime<Utc>) -> Result<Vec<RestoreJob>> {
        self.store.list_runnable_restore_jobs(now).await
    }

    pub async fn list_restore_job_items(&self, job_id: Uuid) -> Result<Vec<RestoreItem>> {
        self.store.get_restore_job(job_id).await?;
        self.store.list_restore_items(job_id).await
    }

    pub async fn get_restore_item(&self, id: Uuid) -> Result<RestoreItem> {
        self.store.get_restore_item(id).await
    }

    /// Log entries for one job, newest first.
    pub async fn list_job_logs(&self, kind: JobKind, job_id: Uuid) -> Result<Vec<JobLog>> {
        match kind {
            JobKind::Backup => {
                self.store.get_backup_job(job_id).await?;
            }
            JobKind::Restore => {
                self.store.get_restore_job(job_id).await?;
            }
        }
        self.store.list_job_logs(kind, job_id).await
    }

    /// Record one log entry from the executor against an item.
    pub async fn append_item_log(
        &self,
        kind: JobKind,
        job_id: Uuid,
        item_status_id: Uuid,
        severity: LogSeverity,
        title: String,
        message: String,
    ) -> Result<JobLog> {
        self.store
            .append_job_log(NewJobLog {
                job_kind: kind,
                job_id,
                item_status_id: Some(item_status_id),
                severity,
                title,
                message,
            })
            .await
    }

    // ---------- commands ----------

    /// Resolve the dump invocation for one backup item status.
    pub async fn backup_item_command(
        &self,
        job_id: Uuid,
        item_status_id: Uuid,
        max_allowed_packet: u64,
    ) -> Result<ItemCommand> {
        let item = self.store.get_backup_item_status(item_status_id).await?;
        if item.job_id != job_id {
            return Err(AppError::NotFound(format!(
                "Backup item status {item_status_id} not found on job {job_id}"
            )));
        }
        let job = self.store.get_backup_job(job_id).await?;
        let plan = self.store.get_backup_plan(job.plan_id).await?;
        let object = self.store.get_catalog_object(item.catalog_object_id).await?;
        let target = self
            .store
            .get_database_target(plan.database_target_id)
            .await?;
        let conn = DumpContext::for_target(&target, max_allowed_packet)?;
        Ok(ItemCommand {
            args: dump::backup_args(&object, &conn),
            artifact_filename: dump::artifact_filename(&object),
        })
    }

    /// Resolve the restore invocation for one restore item. The catalog
    /// object is reached through the backup item the restore replays;
    /// credentials come from the restore plan's destination target.
    pub async fn restore_item_command(
        &self,
        job_id: Uuid,
        item_id: Uuid,
        max_allowed_packet: u64,
    ) -> Result<ItemCommand> {
        let item = self.store.get_restore_item(item_id).await?;
        if item.job_id != job_id {
            return Err(AppError::NotFound(format!(
                "Restore item {item_id} not found on job {job_id}"
            )));
        }
        let job = self.store.get_restore_job(job_id).await?;
        let plan = self.store.get_restore_plan(job.plan_id).await?;
        let backup_item = self.store.get_backup_item(item.backup_item_id).await?;
        let object = self
            .store
            .get_catalog_object(backup_item.catalog_object_id)
            .await?;
        let target = self
            .store
            .get_database_target(plan.database_target_id)
            .await?;
        let conn = DumpContext::for_target(&target, max_allowed_packet)?;
        Ok(ItemCommand {
            args: dump::restore_args(&object, &conn),
            artifact_filename: dump::artifact_filename(&object),
        })
    }

    // ---------- status reports ----------

    /// Apply a reported status to a backup job. A successful completion
    /// also closes the plan's run cycle so the scheduler evaluates the
    /// plan again.
    pub async fn report_backup_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<BackupJob> {
        let job = self.store.get_backup_job(id).await?;
        let now = Utc::now();
        let update = transition(
            job.status,
            job.started_at,
            job.retry_count,
            status,
            error_message,
            now,
        )?;
        let updated = self.store.update_backup_job_state(id, update).await?;
        self.log_transition(
            JobKind::Backup,
            updated.id,
            None,
            status,
            updated.error_message.clone(),
        )
        .await?;
        if status == JobStatus::RanToCompletion {
            let finished = updated.completed_at.unwrap_or(now);
            self.store
                .complete_backup_plan_cycle(updated.plan_id, finished)
                .await?;
        }
        Ok(updated)
    }

    pub async fn report_restore_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<RestoreJob> {
        let job = self.store.get_restore_job(id).await?;
        let now = Utc::now();
        let update = transition(
            job.status,
            job.started_at,
            job.retry_count,
            status,
            error_message,
            now,
        )?;
        let updated = self.store.update_restore_job_state(id, update).await?;
        self.log_transition(
            JobKind::Restore,
            updated.id,
            None,
            status,
            updated.error_message.clone(),
        )
        .await?;
        if status == JobStatus::RanToCompletion {
            let finished = updated.completed_at.unwrap_or(now);
            self.store
                .complete_restore_plan_cycle(updated.plan_id, finished)
                .await?;
        }
        Ok(updated)
    }

    /// Apply a reported status to one backup item. Item reports never
    /// touch the parent job; the executor owns the job-level status.
    pub async fn report_backup_item_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<BackupItemStatus> {
        let item = self.store.get_backup_item_status(id).await?;
        let update = transition(
            item.status,
            item.started_at,
            item.retry_count,
            status,
            error_message,
            Utc::now(),
        )?;
        let updated = self.store.update_backup_item_state(id, update).await?;
        self.log_transition(
            JobKind::Backup,
            updated.job_id,
            Some(updated.id),
            status,
            updated.error_message.clone(),
        )
        .await?;
        Ok(updated)
    }

    pub async fn report_restore_item_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<RestoreItem> {
        let item = self.store.get_restore_item(id).await?;
        let update = transition(
            item.status,
            item.started_at,
            item.retry_count,
            status,
            error_message,
            Utc::now(),
        )?;
        let updated = self.store.update_restore_item_state(id, update).await?;
        self.log_transition(
            JobKind::Restore,
            updated.job_id,
            Some(updated.id),
            status,
            updated.error_message.clone(),
        )
        .await?;
        Ok(updated)
    }

    // ---------- retries ----------

    /// Queue a faulted or canceled backup job to run again. The
    /// recorded error stays in place until the next run reports.
    pub async fn retry_backup_job(&self, id: Uuid) -> Result<BackupJob> {
        let job = self.store.get_backup_job(id).await?;
        if !job.status.is_retryable() {
            return Err(AppError::RetryRejected(format!(
                "backup job {id} is {}; only faulted or canceled jobs can be retried",
                job.status
            )));
        }
        let update = RunStateUpdate {
            status: JobStatus::WaitingToRun,
            retry_count: job.retry_count + 1,
            error_message: job.error_message.clone(),
            started_at: job.started_at,
            completed_at: None,
        };
        let updated = self.store.update_backup_job_state(id, update).await?;
        self.log_retry(JobKind::Backup, updated.id, None, updated.retry_count)
            .await?;
        Ok(updated)
    }

    pub async fn retry_restore_job(&self, id: Uuid) -> Result<RestoreJob> {
        let job = self.store.get_restore_job(id).await?;
        if !job.status.is_retryable() {
            return Err(AppError::RetryRejected(format!(
                "restore job {id} is {}; only faulted or canceled jobs can be retried",
                job.status
            )));
        }
        let update = RunStateUpdate {
            status: JobStatus::WaitingToRun,
            retry_count: job.retry_count + 1,
            error_message: job.error_message.clone(),
            started_at: job.started_at,
            completed_at: None,
        };
        let updated = self.store.update_restore_job_state(id, update).await?;
        self.log_retry(JobKind::Restore, updated.id, None, updated.retry_count)
            .await?;
        Ok(updated)
    }

    /// Queue a faulted or canceled backup item to run again, clearing
    /// its recorded error. A faulted parent job is moved back to
    /// `Running` so the executor returns to it; a canceled parent stays
    /// canceled because the operator ended that run on purpose.
    pub async fn retry_backup_item(&self, id: Uuid) -> Result<BackupItemStatus> {
        let item = self.store.get_backup_item_status(id).await?;
        if !item.status.is_retryable() {
            return Err(AppError::RetryRejected(format!(
                "backup item status {id} is {}; only faulted or canceled items can be retried",
                item.status
            )));
        }
        let update = RunStateUpdate {
            status: JobStatus::WaitingToRun,
            retry_count: item.retry_count + 1,
            error_message: None,
            started_at: item.started_at,
            completed_at: None,
        };
        let updated = self.store.update_backup_item_state(id, update).await?;
        self.log_retry(
            JobKind::Backup,
            updated.job_id,
            Some(updated.id),
            updated.retry_count,
        )
        .await?;

        let job = self.store.get_backup_job(updated.job_id).await?;
        if job.status == JobStatus::Faulted {
            let resume = RunStateUpdate {
                status: JobStatus::Running,
                retry_count: job.retry_count,
                error_message: job.error_message.clone(),
                started_at: job.started_at,
                completed_at: None,
            };
            self.store.update_backup_job_state(job.id, resume).await?;
            self.store
                .append_job_log(NewJobLog {
                    job_kind: JobKind::Backup,
                    job_id: job.id,
                    item_status_id: None,
                    severity: LogSeverity::Info,
                    title: "Job resumed".to_string(),
                    message: "a failed item was retried".to_string(),
                })
                .await?;
        }
        Ok(updated)
    }

    pub async fn retry_restore_item(&self, id: Uuid) -> Result<RestoreItem> {
        let item = self.store.get_restore_item(id).await?;
        if !item.status.is_retryable() {
            return Err(AppError::RetryRejected(format!(
                "restore item {id} is {}; only faulted or canceled items can be retried",
                item.status
            )));
        }
        let update = RunStateUpdate {
            status: JobStatus::WaitingToRun,
            retry_count: item.retry_count + 1,
            error_message: None,
            started_at: item.started_at,
            completed_at: None,
        };
        let updated = self.store.update_restore_item_state(id, update).await?;
        self.log_retry(
            JobKind::Restore,
            updated.job_id,
            Some(updated.id),
            updated.retry_count,
        )
        .await?;

        let job = self.store.get_restore_job(updated.job_id).await?;
        if job.status == JobStatus::Faulted {
            let resume = RunStateUpdate {
                status: JobStatus::Running,
                retry_count: job.retry_count,
                error_message: job.error_message.clone(),
                started_at: job.started_at,
                completed_at: None,
            };
            self.store.update_restore_job_state(job.id, resume).await?;
            self.store
                .append_job_log(NewJobLog {
                    job_kind: JobKind::Restore,
                    job_id: job.id,
                    item_status_id: None,
                    severity: LogSeverity::Info,
                    title: "Job resumed".to_string(),
                    message: "a failed item was retried".to_string(),
                })
                .await?;
        }
        Ok(updated)
    }

    // ---------- logging ----------

    async fn log_transition(
        &self,
        kind: JobKind,
        job_id: Uuid,
        item_status_id: Option<Uuid>,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<()> {
        let scope = if item_status_id.is_some() { "Item" } else { "Job" };
        let (severity, verb) = match status {
            JobStatus::Running => (LogSeverity::Info, "started"),
            JobStatus::RanToCompletion => (LogSeverity::Info, "completed"),
            JobStatus::Faulted => (LogSeverity::Error, "failed"),
            JobStatus::Canceled => (LogSeverity::Warning, "canceled"),
            // Queue states are logged where they happen: creation by the
            // orchestrator, requeues by the retry operations.
            JobStatus::Created | JobStatus::WaitingToRun => return Ok(()),
        };
        self.store
            .append_job_log(NewJobLog {
                job_kind: kind,
                job_id,
                item_status_id,
                severity,
                title: format!("{scope} {verb}"),
                message: error.unwrap_or_default(),
            })
            .await?;
        Ok(())
    }

    async fn log_retry(
        &self,
        kind: JobKind,
        job_id: Uuid,
        item_status_id: Option<Uuid>,
        retry_count: i32,
    ) -> Result<()> {
        let scope = if item_status_id.is_some() { "Item" } else { "Job" };
        self.store
            .append_job_log(NewJobLog {
                job_kind: kind,
                job_id,
                item_status_id,
                severity: LogSeverity::Info,
                title: format!("{scope} retried"),
                message: format!("retry #{retry_count}"),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::ObjectKind;
    use crate::models::plan::{BackupItem, BackupPlan, ScheduleKind};
    use crate::models::target::StorageKind;
    use crate::scanner::ScannedObject;
    use crate::store::memory::MemoryStore;
    use crate::store::{NewBackupPlan, NewDatabaseTarget, NewStorageTarget};

    fn service(store: &Arc<MemoryStore>) -> JobService {
        JobService::new(store.clone())
    }

    async fn seed_plan(store: &MemoryStore) -> (BackupPlan, Vec<BackupItem>) {
        let target = store
            .create_database_target(NewDatabaseTarget {
                name: "primary".to_string(),
                host: "db.internal".to_string(),
                port: 3306,
                username: "backup".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();
        let storage = store
            .create_storage_target(NewStorageTarget {
                name: "vault".to_string(),
                kind: StorageKind::Local,
                local_path: Some("/var/backups".to_string()),
                s3_bucket: None,
                s3_region: None,
                s3_endpoint: None,
                s3_access_key: None,
                s3_secret_key: None,
            })
            .await
            .unwrap();
        let objects = store
            .upsert_catalog_objects(
                target.id,
                vec![
                    ScannedObject {
                        schema_name: "app".to_string(),
                        object_name: Some("users".to_string()),
                        kind: ObjectKind::TableData,
                        table_engine: Some("InnoDB".to_string()),
                        approx_rows: Some(100),
                    },
                    ScannedObject {
                        schema_name: "app".to_string(),
                        object_name: Some("orders".to_string()),
                        kind: ObjectKind::TableData,
                        table_engine: Some("InnoDB".to_string()),
                        approx_rows: Some(500),
                    },
                ],
            )
            .await
            .unwrap();
        let plan = store
            .create_backup_plan(NewBackupPlan {
                name: "nightly".to_string(),
                description: None,
                database_target_id: target.id,
                storage_target_id: storage.id,
                schedule_kind: ScheduleKind::Repeating,
                schedule_cron: Some("0 0 * * *".to_string()),
                is_active: true,
                catalog_object_ids: objects.iter().map(|o| o.id).collect(),
            })
            .await
            .unwrap();
        let items = store.list_selected_backup_items(plan.id).await.unwrap();
        (plan, items)
    }

    async fn seed_job(store: &MemoryStore) -> (BackupPlan, BackupJob, Vec<BackupItemStatus>) {
        let (plan, items) = seed_plan(store).await;
        let job = store.create_backup_job(plan.id, &items).await.unwrap();
        let statuses = store.list_backup_item_statuses(job.id).await.unwrap();
        (plan, job, statuses)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_transition_pins_started_at_on_first_running() {
        let now = at(1_000);
        let update =
            transition(JobStatus::WaitingToRun, None, 0, JobStatus::Running, None, now).unwrap();
        assert_eq!(update.started_at, Some(now));
        assert_eq!(update.completed_at, None);

        let later = at(2_000);
        let again = transition(
            JobStatus::Running,
            update.started_at,
            0,
            JobStatus::Running,
            None,
            later,
        )
        .unwrap();
        assert_eq!(again.started_at, Some(now));
    }

    #[test]
    fn test_transition_sets_completed_at_only_when_terminal() {
        let now = at(1_000);
        let done = transition(
            JobStatus::Running,
            Some(at(500)),
            0,
            JobStatus::RanToCompletion,
            None,
            now,
        )
        .unwrap();
        assert_eq!(done.completed_at, Some(now));

        let queued =
            transition(JobStatus::Created, None, 0, JobStatus::WaitingToRun, None, now).unwrap();
        assert_eq!(queued.completed_at, None);
        assert_eq!(queued.started_at, None);
    }

    #[test]
    fn test_transition_rejects_reports_on_terminal_runs() {
        let err = transition(
            JobStatus::Faulted,
            Some(at(500)),
            0,
            JobStatus::Running,
            None,
            at(1_000),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_completion_closes_plan_cycle() {
        let store = Arc::new(MemoryStore::new());
        let (plan, job, _) = seed_job(&store).await;
        let svc = service(&store);

        svc.report_backup_job_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();
        let done = svc
            .report_backup_job_status(job.id, JobStatus::RanToCompletion, None)
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::RanToCompletion);
        assert!(done.completed_at.is_some());

        let plan = store.get_backup_plan(plan.id).await.unwrap();
        assert_eq!(plan.last_run, done.completed_at);
        assert_eq!(plan.next_run, None);

        let logs = store.list_job_logs(JobKind::Backup, job.id).await.unwrap();
        let titles: Vec<&str> = logs.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["Job completed", "Job started"]);
    }

    #[tokio::test]
    async fn test_fault_records_error_and_log() {
        let store = Arc::new(MemoryStore::new());
        let (_, job, _) = seed_job(&store).await;
        let svc = service(&store);

        svc.report_backup_job_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();
        let faulted = svc
            .report_backup_job_status(
                job.id,
                JobStatus::Faulted,
                Some("mysqldump exited with 2".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(
            faulted.error_message.as_deref(),
            Some("mysqldump exited with 2")
        );

        let logs = store.list_job_logs(JobKind::Backup, job.id).await.unwrap();
        assert_eq!(logs[0].title, "Job failed");
        assert_eq!(logs[0].severity, LogSeverity::Error);
        assert_eq!(logs[0].message, "mysqldump exited with 2");
    }

    #[tokio::test]
    async fn test_report_on_finished_job_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let (_, job, _) = seed_job(&store).await;
        let svc = service(&store);

        svc.report_backup_job_status(job.id, JobStatus::RanToCompletion, None)
            .await
            .unwrap();
        let err = svc
            .report_backup_job_status(job.id, JobStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_job_retry_preserves_error_message() {
        let store = Arc::new(MemoryStore::new());
        let (_, job, _) = seed_job(&store).await;
        let svc = service(&store);

        svc.report_backup_job_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();
        svc.report_backup_job_status(job.id, JobStatus::Faulted, Some("disk full".to_string()))
            .await
            .unwrap();

        let retried = svc.retry_backup_job(job.id).await.unwrap();
        assert_eq!(retried.status, JobStatus::WaitingToRun);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.error_message.as_deref(), Some("disk full"));
        assert_eq!(retried.completed_at, None);
    }

    #[tokio::test]
    async fn test_retry_of_running_job_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (_, job, _) = seed_job(&store).await;
        let svc = service(&store);

        svc.report_backup_job_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();
        let err = svc.retry_backup_job(job.id).await.unwrap_err();
        assert!(matches!(err, AppError::RetryRejected(_)));

        svc.report_backup_job_status(job.id, JobStatus::RanToCompletion, None)
            .await
            .unwrap();
        let err = svc.retry_backup_job(job.id).await.unwrap_err();
        assert!(matches!(err, AppError::RetryRejected(_)));
    }

    #[tokio::test]
    async fn test_item_retry_clears_error_and_resumes_faulted_job() {
        let store = Arc::new(MemoryStore::new());
        let (_, job, statuses) = seed_job(&store).await;
        let svc = service(&store);

        svc.report_backup_job_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();
        svc.report_backup_item_status(
            statuses[0].id,
            JobStatus::Faulted,
            Some("lock wait timeout".to_string()),
        )
        .await
        .unwrap();
        svc.report_backup_job_status(job.id, JobStatus::Faulted, Some("1 item failed".to_string()))
            .await
            .unwrap();

        let retried = svc.retry_backup_item(statuses[0].id).await.unwrap();
        assert_eq!(retried.status, JobStatus::WaitingToRun);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.error_message, None);

        let job = store.get_backup_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.completed_at, None);
        assert_eq!(job.error_message.as_deref(), Some("1 item failed"));

        let logs = store.list_job_logs(JobKind::Backup, job.id).await.unwrap();
        assert_eq!(logs[0].title, "Job resumed");
    }

    #[tokio::test]
    async fn test_item_retry_leaves_canceled_job_canceled() {
        let store = Arc::new(MemoryStore::new());
        let (_, job, statuses) = seed_job(&store).await;
        let svc = service(&store);

        svc.report_backup_item_status(statuses[0].id, JobStatus::Canceled, None)
            .await
            .unwrap();
        svc.report_backup_job_status(job.id, JobStatus::Canceled, None)
            .await
            .unwrap();

        let retried = svc.retry_backup_item(statuses[0].id).await.unwrap();
        assert_eq!(retried.status, JobStatus::WaitingToRun);

        let job = store.get_backup_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
    }

    #[tokio::test]
    async fn test_item_report_does_not_touch_job_status() {
        let store = Arc::new(MemoryStore::new());
        let (_, job, statuses) = seed_job(&store).await;
        let svc = service(&store);

        svc.report_backup_item_status(statuses[0].id, JobStatus::Running, None)
            .await
            .unwrap();
        svc.report_backup_item_status(statuses[0].id, JobStatus::RanToCompletion, None)
            .await
            .unwrap();

        let job = store.get_backup_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Created);
    }

    #[tokio::test]
    async fn test_backup_item_command_resolves_args_and_filename() {
        let store = Arc::new(MemoryStore::new());
        let (_, job, statuses) = seed_job(&store).await;
        let svc = service(&store);

        let command = svc
            .backup_item_command(job.id, statuses[0].id, 1_073_741_824)
            .await
            .unwrap();

        assert!(command.args.contains(&"--host=db.internal".to_string()));
        assert!(command.args.contains(&"--single-transaction".to_string()));
        assert_eq!(command.args.last().map(String::as_str), Some("users"));
        assert_eq!(command.artifact_filename, "app.users-data.sql.xz.enc");
    }

    #[tokio::test]
    async fn test_item_command_rejects_foreign_job() {
        let store = Arc::new(MemoryStore::new());
        let (_, job, statuses) = seed_job(&store).await;
        let svc = service(&store);

        let err = svc
            .backup_item_command(Uuid::new_v4(), statuses[0].id, 1_073_741_824)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // The real pairing still resolves.
        svc.backup_item_command(job.id, statuses[0].id, 1_073_741_824)
            .await
            .unwrap();
    }
}
