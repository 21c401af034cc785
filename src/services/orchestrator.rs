//! The scheduling loop.
//!
//! Every tick works through three passes: evaluate backup plans that
//! are awaiting a schedule, fan completed backups out to triggered
//! restore plans, then evaluate scheduled restore plans. Jobs are
//! created eagerly together with the evaluated `next_run`; the
//! execution side claims them once the owning plan is due. A plan that
//! fails evaluation (usually a malformed cron expression) is skipped
//! with a warning and retried on the next tick, it never takes the
//! loop down.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::{interval, Duration};
use uuid::Uuid;

use crate::error::Result;
use crate::models::job::{BackupJob, JobKind};
use crate::models::job_log::LogSeverity;
use crate::models::plan::{BackupPlan, RestorePlan};
use crate::schedule;
use crate::store::{EngineStore, NewJobLog};

/// What one tick produced.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    pub backup_jobs_created: usize,
    pub restore_jobs_created: usize,
    pub restore_jobs_triggered: usize,
}

impl TickSummary {
    pub fn has_work(&self) -> bool {
        self.backup_jobs_created > 0
            || self.restore_jobs_created > 0
            || self.restore_jobs_triggered > 0
    }
}

pub struct Orchestrator {
    store: Arc<dyn EngineStore>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    /// Run one full evaluation pass. `now` is injected so ticks stay
    /// deterministic under test.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let mut summary = TickSummary::default();

        for plan in self.store.list_unscheduled_backup_plans().await? {
            match self.schedule_backup_plan(&plan, now).await {
                Ok(true) => summary.backup_jobs_created += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    plan_id = %plan.id,
                    plan = %plan.name,
                    error = %e,
                    "Skipping backup plan this tick"
                ),
            }
        }

        for job in self.store.list_completed_untriggered_backup_jobs().await? {
            match self.trigger_restores(&job).await {
                Ok(n) => summary.restore_jobs_triggered += n,
                Err(e) => tracing::warn!(
                    job_id = %job.id,
                    error = %e,
                    "Deferring triggered restores for backup job"
                ),
            }
        }

        for plan in self.store.list_unscheduled_restore_plans().await? {
            match self.schedule_restore_plan(&plan, now).await {
                Ok(true) => summary.restore_jobs_created += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    plan_id = %plan.id,
                    plan = %plan.name,
                    error = %e,
                    "Skipping restore plan this tick"
                ),
            }
        }

        Ok(summary)
    }

    /// Evaluate one backup plan. Returns whether a job was created.
    ///
    /// A plan with a live job is left unscheduled; its `next_run` is
    /// only written together with a fresh job so the two stay a pair.
    async fn schedule_backup_plan(&self, plan: &BackupPlan, now: DateTime<Utc>) -> Result<bool> {
        if self.store.has_active_backup_job(plan.id).await? {
            tracing::debug!(plan_id = %plan.id, "Backup plan already has a live job");
            return Ok(false);
        }
        let next = schedule::next_run(
            &plan.schedule_kind,
            plan.schedule_cron.as_deref(),
            plan.created_at,
            plan.last_run,
            now,
        )?;
        let Some(next) = next else {
            // One-time plans that already ran settle here for good.
            tracing::debug!(plan_id = %plan.id, "Backup plan has no further runs");
            return Ok(false);
        };
        let items = self.store.list_selected_backup_items(plan.id).await?;
        if items.is_empty() {
            tracing::warn!(
                plan_id = %plan.id,
                plan = %plan.name,
                "Backup plan has no selected items; advancing its schedule without a job"
            );
            self.store
                .set_backup_plan_next_run(plan.id, Some(next))
                .await?;
            return Ok(false);
        }
        self.store
            .set_backup_plan_next_run(plan.id, Some(next))
            .await?;
        let job = self.store.create_backup_job(plan.id, &items).await?;
        self.log_created(JobKind::Backup, job.id, format!("{} item(s) queued", items.len()))
            .await?;
        tracing::info!(
            plan_id = %plan.id,
            plan = %plan.name,
            job_id = %job.id,
            next_run = %next,
            "Backup job created"
        );
        Ok(true)
    }

    /// Fan one completed backup job out to its triggered restore plans.
    /// The job is flagged after the fan-out, so a crash in between
    /// replays it on the next tick and the live-job guard absorbs the
    /// duplicates.
    async fn trigger_restores(&self, job: &BackupJob) -> Result<usize> {
        let mut created = 0;
        for plan in self.store.list_triggered_restore_plans(job.plan_id).await? {
            match self.create_triggered_restore(&plan, job.id).await {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    plan_id = %plan.id,
                    plan = %plan.name,
                    error = %e,
                    "Skipping triggered restore plan"
                ),
            }
        }
        self.store.mark_backup_job_triggered(job.id).await?;
        Ok(created)
    }

    async fn create_triggered_restore(
        &self,
        plan: &RestorePlan,
        source_job_id: Uuid,
    ) -> Result<bool> {
        if self.store.has_active_restore_job(plan.id).await? {
            tracing::debug!(plan_id = %plan.id, "Restore plan already has a live job");
            return Ok(false);
        }
        let items = self
            .store
            .list_selected_backup_items(plan.source_backup_plan_id)
            .await?;
        if items.is_empty() {
            tracing::warn!(
                plan_id = %plan.id,
                plan = %plan.name,
                "Source plan has no selected items; nothing to restore"
            );
            return Ok(false);
        }
        let job = self.store.create_restore_job(plan.id, &items).await?;
        self.log_created(
            JobKind::Restore,
            job.id,
            format!("triggered by backup job {source_job_id}"),
        )
        .await?;
        tracing::info!(
            plan_id = %plan.id,
            plan = %plan.name,
            job_id = %job.id,
            source_job_id = %source_job_id,
            "Triggered restore job created"
        );
        Ok(true)
    }

    /// Evaluate one scheduled restore plan. Triggered plans never show
    /// up here; they are handled by the fan-out pass.
    async fn schedule_restore_plan(&self, plan: &RestorePlan, now: DateTime<Utc>) -> Result<bool> {
        if self.store.has_active_restore_job(plan.id).await? {
            tracing::debug!(plan_id = %plan.id, "Restore plan already has a live job");
            return Ok(false);
        }
        let next = schedule::next_run(
            &plan.schedule_kind,
            plan.schedule_cron.as_deref(),
            plan.created_at,
            plan.last_run,
            now,
        )?;
        let Some(next) = next else {
            tracing::debug!(plan_id = %plan.id, "Restore plan has no further runs");
            return Ok(false);
        };
        let items = self
            .store
            .list_selected_backup_items(plan.source_backup_plan_id)
            .await?;
        if items.is_empty() {
            tracing::warn!(
                plan_id = %plan.id,
                plan = %plan.name,
                "Source plan has no selected items; advancing the schedule without a job"
            );
            self.store
                .set_restore_plan_next_run(plan.id, Some(next))
                .await?;
            return Ok(false);
        }
        self.store
            .set_restore_plan_next_run(plan.id, Some(next))
            .await?;
        let job = self.store.create_restore_job(plan.id, &items).await?;
        self.log_created(JobKind::Restore, job.id, format!("{} item(s) queued", items.len()))
            .await?;
        tracing::info!(
            plan_id = %plan.id,
            plan = %plan.name,
            job_id = %job.id,
            next_run = %next,
            "Restore job created"
        );
        Ok(true)
    }

    async fn log_created(&self, kind: JobKind, job_id: Uuid, message: String) -> Result<()> {
        self.store
            .append_job_log(NewJobLog {
                job_kind: kind,
                job_id,
                item_status_id: None,
                severity: LogSeverity::Info,
                title: "Job created".to_string(),
                message,
            })
            .await?;
        Ok(())
    }
}

/// Start the orchestrator loop in the background.
pub fn spawn(store: Arc<dyn EngineStore>, interval_secs: u64) {
    tokio::spawn(async move {
        let orchestrator = Orchestrator::new(store);
        // Let the server finish coming up before the first evaluation.
        tokio::time::sleep(Duration::from_secs(5)).await;
        tracing::info!(interval_secs, "Starting orchestrator loop");
        let mut ticker = interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match orchestrator.tick(Utc::now()).await {
                Ok(summary) if summary.has_work() => {
                    tracing::info!(
                        backup_jobs = summary.backup_jobs_created,
                        restore_jobs = summary.restore_jobs_created,
                        triggered = summary.restore_jobs_triggered,
                        "Orchestrator tick produced work"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Orchestrator tick failed: {}", e),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::ObjectKind;
    use crate::models::job::JobStatus;
    use crate::models::plan::ScheduleKind;
    use crate::models::target::StorageKind;
    use crate::scanner::ScannedObject;
    use crate::services::job_service::JobService;
    use crate::store::memory::MemoryStore;
    use crate::store::{
        JobFilter, NewBackupPlan, NewDatabaseTarget, NewRestorePlan, NewStorageTarget, PlanUpdate,
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        orchestrator: Orchestrator,
        jobs: JobService,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let orchestrator = Orchestrator::new(store.clone());
            let jobs = JobService::new(store.clone());
            Self {
                store,
                orchestrator,
                jobs,
            }
        }

        async fn seed_backup_plan(&self, name: &str, kind: ScheduleKind, cron: Option<&str>) -> BackupPlan {
            let target = match self.store.list_database_targets().await.unwrap().first() {
                Some(t) => t.clone(),
                None => self
                    .store
                    .create_database_target(NewDatabaseTarget {
                        name: "primary".to_string(),
                        host: "db.internal".to_string(),
                        port: 3306,
                        username: "backup".to_string(),
                        password: "secret".to_string(),
                    })
                    .await
                    .unwrap(),
            };
            let storage = match self.store.list_storage_targets().await.unwrap().first() {
                Some(s) => s.clone(),
                None => self
                    .store
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
                    .unwrap(),
            };
            let objects = self
                .store
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
            self.store
                .create_backup_plan(NewBackupPlan {
                    name: name.to_string(),
                    description: None,
                    database_target_id: target.id,
                    storage_target_id: storage.id,
                    schedule_kind: kind,
                    schedule_cron: cron.map(str::to_string),
                    is_active: true,
                    catalog_object_ids: objects.iter().map(|o| o.id).collect(),
                })
                .await
                .unwrap()
        }

        async fn seed_restore_plan(
            &self,
            name: &str,
            source: &BackupPlan,
            kind: ScheduleKind,
            cron: Option<&str>,
        ) -> RestorePlan {
            self.store
                .create_restore_plan(NewRestorePlan {
                    name: name.to_string(),
                    description: None,
                    source_backup_plan_id: source.id,
                    database_target_id: source.database_target_id,
                    schedule_kind: kind,
                    schedule_cron: cron.map(str::to_string),
                    is_active: true,
                })
                .await
                .unwrap()
        }

        async fn backup_jobs(&self, plan_id: Uuid) -> Vec<BackupJob> {
            self.store
                .list_backup_jobs(JobFilter {
                    plan_id: Some(plan_id),
                    status: None,
                })
                .await
                .unwrap()
        }

        async fn deactivate_backup_plan(&self, plan: &BackupPlan) {
            let plan = self.store.get_backup_plan(plan.id).await.unwrap();
            self.store
                .update_backup_plan(
                    plan.id,
                    PlanUpdate {
                        name: plan.name.clone(),
                        description: plan.description.clone(),
                        schedule_kind: plan.schedule_kind,
                        schedule_cron: plan.schedule_cron.clone(),
                        is_active: false,
                        next_run: plan.next_run,
                    },
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_tick_creates_job_and_schedules_plan() {
        let fx = Fixture::new();
        let plan = fx
            .seed_backup_plan("nightly", ScheduleKind::Repeating, Some("0 3 * * *"))
            .await;

        let summary = fx.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.backup_jobs_created, 1);

        let jobs = fx.backup_jobs(plan.id).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Created);

        let statuses = fx.store.list_backup_item_statuses(jobs[0].id).await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses
            .iter()
            .all(|s| s.status == JobStatus::WaitingToRun));

        let plan = fx.store.get_backup_plan(plan.id).await.unwrap();
        let next = plan.next_run.unwrap();
        assert!(next > Utc::now());

        let logs = fx
            .store
            .list_job_logs(JobKind::Backup, jobs[0].id)
            .await
            .unwrap();
        assert_eq!(logs[0].title, "Job created");
    }

    #[tokio::test]
    async fn test_tick_skips_plan_with_live_job_without_scheduling() {
        let fx = Fixture::new();
        let plan = fx
            .seed_backup_plan("nightly", ScheduleKind::Repeating, Some("0 3 * * *"))
            .await;
        let items = fx.store.list_selected_backup_items(plan.id).await.unwrap();
        fx.store.create_backup_job(plan.id, &items).await.unwrap();

        let summary = fx.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.backup_jobs_created, 0);

        assert_eq!(fx.backup_jobs(plan.id).await.len(), 1);
        // The plan stays unscheduled so the next tick reconsiders it.
        let plan = fx.store.get_backup_plan(plan.id).await.unwrap();
        assert_eq!(plan.next_run, None);
    }

    #[tokio::test]
    async fn test_completed_cycle_feeds_the_next_tick() {
        let fx = Fixture::new();
        let plan = fx
            .seed_backup_plan("nightly", ScheduleKind::Repeating, Some("0 3 * * *"))
            .await;

        fx.orchestrator.tick(Utc::now()).await.unwrap();
        let job_id = fx.backup_jobs(plan.id).await[0].id;
        fx.jobs
            .report_backup_job_status(job_id, JobStatus::RanToCompletion, None)
            .await
            .unwrap();

        let summary = fx.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.backup_jobs_created, 1);
        assert_eq!(fx.backup_jobs(plan.id).await.len(), 2);

        let plan = fx.store.get_backup_plan(plan.id).await.unwrap();
        assert!(plan.last_run.is_some());
        assert!(plan.next_run.is_some());
    }

    #[tokio::test]
    async fn test_completed_backup_fans_out_to_triggered_restores() {
        let fx = Fixture::new();
        let backup = fx
            .seed_backup_plan("nightly", ScheduleKind::Repeating, Some("0 3 * * *"))
            .await;
        let restore = fx
            .seed_restore_plan("rehearsal", &backup, ScheduleKind::Triggered, None)
            .await;

        fx.orchestrator.tick(Utc::now()).await.unwrap();
        let job_id = fx.backup_jobs(backup.id).await[0].id;
        fx.jobs
            .report_backup_job_status(job_id, JobStatus::RanToCompletion, None)
            .await
            .unwrap();
        fx.deactivate_backup_plan(&backup).await;

        let summary = fx.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.restore_jobs_triggered, 1);

        let restore_jobs = fx
            .store
            .list_restore_jobs(JobFilter {
                plan_id: Some(restore.id),
                status: None,
            })
            .await
            .unwrap();
        assert_eq!(restore_jobs.len(), 1);
        let items = fx.store.list_restore_items(restore_jobs[0].id).await.unwrap();
        assert_eq!(items.len(), 2);

        let job = fx.store.get_backup_job(job_id).await.unwrap();
        assert!(job.has_triggered_restore);

        // Already-flagged jobs are not fanned out again.
        let summary = fx.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.restore_jobs_triggered, 0);
        let restore_jobs = fx
            .store
            .list_restore_jobs(JobFilter::default())
            .await
            .unwrap();
        assert_eq!(restore_jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_fan_out_flags_job_even_without_matching_plans() {
        let fx = Fixture::new();
        let backup = fx
            .seed_backup_plan("nightly", ScheduleKind::Repeating, Some("0 3 * * *"))
            .await;

        fx.orchestrator.tick(Utc::now()).await.unwrap();
        let job_id = fx.backup_jobs(backup.id).await[0].id;
        fx.jobs
            .report_backup_job_status(job_id, JobStatus::RanToCompletion, None)
            .await
            .unwrap();
        fx.deactivate_backup_plan(&backup).await;

        let summary = fx.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.restore_jobs_triggered, 0);
        let job = fx.store.get_backup_job(job_id).await.unwrap();
        assert!(job.has_triggered_restore);
    }

    #[tokio::test]
    async fn test_malformed_cron_skips_only_that_plan() {
        let fx = Fixture::new();
        let broken = fx
            .seed_backup_plan("broken", ScheduleKind::Repeating, Some("every day at 3"))
            .await;
        let good = fx
            .seed_backup_plan("good", ScheduleKind::Repeating, Some("0 3 * * *"))
            .await;

        let summary = fx.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.backup_jobs_created, 1);

        assert!(fx.backup_jobs(broken.id).await.is_empty());
        assert_eq!(fx.backup_jobs(good.id).await.len(), 1);

        // The broken plan stays in the evaluation pool.
        let broken = fx.store.get_backup_plan(broken.id).await.unwrap();
        assert_eq!(broken.next_run, None);
    }

    #[tokio::test]
    async fn test_one_time_plan_runs_exactly_once() {
        let fx = Fixture::new();
        let plan = fx
            .seed_backup_plan("initial-load", ScheduleKind::OneTime, None)
            .await;

        let summary = fx.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.backup_jobs_created, 1);
        let scheduled = fx.store.get_backup_plan(plan.id).await.unwrap();
        assert_eq!(
            scheduled.next_run,
            Some(plan.created_at + chrono::Duration::minutes(5))
        );

        let job_id = fx.backup_jobs(plan.id).await[0].id;
        fx.jobs
            .report_backup_job_status(job_id, JobStatus::RanToCompletion, None)
            .await
            .unwrap();

        let summary = fx.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.backup_jobs_created, 0);
        assert_eq!(fx.backup_jobs(plan.id).await.len(), 1);
        let plan = fx.store.get_backup_plan(plan.id).await.unwrap();
        assert_eq!(plan.next_run, None);
    }

    #[tokio::test]
    async fn test_empty_selection_advances_schedule_without_job() {
        let fx = Fixture::new();
        let plan = fx
            .seed_backup_plan("nightly", ScheduleKind::Repeating, Some("0 3 * * *"))
            .await;
        for item in fx.store.list_backup_items(plan.id).await.unwrap() {
            fx.store
                .set_backup_item_selected(plan.id, item.id, false)
                .await
                .unwrap();
        }

        let summary = fx.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.backup_jobs_created, 0);
        assert!(fx.backup_jobs(plan.id).await.is_empty());
        let plan = fx.store.get_backup_plan(plan.id).await.unwrap();
        assert!(plan.next_run.is_some());
    }

    #[tokio::test]
    async fn test_scheduled_restore_plan_gets_jobs_from_source_selection() {
        let fx = Fixture::new();
        let backup = fx
            .seed_backup_plan("nightly", ScheduleKind::Repeating, Some("0 3 * * *"))
            .await;
        let restore = fx
            .seed_restore_plan("rehearsal", &backup, ScheduleKind::Repeating, Some("0 6 * * *"))
            .await;
        fx.deactivate_backup_plan(&backup).await;

        let summary = fx.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.restore_jobs_created, 1);

        let jobs = fx
            .store
            .list_restore_jobs(JobFilter {
                plan_id: Some(restore.id),
                status: None,
            })
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        let items = fx.store.list_restore_items(jobs[0].id).await.unwrap();
        assert_eq!(items.len(), 2);

        let restore = fx.store.get_restore_plan(restore.id).await.unwrap();
        assert!(restore.next_run.is_some());
    }
}
