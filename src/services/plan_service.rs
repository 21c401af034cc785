//! Backup and restore plan management.
//!
//! Creation and edits validate schedules up front so a malformed cron
//! expression is rejected at the API instead of surfacing later as a
//! skipped plan in the orchestrator. Plans are stored with `next_run`
//! NULL and picked up by the next tick; an edit that changes the
//! schedule recomputes `next_run` immediately, any other edit leaves
//! the evaluated time alone.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::job::{BackupJob, JobKind, RestoreJob};
use crate::models::job_log::LogSeverity;
use crate::models::plan::{BackupItem, BackupPlan, RestorePlan, ScheduleKind};
use crate::schedule;
use crate::store::{EngineStore, NewBackupPlan, NewJobLog, NewRestorePlan, PlanUpdate};

/// Partial plan edit; `None` keeps the current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub schedule_kind: Option<ScheduleKind>,
    pub schedule_cron: Option<String>,
    pub is_active: Option<bool>,
}

pub struct PlanService {
    store: Arc<dyn EngineStore>,
}

impl PlanService {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    // ---------- backup plans ----------

    pub async fn create_backup_plan(&self, new: NewBackupPlan) -> Result<BackupPlan> {
        if new.schedule_kind == ScheduleKind::Triggered {
            return Err(AppError::Validation(
                "backup plans cannot use the triggered schedule".to_string(),
            ));
        }
        validate_schedule(&new.schedule_kind, new.schedule_cron.as_deref())?;
        self.store.get_database_target(new.database_target_id).await?;
        self.store.get_storage_target(new.storage_target_id).await?;
        for id in &new.catalog_object_ids {
            let object = self.store.get_catalog_object(*id).await?;
            if object.database_target_id != new.database_target_id {
                return Err(AppError::Validation(format!(
                    "catalog object {id} belongs to a different database target"
                )));
            }
        }
        self.store.create_backup_plan(new).await
    }

    pub async fn get_backup_plan(&self, id: Uuid) -> Result<BackupPlan> {
        self.store.get_backup_plan(id).await
    }

    pub async fn list_backup_plans(&self) -> Result<Vec<BackupPlan>> {
        self.store.list_backup_plans().await
    }

    pub async fn update_backup_plan(&self, id: Uuid, edit: PlanEdit) -> Result<BackupPlan> {
        let existing = self.store.get_backup_plan(id).await?;
        let schedule_kind = edit.schedule_kind.unwrap_or(existing.schedule_kind);
        if schedule_kind == ScheduleKind::Triggered {
            return Err(AppError::Validation(
                "backup plans cannot use the triggered schedule".to_string(),
            ));
        }
        let schedule_cron = edit.schedule_cron.or_else(|| existing.schedule_cron.clone());
        validate_schedule(&schedule_kind, schedule_cron.as_deref())?;

        let schedule_changed = schedule_kind != existing.schedule_kind
            || schedule_cron != existing.schedule_cron;
        let next_run = if schedule_changed {
            schedule::next_run(
                &schedule_kind,
                schedule_cron.as_deref(),
                existing.created_at,
                existing.last_run,
                Utc::now(),
            )?
        } else {
            existing.next_run
        };

        self.store
            .update_backup_plan(
                id,
                PlanUpdate {
                    name: edit.name.unwrap_or_else(|| existing.name.clone()),
                    description: edit.description.or_else(|| existing.description.clone()),
                    schedule_kind,
                    schedule_cron,
                    is_active: edit.is_active.unwrap_or(existing.is_active),
                    next_run,
                },
            )
            .await
    }

    pub async fn delete_backup_plan(&self, id: Uuid) -> Result<()> {
        self.store.delete_backup_plan(id).await
    }

    pub async fn list_backup_items(&self, plan_id: Uuid) -> Result<Vec<BackupItem>> {
        self.store.get_backup_plan(plan_id).await?;
        self.store.list_backup_items(plan_id).await
    }

    pub async fn set_backup_item_selected(
        &self,
        plan_id: Uuid,
        item_id: Uuid,
        is_selected: bool,
    ) -> Result<BackupItem> {
        self.store
            .set_backup_item_selected(plan_id, item_id, is_selected)
            .await
    }

    /// Create a job for the plan right away, outside its schedule. The
    /// evaluated `next_run` is cleared so the fresh job is immediately
    /// claimable and the plan re-enters evaluation once the job closes.
    pub async fn run_backup_plan_now(&self, id: Uuid) -> Result<BackupJob> {
        let plan = self.store.get_backup_plan(id).await?;
        if !plan.is_active {
            return Err(AppError::Validation(format!(
                "backup plan '{}' is inactive",
                plan.name
            )));
        }
        if self.store.has_active_backup_job(plan.id).await? {
            return Err(AppError::Conflict(format!(
                "backup plan '{}' already has an active job",
                plan.name
            )));
        }
        let items = self.store.list_selected_backup_items(plan.id).await?;
        if items.is_empty() {
            return Err(AppError::Validation(format!(
                "backup plan '{}' has no selected items",
                plan.name
            )));
        }
        let job = self.store.create_backup_job(plan.id, &items).await?;
        self.store.set_backup_plan_next_run(plan.id, None).await?;
        self.store
            .append_job_log(NewJobLog {
                job_kind: JobKind::Backup,
                job_id: job.id,
                item_status_id: None,
                severity: LogSeverity::Info,
                title: "Job created".to_string(),
                message: format!("run now with {} item(s)", items.len()),
            })
            .await?;
        Ok(job)
    }

    // ---------- restore plans ----------

    pub async fn create_restore_plan(&self, new: NewRestorePlan) -> Result<RestorePlan> {
        validate_schedule(&new.schedule_kind, new.schedule_cron.as_deref())?;
        self.store
            .get_backup_plan(new.source_backup_plan_id)
            .await?;
        self.store.get_database_target(new.database_target_id).await?;
        self.store.create_restore_plan(new).await
    }

    pub async fn get_restore_plan(&self, id: Uuid) -> Result<RestorePlan> {
        self.store.get_restore_plan(id).await
    }

    pub async fn list_restore_plans(&self) -> Result<Vec<RestorePlan>> {
        self.store.list_restore_plans().await
    }

    pub async fn update_restore_plan(&self, id: Uuid, edit: PlanEdit) -> Result<RestorePlan> {
        let existing = self.store.get_restore_plan(id).await?;
        let schedule_kind = edit.schedule_kind.unwrap_or(existing.schedule_kind);
        let schedule_cron = edit.schedule_cron.or_else(|| existing.schedule_cron.clone());
        validate_schedule(&schedule_kind, schedule_cron.as_deref())?;

        let schedule_changed = schedule_kind != existing.schedule_kind
            || schedule_cron != existing.schedule_cron;
        let next_run = if schedule_changed {
            schedule::next_run(
                &schedule_kind,
                schedule_cron.as_deref(),
                existing.created_at,
                existing.last_run,
                Utc::now(),
            )?
        } else {
            existing.next_run
        };

        self.store
            .update_restore_plan(
                id,
                PlanUpdate {
                    name: edit.name.unwrap_or_else(|| existing.name.clone()),
                    description: edit.description.or_else(|| existing.description.clone()),
                    schedule_kind,
                    schedule_cron,
                    is_active: edit.is_active.unwrap_or(existing.is_active),
                    next_run,
                },
            )
            .await
    }

    pub async fn delete_restore_plan(&self, id: Uuid) -> Result<()> {
        self.store.delete_restore_plan(id).await
    }

    /// Create a restore job right away from the source plan's current
    /// item selection.
    pub async fn run_restore_plan_now(&self, id: Uuid) -> Result<RestoreJob> {
        let plan = self.store.get_restore_plan(id).await?;
        if !plan.is_active {
            return Err(AppError::Validation(format!(
                "restore plan '{}' is inactive",
                plan.name
            )));
        }
        if self.store.has_active_restore_job(plan.id).await? {
            return Err(AppError::Conflict(format!(
                "restore plan '{}' already has an active job",
                plan.name
            )));
        }
        let items = self
            .store
            .list_selected_backup_items(plan.source_backup_plan_id)
            .await?;
        if items.is_empty() {
            return Err(AppError::Validation(format!(
                "restore plan '{}' has no items to restore; the source plan's selection is empty",
                plan.name
            )));
        }
        let job = self.store.create_restore_job(plan.id, &items).await?;
        self.store.set_restore_plan_next_run(plan.id, None).await?;
        self.store
            .append_job_log(NewJobLog {
                job_kind: JobKind::Restore,
                job_id: job.id,
                item_status_id: None,
                severity: LogSeverity::Info,
                title: "Job created".to_string(),
                message: format!("run now with {} item(s)", items.len()),
            })
            .await?;
        Ok(job)
    }
}

/// Reject schedules the evaluator could not work with later.
fn validate_schedule(kind: &ScheduleKind, cron: Option<&str>) -> Result<()> {
    match kind {
        ScheduleKind::Repeating => {
            let expr = cron.ok_or_else(|| {
                AppError::Validation("a repeating schedule needs a cron expression".to_string())
            })?;
            schedule::parse_cron(expr)?;
            Ok(())
        }
        ScheduleKind::OneTime | ScheduleKind::Triggered => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::{CatalogObject, ObjectKind};
    use crate::models::job::JobStatus;
    use crate::models::target::{DatabaseTarget, StorageKind, StorageTarget};
    use crate::scanner::ScannedObject;
    use crate::store::memory::MemoryStore;
    use crate::store::{NewDatabaseTarget, NewStorageTarget};

    async fn seed_targets(store: &MemoryStore) -> (DatabaseTarget, StorageTarget) {
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
        (target, storage)
    }

    async fn seed_catalog(store: &MemoryStore, target_id: Uuid) -> Vec<CatalogObject> {
        store
            .upsert_catalog_objects(
                target_id,
                vec![ScannedObject {
                    schema_name: "app".to_string(),
                    object_name: Some("users".to_string()),
                    kind: ObjectKind::TableData,
                    table_engine: Some("InnoDB".to_string()),
                    approx_rows: Some(100),
                }],
            )
            .await
            .unwrap()
    }

    fn plan_request(
        target: &DatabaseTarget,
        storage: &StorageTarget,
        objects: &[CatalogObject],
    ) -> NewBackupPlan {
        NewBackupPlan {
            name: "nightly".to_string(),
            description: None,
            database_target_id: target.id,
            storage_target_id: storage.id,
            schedule_kind: ScheduleKind::Repeating,
            schedule_cron: Some("0 3 * * *".to_string()),
            is_active: true,
            catalog_object_ids: objects.iter().map(|o| o.id).collect(),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_bad_cron() {
        let store = Arc::new(MemoryStore::new());
        let (target, storage) = seed_targets(&store).await;
        let objects = seed_catalog(&store, target.id).await;
        let svc = PlanService::new(store.clone());

        let mut req = plan_request(&target, &storage, &objects);
        req.schedule_cron = Some("not a cron".to_string());
        let err = svc.create_backup_plan(req).await.unwrap_err();
        assert!(matches!(err, AppError::ScheduleParse(_)));

        let mut req = plan_request(&target, &storage, &objects);
        req.schedule_cron = None;
        let err = svc.create_backup_plan(req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_triggered_backup_plan() {
        let store = Arc::new(MemoryStore::new());
        let (target, storage) = seed_targets(&store).await;
        let objects = seed_catalog(&store, target.id).await;
        let svc = PlanService::new(store.clone());

        let mut req = plan_request(&target, &storage, &objects);
        req.schedule_kind = ScheduleKind::Triggered;
        req.schedule_cron = None;
        let err = svc.create_backup_plan(req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_catalog_objects() {
        let store = Arc::new(MemoryStore::new());
        let (target, storage) = seed_targets(&store).await;
        let other = store
            .create_database_target(NewDatabaseTarget {
                name: "replica".to_string(),
                host: "db2.internal".to_string(),
                port: 3306,
                username: "backup".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();
        let foreign = seed_catalog(&store, other.id).await;
        let svc = PlanService::new(store.clone());

        let req = plan_request(&target, &storage, &foreign);
        let err = svc.create_backup_plan(req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_recomputes_next_run_only_on_schedule_change() {
        let store = Arc::new(MemoryStore::new());
        let (target, storage) = seed_targets(&store).await;
        let objects = seed_catalog(&store, target.id).await;
        let svc = PlanService::new(store.clone());

        let plan = svc
            .create_backup_plan(plan_request(&target, &storage, &objects))
            .await
            .unwrap();
        let evaluated = Utc::now() + chrono::Duration::hours(6);
        store
            .set_backup_plan_next_run(plan.id, Some(evaluated))
            .await
            .unwrap();

        // A rename keeps the evaluated time.
        let renamed = svc
            .update_backup_plan(
                plan.id,
                PlanEdit {
                    name: Some("nightly-eu".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.next_run, Some(evaluated));

        // A cron change recomputes it.
        let rescheduled = svc
            .update_backup_plan(
                plan.id,
                PlanEdit {
                    schedule_cron: Some("30 4 * * *".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let next = rescheduled.next_run.unwrap();
        assert_ne!(next, evaluated);
        assert!(next > Utc::now());
        assert_eq!(next.format("%H:%M").to_string(), "04:30");
    }

    #[tokio::test]
    async fn test_run_now_guards() {
        let store = Arc::new(MemoryStore::new());
        let (target, storage) = seed_targets(&store).await;
        let objects = seed_catalog(&store, target.id).await;
        let svc = PlanService::new(store.clone());

        let plan = svc
            .create_backup_plan(plan_request(&target, &storage, &objects))
            .await
            .unwrap();

        // First run-now succeeds and leaves the plan unscheduled.
        let job = svc.run_backup_plan_now(plan.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Created);
        let plan_after = store.get_backup_plan(plan.id).await.unwrap();
        assert_eq!(plan_after.next_run, None);

        // A second one conflicts while the job is active.
        let err = svc.run_backup_plan_now(plan.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Inactive plans are rejected outright.
        svc.update_backup_plan(
            plan.id,
            PlanEdit {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let err = svc.run_backup_plan_now(plan.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_restore_run_now_snapshots_source_selection() {
        let store = Arc::new(MemoryStore::new());
        let (target, storage) = seed_targets(&store).await;
        let objects = seed_catalog(&store, target.id).await;
        let svc = PlanService::new(store.clone());

        let backup = svc
            .create_backup_plan(plan_request(&target, &storage, &objects))
            .await
            .unwrap();
        let restore = svc
            .create_restore_plan(NewRestorePlan {
                name: "rehearsal".to_string(),
                description: None,
                source_backup_plan_id: backup.id,
                database_target_id: target.id,
                schedule_kind: ScheduleKind::OneTime,
                schedule_cron: None,
                is_active: true,
            })
            .await
            .unwrap();

        let job = svc.run_restore_plan_now(restore.id).await.unwrap();
        let items = store.list_restore_items(job.id).await.unwrap();
        assert_eq!(items.len(), 1);

        // Deselecting everything on the source makes run-now a 400.
        let source_items = store.list_backup_items(backup.id).await.unwrap();
        store
            .set_backup_item_selected(backup.id, source_items[0].id, false)
            .await
            .unwrap();
        store
            .update_restore_job_state(
                job.id,
                crate::store::RunStateUpdate {
                    status: JobStatus::Canceled,
                    retry_count: 0,
                    error_message: None,
                    started_at: None,
                    completed_at: Some(Utc::now()),
                },
            )
            .await
            .unwrap();
        let err = svc.run_restore_plan_now(restore.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_restore_plan_requires_existing_source() {
        let store = Arc::new(MemoryStore::new());
        let (target, _) = seed_targets(&store).await;
        let svc = PlanService::new(store.clone());

        let err = svc
            .create_restore_plan(NewRestorePlan {
                name: "rehearsal".to_string(),
                description: None,
                source_backup_plan_id: Uuid::new_v4(),
                database_target_id: target.id,
                schedule_kind: ScheduleKind::Triggered,
                schedule_cron: None,
                is_active: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
