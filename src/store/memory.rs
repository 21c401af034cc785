//! In-memory store.
//!
//! A complete [`EngineStore`] over plain vectors behind one `RwLock`.
//! Mirrors the relational semantics of the Postgres store, including
//! name uniqueness, delete cascades, the single-active-job rule, and
//! listing order, so the engine and its tests run without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::catalog::{CatalogObject, ObjectKind};
use crate::models::job::{
    BackupItemStatus, BackupJob, JobKind, JobStatus, RestoreItem, RestoreJob,
};
use crate::models::job_log::JobLog;
use crate::models::plan::{BackupItem, BackupPlan, RestorePlan, ScheduleKind};
use crate::models::target::{DatabaseTarget, StorageTarget};
use crate::scanner::ScannedObject;
use crate::schedule;
use crate::store::{
    EngineStore, JobFilter, NewBackupPlan, NewDatabaseTarget, NewJobLog, NewRestorePlan,
    NewStorageTarget, PlanUpdate, RunStateUpdate,
};

#[derive(Default)]
struct Inner {
    database_targets: Vec<DatabaseTarget>,
    storage_targets: Vec<StorageTarget>,
    catalog_objects: Vec<CatalogObject>,
    backup_plans: Vec<BackupPlan>,
    backup_items: Vec<BackupItem>,
    restore_plans: Vec<RestorePlan>,
    backup_jobs: Vec<BackupJob>,
    restore_jobs: Vec<RestoreJob>,
    backup_item_statuses: Vec<BackupItemStatus>,
    restore_items: Vec<RestoreItem>,
    job_logs: Vec<JobLog>,
}

/// In-memory implementation of [`EngineStore`].
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort rank matching the Postgres enum label order of `object_kind`.
fn kind_rank(kind: &ObjectKind) -> u8 {
    match kind {
        ObjectKind::TableStructure => 0,
        ObjectKind::TableData => 1,
        ObjectKind::View => 2,
        ObjectKind::Trigger => 3,
        ObjectKind::Event => 4,
        ObjectKind::FunctionProcedure => 5,
    }
}

#[async_trait]
impl EngineStore for MemoryStore {
    // -----------------------------------------------------------------------
    // Database targets
    // -----------------------------------------------------------------------

    async fn create_database_target(&self, new: NewDatabaseTarget) -> Result<DatabaseTarget> {
        let mut inner = self.inner.write().await;

        if inner.database_targets.iter().any(|t| t.name == new.name) {
            return Err(AppError::Conflict(format!(
                "Database target '{}' already exists",
                new.name
            )));
        }

        let now = Utc::now();
        let target = DatabaseTarget {
            id: Uuid::new_v4(),
            name: new.name,
            host: new.host,
            port: new.port,
            username: new.username,
            password: new.password,
            created_at: now,
            updated_at: now,
        };
        inner.database_targets.push(target.clone());

        Ok(target)
    }

    async fn get_database_target(&self, id: Uuid) -> Result<DatabaseTarget> {
        let inner = self.inner.read().await;
        inner
            .database_targets
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Database target {id} not found")))
    }

    async fn list_database_targets(&self) -> Result<Vec<DatabaseTarget>> {
        let inner = self.inner.read().await;
        let mut targets = inner.database_targets.clone();
        targets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(targets)
    }

    async fn delete_database_target(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;

        let in_use = inner
            .backup_plans
            .iter()
            .any(|p| p.database_target_id == id)
            || inner
                .restore_plans
                .iter()
                .any(|p| p.database_target_id == id);
        if in_use {
            return Err(AppError::Conflict(format!(
                "Database target {id} is still referenced by one or more plans"
            )));
        }

        let before = inner.database_targets.len();
        inner.database_targets.retain(|t| t.id != id);
        if inner.database_targets.len() == before {
            return Err(AppError::NotFound(format!(
                "Database target {id} not found"
            )));
        }

        inner.catalog_objects.retain(|c| c.database_target_id != id);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Storage targets
    // -----------------------------------------------------------------------

    async fn create_storage_target(&self, new: NewStorageTarget) -> Result<StorageTarget> {
        let mut inner = self.inner.write().await;

        if inner.storage_targets.iter().any(|t| t.name == new.name) {
            return Err(AppError::Conflict(format!(
                "Storage target '{}' already exists",
                new.name
            )));
        }

        let now = Utc::now();
        let target = StorageTarget {
            id: Uuid::new_v4(),
            name: new.name,
            kind: new.kind,
            local_path: new.local_path,
            s3_bucket: new.s3_bucket,
            s3_region: new.s3_region,
            s3_endpoint: new.s3_endpoint,
            s3_access_key: new.s3_access_key,
            s3_secret_key: new.s3_secret_key,
            created_at: now,
            updated_at: now,
        };
        inner.storage_targets.push(target.clone());

        Ok(target)
    }

    async fn get_storage_target(&self, id: Uuid) -> Result<StorageTarget> {
        let inner = self.inner.read().await;
        inner
            .storage_targets
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Storage target {id} not found")))
    }

    async fn list_storage_targets(&self) -> Result<Vec<StorageTarget>> {
        let inner = self.inner.read().await;
        let mut targets = inner.storage_targets.clone();
        targets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(targets)
    }

    async fn delete_storage_target(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;

        if inner.backup_plans.iter().any(|p| p.storage_target_id == id) {
            return Err(AppError::Conflict(format!(
                "Storage target {id} is still referenced by one or more backup plans"
            )));
        }

        let before = inner.storage_targets.len();
        inner.storage_targets.retain(|t| t.id != id);
        if inner.storage_targets.len() == before {
            return Err(AppError::NotFound(format!("Storage target {id} not found")));
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Catalog
    // -----------------------------------------------------------------------

    async fn upsert_catalog_objects(
        &self,
        database_target_id: Uuid,
        objects: Vec<ScannedObject>,
    ) -> Result<Vec<CatalogObject>> {
        let mut inner = self.inner.write().await;

        if !inner
            .database_targets
            .iter()
            .any(|t| t.id == database_target_id)
        {
            return Err(AppError::NotFound(format!(
                "Database target {database_target_id} not found"
            )));
        }

        let mut upserted = Vec::with_capacity(objects.len());
        for obj in objects {
            let existing = inner.catalog_objects.iter_mut().find(|c| {
                c.database_target_id == database_target_id
                    && c.schema_name == obj.schema_name
                    && c.object_name == obj.object_name
                    && c.kind == obj.kind
            });
            match existing {
                Some(row) => {
                    row.table_engine = obj.table_engine;
                    row.approx_rows = obj.approx_rows;
                    upserted.push(row.clone());
                }
                None => {
                    let row = CatalogObject {
                        id: Uuid::new_v4(),
                        database_target_id,
                        schema_name: obj.schema_name,
                        object_name: obj.object_name,
                        kind: obj.kind,
                        table_engine: obj.table_engine,
                        approx_rows: obj.approx_rows,
                        created_at: Utc::now(),
                    };
                    inner.catalog_objects.push(row.clone());
                    upserted.push(row);
                }
            }
        }

        Ok(upserted)
    }

    async fn list_catalog_objects(&self, database_target_id: Uuid) -> Result<Vec<CatalogObject>> {
        let inner = self.inner.read().await;
        let mut objects: Vec<CatalogObject> = inner
            .catalog_objects
            .iter()
            .filter(|c| c.database_target_id == database_target_id)
            .cloned()
            .collect();
        objects.sort_by(|a, b| {
            a.schema_name
                .cmp(&b.schema_name)
                .then_with(|| kind_rank(&a.kind).cmp(&kind_rank(&b.kind)))
                .then_with(|| a.object_name.cmp(&b.object_name))
        });
        Ok(objects)
    }

    async fn get_catalog_object(&self, id: Uuid) -> Result<CatalogObject> {
        let inner = self.inner.read().await;
        inner
            .catalog_objects
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Catalog object {id} not found")))
    }

    // -----------------------------------------------------------------------
    // Backup plans
    // -----------------------------------------------------------------------

    async fn create_backup_plan(&self, new: NewBackupPlan) -> Result<BackupPlan> {
        let mut inner = self.inner.write().await;

        if inner.backup_plans.iter().any(|p| p.name == new.name) {
            return Err(AppError::Conflict(format!(
                "Backup plan '{}' already exists",
                new.name
            )));
        }

        let now = Utc::now();
        let plan = BackupPlan {
            id: Uuid::new_v4(),
            name: new.name,
            description: new.description,
            database_target_id: new.database_target_id,
            storage_target_id: new.storage_target_id,
            schedule_kind: new.schedule_kind,
            schedule_cron: new.schedule_cron,
            is_active: new.is_active,
            last_run: None,
            next_run: None,
            created_at: now,
            updated_at: now,
        };
        inner.backup_plans.push(plan.clone());

        for (idx, object_id) in new.catalog_object_ids.iter().enumerate() {
            inner.backup_items.push(BackupItem {
                id: Uuid::new_v4(),
                plan_id: plan.id,
                catalog_object_id: *object_id,
                is_selected: true,
                position: idx as i32,
                created_at: now,
            });
        }

        Ok(plan)
    }

    async fn get_backup_plan(&self, id: Uuid) -> Result<BackupPlan> {
        let inner = self.inner.read().await;
        inner
            .backup_plans
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Backup plan {id} not found")))
    }

    async fn list_backup_plans(&self) -> Result<Vec<BackupPlan>> {
        let inner = self.inner.read().await;
        let mut plans = inner.backup_plans.clone();
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    async fn update_backup_plan(&self, id: Uuid, update: PlanUpdate) -> Result<BackupPlan> {
        let mut inner = self.inner.write().await;

        if inner
            .backup_plans
            .iter()
            .any(|p| p.name == update.name && p.id != id)
        {
            return Err(AppError::Conflict(format!(
                "Backup plan '{}' already exists",
                update.name
            )));
        }

        let plan = inner
            .backup_plans
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Backup plan {id} not found")))?;

        plan.name = update.name;
        plan.description = update.description;
        plan.schedule_kind = update.schedule_kind;
        plan.schedule_cron = update.schedule_cron;
        plan.is_active = update.is_active;
        plan.next_run = update.next_run;
        plan.updated_at = Utc::now();

        Ok(plan.clone())
    }

    async fn delete_backup_plan(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;

        if !inner.backup_plans.iter().any(|p| p.id == id) {
            return Err(AppError::NotFound(format!("Backup plan {id} not found")));
        }

        let backup_job_ids: Vec<Uuid> = inner
            .backup_jobs
            .iter()
            .filter(|j| j.plan_id == id)
            .map(|j| j.id)
            .collect();
        let restore_plan_ids: Vec<Uuid> = inner
            .restore_plans
            .iter()
            .filter(|p| p.source_backup_plan_id == id)
            .map(|p| p.id)
            .collect();
        let restore_job_ids: Vec<Uuid> = inner
            .restore_jobs
            .iter()
            .filter(|j| restore_plan_ids.contains(&j.plan_id))
            .map(|j| j.id)
            .collect();

        inner.job_logs.retain(|l| {
            !(l.job_kind == JobKind::Backup && backup_job_ids.contains(&l.job_id))
                && !(l.job_kind == JobKind::Restore && restore_job_ids.contains(&l.job_id))
        });
        inner
            .backup_item_statuses
            .retain(|s| !backup_job_ids.contains(&s.job_id));
        inner
            .restore_items
            .retain(|i| !restore_job_ids.contains(&i.job_id));
        inner.backup_jobs.retain(|j| j.plan_id != id);
        inner
            .restore_jobs
            .retain(|j| !restore_plan_ids.contains(&j.plan_id));
        inner
            .restore_plans
            .retain(|p| p.source_backup_plan_id != id);
        inner.backup_items.retain(|i| i.plan_id != id);
        inner.backup_plans.retain(|p| p.id != id);

        Ok(())
    }

    async fn list_unscheduled_backup_plans(&self) -> Result<Vec<BackupPlan>> {
        let inner = self.inner.read().await;
        Ok(inner
            .backup_plans
            .iter()
            .filter(|p| p.is_active && p.next_run.is_none())
            .cloned()
            .collect())
    }

    async fn set_backup_plan_next_run(
        &self,
        id: Uuid,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let plan = inner
            .backup_plans
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Backup plan {id} not found")))?;
        plan.next_run = next_run;
        plan.updated_at = Utc::now();
        Ok(())
    }

    async fn complete_backup_plan_cycle(&self, id: Uuid, last_run: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let plan = inner
            .backup_plans
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Backup plan {id} not found")))?;
        plan.last_run = Some(last_run);
        plan.next_run = None;
        plan.updated_at = Utc::now();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Backup items
    // -----------------------------------------------------------------------

    async fn list_backup_items(&self, plan_id: Uuid) -> Result<Vec<BackupItem>> {
        let inner = self.inner.read().await;
        let mut items: Vec<BackupItem> = inner
            .backup_items
            .iter()
            .filter(|i| i.plan_id == plan_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.position);
        Ok(items)
    }

    async fn list_selected_backup_items(&self, plan_id: Uuid) -> Result<Vec<BackupItem>> {
        let inner = self.inner.read().await;
        let mut items: Vec<BackupItem> = inner
            .backup_items
            .iter()
            .filter(|i| i.plan_id == plan_id && i.is_selected)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.position);
        Ok(items)
    }

    async fn get_backup_item(&self, id: Uuid) -> Result<BackupItem> {
        let inner = self.inner.read().await;
        inner
            .backup_items
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Backup item {id} not found")))
    }

    async fn set_backup_item_selected(
        &self,
        plan_id: Uuid,
        item_id: Uuid,
        is_selected: bool,
    ) -> Result<BackupItem> {
        let mut inner = self.inner.write().await;
        let item = inner
            .backup_items
            .iter_mut()
            .find(|i| i.id == item_id && i.plan_id == plan_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("Backup item {item_id} not found on plan {plan_id}"))
            })?;
        item.is_selected = is_selected;
        Ok(item.clone())
    }

    // -----------------------------------------------------------------------
    // Restore plans
    // -----------------------------------------------------------------------

    async fn create_restore_plan(&self, new: NewRestorePlan) -> Result<RestorePlan> {
        let mut inner = self.inner.write().await;

        if inner.restore_plans.iter().any(|p| p.name == new.name) {
            return Err(AppError::Conflict(format!(
                "Restore plan '{}' already exists",
                new.name
            )));
        }

        let now = Utc::now();
        let plan = RestorePlan {
            id: Uuid::new_v4(),
            name: new.name,
            description: new.description,
            source_backup_plan_id: new.source_backup_plan_id,
            database_target_id: new.database_target_id,
            schedule_kind: new.schedule_kind,
            schedule_cron: new.schedule_cron,
            is_active: new.is_active,
            last_run: None,
            next_run: None,
            created_at: now,
            updated_at: now,
        };
        inner.restore_plans.push(plan.clone());

        Ok(plan)
    }

    async fn get_restore_plan(&self, id: Uuid) -> Result<RestorePlan> {
        let inner = self.inner.read().await;
        inner
            .restore_plans
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Restore plan {id} not found")))
    }

    async fn list_restore_plans(&self) -> Result<Vec<RestorePlan>> {
        let inner = self.inner.read().await;
        let mut plans = inner.restore_plans.clone();
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    async fn update_restore_plan(&self, id: Uuid, update: PlanUpdate) -> Result<RestorePlan> {
        let mut inner = self.inner.write().await;

        if inner
            .restore_plans
            .iter()
            .any(|p| p.name == update.name && p.id != id)
        {
            return Err(AppError::Conflict(format!(
                "Restore plan '{}' already exists",
                update.name
            )));
        }

        let plan = inner
            .restore_plans
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Restore plan {id} not found")))?;

        plan.name = update.name;
        plan.description = update.description;
        plan.schedule_kind = update.schedule_kind;
        plan.schedule_cron = update.schedule_cron;
        plan.is_active = update.is_active;
        plan.next_run = update.next_run;
        plan.updated_at = Utc::now();

        Ok(plan.clone())
    }

    async fn delete_restore_plan(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;

        if !inner.restore_plans.iter().any(|p| p.id == id) {
            return Err(AppError::NotFound(format!("Restore plan {id} not found")));
        }

        let job_ids: Vec<Uuid> = inner
            .restore_jobs
            .iter()
            .filter(|j| j.plan_id == id)
            .map(|j| j.id)
            .collect();

        inner
            .job_logs
            .retain(|l| !(l.job_kind == JobKind::Restore && job_ids.contains(&l.job_id)));
        inner.restore_items.retain(|i| !job_ids.contains(&i.job_id));
        inner.restore_jobs.retain(|j| j.plan_id != id);
        inner.restore_plans.retain(|p| p.id != id);

        Ok(())
    }

    async fn list_unscheduled_restore_plans(&self) -> Result<Vec<RestorePlan>> {
        let inner = self.inner.read().await;
        Ok(inner
            .restore_plans
            .iter()
            .filter(|p| {
                p.is_active && p.next_run.is_none() && p.schedule_kind != ScheduleKind::Triggered
            })
            .cloned()
            .collect())
    }

    async fn list_triggered_restore_plans(
        &self,
        source_backup_plan_id: Uuid,
    ) -> Result<Vec<RestorePlan>> {
        let inner = self.inner.read().await;
        Ok(inner
            .restore_plans
            .iter()
            .filter(|p| {
                p.source_backup_plan_id == source_backup_plan_id
                    && p.schedule_kind == ScheduleKind::Triggered
                    && p.is_active
            })
            .cloned()
            .collect())
    }

    async fn set_restore_plan_next_run(
        &self,
        id: Uuid,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let plan = inner
            .restore_plans
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Restore plan {id} not found")))?;
        plan.next_run = next_run;
        plan.updated_at = Utc::now();
        Ok(())
    }

    async fn complete_restore_plan_cycle(&self, id: Uuid, last_run: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let plan = inner
            .restore_plans
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Restore plan {id} not found")))?;
        plan.last_run = Some(last_run);
        plan.next_run = None;
        plan.updated_at = Utc::now();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Backup jobs
    // -----------------------------------------------------------------------

    async fn create_backup_job(&self, plan_id: Uuid, items: &[BackupItem]) -> Result<BackupJob> {
        let mut inner = self.inner.write().await;

        if inner
            .backup_jobs
            .iter()
            .any(|j| j.plan_id == plan_id && !j.status.is_terminal())
        {
            return Err(AppError::Conflict(format!(
                "Backup plan {plan_id} already has an active job"
            )));
        }

        let now = Utc::now();
        let job = BackupJob {
            id: Uuid::new_v4(),
            plan_id,
            status: JobStatus::Created,
            has_triggered_restore: false,
            retry_count: 0,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
        };
        inner.backup_jobs.push(job.clone());

        for item in items {
            inner.backup_item_statuses.push(BackupItemStatus {
                id: Uuid::new_v4(),
                job_id: job.id,
                catalog_object_id: item.catalog_object_id,
                position: item.position,
                status: JobStatus::WaitingToRun,
                retry_count: 0,
                error_message: None,
                started_at: None,
                completed_at: None,
                created_at: now,
            });
        }

        Ok(job)
    }

    async fn get_backup_job(&self, id: Uuid) -> Result<BackupJob> {
        let inner = self.inner.read().await;
        inner
            .backup_jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Backup job {id} not found")))
    }

    async fn list_backup_jobs(&self, filter: JobFilter) -> Result<Vec<BackupJob>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<BackupJob> = inner
            .backup_jobs
            .iter()
            .filter(|j| filter.plan_id.map_or(true, |id| j.plan_id == id))
            .filter(|j| filter.status.as_ref().map_or(true, |s| &j.status == s))
            .cloned()
            .collect();
        jobs.reverse();
        Ok(jobs)
    }

    async fn has_active_backup_job(&self, plan_id: Uuid) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .backup_jobs
            .iter()
            .any(|j| j.plan_id == plan_id && !j.status.is_terminal()))
    }

    async fn list_runnable_backup_jobs(&self, now: DateTime<Utc>) -> Result<Vec<BackupJob>> {
        let inner = self.inner.read().await;
        Ok(inner
            .backup_jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Created | JobStatus::WaitingToRun))
            .filter(|j| {
                inner
                    .backup_plans
                    .iter()
                    .find(|p| p.id == j.plan_id)
                    .map(|p| schedule::is_due(p.is_active, p.next_run, now))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn list_completed_untriggered_backup_jobs(&self) -> Result<Vec<BackupJob>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<BackupJob> = inner
            .backup_jobs
            .iter()
            .filter(|j| j.status == JobStatus::RanToCompletion && !j.has_triggered_restore)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.completed_at);
        Ok(jobs)
    }

    async fn mark_backup_job_triggered(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        let job = inner
            .backup_jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Backup job {id} not found")))?;
        job.has_triggered_restore = true;
        Ok(())
    }

    async fn update_backup_job_state(
        &self,
        id: Uuid,
        update: RunStateUpdate,
    ) -> Result<BackupJob> {
        let mut inner = self.inner.write().await;
        let job = inner
            .backup_jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Backup job {id} not found")))?;
        job.status = update.status;
        job.retry_count = update.retry_count;
        job.error_message = update.error_message;
        job.started_at = update.started_at;
        job.completed_at = update.completed_at;
        Ok(job.clone())
    }

    // -----------------------------------------------------------------------
    // Restore jobs
    // -----------------------------------------------------------------------

    async fn create_restore_job(
        &self,
        plan_id: Uuid,
        source_items: &[BackupItem],
    ) -> Result<RestoreJob> {
        let mut inner = self.inner.write().await;

        if inner
            .restore_jobs
            .iter()
            .any(|j| j.plan_id == plan_id && !j.status.is_terminal())
        {
            return Err(AppError::Conflict(format!(
                "Restore plan {plan_id} already has an active job"
            )));
        }

        let now = Utc::now();
        let job = RestoreJob {
            id: Uuid::new_v4(),
            plan_id,
            status: JobStatus::Created,
            retry_count: 0,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
        };
        inner.restore_jobs.push(job.clone());

        for item in source_items {
            inner.restore_items.push(RestoreItem {
                id: Uuid::new_v4(),
                job_id: job.id,
                backup_item_id: item.id,
                position: item.position,
                status: JobStatus::WaitingToRun,
                retry_count: 0,
                error_message: None,
                started_at: None,
                completed_at: None,
                created_at: now,
            });
        }

        Ok(job)
    }

    async fn get_restore_job(&self, id: Uuid) -> Result<RestoreJob> {
        let inner = self.inner.read().await;
        inner
            .restore_jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Restore job {id} not found")))
    }

    async fn list_restore_jobs(&self, filter: JobFilter) -> Result<Vec<RestoreJob>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<RestoreJob> = inner
            .restore_jobs
            .iter()
            .filter(|j| filter.plan_id.map_or(true, |id| j.plan_id == id))
            .filter(|j| filter.status.as_ref().map_or(true, |s| &j.status == s))
            .cloned()
            .collect();
        jobs.reverse();
        Ok(jobs)
    }

    async fn has_active_restore_job(&self, plan_id: Uuid) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .restore_jobs
            .iter()
            .any(|j| j.plan_id == plan_id && !j.status.is_terminal()))
    }

    async fn list_runnable_restore_jobs(&self, now: DateTime<Utc>) -> Result<Vec<RestoreJob>> {
        let inner = self.inner.read().await;
        Ok(inner
            .restore_jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Created | JobStatus::WaitingToRun))
            .filter(|j| {
                inner
                    .restore_plans
                    .iter()
                    .find(|p| p.id == j.plan_id)
                    .map(|p| schedule::is_due(p.is_active, p.next_run, now))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn update_restore_job_state(
        &self,
        id: Uuid,
        update: RunStateUpdate,
    ) -> Result<RestoreJob> {
        let mut inner = self.inner.write().await;
        let job = inner
            .restore_jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Restore job {id} not found")))?;
        job.status = update.status;
        job.retry_count = update.retry_count;
        job.error_message = update.error_message;
        job.started_at = update.started_at;
        job.completed_at = update.completed_at;
        Ok(job.clone())
    }

    // -----------------------------------------------------------------------
    // Item statuses
    // -----------------------------------------------------------------------

    async fn list_backup_item_statuses(&self, job_id: Uuid) -> Result<Vec<BackupItemStatus>> {
        let inner = self.inner.read().await;
        let mut statuses: Vec<BackupItemStatus> = inner
            .backup_item_statuses
            .iter()
            .filter(|s| s.job_id == job_id)
            .cloned()
            .collect();
        statuses.sort_by_key(|s| s.position);
        Ok(statuses)
    }

    async fn get_backup_item_status(&self, id: Uuid) -> Result<BackupItemStatus> {
        let inner = self.inner.read().await;
        inner
            .backup_item_statuses
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Backup item status {id} not found")))
    }

    async fn update_backup_item_state(
        &self,
        id: Uuid,
        update: RunStateUpdate,
    ) -> Result<BackupItemStatus> {
        let mut inner = self.inner.write().await;
        let status = inner
            .backup_item_statuses
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Backup item status {id} not found")))?;
        status.status = update.status;
        status.retry_count = update.retry_count;
        status.error_message = update.error_message;
        status.started_at = update.started_at;
        status.completed_at = update.completed_at;
        Ok(status.clone())
    }

    async fn list_restore_items(&self, job_id: Uuid) -> Result<Vec<RestoreItem>> {
        let inner = self.inner.read().await;
        let mut items: Vec<RestoreItem> = inner
            .restore_items
            .iter()
            .filter(|i| i.job_id == job_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.position);
        Ok(items)
    }

    async fn get_restore_item(&self, id: Uuid) -> Result<RestoreItem> {
        let inner = self.inner.read().await;
        inner
            .restore_items
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Restore item {id} not found")))
    }

    async fn update_restore_item_state(
        &self,
        id: Uuid,
        update: RunStateUpdate,
    ) -> Result<RestoreItem> {
        let mut inner = self.inner.write().await;
        let item = inner
            .restore_items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Restore item {id} not found")))?;
        item.status = update.status;
        item.retry_count = update.retry_count;
        item.error_message = update.error_message;
        item.started_at = update.started_at;
        item.completed_at = update.completed_at;
        Ok(item.clone())
    }

    // -----------------------------------------------------------------------
    // Job logs
    // -----------------------------------------------------------------------

    async fn append_job_log(&self, entry: NewJobLog) -> Result<JobLog> {
        let mut inner = self.inner.write().await;
        let log = JobLog {
            id: Uuid::new_v4(),
            job_kind: entry.job_kind,
            job_id: entry.job_id,
            item_status_id: entry.item_status_id,
            severity: entry.severity,
            title: entry.title,
            message: entry.message,
            logged_at: Utc::now(),
        };
        inner.job_logs.push(log.clone());
        Ok(log)
    }

    async fn list_job_logs(&self, job_kind: JobKind, job_id: Uuid) -> Result<Vec<JobLog>> {
        let inner = self.inner.read().await;
        let mut logs: Vec<JobLog> = inner
            .job_logs
            .iter()
            .filter(|l| l.job_kind == job_kind && l.job_id == job_id)
            .cloned()
            .collect();
        logs.reverse();
        Ok(logs)
    }
}
