//! Postgres-backed store.
//!
//! Implements [`EngineStore`] against the schema in `migrations/`.
//! Unique-key collisions surface as [`AppError::Conflict`] and missing
//! rows as [`AppError::NotFound`]; everything else propagates as a
//! database error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::catalog::CatalogObject;
use crate::models::job::{BackupItemStatus, BackupJob, JobKind, RestoreItem, RestoreJob};
use crate::models::job_log::JobLog;
use crate::models::plan::{BackupItem, BackupPlan, RestorePlan};
use crate::models::target::{DatabaseTarget, StorageTarget};
use crate::scanner::ScannedObject;
use crate::store::{
    EngineStore, JobFilter, NewBackupPlan, NewDatabaseTarget, NewJobLog, NewRestorePlan,
    NewStorageTarget, PlanUpdate, RunStateUpdate,
};

/// Postgres implementation of [`EngineStore`].
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EngineStore for PgStore {
    // -----------------------------------------------------------------------
    // Database targets
    // -----------------------------------------------------------------------

    async fn create_database_target(&self, new: NewDatabaseTarget) -> Result<DatabaseTarget> {
        let target: DatabaseTarget = sqlx::query_as(
            r#"
            INSERT INTO database_targets (name, host, port, username, password)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, host, port, username, password, created_at, updated_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.host)
        .bind(new.port)
        .bind(&new.username)
        .bind(&new.password)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if e.to_string().contains("duplicate key") {
                AppError::Conflict(format!("Database target '{}' already exists", new.name))
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(target)
    }

    async fn get_database_target(&self, id: Uuid) -> Result<DatabaseTarget> {
        let target: DatabaseTarget = sqlx::query_as(
            r#"
            SELECT id, name, host, port, username, password, created_at, updated_at
            FROM database_targets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Database target {id} not found")))?;

        Ok(target)
    }

    async fn list_database_targets(&self) -> Result<Vec<DatabaseTarget>> {
        let targets: Vec<DatabaseTarget> = sqlx::query_as(
            r#"
            SELECT id, name, host, port, username, password, created_at, updated_at
            FROM database_targets
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(targets)
    }

    async fn delete_database_target(&self, id: Uuid) -> Result<()> {
        let in_use: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM backup_plans WHERE database_target_id = $1)
                OR EXISTS(SELECT 1 FROM restore_plans WHERE database_target_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        if in_use {
            return Err(AppError::Conflict(format!(
                "Database target {id} is still referenced by one or more plans"
            )));
        }

        // Catalog objects go with the target via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM database_targets WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Database target {id} not found"
            )));
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Storage targets
    // -----------------------------------------------------------------------

    async fn create_storage_target(&self, new: NewStorageTarget) -> Result<StorageTarget> {
        let target: StorageTarget = sqlx::query_as(
            r#"
            INSERT INTO storage_targets (name, kind, local_path, s3_bucket, s3_region,
                                         s3_endpoint, s3_access_key, s3_secret_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, name, kind, local_path, s3_bucket, s3_region, s3_endpoint,
                      s3_access_key, s3_secret_key, created_at, updated_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.kind)
        .bind(&new.local_path)
        .bind(&new.s3_bucket)
        .bind(&new.s3_region)
        .bind(&new.s3_endpoint)
        .bind(&new.s3_access_key)
        .bind(&new.s3_secret_key)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if e.to_string().contains("duplicate key") {
                AppError::Conflict(format!("Storage target '{}' already exists", new.name))
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(target)
    }

    async fn get_storage_target(&self, id: Uuid) -> Result<StorageTarget> {
        let target: StorageTarget = sqlx::query_as(
            r#"
            SELECT id, name, kind, local_path, s3_bucket, s3_region, s3_endpoint,
                   s3_access_key, s3_secret_key, created_at, updated_at
            FROM storage_targets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Storage target {id} not found")))?;

        Ok(target)
    }

    async fn list_storage_targets(&self) -> Result<Vec<StorageTarget>> {
        let targets: Vec<StorageTarget> = sqlx::query_as(
            r#"
            SELECT id, name, kind, local_path, s3_bucket, s3_region, s3_endpoint,
                   s3_access_key, s3_secret_key, created_at, updated_at
            FROM storage_targets
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(targets)
    }

    async fn delete_storage_target(&self, id: Uuid) -> Result<()> {
        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM backup_plans WHERE storage_target_id = $1)",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        if in_use {
            return Err(AppError::Conflict(format!(
                "Storage target {id} is still referenced by one or more backup plans"
            )));
        }

        let result = sqlx::query("DELETE FROM storage_targets WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
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
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM database_targets WHERE id = $1)")
                .bind(database_target_id)
                .fetch_one(&self.db)
                .await?;

        if !exists {
            return Err(AppError::NotFound(format!(
                "Database target {database_target_id} not found"
            )));
        }

        let mut tx = self.db.begin().await?;
        let mut upserted = Vec::with_capacity(objects.len());

        // The conflict target matches the identity index; a re-scan keeps
        // existing ids stable and only refreshes the volatile columns.
        for obj in &objects {
            let row: CatalogObject = sqlx::query_as(
                r#"
                INSERT INTO catalog_objects (database_target_id, schema_name, object_name,
                                             kind, table_engine, approx_rows)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (database_target_id, schema_name, COALESCE(object_name, ''), kind)
                DO UPDATE SET table_engine = EXCLUDED.table_engine,
                              approx_rows = EXCLUDED.approx_rows
                RETURNING id, database_target_id, schema_name, object_name, kind,
                          table_engine, approx_rows, created_at
                "#,
            )
            .bind(database_target_id)
            .bind(&obj.schema_name)
            .bind(&obj.object_name)
            .bind(&obj.kind)
            .bind(&obj.table_engine)
            .bind(obj.approx_rows)
            .fetch_one(&mut *tx)
            .await?;

            upserted.push(row);
        }

        tx.commit().await?;

        Ok(upserted)
    }

    async fn list_catalog_objects(&self, database_target_id: Uuid) -> Result<Vec<CatalogObject>> {
        let objects: Vec<CatalogObject> = sqlx::query_as(
            r#"
            SELECT id, database_target_id, schema_name, object_name, kind,
                   table_engine, approx_rows, created_at
            FROM catalog_objects
            WHERE database_target_id = $1
            ORDER BY schema_name ASC, kind ASC, object_name ASC
            "#,
        )
        .bind(database_target_id)
        .fetch_all(&self.db)
        .await?;

        Ok(objects)
    }

    async fn get_catalog_object(&self, id: Uuid) -> Result<CatalogObject> {
        let object: CatalogObject = sqlx::query_as(
            r#"
            SELECT id, database_target_id, schema_name, object_name, kind,
                   table_engine, approx_rows, created_at
            FROM catalog_objects
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Catalog object {id} not found")))?;

        Ok(object)
    }

    // -----------------------------------------------------------------------
    // Backup plans
    // -----------------------------------------------------------------------

    async fn create_backup_plan(&self, new: NewBackupPlan) -> Result<BackupPlan> {
        let mut tx = self.db.begin().await?;

        let plan: BackupPlan = sqlx::query_as(
            r#"
            INSERT INTO backup_plans (name, description, database_target_id, storage_target_id,
                                      schedule_kind, schedule_cron, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, name, description, database_target_id, storage_target_id,
                      schedule_kind, schedule_cron, is_active, last_run, next_run,
                      created_at, updated_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.database_target_id)
        .bind(new.storage_target_id)
        .bind(&new.schedule_kind)
        .bind(&new.schedule_cron)
        .bind(new.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if e.to_string().contains("duplicate key") {
                AppError::Conflict(format!("Backup plan '{}' already exists", new.name))
            } else {
                AppError::Database(e)
            }
        })?;

        for (idx, object_id) in new.catalog_object_ids.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO backup_items (plan_id, catalog_object_id, is_selected, position)
                VALUES ($1, $2, true, $3)
                "#,
            )
            .bind(plan.id)
            .bind(object_id)
            .bind(idx as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(plan)
    }

    async fn get_backup_plan(&self, id: Uuid) -> Result<BackupPlan> {
        let plan: BackupPlan = sqlx::query_as(
            r#"
            SELECT id, name, description, database_target_id, storage_target_id,
                   schedule_kind, schedule_cron, is_active, last_run, next_run,
                   created_at, updated_at
            FROM backup_plans
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Backup plan {id} not found")))?;

        Ok(plan)
    }

    async fn list_backup_plans(&self) -> Result<Vec<BackupPlan>> {
        let plans: Vec<BackupPlan> = sqlx::query_as(
            r#"
            SELECT id, name, description, database_target_id, storage_target_id,
                   schedule_kind, schedule_cron, is_active, last_run, next_run,
                   created_at, updated_at
            FROM backup_plans
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(plans)
    }

    async fn update_backup_plan(&self, id: Uuid, update: PlanUpdate) -> Result<BackupPlan> {
        let plan: BackupPlan = sqlx::query_as(
            r#"
            UPDATE backup_plans
            SET name = $2, description = $3, schedule_kind = $4, schedule_cron = $5,
                is_active = $6, next_run = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, database_target_id, storage_target_id,
                      schedule_kind, schedule_cron, is_active, last_run, next_run,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(&update.schedule_kind)
        .bind(&update.schedule_cron)
        .bind(update.is_active)
        .bind(update.next_run)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            if e.to_string().contains("duplicate key") {
                AppError::Conflict(format!("Backup plan '{}' already exists", update.name))
            } else {
                AppError::Database(e)
            }
        })?
        .ok_or_else(|| AppError::NotFound(format!("Backup plan {id} not found")))?;

        Ok(plan)
    }

    async fn delete_backup_plan(&self, id: Uuid) -> Result<()> {
        let mut tx = self.db.begin().await?;

        // Logs are keyed by (kind, job id) without a foreign key, so they
        // are cleaned up by hand before the cascade removes the jobs.
        sqlx::query(
            r#"
            DELETE FROM job_logs
            WHERE job_kind = 'backup'
              AND job_id IN (SELECT id FROM backup_jobs WHERE plan_id = $1)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM job_logs
            WHERE job_kind = 'restore'
              AND job_id IN (
                  SELECT j.id FROM restore_jobs j
                  JOIN restore_plans p ON p.id = j.plan_id
                  WHERE p.source_backup_plan_id = $1
              )
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM backup_plans WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Backup plan {id} not found")));
        }

        tx.commit().await?;

        Ok(())
    }

    async fn list_unscheduled_backup_plans(&self) -> Result<Vec<BackupPlan>> {
        let plans: Vec<BackupPlan> = sqlx::query_as(
            r#"
            SELECT id, name, description, database_target_id, storage_target_id,
                   schedule_kind, schedule_cron, is_active, last_run, next_run,
                   created_at, updated_at
            FROM backup_plans
            WHERE is_active = true AND next_run IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(plans)
    }

    async fn set_backup_plan_next_run(
        &self,
        id: Uuid,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE backup_plans SET next_run = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(next_run)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Backup plan {id} not found")));
        }

        Ok(())
    }

    async fn complete_backup_plan_cycle(&self, id: Uuid, last_run: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE backup_plans
            SET last_run = $2, next_run = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(last_run)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Backup plan {id} not found")));
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Backup items
    // -----------------------------------------------------------------------

    async fn list_backup_items(&self, plan_id: Uuid) -> Result<Vec<BackupItem>> {
        let items: Vec<BackupItem> = sqlx::query_as(
            r#"
            SELECT id, plan_id, catalog_object_id, is_selected, position, created_at
            FROM backup_items
            WHERE plan_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(plan_id)
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    async fn list_selected_backup_items(&self, plan_id: Uuid) -> Result<Vec<BackupItem>> {
        let items: Vec<BackupItem> = sqlx::query_as(
            r#"
            SELECT id, plan_id, catalog_object_id, is_selected, position, created_at
            FROM backup_items
            WHERE plan_id = $1 AND is_selected = true
            ORDER BY position ASC
            "#,
        )
        .bind(plan_id)
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    async fn get_backup_item(&self, id: Uuid) -> Result<BackupItem> {
        let item: BackupItem = sqlx::query_as(
            r#"
            SELECT id, plan_id, catalog_object_id, is_selected, position, created_at
            FROM backup_items
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Backup item {id} not found")))?;

        Ok(item)
    }

    async fn set_backup_item_selected(
        &self,
        plan_id: Uuid,
        item_id: Uuid,
        is_selected: bool,
    ) -> Result<BackupItem> {
        let item: BackupItem = sqlx::query_as(
            r#"
            UPDATE backup_items
            SET is_selected = $3
            WHERE id = $2 AND plan_id = $1
            RETURNING id, plan_id, catalog_object_id, is_selected, position, created_at
            "#,
        )
        .bind(plan_id)
        .bind(item_id)
        .bind(is_selected)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Backup item {item_id} not found on plan {plan_id}"))
        })?;

        Ok(item)
    }

    // -----------------------------------------------------------------------
    // Restore plans
    // -----------------------------------------------------------------------

    async fn create_restore_plan(&self, new: NewRestorePlan) -> Result<RestorePlan> {
        let plan: RestorePlan = sqlx::query_as(
            r#"
            INSERT INTO restore_plans (name, description, source_backup_plan_id,
                                       database_target_id, schedule_kind, schedule_cron,
                                       is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, name, description, source_backup_plan_id, database_target_id,
                      schedule_kind, schedule_cron, is_active, last_run, next_run,
                      created_at, updated_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.source_backup_plan_id)
        .bind(new.database_target_id)
        .bind(&new.schedule_kind)
        .bind(&new.schedule_cron)
        .bind(new.is_active)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if e.to_string().contains("duplicate key") {
                AppError::Conflict(format!("Restore plan '{}' already exists", new.name))
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(plan)
    }

    async fn get_restore_plan(&self, id: Uuid) -> Result<RestorePlan> {
        let plan: RestorePlan = sqlx::query_as(
            r#"
            SELECT id, name, description, source_backup_plan_id, database_target_id,
                   schedule_kind, schedule_cron, is_active, last_run, next_run,
                   created_at, updated_at
            FROM restore_plans
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Restore plan {id} not found")))?;

        Ok(plan)
    }

    async fn list_restore_plans(&self) -> Result<Vec<RestorePlan>> {
        let plans: Vec<RestorePlan> = sqlx::query_as(
            r#"
            SELECT id, name, description, source_backup_plan_id, database_target_id,
                   schedule_kind, schedule_cron, is_active, last_run, next_run,
                   created_at, updated_at
            FROM restore_plans
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(plans)
    }

    async fn update_restore_plan(&self, id: Uuid, update: PlanUpdate) -> Result<RestorePlan> {
        let plan: RestorePlan = sqlx::query_as(
            r#"
            UPDATE restore_plans
            SET name = $2, description = $3, schedule_kind = $4, schedule_cron = $5,
                is_active = $6, next_run = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, source_backup_plan_id, database_target_id,
                      schedule_kind, schedule_cron, is_active, last_run, next_run,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(&update.schedule_kind)
        .bind(&update.schedule_cron)
        .bind(update.is_active)
        .bind(update.next_run)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            if e.to_string().contains("duplicate key") {
                AppError::Conflict(format!("Restore plan '{}' already exists", update.name))
            } else {
                AppError::Database(e)
            }
        })?
        .ok_or_else(|| AppError::NotFound(format!("Restore plan {id} not found")))?;

        Ok(plan)
    }

    async fn delete_restore_plan(&self, id: Uuid) -> Result<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM job_logs
            WHERE job_kind = 'restore'
              AND job_id IN (SELECT id FROM restore_jobs WHERE plan_id = $1)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM restore_plans WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Restore plan {id} not found")));
        }

        tx.commit().await?;

        Ok(())
    }

    async fn list_unscheduled_restore_plans(&self) -> Result<Vec<RestorePlan>> {
        let plans: Vec<RestorePlan> = sqlx::query_as(
            r#"
            SELECT id, name, description, source_backup_plan_id, database_target_id,
                   schedule_kind, schedule_cron, is_active, last_run, next_run,
                   created_at, updated_at
            FROM restore_plans
            WHERE is_active = true AND next_run IS NULL AND schedule_kind <> 'triggered'
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(plans)
    }

    async fn list_triggered_restore_plans(
        &self,
        source_backup_plan_id: Uuid,
    ) -> Result<Vec<RestorePlan>> {
        let plans: Vec<RestorePlan> = sqlx::query_as(
            r#"
            SELECT id, name, description, source_backup_plan_id, database_target_id,
                   schedule_kind, schedule_cron, is_active, last_run, next_run,
                   created_at, updated_at
            FROM restore_plans
            WHERE source_backup_plan_id = $1
              AND schedule_kind = 'triggered'
              AND is_active = true
            ORDER BY created_at ASC
            "#,
        )
        .bind(source_backup_plan_id)
        .fetch_all(&self.db)
        .await?;

        Ok(plans)
    }

    async fn set_restore_plan_next_run(
        &self,
        id: Uuid,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE restore_plans SET next_run = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(next_run)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Restore plan {id} not found")));
        }

        Ok(())
    }

    async fn complete_restore_plan_cycle(&self, id: Uuid, last_run: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE restore_plans
            SET last_run = $2, next_run = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(last_run)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Restore plan {id} not found")));
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Backup jobs
    // -----------------------------------------------------------------------

    async fn create_backup_job(&self, plan_id: Uuid, items: &[BackupItem]) -> Result<BackupJob> {
        let mut tx = self.db.begin().await?;

        // The partial unique index on (plan_id) for live statuses rejects
        // a second concurrent job for the same plan.
        let job: BackupJob = sqlx::query_as(
            r#"
            INSERT INTO backup_jobs (plan_id, status)
            VALUES ($1, 'created')
            RETURNING id, plan_id, status, has_triggered_restore, retry_count,
                      error_message, started_at, completed_at, created_at
            "#,
        )
        .bind(plan_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if e.to_string().contains("duplicate key") {
                AppError::Conflict(format!("Backup plan {plan_id} already has an active job"))
            } else {
                AppError::Database(e)
            }
        })?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO backup_item_statuses (job_id, catalog_object_id, position, status)
                VALUES ($1, $2, $3, 'waiting_to_run')
                "#,
            )
            .bind(job.id)
            .bind(item.catalog_object_id)
            .bind(item.position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(job)
    }

    async fn get_backup_job(&self, id: Uuid) -> Result<BackupJob> {
        let job: BackupJob = sqlx::query_as(
            r#"
            SELECT id, plan_id, status, has_triggered_restore, retry_count,
                   error_message, started_at, completed_at, created_at
            FROM backup_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Backup job {id} not found")))?;

        Ok(job)
    }

    async fn list_backup_jobs(&self, filter: JobFilter) -> Result<Vec<BackupJob>> {
        let jobs: Vec<BackupJob> = sqlx::query_as(
            r#"
            SELECT id, plan_id, status, has_triggered_restore, retry_count,
                   error_message, started_at, completed_at, created_at
            FROM backup_jobs
            WHERE ($1::uuid IS NULL OR plan_id = $1)
              AND ($2::job_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.plan_id)
        .bind(&filter.status)
        .fetch_all(&self.db)
        .await?;

        Ok(jobs)
    }

    async fn has_active_backup_job(&self, plan_id: Uuid) -> Result<bool> {
        let active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM backup_jobs
                WHERE plan_id = $1
                  AND status IN ('created', 'waiting_to_run', 'running')
            )
            "#,
        )
        .bind(plan_id)
        .fetch_one(&self.db)
        .await?;

        Ok(active)
    }

    async fn list_runnable_backup_jobs(&self, now: DateTime<Utc>) -> Result<Vec<BackupJob>> {
        let jobs: Vec<BackupJob> = sqlx::query_as(
            r#"
            SELECT j.id, j.plan_id, j.status, j.has_triggered_restore, j.retry_count,
                   j.error_message, j.started_at, j.completed_at, j.created_at
            FROM backup_jobs j
            JOIN backup_plans p ON p.id = j.plan_id
            WHERE j.status IN ('created', 'waiting_to_run')
              AND p.is_active = true
              AND (p.next_run IS NULL OR p.next_run <= $1)
            ORDER BY j.created_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.db)
        .await?;

        Ok(jobs)
    }

    async fn list_completed_untriggered_backup_jobs(&self) -> Result<Vec<BackupJob>> {
        let jobs: Vec<BackupJob> = sqlx::query_as(
            r#"
            SELECT id, plan_id, status, has_triggered_restore, retry_count,
                   error_message, started_at, completed_at, created_at
            FROM backup_jobs
            WHERE status = 'ran_to_completion' AND has_triggered_restore = false
            ORDER BY completed_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(jobs)
    }

    async fn mark_backup_job_triggered(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE backup_jobs SET has_triggered_restore = true WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Backup job {id} not found")));
        }

        Ok(())
    }

    async fn update_backup_job_state(
        &self,
        id: Uuid,
        update: RunStateUpdate,
    ) -> Result<BackupJob> {
        let job: BackupJob = sqlx::query_as(
            r#"
            UPDATE backup_jobs
            SET status = $2, retry_count = $3, error_message = $4,
                started_at = $5, completed_at = $6
            WHERE id = $1
            RETURNING id, plan_id, status, has_triggered_restore, retry_count,
                      error_message, started_at, completed_at, created_at
            "#,
        )
        .bind(id)
        .bind(&update.status)
        .bind(update.retry_count)
        .bind(&update.error_message)
        .bind(update.started_at)
        .bind(update.completed_at)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Backup job {id} not found")))?;

        Ok(job)
    }

    // -----------------------------------------------------------------------
    // Restore jobs
    // -----------------------------------------------------------------------

    async fn create_restore_job(
        &self,
        plan_id: Uuid,
        source_items: &[BackupItem],
    ) -> Result<RestoreJob> {
        let mut tx = self.db.begin().await?;

        let job: RestoreJob = sqlx::query_as(
            r#"
            INSERT INTO restore_jobs (plan_id, status)
            VALUES ($1, 'created')
            RETURNING id, plan_id, status, retry_count, error_message,
                      started_at, completed_at, created_at
            "#,
        )
        .bind(plan_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if e.to_string().contains("duplicate key") {
                AppError::Conflict(format!("Restore plan {plan_id} already has an active job"))
            } else {
                AppError::Database(e)
            }
        })?;

        for item in source_items {
            sqlx::query(
                r#"
                INSERT INTO restore_items (job_id, backup_item_id, position, status)
                VALUES ($1, $2, $3, 'waiting_to_run')
                "#,
            )
            .bind(job.id)
            .bind(item.id)
            .bind(item.position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(job)
    }

    async fn get_restore_job(&self, id: Uuid) -> Result<RestoreJob> {
        let job: RestoreJob = sqlx::query_as(
            r#"
            SELECT id, plan_id, status, retry_count, error_message,
                   started_at, completed_at, created_at
            FROM restore_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Restore job {id} not found")))?;

        Ok(job)
    }

    async fn list_restore_jobs(&self, filter: JobFilter) -> Result<Vec<RestoreJob>> {
        let jobs: Vec<RestoreJob> = sqlx::query_as(
            r#"
            SELECT id, plan_id, status, retry_count, error_message,
                   started_at, completed_at, created_at
            FROM restore_jobs
            WHERE ($1::uuid IS NULL OR plan_id = $1)
              AND ($2::job_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.plan_id)
        .bind(&filter.status)
        .fetch_all(&self.db)
        .await?;

        Ok(jobs)
    }

    async fn has_active_restore_job(&self, plan_id: Uuid) -> Result<bool> {
        let active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM restore_jobs
                WHERE plan_id = $1
                  AND status IN ('created', 'waiting_to_run', 'running')
            )
            "#,
        )
        .bind(plan_id)
        .fetch_one(&self.db)
        .await?;

        Ok(active)
    }

    async fn list_runnable_restore_jobs(&self, now: DateTime<Utc>) -> Result<Vec<RestoreJob>> {
        let jobs: Vec<RestoreJob> = sqlx::query_as(
            r#"
            SELECT j.id, j.plan_id, j.status, j.retry_count, j.error_message,
                   j.started_at, j.completed_at, j.created_at
            FROM restore_jobs j
            JOIN restore_plans p ON p.id = j.plan_id
            WHERE j.status IN ('created', 'waiting_to_run')
              AND p.is_active = true
              AND (p.next_run IS NULL OR p.next_run <= $1)
            ORDER BY j.created_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.db)
        .await?;

        Ok(jobs)
    }

    async fn update_restore_job_state(
        &self,
        id: Uuid,
        update: RunStateUpdate,
    ) -> Result<RestoreJob> {
        let job: RestoreJob = sqlx::query_as(
            r#"
            UPDATE restore_jobs
            SET status = $2, retry_count = $3, error_message = $4,
                started_at = $5, completed_at = $6
            WHERE id = $1
            RETURNING id, plan_id, status, retry_count, error_message,
                      started_at, completed_at, created_at
            "#,
        )
        .bind(id)
        .bind(&update.status)
        .bind(update.retry_count)
        .bind(&update.error_message)
        .bind(update.started_at)
        .bind(update.completed_at)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Restore job {id} not found")))?;

        Ok(job)
    }

    // -----------------------------------------------------------------------
    // Item statuses
    // -----------------------------------------------------------------------

    async fn list_backup_item_statuses(&self, job_id: Uuid) -> Result<Vec<BackupItemStatus>> {
        let statuses: Vec<BackupItemStatus> = sqlx::query_as(
            r#"
            SELECT id, job_id, catalog_object_id, position, status, retry_count,
                   error_message, started_at, completed_at, created_at
            FROM backup_item_statuses
            WHERE job_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.db)
        .await?;

        Ok(statuses)
    }

    async fn get_backup_item_status(&self, id: Uuid) -> Result<BackupItemStatus> {
        let status: BackupItemStatus = sqlx::query_as(
            r#"
            SELECT id, job_id, catalog_object_id, position, status, retry_count,
                   error_message, started_at, completed_at, created_at
            FROM backup_item_statuses
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Backup item status {id} not found")))?;

        Ok(status)
    }

    async fn update_backup_item_state(
        &self,
        id: Uuid,
        update: RunStateUpdate,
    ) -> Result<BackupItemStatus> {
        let status: BackupItemStatus = sqlx::query_as(
            r#"
            UPDATE backup_item_statuses
            SET status = $2, retry_count = $3, error_message = $4,
                started_at = $5, completed_at = $6
            WHERE id = $1
            RETURNING id, job_id, catalog_object_id, position, status, retry_count,
                      error_message, started_at, completed_at, created_at
            "#,
        )
        .bind(id)
        .bind(&update.status)
        .bind(update.retry_count)
        .bind(&update.error_message)
        .bind(update.started_at)
        .bind(update.completed_at)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Backup item status {id} not found")))?;

        Ok(status)
    }

    async fn list_restore_items(&self, job_id: Uuid) -> Result<Vec<RestoreItem>> {
        let items: Vec<RestoreItem> = sqlx::query_as(
            r#"
            SELECT id, job_id, backup_item_id, position, status, retry_count,
                   error_message, started_at, completed_at, created_at
            FROM restore_items
            WHERE job_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    async fn get_restore_item(&self, id: Uuid) -> Result<RestoreItem> {
        let item: RestoreItem = sqlx::query_as(
            r#"
            SELECT id, job_id, backup_item_id, position, status, retry_count,
                   error_message, started_at, completed_at, created_at
            FROM restore_items
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Restore item {id} not found")))?;

        Ok(item)
    }

    async fn update_restore_item_state(
        &self,
        id: Uuid,
        update: RunStateUpdate,
    ) -> Result<RestoreItem> {
        let item: RestoreItem = sqlx::query_as(
            r#"
            UPDATE restore_items
            SET status = $2, retry_count = $3, error_message = $4,
                started_at = $5, completed_at = $6
            WHERE id = $1
            RETURNING id, job_id, backup_item_id, position, status, retry_count,
                      error_message, started_at, completed_at, created_at
            "#,
        )
        .bind(id)
        .bind(&update.status)
        .bind(update.retry_count)
        .bind(&update.error_message)
        .bind(update.started_at)
        .bind(update.completed_at)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Restore item {id} not found")))?;

        Ok(item)
    }

    // -----------------------------------------------------------------------
    // Job logs
    // -----------------------------------------------------------------------

    async fn append_job_log(&self, entry: NewJobLog) -> Result<JobLog> {
        let log: JobLog = sqlx::query_as(
            r#"
            INSERT INTO job_logs (job_kind, job_id, item_status_id, severity, title, message)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, job_kind, job_id, item_status_id, severity, title, message, logged_at
            "#,
        )
        .bind(&entry.job_kind)
        .bind(entry.job_id)
        .bind(entry.item_status_id)
        .bind(&entry.severity)
        .bind(&entry.title)
        .bind(&entry.message)
        .fetch_one(&self.db)
        .await?;

        Ok(log)
    }

    async fn list_job_logs(&self, job_kind: JobKind, job_id: Uuid) -> Result<Vec<JobLog>> {
        let logs: Vec<JobLog> = sqlx::query_as(
            r#"
            SELECT id, job_kind, job_id, item_status_id, severity, title, message, logged_at
            FROM job_logs
            WHERE job_kind = $1 AND job_id = $2
            ORDER BY logged_at DESC
            "#,
        )
        .bind(job_kind)
        .bind(job_id)
        .fetch_all(&self.db)
        .await?;

        Ok(logs)
    }
}
