//! Catalog scans against live database targets.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::Result;
use crate::models::catalog::CatalogObject;
use crate::scanner::{self, mysql::MySqlMetadataSource};
use crate::store::EngineStore;

pub struct CatalogService {
    store: Arc<dyn EngineStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    /// Connect to the target, enumerate its backup-relevant objects and
    /// fold them into the stored catalog. Existing objects keep their
    /// ids so plan item references survive a re-scan.
    pub async fn scan_database_target(&self, id: Uuid) -> Result<Vec<CatalogObject>> {
        let target = self.store.get_database_target(id).await?;
        let source = MySqlMetadataSource::connect(&target).await?;
        let objects = scanner::scan(&source).await?;
        tracing::info!(
            target_id = %target.id,
            target = %target.name,
            objects = objects.len(),
            "Catalog scan finished"
        );
        self.store.upsert_catalog_objects(target.id, objects).await
    }

    pub async fn list_catalog_objects(&self, database_target_id: Uuid) -> Result<Vec<CatalogObject>> {
        self.store.get_database_target(database_target_id).await?;
        self.store.list_catalog_objects(database_target_id).await
    }
}
