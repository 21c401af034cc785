//! Catalog scanner.
//!
//! Classifies the metadata listings of a database target into typed
//! catalog objects: base tables split into a structure object and a data
//! object, views stay single, and triggers/events/routines collapse to
//! one schema-scoped object per distinct schema because the dump tool
//! captures those per schema, not per object.

pub mod mysql;

use crate::error::Result;
use crate::models::catalog::ObjectKind;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Schemas that are never eligible for backup.
pub const SYSTEM_SCHEMAS: [&str; 4] = ["mysql", "information_schema", "performance_schema", "sys"];

pub fn is_system_schema(schema: &str) -> bool {
    SYSTEM_SCHEMAS.contains(&schema)
}

/// One row of the tables/views listing.
#[derive(Debug, Clone)]
pub struct TableListing {
    pub schema: String,
    pub name: String,
    pub is_base_table: bool,
    pub engine: Option<String>,
    pub approx_rows: Option<i64>,
}

/// A catalog object discovered by a scan, before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedObject {
    pub schema_name: String,
    pub object_name: Option<String>,
    pub kind: ObjectKind,
    pub table_engine: Option<String>,
    pub approx_rows: Option<i64>,
}

/// Read-only metadata queries against one database target.
///
/// Listings come back unfiltered and undeduplicated; classification is
/// the scanner's job. Implementations map their query errors to
/// `AppError::ScanFailure`.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn tables_and_views(&self) -> Result<Vec<TableListing>>;
    async fn trigger_schemas(&self) -> Result<Vec<String>>;
    async fn event_schemas(&self) -> Result<Vec<String>>;
    async fn routine_schemas(&self) -> Result<Vec<String>>;
}

/// Run a full scan.
///
/// All four listings are fetched first; any failure aborts the scan
/// with no partial result.
pub async fn scan(source: &dyn MetadataSource) -> Result<Vec<ScannedObject>> {
    let tables = source.tables_and_views().await?;
    let triggers = source.trigger_schemas().await?;
    let events = source.event_schemas().await?;
    let routines = source.routine_schemas().await?;

    let mut objects = Vec::new();

    for table in tables {
        if is_system_schema(&table.schema) {
            continue;
        }
        if table.is_base_table {
            objects.push(ScannedObject {
                schema_name: table.schema.clone(),
                object_name: Some(table.name.clone()),
                kind: ObjectKind::TableStructure,
                table_engine: table.engine.clone(),
                approx_rows: None,
            });
            objects.push(ScannedObject {
                schema_name: table.schema,
                object_name: Some(table.name),
                kind: ObjectKind::TableData,
                table_engine: None,
                approx_rows: table.approx_rows,
            });
        } else {
            objects.push(ScannedObject {
                schema_name: table.schema,
                object_name: Some(table.name),
                kind: ObjectKind::View,
                table_engine: None,
                approx_rows: None,
            });
        }
    }

    objects.extend(schema_scoped(triggers, ObjectKind::Trigger));
    objects.extend(schema_scoped(events, ObjectKind::Event));
    objects.extend(schema_scoped(routines, ObjectKind::FunctionProcedure));

    Ok(objects)
}

/// Collapse a raw schema listing to one object per distinct schema.
fn schema_scoped(schemas: Vec<String>, kind: ObjectKind) -> Vec<ScannedObject> {
    schemas
        .into_iter()
        .filter(|s| !is_system_schema(s))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|schema| ScannedObject {
            schema_name: schema,
            object_name: None,
            kind: kind.clone(),
            table_engine: None,
            approx_rows: None,
        })
        .collect()
}
