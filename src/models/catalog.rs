//! Catalog object model: schema objects discovered on a database target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Kind of schema object a backup unit covers.
///
/// Base tables contribute two kinds (structure and data are dumped and
/// restored separately); triggers, events, and stored routines are
/// schema-scoped and dumped once per schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "object_kind", rename_all = "snake_case")]
pub enum ObjectKind {
    TableStructure,
    TableData,
    View,
    Trigger,
    Event,
    FunctionProcedure,
}

impl ObjectKind {
    /// Schema-scoped kinds carry no object name; one catalog entry covers
    /// every object of that kind in the schema.
    pub fn is_schema_scoped(&self) -> bool {
        matches!(
            self,
            ObjectKind::Trigger | ObjectKind::Event | ObjectKind::FunctionProcedure
        )
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::TableStructure => write!(f, "table_structure"),
            ObjectKind::TableData => write!(f, "table_data"),
            ObjectKind::View => write!(f, "view"),
            ObjectKind::Trigger => write!(f, "trigger"),
            ObjectKind::Event => write!(f, "event"),
            ObjectKind::FunctionProcedure => write!(f, "function_procedure"),
        }
    }
}

/// Catalog object entity.
///
/// One row per backup unit discovered by a scan of a database target.
/// Identity within a target is (schema_name, object_name, kind);
/// `object_name` is NULL for schema-scoped kinds.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct CatalogObject {
    pub id: Uuid,
    pub database_target_id: Uuid,
    pub schema_name: String,
    pub object_name: Option<String>,
    pub kind: ObjectKind,
    pub table_engine: Option<String>,
    pub approx_rows: Option<i64>,
    pub created_at: DateTime<Utc>,
}
