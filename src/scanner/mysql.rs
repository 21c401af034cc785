//! Metadata source backed by a live MySQL server's information_schema.

use crate::db;
use crate::error::{AppError, Result};
use crate::models::target::DatabaseTarget;
use async_trait::async_trait;
use sqlx::MySqlPool;

use super::{MetadataSource, TableListing};

/// Queries `information_schema` over a short-lived pool on the target.
pub struct MySqlMetadataSource {
    pool: MySqlPool,
}

impl MySqlMetadataSource {
    /// Connect to a database target.
    pub async fn connect(target: &DatabaseTarget) -> Result<Self> {
        let pool = db::connect_target(target).await?;
        Ok(Self { pool })
    }

    async fn schema_listing(&self, sql: &str, what: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, SchemaRow>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::ScanFailure(format!("{} listing failed: {}", what, e)))?;
        Ok(rows.into_iter().map(|r| r.schema_name).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TableRow {
    table_schema: String,
    table_name: String,
    table_type: String,
    engine: Option<String>,
    table_rows: Option<u64>,
}

#[derive(Debug, sqlx::FromRow)]
struct SchemaRow {
    schema_name: String,
}

#[async_trait]
impl MetadataSource for MySqlMetadataSource {
    async fn tables_and_views(&self) -> Result<Vec<TableListing>> {
        let rows = sqlx::query_as::<_, TableRow>(
            r#"
            SELECT TABLE_SCHEMA AS table_schema,
                   TABLE_NAME AS table_name,
                   TABLE_TYPE AS table_type,
                   ENGINE AS engine,
                   TABLE_ROWS AS table_rows
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
            ORDER BY TABLE_SCHEMA, TABLE_NAME
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::ScanFailure(format!("table listing failed: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| TableListing {
                schema: row.table_schema,
                name: row.table_name,
                is_base_table: row.table_type == "BASE TABLE",
                engine: row.engine,
                approx_rows: row.table_rows.map(|n| n as i64),
            })
            .collect())
    }

    async fn trigger_schemas(&self) -> Result<Vec<String>> {
        self.schema_listing(
            r#"
            SELECT TRIGGER_SCHEMA AS schema_name
            FROM information_schema.TRIGGERS
            WHERE TRIGGER_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
            "#,
            "trigger",
        )
        .await
    }

    async fn event_schemas(&self) -> Result<Vec<String>> {
        self.schema_listing(
            r#"
            SELECT EVENT_SCHEMA AS schema_name
            FROM information_schema.EVENTS
            WHERE EVENT_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
            "#,
            "event",
        )
        .await
    }

    async fn routine_schemas(&self) -> Result<Vec<String>> {
        self.schema_listing(
            r#"
            SELECT ROUTINE_SCHEMA AS schema_name
            FROM information_schema.ROUTINES
            WHERE ROUTINE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
            "#,
            "routine",
        )
        .await
    }
}
