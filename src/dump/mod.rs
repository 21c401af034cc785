//! Dump tool argument registry.
//!
//! Every catalog object kind maps to a fixed argument vector for the
//! external dump tool (backup direction), a mirrored vector for the
//! restore direction, and a deterministic artifact filename:
//!
//! - per-table kinds: `{schema}.{name}-{structure|data|view}.sql.xz.enc`
//! - schema-scoped kinds: `{schema}-{triggers|events|funcs}.sql.xz.enc`
//!
//! The `.xz.enc` extension records the compress-then-encrypt pipeline the
//! execution side applies; this module only names the artifact.
//!
//! Restore vectors repeat the backup selectivity flags but never the
//! structural flags (`--add-drop-table`, `--skip-dump-date`): restoration
//! replays the dump as written. Downstream tooling parses these filenames
//! and flag sets, so both are frozen contracts.

use crate::error::{AppError, Result};
use crate::models::catalog::{CatalogObject, ObjectKind};
use crate::models::target::DatabaseTarget;

/// Connection settings resolved for one dump tool invocation.
#[derive(Clone)]
pub struct DumpContext {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub max_allowed_packet: u64,
}

impl DumpContext {
    /// Build the invocation context for a database target.
    pub fn for_target(target: &DatabaseTarget, max_allowed_packet: u64) -> Result<Self> {
        let port = u16::try_from(target.port).map_err(|_| {
            AppError::Validation(format!(
                "invalid port {} for target {}",
                target.port, target.name
            ))
        })?;
        Ok(Self {
            host: target.host.clone(),
            port,
            username: target.username.clone(),
            password: target.password.clone(),
            max_allowed_packet,
        })
    }
}

impl std::fmt::Debug for DumpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpContext")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("max_allowed_packet", &self.max_allowed_packet)
            .finish_non_exhaustive()
    }
}

/// Flags shared by every kind in both directions.
fn connection_args(conn: &DumpContext) -> Vec<String> {
    vec![
        format!("--host={}", conn.host),
        format!("--port={}", conn.port),
        format!("--user={}", conn.username),
        format!("--password={}", conn.password),
        format!("--max-allowed-packet={}", conn.max_allowed_packet),
        "--skip-lock-tables".to_string(),
        "--column-statistics=0".to_string(),
    ]
}

/// The trailing positional arguments: schema, plus the table name for
/// per-table kinds.
fn positional_args(object: &CatalogObject, args: &mut Vec<String>) {
    args.push(object.schema_name.clone());
    if !object.kind.is_schema_scoped() {
        args.push(object.object_name.clone().unwrap_or_default());
    }
}

/// Argument vector for dumping one catalog object.
pub fn backup_args(object: &CatalogObject, conn: &DumpContext) -> Vec<String> {
    let mut args = connection_args(conn);
    match object.kind {
        ObjectKind::TableStructure => {
            args.extend([
                "--no-data".to_string(),
                "--add-drop-table".to_string(),
                "--skip-triggers".to_string(),
                "--skip-dump-date".to_string(),
            ]);
        }
        ObjectKind::TableData => {
            args.extend([
                "--no-create-info".to_string(),
                "--extended-insert".to_string(),
                "--complete-insert".to_string(),
                "--single-transaction".to_string(),
                "--quick".to_string(),
                "--skip-triggers".to_string(),
            ]);
        }
        ObjectKind::View => {
            args.extend(["--no-data".to_string(), "--skip-triggers".to_string()]);
        }
        ObjectKind::Trigger => {
            args.extend([
                "--no-create-info".to_string(),
                "--no-data".to_string(),
                "--triggers".to_string(),
                "--skip-events".to_string(),
                "--skip-routines".to_string(),
            ]);
        }
        ObjectKind::Event => {
            args.extend([
                "--no-create-info".to_string(),
                "--no-data".to_string(),
                "--skip-triggers".to_string(),
                "--events".to_string(),
                "--skip-routines".to_string(),
            ]);
        }
        ObjectKind::FunctionProcedure => {
            args.extend([
                "--no-create-info".to_string(),
                "--no-data".to_string(),
                "--skip-triggers".to_string(),
                "--skip-events".to_string(),
                "--routines".to_string(),
            ]);
        }
    }
    positional_args(object, &mut args);
    args
}

/// Argument vector for restoring one catalog object.
///
/// Kept as a second exhaustive match rather than a filtered copy of
/// [`backup_args`] so that a new kind fails to compile until both
/// directions are spelled out.
pub fn restore_args(object: &CatalogObject, conn: &DumpContext) -> Vec<String> {
    let mut args = connection_args(conn);
    match object.kind {
        ObjectKind::TableStructure => {
            args.extend(["--no-data".to_string(), "--skip-triggers".to_string()]);
        }
        ObjectKind::TableData => {
            args.extend([
                "--no-create-info".to_string(),
                "--extended-insert".to_string(),
                "--complete-insert".to_string(),
                "--single-transaction".to_string(),
                "--quick".to_string(),
                "--skip-triggers".to_string(),
            ]);
        }
        ObjectKind::View => {
            args.extend(["--no-data".to_string(), "--skip-triggers".to_string()]);
        }
        ObjectKind::Trigger => {
            args.extend([
                "--no-create-info".to_string(),
                "--no-data".to_string(),
                "--triggers".to_string(),
                "--skip-events".to_string(),
                "--skip-routines".to_string(),
            ]);
        }
        ObjectKind::Event => {
            args.extend([
                "--no-create-info".to_string(),
                "--no-data".to_string(),
                "--skip-triggers".to_string(),
                "--events".to_string(),
                "--skip-routines".to_string(),
            ]);
        }
        ObjectKind::FunctionProcedure => {
            args.extend([
                "--no-create-info".to_string(),
                "--no-data".to_string(),
                "--skip-triggers".to_string(),
                "--skip-events".to_string(),
                "--routines".to_string(),
            ]);
        }
    }
    positional_args(object, &mut args);
    args
}

fn artifact_suffix(kind: &ObjectKind) -> &'static str {
    match kind {
        ObjectKind::TableStructure => "structure",
        ObjectKind::TableData => "data",
        ObjectKind::View => "view",
        ObjectKind::Trigger => "triggers",
        ObjectKind::Event => "events",
        ObjectKind::FunctionProcedure => "funcs",
    }
}

/// Deterministic artifact filename for one catalog object.
pub fn artifact_filename(object: &CatalogObject) -> String {
    let suffix = artifact_suffix(&object.kind);
    if object.kind.is_schema_scoped() {
        format!("{}-{}.sql.xz.enc", object.schema_name, suffix)
    } else {
        format!(
            "{}.{}-{}.sql.xz.enc",
            object.schema_name,
            object.object_name.as_deref().unwrap_or_default(),
            suffix
        )
    }
}
