//! Database connection pool setup.
//!
//! Two kinds of pools live here: the PostgreSQL control-plane pool that
//! backs the store, and short-lived MySQL pools opened against the
//! databases being backed up (catalog scans read their metadata).

use crate::error::{AppError, Result};
use crate::models::target::DatabaseTarget;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Create the control-plane connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Open a small pool against a scanned MySQL target
pub async fn connect_target(target: &DatabaseTarget) -> Result<MySqlPool> {
    let port = u16::try_from(target.port)
        .map_err(|_| AppError::Validation(format!("invalid port {} for target {}", target.port, target.name)))?;

    let options = MySqlConnectOptions::new()
        .host(&target.host)
        .port(port)
        .username(&target.username)
        .password(&target.password);

    let pool = MySqlPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .map_err(|e| AppError::ScanFailure(format!("cannot connect to {}: {}", target.name, e)))?;

    Ok(pool)
}
