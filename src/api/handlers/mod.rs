//! HTTP request handlers.

pub mod backup_jobs;
pub mod backup_plans;
pub mod database_targets;
pub mod health;
pub mod restore_jobs;
pub mod restore_plans;
pub mod storage_targets;
