//! Database models (SQLx).

pub mod catalog;
pub mod job;
pub mod job_log;
pub mod plan;
pub mod target;
