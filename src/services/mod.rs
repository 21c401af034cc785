//! Engine services.
//!
//! The rules of the engine live between the HTTP handlers and the store:
//! target management, plan validation and schedule edits, the job and
//! item state machine, catalog scans, and the orchestrator loop that
//! turns due plans into jobs.

pub mod catalog_service;
pub mod job_service;
pub mod orchestrator;
pub mod plan_service;
pub mod target_service;
