//! Dumpkeeper - Backend Library
//!
//! MySQL logical backup and restore orchestration engine.

pub mod api;
pub mod config;
pub mod db;
pub mod dump;
pub mod error;
pub mod models;
pub mod scanner;
pub mod schedule;
pub mod services;
pub mod storage;
pub mod store;

pub use config::Config;
pub use error::{AppError, Result};
