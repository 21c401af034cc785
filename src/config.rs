//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL (PostgreSQL control-plane store)
    pub database_url: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Log level
    pub log_level: String,

    /// Seconds between orchestrator ticks
    pub orchestrator_interval_secs: u64,

    /// Value passed to the dump tool as --max-allowed-packet (bytes)
    pub dump_max_allowed_packet: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| AppError::Config("DATABASE_URL not set".into()))?,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            orchestrator_interval_secs: env::var("ORCHESTRATOR_INTERVAL_SECS")
                .unwrap_or_else(|_| "15".into())
                .parse()
                .unwrap_or(15),
            dump_max_allowed_packet: env::var("DUMP_MAX_ALLOWED_PACKET")
                .unwrap_or_else(|_| "1073741824".into())
                .parse()
                .unwrap_or(1_073_741_824),
        })
    }
}
