//! API module - HTTP handlers and OpenAPI wiring.

pub mod handlers;
pub mod openapi;
pub mod routes;

use crate::config::Config;
use crate::store::EngineStore;
use sqlx::PgPool;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub store: Arc<dyn EngineStore>,
}

impl AppState {
    pub fn new(config: Config, db: PgPool, store: Arc<dyn EngineStore>) -> Self {
        Self { config, db, store }
    }
}

pub type SharedState = Arc<AppState>;
