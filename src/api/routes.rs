//! Route definitions for the API.

use axum::{routing::get, Router};
use utoipa_swagger_ui::SwaggerUi;

use super::handlers;
use super::SharedState;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    // Build OpenAPI spec once at startup
    let openapi = super::openapi::build_openapi();

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/healthz", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/readyz", get(handlers::health::readiness_check))
        .route("/livez", get(handlers::health::liveness_check))
        // OpenAPI spec (served by SwaggerUi at /api/v1/openapi.json) and Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", openapi))
        // API v1 routes
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes() -> Router<SharedState> {
    Router::new()
        // MySQL servers the engine dumps from and restores into
        .nest(
            "/database-targets",
            handlers::database_targets::router(),
        )
        // Artifact destinations (local directories, S3 buckets)
        .nest("/storage-targets", handlers::storage_targets::router())
        // Backup plans and their item selection
        .nest("/backup-plans", handlers::backup_plans::router())
        // Restore plans replaying a backup plan's artifacts
        .nest("/restore-plans", handlers::restore_plans::router())
        // Backup job runs, item statuses, and the executor work feed
        .nest("/backup-jobs", handlers::backup_jobs::router())
        // Restore job runs and items
        .nest("/restore-jobs", handlers::restore_jobs::router())
}
