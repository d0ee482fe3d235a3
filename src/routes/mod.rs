use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod generate;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod quality;

/// Health and `/api/v1` routes. The Prometheus endpoint is mounted
/// separately because it carries its own state.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/generate", post(generate::submit_generation))
        .route("/api/v1/runs", get(generate::list_runs))
        .route(
            "/api/v1/runs/{run_id}",
            get(generate::get_run).delete(generate::cancel_run),
        )
        .route("/api/v1/runs/{run_id}/artifact", get(generate::get_artifact))
        .route(
            "/api/v1/jobs/{job_id}",
            get(jobs::get_job).delete(jobs::cancel_job),
        )
        .route("/api/v1/queue", get(jobs::queue_status))
        .route(
            "/api/v1/quality/config",
            get(quality::get_config).patch(quality::update_config),
        )
        .with_state(state)
}
