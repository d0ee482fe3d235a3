use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{Job, QueueStatus};

/// GET /api/v1/jobs/{job_id}: Job lifecycle state and progress.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Job>, StatusCode> {
    state
        .scheduler
        .get_job(job_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// DELETE /api/v1/jobs/{job_id}: Cancel a pending or processing job.
///
/// Cancelling a job that already finished is a conflict; unknown ids are 404.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Job>, StatusCode> {
    if let Some(job) = state.scheduler.cancel(job_id) {
        return Ok(Json(job));
    }
    match state.scheduler.get_job(job_id) {
        Some(_) => Err(StatusCode::CONFLICT),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// GET /api/v1/queue: Slot availability and queue depth.
pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.scheduler.status())
}
