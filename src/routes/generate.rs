use std::str::FromStr;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::generation::{
    GenerateRequest, GenerateResponse, GenerationParams, ReferenceImage, ReferenceRole,
};
use crate::models::job::JobPriority;
use crate::models::quality::Tier;
use crate::models::run::{GenerationRun, RunStatus};
use crate::services::orchestrator::RunRequest;

/// POST /api/v1/generate: Upload model and product references and start a
/// generation run.
pub async fn submit_generation(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<GenerateResponse>, StatusCode> {
    let mut model_image: Option<ReferenceImage> = None;
    let mut product_image: Option<ReferenceImage> = None;
    let mut prompt: Option<String> = None;
    let mut priority: Option<String> = None;
    let mut tier: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(name @ ("model_image" | "product_image")) => {
                let role = if name == "model_image" {
                    ReferenceRole::Model
                } else {
                    ReferenceRole::Product
                };
                let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;

                // Validate image format using the `image` crate
                let format =
                    image::guess_format(&data).map_err(|_| StatusCode::UNSUPPORTED_MEDIA_TYPE)?;

                let reference = ReferenceImage {
                    role,
                    content_type: format.to_mime_type().to_string(),
                    bytes: data.to_vec(),
                };
                match role {
                    ReferenceRole::Model => model_image = Some(reference),
                    ReferenceRole::Product => product_image = Some(reference),
                }
            }
            Some("prompt") => {
                prompt = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            Some("priority") => {
                priority = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            Some("tier") => {
                tier = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            _ => {}
        }
    }

    let request = GenerateRequest {
        prompt: prompt.ok_or(StatusCode::BAD_REQUEST)?,
        priority,
        tier,
    };
    request
        .validate()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;

    let model_image = model_image.ok_or(StatusCode::BAD_REQUEST)?;
    let product_image = product_image.ok_or(StatusCode::BAD_REQUEST)?;

    let priority = match request.priority.as_deref() {
        Some(name) => JobPriority::from_str(name.trim()).map_err(|_| StatusCode::BAD_REQUEST)?,
        None => JobPriority::default(),
    };

    let handle = state.orchestrator.start(RunRequest {
        params: GenerationParams::new(request.prompt),
        references: vec![model_image, product_image],
        priority,
        tier: request.tier.as_deref().map(Tier::from_name),
    });

    let (status, message) = match handle.queue_position {
        Some(_) => ("queued", "All generation slots are busy; request queued"),
        None => ("running", "Generation started"),
    };

    Ok(Json(GenerateResponse {
        run_id: handle.run_id,
        job_id: handle.job_id,
        status: status.to_string(),
        queue_position: handle.queue_position,
        message: message.to_string(),
    }))
}

/// GET /api/v1/runs
pub async fn list_runs(State(state): State<AppState>) -> Json<Vec<GenerationRun>> {
    Json(state.orchestrator.list_runs())
}

/// GET /api/v1/runs/{run_id}: Run status, attempt history and final verdict.
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<GenerationRun>, StatusCode> {
    state
        .orchestrator
        .get_run(run_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// DELETE /api/v1/runs/{run_id}
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<GenerationRun>, StatusCode> {
    state
        .orchestrator
        .cancel_run(run_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/v1/runs/{run_id}/artifact: Image bytes of a passed run.
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let run = state
        .orchestrator
        .get_run(run_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    if run.status != RunStatus::Passed {
        return Err(StatusCode::CONFLICT);
    }
    let artifact = run.artifact.ok_or(StatusCode::NOT_FOUND)?;
    Ok(([(header::CONTENT_TYPE, artifact.content_type)], artifact.bytes))
}
