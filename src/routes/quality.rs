use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::quality::{QualityConfig, QualityConfigPatch};

/// GET /api/v1/quality/config
pub async fn get_config(State(state): State<AppState>) -> Json<QualityConfig> {
    Json(state.gate.config())
}

/// PATCH /api/v1/quality/config: Merge a partial configuration update.
/// Applies to evaluations that start after the update.
pub async fn update_config(
    State(state): State<AppState>,
    Json(patch): Json<QualityConfigPatch>,
) -> Result<Json<QualityConfig>, StatusCode> {
    patch
        .validate()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    Ok(Json(state.gate.update_configuration(patch)))
}
