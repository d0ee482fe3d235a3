use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub scheduler: SchedulerHealth,
    pub quality_gate: ComponentHealth,
}

#[derive(Serialize)]
pub struct SchedulerHealth {
    pub status: String,
    pub total_slots: usize,
    pub available_slots: usize,
    pub pending_jobs: usize,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub detail: Option<String>,
}

/// GET /health: Scheduler capacity and active quality tier.
///
/// Saturated slots report `busy` but stay 200; the service is still
/// accepting and queueing work.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let queue = state.scheduler.status();
    let scheduler = SchedulerHealth {
        status: if queue.available_slots > 0 {
            "ok".to_string()
        } else {
            "busy".to_string()
        },
        total_slots: queue.total_slots,
        available_slots: queue.available_slots,
        pending_jobs: queue.pending_queue_length,
    };

    let config = state.gate.config();
    let quality_gate = ComponentHealth {
        status: "ok".to_string(),
        detail: Some(format!(
            "tier={} strict_mode={}",
            config.tier, config.strict_mode
        )),
    };

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            scheduler,
            quality_gate,
        },
    };

    (StatusCode::OK, Json(response))
}
