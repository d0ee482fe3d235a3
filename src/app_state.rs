use std::sync::Arc;

use crate::services::{
    orchestrator::RetryOrchestrator, quality_gate::QualityGate, scheduler::JobScheduler,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<JobScheduler>,
    pub gate: Arc<QualityGate>,
    pub orchestrator: Arc<RetryOrchestrator>,
}

impl AppState {
    pub fn new(
        scheduler: Arc<JobScheduler>,
        gate: Arc<QualityGate>,
        orchestrator: RetryOrchestrator,
    ) -> Self {
        Self {
            scheduler,
            gate,
            orchestrator: Arc::new(orchestrator),
        }
    }
}
