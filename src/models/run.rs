use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use uuid::Uuid;

use crate::models::generation::{Artifact, GenerationParams};
use crate::models::job::JobPriority;
use crate::models::quality::{Tier, ValidationResult};

/// State of a generation run across all of its attempts.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Passed,
    Rejected,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Passed | Self::Rejected | Self::Failed | Self::Cancelled
        )
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Passed,
    Rejected,
    ProviderError,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub job_id: Uuid,
    pub params: GenerationParams,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// One user request, spanning one or more scheduler jobs.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRun {
    pub id: Uuid,
    pub status: RunStatus,
    pub priority: JobPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    pub current_job_id: Uuid,
    pub attempts: Vec<AttemptRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    #[serde(skip)]
    pub artifact: Option<Artifact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returned by `RetryOrchestrator::start`.
#[derive(Debug, Clone, Serialize)]
pub struct RunHandle {
    pub run_id: Uuid,
    pub job_id: Uuid,
    pub queue_position: Option<usize>,
}
