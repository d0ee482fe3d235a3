use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle state of a generation job held by the scheduler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Admission priority. Declaration order is ascending so `Ord` ranks
/// `High` above `Normal` above `Low`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// A generation job tracked by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub slot: Option<usize>,
    /// Monotonic arrival counter; breaks priority ties in the pending queue.
    #[serde(skip)]
    pub(crate) sequence: u64,
}

impl Job {
    pub(crate) fn new(payload: serde_json::Value, priority: JobPriority, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            status: JobStatus::Pending,
            priority,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            estimated_completion: None,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
            result: None,
            error: None,
            slot: None,
            sequence,
        }
    }

    /// Pending-queue sort key: higher priority first, then earlier arrival.
    pub(crate) fn queue_key(&self) -> (Reverse<JobPriority>, u64) {
        (Reverse(self.priority), self.sequence)
    }

    /// Timestamp at which the job reached its terminal state, if any.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            JobStatus::Completed => self.completed_at,
            JobStatus::Failed => self.failed_at,
            JobStatus::Cancelled => self.cancelled_at,
            JobStatus::Pending | JobStatus::Processing => None,
        }
    }
}

/// Returned by `submit`: where the job landed.
#[derive(Debug, Clone, Serialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// 1-based position in the pending queue when the job was queued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<usize>,
}

/// A job currently holding a slot.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveJob {
    pub job_id: Uuid,
    pub slot: usize,
    pub priority: JobPriority,
    pub progress: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub elapsed_ms: i64,
}

/// Point-in-time snapshot of scheduler occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub total_slots: usize,
    pub available_slots: usize,
    pub active_jobs: Vec<ActiveJob>,
    pub pending_queue_length: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
}
