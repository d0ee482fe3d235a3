use std::time::Duration;

use serde::Deserialize;

use crate::services::{orchestrator, scheduler};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Number of concurrent generation slots.
    #[serde(default = "default_scheduler_slots")]
    pub scheduler_slots: usize,

    /// Expected duration of one generation job, used for completion estimates.
    #[serde(default = "default_expected_job_secs")]
    pub expected_job_secs: u64,

    /// Quality tier name: standard, premium or ultra.
    #[serde(default = "default_quality_tier")]
    pub quality_tier: String,

    /// Require every dimension to pass, not just the group verdicts.
    #[serde(default)]
    pub strict_mode: bool,

    /// Hard ceiling on attempts per generation run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Finished jobs and runs older than this are dropped.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Image generation endpoint
    pub provider_url: String,

    pub provider_token: Option<String>,

    /// Scoring service endpoint
    pub scorer_url: String,

    pub scorer_token: Option<String>,

    /// Timeout for provider and scorer requests.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_scheduler_slots() -> usize {
    scheduler::DEFAULT_SLOTS
}

fn default_expected_job_secs() -> u64 {
    scheduler::DEFAULT_EXPECTED_DURATION.as_secs()
}

fn default_quality_tier() -> String {
    "standard".to_string()
}

fn default_max_attempts() -> u32 {
    orchestrator::DEFAULT_MAX_ATTEMPTS
}

fn default_retention_hours() -> u64 {
    24
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn expected_job_duration(&self) -> Duration {
        Duration::from_secs(self.expected_job_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
