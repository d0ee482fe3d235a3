//! Fake collaborators and polling helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout, Instant};
use uuid::Uuid;

use tryon_gate::models::generation::{Artifact, GenerationParams, ReferenceImage};
use tryon_gate::models::quality::ScoreReport;
use tryon_gate::models::run::GenerationRun;
use tryon_gate::services::orchestrator::RetryOrchestrator;
use tryon_gate::services::provider::{GenerationProvider, ProviderError};
use tryon_gate::services::quality_gate::QualityGate;
use tryon_gate::services::scheduler::JobScheduler;
use tryon_gate::services::scorer::{Scorer, ScorerError};

use crate::fixtures::PNG_BYTES;

/// Scorer that replays a script of reports. `None` entries fail the call.
/// The last entry repeats once the script runs out.
pub struct ScriptedScorer {
    script: Mutex<VecDeque<Option<ScoreReport>>>,
    calls: AtomicUsize,
}

impl ScriptedScorer {
    pub fn new(script: impl IntoIterator<Item = Option<ScoreReport>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(report: ScoreReport) -> Self {
        Self::new([Some(report)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    async fn score(
        &self,
        _artifact: &Artifact,
        _references: &[ReferenceImage],
    ) -> Result<ScoreReport, ScorerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().flatten()
            } else {
                script.front().cloned().flatten()
            }
        };
        next.ok_or(ScorerError::Status {
            status: 503,
            message: "scorer unavailable".to_string(),
        })
    }
}

/// Provider that records every request and can fail its first N calls.
/// Tracks peak concurrency so tests can check the slot bound.
pub struct RecordingProvider {
    requests: Mutex<Vec<GenerationParams>>,
    failures_remaining: AtomicUsize,
    delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::failing(0)
    }

    pub fn failing(failures: usize) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failures_remaining: AtomicUsize::new(failures),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<GenerationParams> {
        self.requests.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for RecordingProvider {
    async fn generate(
        &self,
        params: &GenerationParams,
        _references: &[ReferenceImage],
    ) -> Result<Artifact, ProviderError> {
        self.requests.lock().unwrap().push(params.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ProviderError::Rejected {
                status: 500,
                message: "provider overloaded".to_string(),
            });
        }
        Ok(Artifact {
            content_type: "image/png".to_string(),
            bytes: PNG_BYTES.to_vec(),
        })
    }
}

/// Provider that parks every call until released.
pub struct BlockingProvider {
    pub started: Notify,
    pub release: Notify,
}

impl BlockingProvider {
    pub fn new() -> Self {
        Self {
            started: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl GenerationProvider for BlockingProvider {
    async fn generate(
        &self,
        _params: &GenerationParams,
        _references: &[ReferenceImage],
    ) -> Result<Artifact, ProviderError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(Artifact {
            content_type: "image/png".to_string(),
            bytes: PNG_BYTES.to_vec(),
        })
    }
}

pub struct Harness {
    pub scheduler: Arc<JobScheduler>,
    pub gate: Arc<QualityGate>,
    pub orchestrator: Arc<RetryOrchestrator>,
}

pub fn harness(
    slots: usize,
    gate: QualityGate,
    provider: Arc<dyn GenerationProvider>,
    scorer: Arc<dyn Scorer>,
    max_attempts: u32,
) -> Harness {
    let scheduler = Arc::new(JobScheduler::new(slots));
    let gate = Arc::new(gate);
    let orchestrator = Arc::new(RetryOrchestrator::new(
        Arc::clone(&scheduler),
        Arc::clone(&gate),
        provider,
        scorer,
        max_attempts,
    ));
    Harness {
        scheduler,
        gate,
        orchestrator,
    }
}

/// Poll until `predicate` holds for the run, or panic after five seconds.
pub async fn wait_for_run(
    orchestrator: &RetryOrchestrator,
    run_id: Uuid,
    predicate: impl Fn(&GenerationRun) -> bool,
) -> GenerationRun {
    let deadline = Instant::now() + Duration::from_secs(5);
    timeout(Duration::from_secs(5), async {
        loop {
            if let Some(run) = orchestrator.get_run(run_id) {
                if predicate(&run) {
                    return run;
                }
            }
            assert!(Instant::now() < deadline, "run {run_id} did not settle");
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for run")
}

pub async fn wait_until_settled(orchestrator: &RetryOrchestrator, run_id: Uuid) -> GenerationRun {
    wait_for_run(orchestrator, run_id, |run| run.status.is_terminal()).await
}
