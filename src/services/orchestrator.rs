use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::generation::{Artifact, GenerationParams, ReferenceImage};
use crate::models::job::{JobPriority, JobStatus};
use crate::models::quality::{GroupScores, ScoreReport, Tier, ValidationResult};
use crate::models::run::{AttemptOutcome, AttemptRecord, GenerationRun, RunHandle, RunStatus};
use crate::services::provider::GenerationProvider;
use crate::services::quality_gate::QualityGate;
use crate::services::scheduler::{retention_cutoff, JobScheduler};
use crate::services::scorer::Scorer;

/// Attempts allowed per run when none is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Progress reported after each pipeline stage.
const PROGRESS_ADMITTED: u8 = 10;
const PROGRESS_GENERATED: u8 = 60;
const PROGRESS_SCORED: u8 = 90;

/// Everything needed to start a generation run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub params: GenerationParams,
    pub references: Vec<ReferenceImage>,
    pub priority: JobPriority,
    /// Per-run tier; `None` uses the gate's active tier.
    pub tier: Option<Tier>,
}

/// Result of one pass through the attempt pipeline.
enum Attempt {
    Passed(Box<ValidationResult>, Artifact),
    Rejected(Box<ValidationResult>, Artifact),
    ProviderFailed(String),
    Cancelled,
}

/// Sequences generate → score → evaluate → maybe retry for each run.
///
/// Each run executes as its own tokio task. A task only calls the provider
/// once its job holds a scheduler slot, so provider parallelism is bounded by
/// the slot count.
pub struct RetryOrchestrator {
    scheduler: Arc<JobScheduler>,
    gate: Arc<QualityGate>,
    provider: Arc<dyn GenerationProvider>,
    scorer: Arc<dyn Scorer>,
    runs: RwLock<HashMap<Uuid, GenerationRun>>,
    max_attempts: u32,
}

impl RetryOrchestrator {
    pub fn new(
        scheduler: Arc<JobScheduler>,
        gate: Arc<QualityGate>,
        provider: Arc<dyn GenerationProvider>,
        scorer: Arc<dyn Scorer>,
        max_attempts: u32,
    ) -> Self {
        Self {
            scheduler,
            gate,
            provider,
            scorer,
            runs: RwLock::new(HashMap::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Register a run, submit its first job and spawn the run task.
    pub fn start(self: &Arc<Self>, request: RunRequest) -> RunHandle {
        let run_id = Uuid::new_v4();
        let handle = self
            .scheduler
            .submit(job_payload(run_id, 1, &request.params), request.priority);

        let now = Utc::now();
        let run = GenerationRun {
            id: run_id,
            status: if handle.status == JobStatus::Processing {
                RunStatus::Running
            } else {
                RunStatus::Queued
            },
            priority: request.priority,
            tier: request.tier,
            current_job_id: handle.job_id,
            attempts: Vec::new(),
            validation: None,
            artifact: None,
            created_at: now,
            updated_at: now,
        };
        self.runs_mut().insert(run_id, run);
        metrics::counter!("generation_runs_started_total").increment(1);
        info!(
            run_id = %run_id,
            job_id = %handle.job_id,
            priority = %request.priority,
            queue_position = ?handle.queue_position,
            "Generation run started"
        );

        let this = Arc::clone(self);
        let job_id = handle.job_id;
        tokio::spawn(async move { this.drive(run_id, request, job_id).await });

        RunHandle {
            run_id,
            job_id: handle.job_id,
            queue_position: handle.queue_position,
        }
    }

    pub fn get_run(&self, run_id: Uuid) -> Option<GenerationRun> {
        self.runs().get(&run_id).cloned()
    }

    pub fn list_runs(&self) -> Vec<GenerationRun> {
        let mut runs: Vec<GenerationRun> = self.runs().values().cloned().collect();
        runs.sort_by_key(|r| r.created_at);
        runs
    }

    /// Final artifact of a passed run.
    pub fn artifact(&self, run_id: Uuid) -> Option<Artifact> {
        self.runs().get(&run_id).and_then(|r| r.artifact.clone())
    }

    /// Cancel a run and its current job. In-flight provider or scorer calls
    /// finish in the background; their results are discarded.
    pub fn cancel_run(&self, run_id: Uuid) -> Option<GenerationRun> {
        let job_id = {
            let mut runs = self.runs_mut();
            let run = runs.get_mut(&run_id)?;
            if run.status.is_terminal() {
                return Some(run.clone());
            }
            run.status = RunStatus::Cancelled;
            run.updated_at = Utc::now();
            run.current_job_id
        };
        self.scheduler.cancel(job_id);
        metrics::counter!("generation_runs_finished_total", "status" => "cancelled").increment(1);
        info!(run_id = %run_id, job_id = %job_id, "Generation run cancelled");
        self.get_run(run_id)
    }

    /// Drop finished runs last updated more than `older_than_hours` ago.
    pub fn cleanup_runs(&self, older_than_hours: u64) -> usize {
        let cutoff = retention_cutoff(older_than_hours);
        let mut runs = self.runs_mut();
        let before = runs.len();
        runs.retain(|_, run| !(run.status.is_terminal() && run.updated_at < cutoff));
        before - runs.len()
    }

    // ── Run task ────────────────────────────────────────────────────────

    async fn drive(self: Arc<Self>, run_id: Uuid, request: RunRequest, first_job: Uuid) {
        let RunRequest {
            mut params,
            references,
            priority,
            tier,
        } = request;
        let mut job_id = first_job;
        let mut attempt: u32 = 1;

        loop {
            let started = Instant::now();
            let result = self
                .run_attempt(run_id, job_id, &params, &references, tier)
                .await;
            metrics::histogram!("generation_attempt_seconds")
                .record(started.elapsed().as_secs_f64());

            match result {
                Attempt::Cancelled => {
                    self.record_attempt(
                        run_id,
                        attempt,
                        job_id,
                        &params,
                        AttemptOutcome::Cancelled,
                        None,
                        None,
                    );
                    self.finish(run_id, RunStatus::Cancelled, None, None);
                    return;
                }
                Attempt::Passed(validation, artifact) => {
                    self.record_attempt(
                        run_id,
                        attempt,
                        job_id,
                        &params,
                        AttemptOutcome::Passed,
                        Some(validation.overall_score),
                        None,
                    );
                    info!(
                        run_id = %run_id,
                        attempt,
                        overall_score = validation.overall_score,
                        "Generated image passed quality gate"
                    );
                    self.finish(run_id, RunStatus::Passed, Some(*validation), Some(artifact));
                    return;
                }
                Attempt::Rejected(validation, artifact) => {
                    self.record_attempt(
                        run_id,
                        attempt,
                        job_id,
                        &params,
                        AttemptOutcome::Rejected,
                        Some(validation.overall_score),
                        None,
                    );
                    let retry = validation
                        .retry_recommendation
                        .as_ref()
                        .filter(|r| r.should_retry)
                        .filter(|r| attempt < (r.max_retries + 1).min(self.max_attempts));

                    match retry {
                        Some(recommendation) => {
                            info!(
                                run_id = %run_id,
                                attempt,
                                overall_score = validation.overall_score,
                                strategy = %recommendation.strategy,
                                priority = %recommendation.priority,
                                max_retries = recommendation.max_retries,
                                "Generated image rejected, retrying with adjusted parameters"
                            );
                            params.apply(recommendation);
                        }
                        None => {
                            info!(
                                run_id = %run_id,
                                attempt,
                                overall_score = validation.overall_score,
                                "Generated image rejected, retry budget exhausted"
                            );
                            self.finish(run_id, RunStatus::Rejected, Some(*validation), Some(artifact));
                            return;
                        }
                    }
                }
                Attempt::ProviderFailed(error) => {
                    self.record_attempt(
                        run_id,
                        attempt,
                        job_id,
                        &params,
                        AttemptOutcome::ProviderError,
                        None,
                        Some(error.clone()),
                    );
                    if attempt >= self.max_attempts {
                        warn!(run_id = %run_id, attempt, error = %error, "Generation failed, no attempts left");
                        self.finish(run_id, RunStatus::Failed, None, None);
                        return;
                    }
                    warn!(run_id = %run_id, attempt, error = %error, "Generation failed, resubmitting");
                }
            }

            attempt += 1;
            let Some(next_job) = self.resubmit(run_id, attempt, &params, priority) else {
                debug!(run_id = %run_id, "Run cancelled between attempts");
                return;
            };
            job_id = next_job;
            metrics::counter!("generation_retries_total").increment(1);
        }
    }

    /// One pass of admission → generate → score → evaluate. Cancellation is
    /// checked between stages; a cancelled job is never completed or failed.
    async fn run_attempt(
        &self,
        run_id: Uuid,
        job_id: Uuid,
        params: &GenerationParams,
        references: &[ReferenceImage],
        tier: Option<Tier>,
    ) -> Attempt {
        if !self.wait_for_admission(job_id).await {
            return Attempt::Cancelled;
        }
        self.update_run(run_id, |run| {
            if run.status == RunStatus::Queued {
                run.status = RunStatus::Running;
            }
        });
        self.scheduler.update_progress(job_id, PROGRESS_ADMITTED, None);

        let artifact = match self.provider.generate(params, references).await {
            Ok(artifact) => artifact,
            Err(e) => {
                if self.is_cancelled(job_id) {
                    return Attempt::Cancelled;
                }
                let error = e.to_string();
                self.scheduler.fail(job_id, error.clone());
                return Attempt::ProviderFailed(error);
            }
        };
        if self.is_cancelled(job_id) {
            return Attempt::Cancelled;
        }
        self.scheduler.update_progress(job_id, PROGRESS_GENERATED, None);

        let report = match self.scorer.score(&artifact, references).await {
            Ok(report) => report,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Scorer failed, degrading both groups");
                let message = e.to_string();
                ScoreReport {
                    consistency: GroupScores::failed(message.clone()),
                    accuracy: GroupScores::failed(message),
                }
            }
        };
        if self.is_cancelled(job_id) {
            return Attempt::Cancelled;
        }
        self.scheduler.update_progress(job_id, PROGRESS_SCORED, None);

        let validation = match tier {
            Some(tier) => self
                .gate
                .evaluate_for_tier(tier, &report.consistency, &report.accuracy),
            None => self.gate.evaluate(&report.consistency, &report.accuracy),
        };

        let summary = json!({
            "passes": validation.passes,
            "overall_score": validation.overall_score,
            "summary": validation.feedback.summary,
            "content_type": artifact.content_type,
            "size_bytes": artifact.bytes.len(),
        });
        if self.scheduler.complete(job_id, summary).is_none() {
            return Attempt::Cancelled;
        }

        if validation.passes {
            Attempt::Passed(Box::new(validation), artifact)
        } else {
            Attempt::Rejected(Box::new(validation), artifact)
        }
    }

    /// Wait until `job_id` is processing. Returns false if it left the
    /// queue any other way.
    async fn wait_for_admission(&self, job_id: Uuid) -> bool {
        let mut changes = self.scheduler.subscribe();
        loop {
            match self.scheduler.get_job(job_id).map(|j| j.status) {
                Some(JobStatus::Processing) => return true,
                Some(JobStatus::Pending) => {}
                _ => return false,
            }
            if changes.changed().await.is_err() {
                return false;
            }
        }
    }

    fn is_cancelled(&self, job_id: Uuid) -> bool {
        self.scheduler
            .get_job(job_id)
            .map_or(true, |job| job.status != JobStatus::Processing)
    }

    /// Submit the next attempt unless the run was cancelled meanwhile.
    fn resubmit(
        &self,
        run_id: Uuid,
        attempt: u32,
        params: &GenerationParams,
        priority: JobPriority,
    ) -> Option<Uuid> {
        let mut runs = self.runs_mut();
        let run = runs.get_mut(&run_id)?;
        if run.status.is_terminal() {
            return None;
        }
        let handle = self
            .scheduler
            .submit(job_payload(run_id, attempt, params), priority);
        run.current_job_id = handle.job_id;
        run.status = if handle.status == JobStatus::Processing {
            RunStatus::Running
        } else {
            RunStatus::Queued
        };
        run.updated_at = Utc::now();
        Some(handle.job_id)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_attempt(
        &self,
        run_id: Uuid,
        attempt: u32,
        job_id: Uuid,
        params: &GenerationParams,
        outcome: AttemptOutcome,
        overall_score: Option<f64>,
        error: Option<String>,
    ) {
        self.update_run(run_id, |run| {
            run.attempts.push(AttemptRecord {
                attempt,
                job_id,
                params: params.clone(),
                outcome,
                overall_score,
                error,
                finished_at: Utc::now(),
            });
        });
    }

    /// Settle a run. A run already cancelled by the caller stays cancelled.
    fn finish(
        &self,
        run_id: Uuid,
        status: RunStatus,
        validation: Option<ValidationResult>,
        artifact: Option<Artifact>,
    ) {
        let mut settled = false;
        self.update_run(run_id, |run| {
            if run.status.is_terminal() {
                return;
            }
            run.status = status;
            if validation.is_some() {
                run.validation = validation;
            }
            run.artifact = artifact;
            settled = true;
        });
        if settled {
            metrics::counter!("generation_runs_finished_total", "status" => status.to_string())
                .increment(1);
        }
    }

    fn update_run(&self, run_id: Uuid, f: impl FnOnce(&mut GenerationRun)) {
        if let Some(run) = self.runs_mut().get_mut(&run_id) {
            f(run);
            run.updated_at = Utc::now();
        }
    }

    fn runs(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, GenerationRun>> {
        self.runs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn runs_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, GenerationRun>> {
        self.runs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn job_payload(run_id: Uuid, attempt: u32, params: &GenerationParams) -> serde_json::Value {
    json!({
        "run_id": run_id,
        "attempt": attempt,
        "params": params,
    })
}
