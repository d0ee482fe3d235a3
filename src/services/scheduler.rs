use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::job::{ActiveJob, Job, JobHandle, JobPriority, JobStatus, QueueStatus};

/// Slot count used when none is configured.
pub const DEFAULT_SLOTS: usize = 5;

/// Provisional runtime used to estimate completion of a newly admitted job.
pub const DEFAULT_EXPECTED_DURATION: Duration = Duration::from_secs(60);

/// Capacity-limited priority scheduler for generation jobs.
///
/// All collections live behind a single mutex. Every path that releases a
/// slot admits the next pending job before the lock is dropped, so no
/// interleaving of callers can push the processing set above `total_slots`
/// or leave a slot idle while work is queued.
#[derive(Debug)]
pub struct JobScheduler {
    total_slots: usize,
    expected_duration: TimeDelta,
    state: Mutex<SchedulerState>,
    changes: watch::Sender<u64>,
}

#[derive(Debug, Default)]
struct SchedulerState {
    processing: HashMap<Uuid, Job>,
    /// Sorted by priority desc, then arrival asc.
    pending: Vec<Job>,
    completed: HashMap<Uuid, Job>,
    failed: HashMap<Uuid, Job>,
    cancelled: HashMap<Uuid, Job>,
    next_sequence: u64,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_SLOTS)
    }
}

impl JobScheduler {
    pub fn new(total_slots: usize) -> Self {
        Self::with_expected_duration(total_slots, DEFAULT_EXPECTED_DURATION)
    }

    pub fn with_expected_duration(total_slots: usize, expected_duration: Duration) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            total_slots: total_slots.max(1),
            expected_duration: TimeDelta::from_std(expected_duration)
                .unwrap_or_else(|_| TimeDelta::seconds(60)),
            state: Mutex::new(SchedulerState::default()),
            changes,
        }
    }

    pub fn total_slots(&self) -> usize {
        self.total_slots
    }

    /// Receiver bumped after every lifecycle change (admission, release,
    /// cancellation). Used by the orchestrator to await admission.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Create a job and admit it, or queue it if every slot is busy.
    pub fn submit(&self, payload: serde_json::Value, priority: JobPriority) -> JobHandle {
        let handle = {
            let mut state = self.state();
            let sequence = state.next_sequence;
            state.next_sequence += 1;

            let job = Job::new(payload, priority, sequence);
            let job_id = job.id;

            let handle = if state.processing.len() < self.total_slots {
                let slot = self.admit(&mut state, job);
                JobHandle {
                    job_id,
                    status: JobStatus::Processing,
                    queue_position: None,
                    slot: Some(slot),
                }
            } else {
                let key = job.queue_key();
                let position = state.pending.partition_point(|j| j.queue_key() < key);
                state.pending.insert(position, job);
                info!(
                    job_id = %job_id,
                    priority = %priority,
                    position = position + 1,
                    "All slots busy, job queued"
                );
                JobHandle {
                    job_id,
                    status: JobStatus::Pending,
                    queue_position: Some(position + 1),
                    slot: None,
                }
            };
            self.record_gauges(&state);
            handle
        };

        metrics::counter!("generation_jobs_submitted_total", "priority" => priority.to_string())
            .increment(1);
        self.notify();
        handle
    }

    /// Update progress of a processing job. Jobs that are not processing
    /// cannot report progress and are left untouched.
    ///
    /// A terminal `status` is routed through the matching release path so the
    /// slot is reclaimed and the queue advances.
    pub fn update_progress(
        &self,
        job_id: Uuid,
        progress: u8,
        status: Option<JobStatus>,
    ) -> Option<Job> {
        match status {
            Some(JobStatus::Completed) => {
                return self.complete(job_id, serde_json::Value::Null);
            }
            Some(JobStatus::Failed) => {
                return self.fail(job_id, "Reported failed via progress update");
            }
            Some(JobStatus::Cancelled) => {
                let is_processing = self.state().processing.contains_key(&job_id);
                return if is_processing { self.cancel(job_id) } else { None };
            }
            Some(JobStatus::Pending) | Some(JobStatus::Processing) | None => {}
        }

        let mut state = self.state();
        let job = state.processing.get_mut(&job_id)?;
        job.progress = progress.min(100);
        debug!(job_id = %job_id, progress = job.progress, "Job progress updated");
        Some(job.clone())
    }

    /// Mark a processing job completed and admit the next pending job.
    /// Returns `None` if the job is not processing.
    pub fn complete(&self, job_id: Uuid, result: serde_json::Value) -> Option<Job> {
        let job = self.release(job_id, JobStatus::Completed, |job, now| {
            job.progress = 100;
            job.completed_at = Some(now);
            job.result = Some(result);
        })?;
        metrics::counter!("generation_jobs_completed").increment(1);
        info!(job_id = %job_id, "Job completed");
        Some(job)
    }

    /// Mark a processing job failed and admit the next pending job.
    /// Returns `None` if the job is not processing.
    pub fn fail(&self, job_id: Uuid, error: impl Into<String>) -> Option<Job> {
        let error = error.into();
        let job = self.release(job_id, JobStatus::Failed, |job, now| {
            job.failed_at = Some(now);
            job.error = Some(error);
        })?;
        metrics::counter!("generation_jobs_failed").increment(1);
        info!(job_id = %job_id, error = job.error.as_deref().unwrap_or_default(), "Job failed");
        Some(job)
    }

    /// Cancel a pending or processing job.
    ///
    /// Only scheduling state is reclaimed; work already handed to an external
    /// provider keeps running and its caller must check for cancellation.
    pub fn cancel(&self, job_id: Uuid) -> Option<Job> {
        let job = {
            let mut state = self.state();
            let now = Utc::now();

            let job = if let Some(index) = state.pending.iter().position(|j| j.id == job_id) {
                let mut job = state.pending.remove(index);
                job.status = JobStatus::Cancelled;
                job.cancelled_at = Some(now);
                state.cancelled.insert(job_id, job.clone());
                job
            } else {
                let mut job = state.processing.remove(&job_id)?;
                let slot = job.slot;
                job.status = JobStatus::Cancelled;
                job.cancelled_at = Some(now);
                state.cancelled.insert(job_id, job.clone());
                debug!(job_id = %job_id, slot = ?slot, "Slot released by cancellation");
                self.admit_next(&mut state);
                job
            };
            self.record_gauges(&state);
            job
        };

        metrics::counter!("generation_jobs_cancelled").increment(1);
        info!(job_id = %job_id, "Job cancelled");
        self.notify();
        Some(job)
    }

    /// Look a job up across processing, pending, completed, failed and
    /// cancelled, in that order.
    pub fn get_job(&self, job_id: Uuid) -> Option<Job> {
        let state = self.state();
        state
            .processing
            .get(&job_id)
            .or_else(|| state.pending.iter().find(|j| j.id == job_id))
            .or_else(|| state.completed.get(&job_id))
            .or_else(|| state.failed.get(&job_id))
            .or_else(|| state.cancelled.get(&job_id))
            .cloned()
    }

    /// 1-based position of a pending job.
    pub fn queue_position(&self, job_id: Uuid) -> Option<usize> {
        self.state()
            .pending
            .iter()
            .position(|j| j.id == job_id)
            .map(|i| i + 1)
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.state();
        let now = Utc::now();

        let mut active_jobs: Vec<ActiveJob> = state
            .processing
            .values()
            .map(|job| ActiveJob {
                job_id: job.id,
                slot: job.slot.unwrap_or_default(),
                priority: job.priority,
                progress: job.progress,
                started_at: job.started_at,
                estimated_completion: job.estimated_completion,
                elapsed_ms: job
                    .started_at
                    .map(|t| (now - t).num_milliseconds())
                    .unwrap_or_default(),
            })
            .collect();
        active_jobs.sort_by_key(|a| a.slot);

        QueueStatus {
            total_slots: self.total_slots,
            available_slots: self.total_slots - state.processing.len(),
            active_jobs,
            pending_queue_length: state.pending.len(),
            completed_count: state.completed.len(),
            failed_count: state.failed.len(),
            cancelled_count: state.cancelled.len(),
        }
    }

    /// Drop terminal jobs that finished more than `older_than_hours` ago.
    /// Pending and processing jobs are never touched.
    pub fn cleanup(&self, older_than_hours: u64) -> usize {
        let cutoff = retention_cutoff(older_than_hours);
        self.cleanup_before(cutoff)
    }

    /// Drop terminal jobs that finished strictly before `cutoff`.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.state();
        let before = state.completed.len() + state.failed.len() + state.cancelled.len();

        let expired = |job: &Job| job.finished_at().is_some_and(|t| t < cutoff);
        state.completed.retain(|_, job| !expired(job));
        state.failed.retain(|_, job| !expired(job));
        state.cancelled.retain(|_, job| !expired(job));

        let removed = before - (state.completed.len() + state.failed.len() + state.cancelled.len());
        if removed > 0 {
            info!(removed, cutoff = %cutoff, "Cleaned up finished jobs");
        }
        removed
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Move a processing job into a terminal collection, then admit the next
    /// pending job within the same critical section.
    fn release(
        &self,
        job_id: Uuid,
        status: JobStatus,
        finish: impl FnOnce(&mut Job, DateTime<Utc>),
    ) -> Option<Job> {
        let job = {
            let mut state = self.state();
            let mut job = state.processing.remove(&job_id)?;
            job.status = status;
            finish(&mut job, Utc::now());

            let bucket = match status {
                JobStatus::Completed => &mut state.completed,
                JobStatus::Failed => &mut state.failed,
                _ => &mut state.cancelled,
            };
            bucket.insert(job_id, job.clone());
            debug!(job_id = %job_id, slot = ?job.slot, status = %status, "Slot released");

            self.admit_next(&mut state);
            self.record_gauges(&state);
            job
        };
        self.notify();
        Some(job)
    }

    /// Admit the head of the pending queue if a slot is free.
    fn admit_next(&self, state: &mut SchedulerState) {
        if state.processing.len() >= self.total_slots || state.pending.is_empty() {
            return;
        }
        let job = state.pending.remove(0);
        self.admit(state, job);
    }

    /// Place `job` into the lowest free slot. Callers must have checked
    /// capacity; exceeding it is a concurrency defect and aborts loudly.
    fn admit(&self, state: &mut SchedulerState, mut job: Job) -> usize {
        assert!(
            state.processing.len() < self.total_slots,
            "scheduler invariant violated: admitting beyond {} slots",
            self.total_slots
        );
        let slot = (1..=self.total_slots)
            .find(|slot| state.processing.values().all(|j| j.slot != Some(*slot)))
            .unwrap_or_else(|| {
                panic!("scheduler invariant violated: no free slot with capacity available")
            });

        let now = Utc::now();
        job.status = JobStatus::Processing;
        job.slot = Some(slot);
        job.started_at = Some(now);
        job.estimated_completion = Some(now + self.expected_duration);

        info!(
            job_id = %job.id,
            slot,
            priority = %job.priority,
            waited_ms = (now - job.created_at).num_milliseconds(),
            "Job admitted"
        );
        state.processing.insert(job.id, job);
        slot
    }

    fn record_gauges(&self, state: &SchedulerState) {
        metrics::gauge!("generation_queue_depth").set(state.pending.len() as f64);
        metrics::gauge!("generation_active_jobs").set(state.processing.len() as f64);
    }
}

/// Instant `older_than_hours` before now, saturating at the earliest
/// representable time.
pub(crate) fn retention_cutoff(older_than_hours: u64) -> DateTime<Utc> {
    i64::try_from(older_than_hours)
        .ok()
        .and_then(TimeDelta::try_hours)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn age_terminal(scheduler: &JobScheduler, job_id: Uuid, finished_at: DateTime<Utc>) {
        let mut guard = scheduler.state();
        let state = &mut *guard;
        for bucket in [&mut state.completed, &mut state.failed, &mut state.cancelled] {
            if let Some(job) = bucket.get_mut(&job_id) {
                job.completed_at = job.completed_at.map(|_| finished_at);
                job.failed_at = job.failed_at.map(|_| finished_at);
                job.cancelled_at = job.cancelled_at.map(|_| finished_at);
            }
        }
    }

    #[test]
    fn test_submit_admits_until_full() {
        let scheduler = JobScheduler::new(2);
        let a = scheduler.submit(json!({"n": 1}), JobPriority::Normal);
        let b = scheduler.submit(json!({"n": 2}), JobPriority::Normal);
        let c = scheduler.submit(json!({"n": 3}), JobPriority::Normal);

        assert_eq!(a.status, JobStatus::Processing);
        assert_eq!(a.slot, Some(1));
        assert_eq!(b.slot, Some(2));
        assert_eq!(c.status, JobStatus::Pending);
        assert_eq!(c.queue_position, Some(1));

        let status = scheduler.status();
        assert_eq!(status.available_slots, 0);
        assert_eq!(status.pending_queue_length, 1);
    }

    #[test]
    fn test_admitted_job_has_estimate() {
        let scheduler = JobScheduler::with_expected_duration(1, Duration::from_secs(30));
        let handle = scheduler.submit(json!({}), JobPriority::Normal);
        let job = scheduler.get_job(handle.job_id).unwrap();
        let started = job.started_at.unwrap();
        assert_eq!(job.estimated_completion, Some(started + TimeDelta::seconds(30)));
    }

    #[test]
    fn test_pending_queue_order() {
        let scheduler = JobScheduler::new(1);
        scheduler.submit(json!({}), JobPriority::Normal);
        let low = scheduler.submit(json!({}), JobPriority::Low);
        let normal = scheduler.submit(json!({}), JobPriority::Normal);
        let high = scheduler.submit(json!({}), JobPriority::High);
        let normal2 = scheduler.submit(json!({}), JobPriority::Normal);

        assert_eq!(high.queue_position, Some(1));
        assert_eq!(scheduler.queue_position(high.job_id), Some(1));
        assert_eq!(scheduler.queue_position(normal.job_id), Some(2));
        assert_eq!(scheduler.queue_position(normal2.job_id), Some(3));
        assert_eq!(scheduler.queue_position(low.job_id), Some(4));
    }

    #[test]
    fn test_submit_handle_matches_job_state() {
        let scheduler = JobScheduler::new(1);
        let admitted = scheduler.submit(json!({}), JobPriority::Low);
        let queued = scheduler.submit(json!({}), JobPriority::High);

        let job = scheduler.get_job(admitted.job_id).unwrap();
        assert_eq!(job.status, admitted.status);
        assert_eq!(job.slot, admitted.slot);

        let job = scheduler.get_job(queued.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(scheduler.queue_position(queued.job_id), queued.queue_position);
    }

    #[test]
    fn test_pending_sorted_by_priority_then_arrival() {
        let scheduler = JobScheduler::new(1);
        scheduler.submit(json!({}), JobPriority::Normal);
        for priority in [
            JobPriority::Low,
            JobPriority::High,
            JobPriority::Normal,
            JobPriority::Low,
            JobPriority::High,
            JobPriority::Normal,
        ] {
            scheduler.submit(json!({}), priority);
        }

        let state = scheduler.state();
        let keys: Vec<_> = state.pending.iter().map(Job::queue_key).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        let priorities: Vec<_> = state.pending.iter().map(|j| j.priority).collect();
        assert_eq!(
            priorities,
            [
                JobPriority::High,
                JobPriority::High,
                JobPriority::Normal,
                JobPriority::Normal,
                JobPriority::Low,
                JobPriority::Low,
            ]
        );
    }

    #[test]
    fn test_progress_only_for_processing() {
        let scheduler = JobScheduler::new(1);
        let a = scheduler.submit(json!({}), JobPriority::Normal);
        let b = scheduler.submit(json!({}), JobPriority::Normal);

        let updated = scheduler.update_progress(a.job_id, 40, None).unwrap();
        assert_eq!(updated.progress, 40);
        assert!(scheduler.update_progress(b.job_id, 40, None).is_none());
        assert_eq!(scheduler.get_job(b.job_id).unwrap().progress, 0);

        let clamped = scheduler.update_progress(a.job_id, 250, None).unwrap();
        assert_eq!(clamped.progress, 100);
    }

    #[test]
    fn test_progress_terminal_status_releases_slot() {
        let scheduler = JobScheduler::new(1);
        let a = scheduler.submit(json!({}), JobPriority::Normal);
        let b = scheduler.submit(json!({}), JobPriority::Normal);

        let done = scheduler
            .update_progress(a.job_id, 100, Some(JobStatus::Completed))
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(scheduler.get_job(b.job_id).unwrap().status, JobStatus::Processing);
    }

    #[test]
    fn test_double_complete_is_noop() {
        let scheduler = JobScheduler::new(1);
        let a = scheduler.submit(json!({}), JobPriority::Normal);
        let b = scheduler.submit(json!({}), JobPriority::Normal);
        let c = scheduler.submit(json!({}), JobPriority::Normal);

        assert!(scheduler.complete(a.job_id, json!({"ok": true})).is_some());
        assert!(scheduler.complete(a.job_id, json!({"ok": true})).is_none());

        assert_eq!(scheduler.get_job(b.job_id).unwrap().status, JobStatus::Processing);
        assert_eq!(scheduler.get_job(c.job_id).unwrap().status, JobStatus::Pending);
        assert_eq!(scheduler.status().completed_count, 1);
    }

    #[test]
    fn test_fail_admits_next() {
        let scheduler = JobScheduler::new(1);
        let a = scheduler.submit(json!({}), JobPriority::Normal);
        let b = scheduler.submit(json!({}), JobPriority::Normal);

        let failed = scheduler.fail(a.job_id, "provider timeout").unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("provider timeout"));
        assert!(failed.failed_at.is_some());
        assert_eq!(scheduler.get_job(b.job_id).unwrap().slot, Some(1));
    }

    #[test]
    fn test_cancel_pending_keeps_slots() {
        let scheduler = JobScheduler::new(1);
        let a = scheduler.submit(json!({}), JobPriority::Normal);
        let b = scheduler.submit(json!({}), JobPriority::Normal);

        let cancelled = scheduler.cancel(b.job_id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(cancelled.slot, None);

        let status = scheduler.status();
        assert_eq!(status.pending_queue_length, 0);
        assert_eq!(status.active_jobs.len(), 1);
        assert_eq!(status.active_jobs[0].job_id, a.job_id);
        assert_eq!(status.cancelled_count, 1);
    }

    #[test]
    fn test_cancel_processing_admits_next() {
        let scheduler = JobScheduler::new(1);
        let a = scheduler.submit(json!({}), JobPriority::Normal);
        let b = scheduler.submit(json!({}), JobPriority::Normal);

        scheduler.cancel(a.job_id).unwrap();
        assert_eq!(scheduler.get_job(a.job_id).unwrap().status, JobStatus::Cancelled);
        assert_eq!(scheduler.get_job(b.job_id).unwrap().status, JobStatus::Processing);
        assert!(scheduler.cancel(a.job_id).is_none());
        assert!(scheduler.complete(a.job_id, json!({})).is_none());
    }

    #[test]
    fn test_unknown_job_operations_are_noops() {
        let scheduler = JobScheduler::new(1);
        let id = Uuid::new_v4();
        assert!(scheduler.get_job(id).is_none());
        assert!(scheduler.complete(id, json!({})).is_none());
        assert!(scheduler.fail(id, "x").is_none());
        assert!(scheduler.cancel(id).is_none());
        assert!(scheduler.update_progress(id, 10, None).is_none());
    }

    #[test]
    fn test_freed_slot_number_is_reused() {
        let scheduler = JobScheduler::new(3);
        let _a = scheduler.submit(json!({}), JobPriority::Normal);
        let b = scheduler.submit(json!({}), JobPriority::Normal);
        let _c = scheduler.submit(json!({}), JobPriority::Normal);

        scheduler.complete(b.job_id, json!({}));
        let d = scheduler.submit(json!({}), JobPriority::Normal);
        assert_eq!(d.slot, Some(2));
    }

    #[test]
    fn test_cleanup_boundary() {
        let scheduler = JobScheduler::new(2);
        let old = scheduler.submit(json!({}), JobPriority::Normal);
        let recent = scheduler.submit(json!({}), JobPriority::Normal);
        scheduler.complete(old.job_id, json!({}));
        scheduler.fail(recent.job_id, "boom");

        let now = Utc::now();
        age_terminal(&scheduler, old.job_id, now - TimeDelta::hours(25));
        age_terminal(&scheduler, recent.job_id, now - TimeDelta::hours(23));

        let running = scheduler.submit(json!({}), JobPriority::Normal);

        assert_eq!(scheduler.cleanup(24), 1);
        assert!(scheduler.get_job(old.job_id).is_none());
        assert!(scheduler.get_job(recent.job_id).is_some());
        assert!(scheduler.get_job(running.job_id).is_some());
    }

    #[test]
    fn test_cleanup_never_touches_live_jobs() {
        let scheduler = JobScheduler::new(1);
        let a = scheduler.submit(json!({}), JobPriority::Normal);
        let b = scheduler.submit(json!({}), JobPriority::Normal);

        let removed = scheduler.cleanup_before(Utc::now() + TimeDelta::hours(1));
        assert_eq!(removed, 0);
        assert!(scheduler.get_job(a.job_id).is_some());
        assert!(scheduler.get_job(b.job_id).is_some());
    }

    #[test]
    fn test_subscribe_sees_changes() {
        let scheduler = JobScheduler::new(1);
        let mut rx = scheduler.subscribe();
        assert!(!rx.has_changed().unwrap());
        scheduler.submit(json!({}), JobPriority::Normal);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        assert!(!rx.has_changed().unwrap());
    }
}
