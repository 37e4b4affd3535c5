//! Shared, thread-safe view of one job.
//!
//! The worker executing a job is the only writer; status queries read
//! snapshots concurrently. Frame counters are atomics so the per-frame path
//! never takes a lock.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

use backdrop_models::{Effect, JobErrorKind, JobId, JobSnapshot, JobStatus};

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    filename: Option<String>,
    error: Option<String>,
    error_kind: Option<JobErrorKind>,
    cached: bool,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Inner {
    job_id: JobId,
    source: String,
    effect: Effect,
    created_at: DateTime<Utc>,
    processed: AtomicU64,
    total: AtomicU64,
    state: RwLock<JobState>,
    cancel_tx: watch::Sender<bool>,
}

/// Clonable handle to a job's progress and lifecycle.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    inner: Arc<Inner>,
}

impl ProgressHandle {
    /// A new job in `Queued`.
    pub fn new(job_id: JobId, source: impl Into<String>, effect: Effect) -> Self {
        let now = Utc::now();
        let (cancel_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                job_id,
                source: source.into(),
                effect,
                created_at: now,
                processed: AtomicU64::new(0),
                total: AtomicU64::new(0),
                state: RwLock::new(JobState {
                    status: JobStatus::Queued,
                    filename: None,
                    error: None,
                    error_kind: None,
                    cached: false,
                    updated_at: now,
                }),
                cancel_tx,
            }),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.inner.job_id
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn effect(&self) -> Effect {
        self.inner.effect
    }

    pub fn status(&self) -> JobStatus {
        self.read().status
    }

    pub fn processed(&self) -> u64 {
        self.inner.processed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.inner.total.load(Ordering::SeqCst)
    }

    /// Consistent copy of the current state.
    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.read();
        // processed first: total is always raised before processed grows
        let processed = self.processed();
        let total = self.total().max(processed);
        JobSnapshot {
            job_id: self.inner.job_id.clone(),
            status: state.status,
            source: self.inner.source.clone(),
            effect: self.inner.effect,
            processed_frames: processed,
            total_frames: total,
            filename: state.filename.clone(),
            error: state.error.clone(),
            error_kind: state.error_kind,
            cached: state.cached,
            created_at: self.inner.created_at,
            updated_at: state.updated_at,
        }
    }

    /// Set the expected frame count.
    pub fn set_total(&self, total: u64) {
        self.inner.total.store(total, Ordering::SeqCst);
    }

    /// Count one more processed frame, growing the total if the estimate
    /// was short. Returns the new processed count.
    pub fn advance(&self) -> u64 {
        let next = self.processed() + 1;
        self.inner.total.fetch_max(next, Ordering::SeqCst);
        self.inner.processed.store(next, Ordering::SeqCst);
        next
    }

    /// `Queued -> Processing`. False if the job left `Queued` already.
    pub fn start(&self) -> bool {
        self.transition(JobStatus::Processing, |_| {})
    }

    /// Finish successfully with the artifact `filename`.
    pub fn complete(&self, filename: impl Into<String>, cached: bool) -> bool {
        let filename = filename.into();
        self.transition(JobStatus::Completed, |state| {
            if !cached {
                self.inner.total.store(self.processed(), Ordering::SeqCst);
            }
            state.filename = Some(filename);
            state.cached = cached;
        })
    }

    /// Finish with an error.
    pub fn fail(&self, kind: JobErrorKind, message: impl Into<String>) -> bool {
        let message = message.into();
        self.transition(JobStatus::Failed, |state| {
            state.error = Some(message);
            state.error_kind = Some(kind);
        })
    }

    /// Acknowledge a cancellation request.
    pub fn mark_cancelled(&self) -> bool {
        self.transition(JobStatus::Cancelled, |_| {})
    }

    /// Ask the worker to stop. A job that has not started yet is cancelled
    /// right away. False if the job is already terminal.
    pub fn request_cancel(&self) -> bool {
        let mut state = self.write();
        if state.status.is_terminal() {
            return false;
        }
        self.inner.cancel_tx.send_replace(true);
        if state.status == JobStatus::Queued {
            state.status = JobStatus::Cancelled;
            state.updated_at = Utc::now();
        }
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        *self.inner.cancel_tx.borrow()
    }

    /// Receiver flipping to `true` when cancellation is requested.
    pub fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.inner.cancel_tx.subscribe()
    }

    fn transition(&self, next: JobStatus, apply: impl FnOnce(&mut JobState)) -> bool {
        let mut state = self.write();
        if !state.status.can_transition_to(next) {
            return false;
        }
        state.status = next;
        apply(&mut state);
        state.updated_at = Utc::now();
        true
    }

    fn read(&self) -> RwLockReadGuard<'_, JobState> {
        self.inner.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, JobState> {
        self.inner.state.write().unwrap_or_else(|e| e.into_inner())
    }
}
