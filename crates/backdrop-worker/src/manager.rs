//! Job registry and scheduling.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn, Instrument};

use backdrop_media::FramePipeline;
use backdrop_models::{Effect, JobErrorKind, JobId, JobSnapshot, JobStatus};
use backdrop_storage::{CacheKey, CacheStore};

use crate::backend::MediaBackend;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::processor::{JobOutcome, JobProcessor};
use crate::progress::ProgressHandle;

/// Owns every job for the lifetime of the process.
///
/// Jobs are registered synchronously and executed on their own tasks. At
/// most `max_concurrent_jobs` of them process frames at once; the rest wait
/// in `Queued`. Finished jobs stay queryable until evicted.
pub struct JobManager {
    config: WorkerConfig,
    processor: JobProcessor,
    cache: Arc<CacheStore>,
    jobs: RwLock<HashMap<JobId, ProgressHandle>>,
    slots: Arc<Semaphore>,
}

impl JobManager {
    pub fn new(
        config: WorkerConfig,
        backend: Arc<dyn MediaBackend>,
        pipeline: Arc<FramePipeline>,
        cache: Arc<CacheStore>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let processor = JobProcessor::new(config.clone(), backend, pipeline, Arc::clone(&cache));
        info!(
            max_concurrent_jobs = config.max_concurrent_jobs,
            work_dir = %config.work_dir,
            "Job manager ready"
        );
        Self {
            config,
            processor,
            cache,
            jobs: RwLock::new(HashMap::new()),
            slots,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Register a job and start it.
    ///
    /// A cached result completes the job before this returns; otherwise the
    /// job is `Queued` and a worker task owns it from here on.
    pub async fn submit(&self, source: &str, effect: Effect) -> JobId {
        let source = source.trim();
        let handle = ProgressHandle::new(JobId::new(), source, effect);
        let job_id = handle.job_id().clone();
        self.write_jobs().insert(job_id.clone(), handle.clone());
        metrics::counter!("backdrop_jobs_submitted_total", "effect" => effect.as_str()).increment(1);

        let key = CacheKey::new(source, effect);
        match self.cache.lookup(&key).await {
            Ok(Some(entry)) => {
                info!(job_id = %job_id, key = %key, filename = %entry.filename, "Cache hit");
                handle.complete(entry.filename, true);
                record_finished(JobStatus::Completed);
                return job_id;
            }
            Ok(None) => debug!(job_id = %job_id, key = %key, "Cache miss"),
            Err(e) => warn!(job_id = %job_id, error = %e, "Cache lookup failed, processing anyway"),
        }

        let task = tokio::spawn(run_job(
            self.processor.clone(),
            Arc::clone(&self.slots),
            handle.clone(),
        ));
        tokio::spawn(async move {
            if let Err(e) = task.await {
                if handle.fail(JobErrorKind::Internal, format!("Worker task aborted: {}", e)) {
                    record_finished(JobStatus::Failed);
                }
            }
        });

        job_id
    }

    pub fn status(&self, job_id: &JobId) -> Option<JobSnapshot> {
        self.read_jobs().get(job_id).map(ProgressHandle::snapshot)
    }

    pub fn handle(&self, job_id: &JobId) -> Option<ProgressHandle> {
        self.read_jobs().get(job_id).cloned()
    }

    /// Request cancellation. False for unknown or already finished jobs.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let Some(handle) = self.handle(job_id) else {
            return false;
        };
        let accepted = handle.request_cancel();
        if accepted {
            info!(job_id = %job_id, status = %handle.status(), "Cancellation requested");
        }
        accepted
    }

    /// Forget a finished job.
    ///
    /// `Ok(false)` for unknown ids; jobs still queued or processing are
    /// refused.
    pub fn evict(&self, job_id: &JobId) -> WorkerResult<bool> {
        let mut jobs = self.write_jobs();
        let terminal = match jobs.get(job_id) {
            None => return Ok(false),
            Some(handle) => handle.status().is_terminal(),
        };
        if !terminal {
            return Err(WorkerError::JobActive(job_id.to_string()));
        }
        jobs.remove(job_id);
        info!(job_id = %job_id, "Job evicted");
        Ok(true)
    }

    /// All known jobs, oldest first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<JobSnapshot> = self.read_jobs().values().map(ProgressHandle::snapshot).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    /// Jobs not yet in a terminal state.
    pub fn active_count(&self) -> usize {
        self.read_jobs()
            .values()
            .filter(|h| !h.status().is_terminal())
            .count()
    }

    fn read_jobs(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, ProgressHandle>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_jobs(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, ProgressHandle>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }
}

async fn run_job(processor: JobProcessor, slots: Arc<Semaphore>, handle: ProgressHandle) {
    let logger = JobLogger::new(handle.job_id(), handle.effect());
    let span = logger.create_span();

    async move {
        let permit = tokio::select! {
            permit = slots.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    handle.fail(JobErrorKind::Internal, "Worker pool is closed");
                    record_finished(JobStatus::Failed);
                    return;
                }
            },
            _ = cancel_requested(handle.cancel_receiver()) => {
                handle.mark_cancelled();
                logger.log_completion("cancelled before start");
                record_finished(JobStatus::Cancelled);
                return;
            }
        };

        if !handle.start() {
            // Cancelled between acquiring the slot and starting
            record_finished(handle.status());
            return;
        }

        let result = processor.run(&handle, &logger).await;
        drop(permit);

        match result {
            Ok(JobOutcome::Completed { filename, reused }) => {
                if reused {
                    logger.log_warning("Equal artifact registered concurrently, reusing it");
                }
                logger.log_completion(&format!("{} ({} frames)", filename, handle.processed()));
                handle.complete(filename, false);
            }
            Ok(JobOutcome::Cancelled) => {
                logger.log_completion("cancelled, partial output discarded");
                handle.mark_cancelled();
            }
            Err(_) if handle.is_cancel_requested() => {
                logger.log_completion("cancelled, partial output discarded");
                handle.mark_cancelled();
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                handle.fail(e.kind(), e.to_string());
            }
        }
        record_finished(handle.status());
    }
    .instrument(span)
    .await
}

async fn cancel_requested(mut rx: watch::Receiver<bool>) {
    loop {
        let requested = *rx.borrow_and_update();
        if requested {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn record_finished(status: JobStatus) {
    metrics::counter!("backdrop_jobs_finished_total", "status" => status.as_str()).increment(1);
}
