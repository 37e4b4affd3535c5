//! Execution of a single job: decode, per-frame effect, encode, remux,
//! cache registration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::warn;

use backdrop_media::{move_file, FramePipeline, MediaError, RemuxOutcome};
use backdrop_storage::{artifact_filename, CacheEntry, CacheKey, CacheStore};

use crate::backend::{FrameSink, FrameSource, MediaBackend};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::progress::ProgressHandle;

/// How a job that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        filename: String,
        /// An equal artifact was registered while this job ran
        reused: bool,
    },
    Cancelled,
}

enum FrameLoop {
    Finished,
    Cancelled,
}

/// Runs jobs against a media backend, a frame pipeline and the cache.
#[derive(Clone)]
pub struct JobProcessor {
    config: WorkerConfig,
    backend: Arc<dyn MediaBackend>,
    pipeline: Arc<FramePipeline>,
    cache: Arc<CacheStore>,
}

impl JobProcessor {
    pub fn new(
        config: WorkerConfig,
        backend: Arc<dyn MediaBackend>,
        pipeline: Arc<FramePipeline>,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            config,
            backend,
            pipeline,
            cache,
        }
    }

    /// Process the job behind `handle`.
    ///
    /// Progress is reported through the handle; the terminal status is left
    /// to the caller. The job's temporary directory is gone when this
    /// returns, whatever the outcome.
    pub async fn run(&self, handle: &ProgressHandle, logger: &JobLogger) -> WorkerResult<JobOutcome> {
        let source = handle.source();
        let started = Instant::now();
        logger.log_start(source);

        let info = self
            .backend
            .probe(source)
            .await
            .map_err(|e| WorkerError::source_unavailable(e.to_string()))?;
        handle.set_total(info.estimated_frames());

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let work = tempfile::Builder::new()
            .prefix("job_")
            .tempdir_in(&self.config.work_dir)?;

        let mut frames = self
            .backend
            .open_source(source, &info)
            .await
            .map_err(|e| WorkerError::source_unavailable(e.to_string()))?;

        let video_path = work.path().join("video.mp4");
        let mut sink = match self.backend.create_sink(&video_path, &info).await {
            Ok(sink) => sink,
            Err(e) => {
                frames.close().await;
                return Err(WorkerError::encode_failure(e.to_string()));
            }
        };

        let pumped = self.pump(handle, logger, frames.as_mut(), sink.as_mut()).await;
        frames.close().await;
        match pumped {
            Ok(FrameLoop::Finished) => {}
            Ok(FrameLoop::Cancelled) => {
                sink.abort().await;
                return Ok(JobOutcome::Cancelled);
            }
            Err(e) => {
                sink.abort().await;
                return Err(e);
            }
        }

        if handle.processed() == 0 {
            sink.abort().await;
            return Err(WorkerError::source_unavailable("No frames could be decoded"));
        }

        let video = sink
            .finish()
            .await
            .map_err(|e| WorkerError::encode_failure(e.to_string()))?;

        if handle.is_cancel_requested() {
            return Ok(JobOutcome::Cancelled);
        }

        let muxed = work.path().join("final.mp4");
        match self
            .backend
            .remux(source, &video, &muxed, info.has_audio, handle.cancel_receiver())
            .await
        {
            Ok(RemuxOutcome::WithAudio) => {}
            Ok(RemuxOutcome::VideoOnly) => logger.log_warning("Source has no audio track"),
            Err(MediaError::Cancelled) => return Ok(JobOutcome::Cancelled),
            Err(e) => return Err(WorkerError::audio_error(e.to_string())),
        }

        let outcome = self.register(handle, &muxed).await?;
        drop_work_dir(work, logger);

        metrics::histogram!("backdrop_job_duration_seconds").record(started.elapsed().as_secs_f64());
        metrics::counter!("backdrop_frames_processed_total").increment(handle.processed());
        Ok(outcome)
    }

    /// Frame loop; the only place a running job checks for cancellation.
    async fn pump(
        &self,
        handle: &ProgressHandle,
        logger: &JobLogger,
        frames: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> WorkerResult<FrameLoop> {
        let effect = handle.effect();
        loop {
            if handle.is_cancel_requested() {
                return Ok(FrameLoop::Cancelled);
            }

            let frame = match frames.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(FrameLoop::Finished),
                Err(e) => return Err(WorkerError::source_unavailable(e.to_string())),
            };

            let pipeline = Arc::clone(&self.pipeline);
            let processed = tokio::task::spawn_blocking(move || pipeline.process(&frame, effect))
                .await
                .map_err(|e| WorkerError::pipeline_failed(format!("Frame task panicked: {}", e)))?
                .map_err(|e| WorkerError::pipeline_failed(e.to_string()))?;

            sink.write_frame(&processed.frame)
                .await
                .map_err(|e| WorkerError::encode_failure(e.to_string()))?;

            let done = handle.advance();
            if done % self.config.progress_log_every.max(1) == 0 {
                logger.log_progress(done, handle.total());
            }
        }
    }

    /// Move the finished file into the output directory and index it.
    ///
    /// If another job registered the same (source, effect) meanwhile, its
    /// artifact wins and ours is discarded with the work directory.
    async fn register(&self, handle: &ProgressHandle, muxed: &Path) -> WorkerResult<JobOutcome> {
        let effect = handle.effect();
        let key = CacheKey::new(handle.source(), effect);

        if let Some(existing) = self.cache.lookup(&key).await? {
            return Ok(JobOutcome::Completed {
                filename: existing.filename,
                reused: true,
            });
        }

        let filename = artifact_filename(effect, &key);
        let target: PathBuf = self.cache.path_for(&filename);
        move_file(muxed, &target).await?;

        let indexed = async {
            let size_bytes = tokio::fs::metadata(&target).await?.len();
            let entry = CacheEntry::new(key, handle.source(), effect, filename, size_bytes);
            Ok::<_, WorkerError>(self.cache.insert(entry).await?)
        }
        .await;

        match indexed {
            Ok(entry) => Ok(JobOutcome::Completed {
                filename: entry.filename,
                reused: false,
            }),
            Err(e) => {
                // An unindexed artifact would never be served or cleared
                match tokio::fs::remove_file(&target).await {
                    Ok(()) => {}
                    Err(rm) if rm.kind() == std::io::ErrorKind::NotFound => {}
                    Err(rm) => warn!(path = %target.display(), error = %rm, "Failed to remove unindexed artifact"),
                }
                Err(e)
            }
        }
    }
}

fn drop_work_dir(work: TempDir, logger: &JobLogger) {
    let path = work.path().to_path_buf();
    if let Err(e) = work.close() {
        logger.log_warning(&format!("Failed to remove {}: {}", path.display(), e));
    }
}
