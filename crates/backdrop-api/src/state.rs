//! Application state.

use std::sync::Arc;

use tracing::{info, warn};

use backdrop_media::{CascadeDetector, DetectorConfig, FramePipeline, NullDetector, RegionDetector};
use backdrop_storage::CacheStore;
use backdrop_worker::{FfmpegBackend, JobManager, MediaBackend, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: Arc<JobManager>,
    pub cache: Arc<CacheStore>,
    pub backend: Arc<dyn MediaBackend>,
    pub pipeline: Arc<FramePipeline>,
    pub http: reqwest::Client,
}

impl AppState {
    /// Build production state: ffmpeg backend, cascade detector, cache in
    /// the configured output directory.
    pub async fn new(
        config: ApiConfig,
        worker_config: WorkerConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let cache = Arc::new(CacheStore::open(&worker_config.output_dir).await?);
        let stats = cache.stats().await;
        info!(
            output_dir = %worker_config.output_dir,
            entries = stats.count,
            "Cache store opened"
        );

        let detector_config = DetectorConfig::from_env();
        let detector: Arc<dyn RegionDetector> = match CascadeDetector::from_config(&detector_config) {
            Ok(detector) => Arc::new(detector),
            Err(e) => {
                warn!(
                    cascade_dir = %detector_config.cascade_dir.display(),
                    error = %e,
                    "Cascades unavailable, person detection disabled"
                );
                Arc::new(NullDetector)
            }
        };

        let backend: Arc<dyn MediaBackend> = Arc::new(FfmpegBackend::new(worker_config.remux_timeout));
        let pipeline = Arc::new(FramePipeline::new(detector));

        Self::from_parts(config, worker_config, backend, pipeline, cache)
    }

    /// Assemble state from already constructed components.
    pub fn from_parts(
        config: ApiConfig,
        worker_config: WorkerConfig,
        backend: Arc<dyn MediaBackend>,
        pipeline: Arc<FramePipeline>,
        cache: Arc<CacheStore>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.proxy_timeout)
            .build()?;
        let jobs = Arc::new(JobManager::new(
            worker_config,
            Arc::clone(&backend),
            Arc::clone(&pipeline),
            Arc::clone(&cache),
        ));

        Ok(Self {
            config,
            jobs,
            cache,
            backend,
            pipeline,
            http,
        })
    }
}
