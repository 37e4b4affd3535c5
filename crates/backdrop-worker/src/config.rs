//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs processing frames at the same time
    pub max_concurrent_jobs: usize,
    /// Parent directory for per-job temporary directories
    pub work_dir: String,
    /// Directory holding finished artifacts and the cache index
    pub output_dir: String,
    /// Upper bound for the audio remux step
    pub remux_timeout: Duration,
    /// Emit a progress log line every this many frames
    pub progress_log_every: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            work_dir: "/tmp/backdrop".to_string(),
            output_dir: "processed_videos".to_string(),
            remux_timeout: Duration::from_secs(600),
            progress_log_every: 100,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(2),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or_else(|_| "/tmp/backdrop".to_string()),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "processed_videos".to_string()),
            remux_timeout: Duration::from_secs(
                std::env::var("WORKER_REMUX_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            progress_log_every: std::env::var("WORKER_PROGRESS_LOG_EVERY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &u64| *n > 0)
                .unwrap_or(100),
        }
    }
}
