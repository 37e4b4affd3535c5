//! Background effect jobs.
//!
//! This crate provides:
//! - Job registry with bounded concurrency and cancellation
//! - Per-job worker driving decode, per-frame effect, encode and audio remux
//! - Progress handles readable while a job runs
//! - The media backend seam used by the worker

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod processor;
pub mod progress;

pub use backend::{FfmpegBackend, FrameSink, FrameSource, MediaBackend};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use manager::JobManager;
pub use processor::{JobOutcome, JobProcessor};
pub use progress::ProgressHandle;
