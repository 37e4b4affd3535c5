//! Shared data models for the Backdrop backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job status and job error kinds
//! - Background effects
//! - Detected regions

pub mod effect;
pub mod job;
pub mod region;
pub mod utils;

// Re-export common types
pub use effect::{Effect, EffectInfo, EffectParseError};
pub use job::{JobErrorKind, JobId, JobSnapshot, JobStatus};
pub use region::Region;
pub use utils::format_bytes;
