//! Job identifiers, lifecycle status and status snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::Effect;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(format!("job_{}", Uuid::new_v4().simple()))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job lifecycle status.
///
/// `Queued -> Processing -> {Completed, Failed, Cancelled}`. A cache hit goes
/// straight from `Queued` to `Completed`; cancelling a queued job goes
/// straight to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Registered, waiting for a worker slot
    #[default]
    Queued,
    /// Frames are being processed
    Processing,
    /// Output is available
    Completed,
    /// Unrecoverable error, see the error fields
    Failed,
    /// Stopped on request, partial output discarded
    Cancelled,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Completed)
                | (Queued, Failed)
                | (Queued, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category of a fatal job error, reported next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// Source missing, unreachable or undecodable
    SourceUnavailable,
    /// Output stream could not be written
    EncodeFailure,
    /// Audio could not be carried over to the output
    AudioError,
    /// A per-frame stage failed
    PipelineFailure,
    /// Anything else (filesystem, cache registration)
    Internal,
}

impl JobErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorKind::SourceUnavailable => "source_unavailable",
            JobErrorKind::EncodeFailure => "encode_failure",
            JobErrorKind::AudioError => "audio_error",
            JobErrorKind::PipelineFailure => "pipeline_failure",
            JobErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of a job, as returned to status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Source reference as submitted
    pub source: String,
    pub effect: Effect,
    pub processed_frames: u64,
    pub total_frames: u64,
    /// Output artifact filename, once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<JobErrorKind>,
    /// Whether the result came from the cache
    pub cached: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    /// Progress percentage (0-100) rounded to one decimal.
    pub fn progress(&self) -> f64 {
        if self.status == JobStatus::Completed {
            return 100.0;
        }
        if self.total_frames == 0 {
            return 0.0;
        }
        let pct = self.processed_frames as f64 / self.total_frames as f64 * 100.0;
        (pct.min(100.0) * 10.0).round() / 10.0
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: JobStatus, processed: u64, total: u64) -> JobSnapshot {
        let now = Utc::now();
        JobSnapshot {
            job_id: JobId::from_string("job_test"),
            status,
            source: "input.mp4".into(),
            effect: Effect::Sepia,
            processed_frames: processed,
            total_frames: total,
            filename: None,
            error: None,
            error_kind: None,
            cached: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_job_id_is_unique_and_prefixed() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("job_"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn test_progress_percentage() {
        assert_eq!(snapshot(JobStatus::Processing, 0, 0).progress(), 0.0);
        assert_eq!(snapshot(JobStatus::Processing, 1, 3).progress(), 33.3);
        assert_eq!(snapshot(JobStatus::Processing, 5, 10).progress(), 50.0);
        assert_eq!(snapshot(JobStatus::Completed, 0, 0).progress(), 100.0);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&JobErrorKind::AudioError).unwrap();
        assert_eq!(json, "\"audio_error\"");
    }
}
