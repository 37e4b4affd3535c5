//! Worker error types.

use thiserror::Error;

use backdrop_models::JobErrorKind;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Encoding failed: {0}")]
    EncodeFailure(String),

    #[error("Audio remux failed: {0}")]
    AudioError(String),

    #[error("Frame pipeline failed: {0}")]
    PipelineFailed(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job is still active: {0}")]
    JobActive(String),

    #[error("Storage error: {0}")]
    Storage(#[from] backdrop_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] backdrop_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    pub fn encode_failure(msg: impl Into<String>) -> Self {
        Self::EncodeFailure(msg.into())
    }

    pub fn audio_error(msg: impl Into<String>) -> Self {
        Self::AudioError(msg.into())
    }

    pub fn pipeline_failed(msg: impl Into<String>) -> Self {
        Self::PipelineFailed(msg.into())
    }

    /// Category reported in job status.
    pub fn kind(&self) -> JobErrorKind {
        match self {
            WorkerError::SourceUnavailable(_) => JobErrorKind::SourceUnavailable,
            WorkerError::EncodeFailure(_) => JobErrorKind::EncodeFailure,
            WorkerError::AudioError(_) => JobErrorKind::AudioError,
            WorkerError::PipelineFailed(_) => JobErrorKind::PipelineFailure,
            WorkerError::Cancelled
            | WorkerError::JobActive(_)
            | WorkerError::Storage(_)
            | WorkerError::Media(_)
            | WorkerError::Io(_) => JobErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backdrop_media::MediaError;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            WorkerError::source_unavailable("gone").kind(),
            JobErrorKind::SourceUnavailable
        );
        assert_eq!(WorkerError::audio_error("x").kind(), JobErrorKind::AudioError);
        assert_eq!(
            WorkerError::from(MediaError::internal("x")).kind(),
            JobErrorKind::Internal
        );
    }

    #[test]
    fn test_message_is_verbatim() {
        let err = WorkerError::encode_failure("disk full");
        assert_eq!(err.to_string(), "Encoding failed: disk full");
    }
}
