//! Structured job logging.

use tracing::{error, info, warn, Span};

use backdrop_models::{Effect, JobId};

/// Per-job logger attaching the job id and effect to every event.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    effect: Effect,
}

impl JobLogger {
    pub fn new(job_id: &JobId, effect: Effect) -> Self {
        Self {
            job_id: job_id.to_string(),
            effect,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, effect = %self.effect, "Job started: {}", message);
    }

    pub fn log_progress(&self, processed: u64, total: u64) {
        info!(
            job_id = %self.job_id,
            effect = %self.effect,
            processed,
            total,
            "Job progress"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, effect = %self.effect, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, effect = %self.effect, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, effect = %self.effect, "Job completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span wrapping the whole job task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, effect = %self.effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, Effect::Blur);
        assert_eq!(logger.job_id(), job_id.as_str());
    }
}
