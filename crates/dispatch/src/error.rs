use service::ServiceError;
use std::time::Duration;
use thiserror::Error;

/// Fatal outcomes of a run. Transient submission and poll failures never
/// surface here; they are logged and retried.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Nothing to plan: no entities besides start_node")]
    EmptyPlan,

    #[error("Batch {batch_id} announcement failed: {source}")]
    Announce {
        batch_id: String,
        #[source]
        source: ServiceError,
    },

    #[error("Batch {batch_id} still incomplete after {attempts} status polls")]
    PollAttemptsExceeded { batch_id: String, attempts: usize },

    #[error("Batch {batch_id} did not complete within {timeout:?}")]
    BatchTimeout { batch_id: String, timeout: Duration },

    #[error("Fetching the final answer failed: {0}")]
    FinalAnswer(#[source] ServiceError),

    #[error("Run cancelled")]
    Cancelled,
}

impl RunError {
    /// Short machine-readable tag for status reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::EmptyPlan => "empty_plan",
            RunError::Announce { .. } => "announce_failed",
            RunError::PollAttemptsExceeded { .. } => "poll_attempts_exceeded",
            RunError::BatchTimeout { .. } => "batch_timeout",
            RunError::FinalAnswer(_) => "final_answer_failed",
            RunError::Cancelled => "cancelled",
        }
    }
}
