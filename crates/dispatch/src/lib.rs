//! Dispatching planned batches to the analysis backend and driving them to a
//! final answer.

pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod retry;
pub mod submitter;

#[cfg(test)]
mod testing;

pub use error::RunError;
pub use orchestrator::{Orchestrator, RunHandle, RunReport, RunRequest, RunStatus};
pub use poller::{CompletionPoller, PollOutcome, PollPolicy, PollState};
pub use retry::RetryPolicy;
pub use submitter::{BatchSubmitter, SubmissionReport};
