use rand::Rng;
use serde::{Deserialize, Serialize};
use service::AnalysisService;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RunError;

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// When and for how long to keep asking whether a batch has finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Upper bound of a random delay added to each interval.
    pub jitter: Duration,
    /// `None` polls until the batch finishes or the run is cancelled.
    pub max_attempts: Option<usize>,
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            jitter: Duration::ZERO,
            max_attempts: Some(200),
            timeout: None,
        }
    }
}

impl PollPolicy {
    /// Fixed interval, no jitter, no limits.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling { attempt: usize },
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub attempts: usize,
    /// Completed combination ids from the last non-terminal report.
    pub completed: Vec<String>,
}

/// Drives a submitted batch to completion, one outstanding poll at a time.
pub struct CompletionPoller<'a, S: ?Sized> {
    service: &'a S,
    policy: &'a PollPolicy,
    state: PollState,
}

impl<'a, S: AnalysisService + ?Sized> CompletionPoller<'a, S> {
    pub fn new(service: &'a S, policy: &'a PollPolicy) -> Self {
        Self {
            service,
            policy,
            state: PollState::Submitted,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Poll until the backend reports the batch finished.
    ///
    /// Transport errors and non-terminal statuses both mean "try again after
    /// the interval". `on_attempt` sees each attempt number and the latest
    /// completed ids.
    pub async fn run(
        &mut self,
        batch_id: &str,
        question: &str,
        cancel: &CancellationToken,
        mut on_attempt: impl FnMut(usize, &[String]),
    ) -> Result<PollOutcome, RunError> {
        let deadline = self.policy.timeout.map(|t| Instant::now() + t);
        let mut completed = Vec::new();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            attempt += 1;
            self.state = PollState::Polling { attempt };

            match self.service.poll_batch_status(batch_id, question).await {
                Ok(status) if status.all_complete() => {
                    self.state = PollState::Resolved;
                    info!(batch_id, attempts = attempt, "All tasks finished");
                    return Ok(PollOutcome {
                        attempts: attempt,
                        completed,
                    });
                }
                Ok(status) => {
                    debug!(
                        batch_id,
                        attempt,
                        status = %status.status,
                        completed = status.completed.len(),
                        "Batch still running"
                    );
                    completed = status.completed;
                }
                Err(e) => {
                    warn!(batch_id, attempt, error = %e, "Status poll failed, will retry");
                }
            }
            on_attempt(attempt, &completed);

            if let Some(max) = self.policy.max_attempts {
                if attempt >= max {
                    return Err(RunError::PollAttemptsExceeded {
                        batch_id: batch_id.to_string(),
                        attempts: attempt,
                    });
                }
            }

            let mut delay = self.policy.next_delay();
            if let (Some(deadline), Some(timeout)) = (deadline, self.policy.timeout) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(RunError::BatchTimeout {
                        batch_id: batch_id.to_string(),
                        timeout,
                    });
                }
                delay = delay.min(remaining);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(RunError::Cancelled),
                _ = sleep(delay) => {}
            }
        }
    }
}
