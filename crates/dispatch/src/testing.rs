//! Scripted in-memory backend for exercising the dispatch stages.

use async_trait::async_trait;
use plan::Entity;
use service::{AnalysisService, BatchStatus, Result, ServiceError, Submission, SubmissionStatus};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CheckCached,
    FetchFinalAnswer,
    Announce { batch_id: String, combination_ids: Vec<String> },
    Submit { combination_id: String },
    Poll { batch_id: String },
}

#[derive(Default)]
pub struct ScriptedService {
    pub cached: bool,
    pub fail_check_cached: bool,
    pub fail_announce: bool,
    /// Submissions at these positions (0-based, in call order) fail.
    pub failing_submissions: Vec<usize>,
    /// Poll responses in order; once drained every poll reports finished.
    pub polls: Mutex<VecDeque<Result<BatchStatus>>>,
    /// Final answer fetches that fail before one succeeds.
    pub failing_answer_fetches: Mutex<usize>,
    pub calls: Mutex<Vec<Call>>,
}

impl ScriptedService {
    pub fn with_polls(polls: Vec<Result<BatchStatus>>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|&c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn pending(completed: &[&str]) -> Result<BatchStatus> {
    Ok(BatchStatus {
        status: "Tasks are still running".to_string(),
        completed: completed.iter().map(|s| s.to_string()).collect(),
    })
}

pub fn finished() -> Result<BatchStatus> {
    Ok(BatchStatus {
        status: service::ALL_TASKS_FINISHED.to_string(),
        completed: Vec::new(),
    })
}

pub fn unavailable() -> Result<BatchStatus> {
    Err(ServiceError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl AnalysisService for ScriptedService {
    async fn extract_entities(&self, _question: &str) -> Result<Vec<Entity>> {
        Ok(Vec::new())
    }

    async fn check_cached(&self, _question: &str) -> Result<bool> {
        self.record(Call::CheckCached);
        if self.fail_check_cached {
            return Err(ServiceError::Unavailable("cache lookup down".to_string()));
        }
        Ok(self.cached)
    }

    async fn fetch_final_answer(&self, question: &str) -> Result<String> {
        self.record(Call::FetchFinalAnswer);
        let mut failing = self.failing_answer_fetches.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(ServiceError::Unavailable("answer store down".to_string()));
        }
        Ok(format!("answer to {question}"))
    }

    async fn announce_batch(&self, batch_id: &str, combination_ids: &[String]) -> Result<()> {
        self.record(Call::Announce {
            batch_id: batch_id.to_string(),
            combination_ids: combination_ids.to_vec(),
        });
        if self.fail_announce {
            return Err(ServiceError::Unavailable("announce rejected".to_string()));
        }
        Ok(())
    }

    async fn submit_combination(&self, submission: Submission<'_>) -> Result<SubmissionStatus> {
        let position = self.count(|c| matches!(c, Call::Submit { .. }));
        self.record(Call::Submit {
            combination_id: submission.combination_id.to_string(),
        });
        if self.failing_submissions.contains(&position) {
            return Err(ServiceError::Unavailable("worker crashed".to_string()));
        }
        Ok(SubmissionStatus {
            status: "Task submitted".to_string(),
        })
    }

    async fn poll_batch_status(&self, batch_id: &str, _question: &str) -> Result<BatchStatus> {
        self.record(Call::Poll {
            batch_id: batch_id.to_string(),
        });
        self.polls.lock().unwrap().pop_front().unwrap_or_else(finished)
    }
}
