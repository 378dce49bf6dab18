use plan::{PlanInput, QueryPlanner};
use serde::Serialize;
use service::AnalysisService;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RunError;
use crate::poller::{CompletionPoller, PollPolicy};
use crate::retry::{RetryError, RetryPolicy};
use crate::submitter::BatchSubmitter;

/// Progress of one run, as published to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    CheckingCache,
    Planning,
    Submitting { submitted: usize, total: usize },
    Polling { attempt: usize, completed: usize, total: usize },
    Resolved { answer: String },
    Failed { kind: String, reason: String },
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Resolved { .. } | RunStatus::Failed { .. } | RunStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub question: String,
    pub input: PlanInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub answer: String,
    pub from_cache: bool,
    pub batch_id: Option<String>,
    pub combinations: usize,
    pub submission_failures: usize,
    pub poll_attempts: usize,
}

impl RunReport {
    fn cached(answer: String) -> Self {
        Self {
            answer,
            from_cache: true,
            batch_id: None,
            combinations: 0,
            submission_failures: 0,
            poll_attempts: 0,
        }
    }
}

/// Sequences cache check, planning, submission and polling for one question.
pub struct Orchestrator<S: ?Sized> {
    service: Arc<S>,
    planner: QueryPlanner,
    poll_policy: PollPolicy,
    retry: RetryPolicy,
}

impl<S: AnalysisService + ?Sized + 'static> Orchestrator<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            planner: QueryPlanner::default(),
            poll_policy: PollPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_planner(mut self, planner: QueryPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_poll_policy(mut self, poll_policy: PollPolicy) -> Self {
        self.poll_policy = poll_policy;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run to a final answer on a background task.
    pub fn spawn(self: &Arc<Self>, request: RunRequest) -> RunHandle {
        let (status_tx, status_rx) = watch::channel(RunStatus::Pending);
        let cancel = CancellationToken::new();

        let orchestrator = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move { orchestrator.run(&request, &token, &status_tx).await });

        RunHandle {
            status: status_rx,
            cancel,
            task,
        }
    }

    /// Answer `request.question`, reusing a cached answer when the backend has one.
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
        status: &watch::Sender<RunStatus>,
    ) -> Result<RunReport, RunError> {
        let result = self.execute(request, cancel, status).await;

        let terminal = match &result {
            Ok(report) => RunStatus::Resolved {
                answer: report.answer.clone(),
            },
            Err(RunError::Cancelled) => RunStatus::Cancelled,
            Err(e) => RunStatus::Failed {
                kind: e.kind().to_string(),
                reason: e.to_string(),
            },
        };
        status.send_replace(terminal);

        result
    }

    async fn execute(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
        status: &watch::Sender<RunStatus>,
    ) -> Result<RunReport, RunError> {
        let question = request.question.as_str();

        status.send_replace(RunStatus::CheckingCache);
        if self.is_cached(question).await {
            info!(question, "Answer already exists, skipping batch");
            let answer = self.fetch_answer(question, cancel).await?;
            return Ok(RunReport::cached(answer));
        }

        status.send_replace(RunStatus::Planning);
        let plan = self.planner.plan(&request.input);
        if plan.is_empty() {
            return Err(RunError::EmptyPlan);
        }
        let total = plan.combinations.len();
        info!(batch_id = %plan.batch_id, combinations = total, "Batch planned");

        let submitter = BatchSubmitter::new(self.service.as_ref(), &self.retry);
        submitter.announce(&plan, cancel).await?;

        status.send_replace(RunStatus::Submitting { submitted: 0, total });
        let report = submitter
            .submit_all(question, &plan, cancel, |submitted| {
                status.send_replace(RunStatus::Submitting { submitted, total });
            })
            .await?;
        if report.failed() > 0 {
            warn!(
                batch_id = %plan.batch_id,
                failed = report.failed(),
                total,
                "Some combinations were not accepted"
            );
        }

        let mut poller = CompletionPoller::new(self.service.as_ref(), &self.poll_policy);
        status.send_replace(RunStatus::Polling {
            attempt: 0,
            completed: 0,
            total,
        });
        let outcome = poller
            .run(&plan.batch_id, question, cancel, |attempt, completed| {
                status.send_replace(RunStatus::Polling {
                    attempt,
                    completed: completed.len(),
                    total,
                });
            })
            .await?;

        let answer = self.fetch_answer(question, cancel).await?;
        info!(batch_id = %plan.batch_id, "Final answer received");

        Ok(RunReport {
            answer,
            from_cache: false,
            batch_id: Some(plan.batch_id),
            combinations: total,
            submission_failures: report.failed(),
            poll_attempts: outcome.attempts,
        })
    }

    /// A failed lookup counts as "not cached".
    async fn is_cached(&self, question: &str) -> bool {
        match self.service.check_cached(question).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(error = %e, "Cached answer lookup failed, running batch");
                false
            }
        }
    }

    async fn fetch_answer(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<String, RunError> {
        self.retry
            .retry("fetch_final_answer", cancel, || {
                self.service.fetch_final_answer(question)
            })
            .await
            .map_err(|e| match e {
                RetryError::Cancelled => RunError::Cancelled,
                RetryError::Exhausted(source) => RunError::FinalAnswer(source),
            })
    }
}

/// Handle to a spawned run.
pub struct RunHandle {
    status: watch::Receiver<RunStatus>,
    cancel: CancellationToken,
    task: JoinHandle<Result<RunReport, RunError>>,
}

impl RunHandle {
    pub fn status(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abandon the run; pending retries and polls stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<RunReport, RunError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Run task aborted");
                Err(RunError::Cancelled)
            }
        }
    }
}
