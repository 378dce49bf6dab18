use plan::Plan;
use service::{AnalysisService, Submission};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RunError;
use crate::retry::{RetryError, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub combination_id: String,
    /// Backend status on success, error text on failure.
    pub result: Result<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionReport {
    pub outcomes: Vec<SubmissionOutcome>,
}

impl SubmissionReport {
    pub fn submitted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.submitted()
    }
}

/// Announces a batch, then submits its combinations one at a time.
pub struct BatchSubmitter<'a, S: ?Sized> {
    service: &'a S,
    retry: &'a RetryPolicy,
}

impl<'a, S: AnalysisService + ?Sized> BatchSubmitter<'a, S> {
    pub fn new(service: &'a S, retry: &'a RetryPolicy) -> Self {
        Self { service, retry }
    }

    /// Register the batch with the backend. Must succeed before any submission.
    pub async fn announce(&self, plan: &Plan, cancel: &CancellationToken) -> Result<(), RunError> {
        let combination_ids = plan.combination_ids();
        self.retry
            .retry("announce_batch", cancel, || {
                self.service.announce_batch(&plan.batch_id, &combination_ids)
            })
            .await
            .map_err(|e| match e {
                RetryError::Cancelled => RunError::Cancelled,
                RetryError::Exhausted(source) => RunError::Announce {
                    batch_id: plan.batch_id.clone(),
                    source,
                },
            })?;

        info!(
            batch_id = %plan.batch_id,
            combinations = combination_ids.len(),
            "Batch announced"
        );
        Ok(())
    }

    /// Submit every combination in plan order, each awaited before the next.
    ///
    /// A failed submission is logged and recorded; the rest still go out.
    /// `on_progress` receives the number of combinations handled so far.
    pub async fn submit_all(
        &self,
        question: &str,
        plan: &Plan,
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(usize),
    ) -> Result<SubmissionReport, RunError> {
        let mut report = SubmissionReport::default();

        for planned in &plan.combinations {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            let submission = Submission {
                question,
                combination: &planned.combination,
                constituents: &plan.constituents,
                edges: &plan.edges,
                batch_id: &plan.batch_id,
                combination_id: &planned.id,
            };

            let result = match self.service.submit_combination(submission).await {
                Ok(status) => {
                    info!(
                        batch_id = %plan.batch_id,
                        combination_id = %planned.id,
                        status = %status.status,
                        "Combination submitted"
                    );
                    Ok(status.status)
                }
                Err(e) => {
                    warn!(
                        batch_id = %plan.batch_id,
                        combination_id = %planned.id,
                        error = %e,
                        "Combination submission failed"
                    );
                    Err(e.to_string())
                }
            };

            report.outcomes.push(SubmissionOutcome {
                combination_id: planned.id.clone(),
                result,
            });
            on_progress(report.outcomes.len());
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, ScriptedService};
    use plan::{Entity, PlanInput, QueryPlanner};

    fn plan_with(n_constituents: usize) -> Plan {
        let constituents: Vec<String> = (0..n_constituents).map(|i| format!("c{i}")).collect();
        let input = PlanInput {
            entities: vec![Entity::new("tea", "Food")],
            constituents: [("tea".to_string(), constituents)].into_iter().collect(),
            edges: Vec::new(),
        };
        QueryPlanner::default().plan(&input)
    }

    #[tokio::test]
    async fn test_announce_precedes_submissions_in_plan_order() {
        let service = ScriptedService::default();
        let retry = RetryPolicy::none();
        let submitter = BatchSubmitter::new(&service, &retry);
        let plan = plan_with(3);
        let cancel = CancellationToken::new();

        submitter.announce(&plan, &cancel).await.unwrap();
        let report = submitter
            .submit_all("q", &plan, &cancel, |_| {})
            .await
            .unwrap();

        let calls = service.calls();
        assert_eq!(
            calls[0],
            Call::Announce {
                batch_id: plan.batch_id.clone(),
                combination_ids: plan.combination_ids(),
            }
        );
        let submitted: Vec<Call> = plan
            .combination_ids()
            .into_iter()
            .map(|combination_id| Call::Submit { combination_id })
            .collect();
        assert_eq!(&calls[1..], submitted.as_slice());
        assert_eq!(report.submitted(), 4);
    }

    #[tokio::test]
    async fn test_failed_submission_does_not_stop_the_rest() {
        let service = ScriptedService {
            failing_submissions: vec![1],
            ..Default::default()
        };
        let retry = RetryPolicy::none();
        let submitter = BatchSubmitter::new(&service, &retry);
        let plan = plan_with(3);
        let mut progress = Vec::new();

        let report = submitter
            .submit_all("q", &plan, &CancellationToken::new(), |n| progress.push(n))
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.failed(), 1);
        assert!(report.outcomes[1].result.is_err());
        assert_eq!(progress, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_announce_failure_is_fatal() {
        let service = ScriptedService {
            fail_announce: true,
            ..Default::default()
        };
        let retry = RetryPolicy::new(1, 1, 1);
        let submitter = BatchSubmitter::new(&service, &retry);

        let err = submitter
            .announce(&plan_with(1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Announce { .. }));
        assert_eq!(service.count(|c| matches!(c, Call::Announce { .. })), 2);
    }

    #[tokio::test]
    async fn test_cancelled_submission_stops() {
        let service = ScriptedService::default();
        let retry = RetryPolicy::none();
        let submitter = BatchSubmitter::new(&service, &retry);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = submitter
            .submit_all("q", &plan_with(3), &cancel, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Cancelled));
        assert!(service.calls().is_empty());
    }
}
