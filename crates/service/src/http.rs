use reqwest::StatusCode;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::debug;

use async_trait::async_trait;
use plan::Entity;

use crate::wire::{
    BatchStatus, CheckPreviousResponse, EntitiesResponse, FinalAnswerResponse,
    InitialStatusRequest, PREVIOUS_ANSWER_FOUND, QuestionRequest, Submission, SubmissionStatus,
    TaskStatusRequest,
};
use crate::{AnalysisService, Result, ServiceError};

#[derive(Clone)]
pub struct HttpAnalysisService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAnalysisService {
    pub fn new(base_url: String, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}/", self.base_url, endpoint);
        debug!(%url, "POST");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ServiceError::Unavailable(format!("{endpoint}: {e}"))
                } else {
                    ServiceError::Http(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(ServiceError::Unavailable(format!("{endpoint}: {status}")));
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(api_error(endpoint, status, message));
        }

        Ok(response.json().await?)
    }
}

fn api_error(endpoint: &str, status: StatusCode, message: String) -> ServiceError {
    ServiceError::Api {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn extract_entities(&self, question: &str) -> Result<Vec<Entity>> {
        let response: EntitiesResponse = self
            .post("question", &QuestionRequest { question })
            .await?;
        Ok(response.into_entities())
    }

    async fn check_cached(&self, question: &str) -> Result<bool> {
        let response: CheckPreviousResponse = self
            .post("check_previous", &QuestionRequest { question })
            .await?;
        Ok(response.status == PREVIOUS_ANSWER_FOUND)
    }

    async fn fetch_final_answer(&self, question: &str) -> Result<String> {
        let response: FinalAnswerResponse =
            self.post("answer", &QuestionRequest { question }).await?;
        Ok(response.final_answer)
    }

    async fn announce_batch(&self, batch_id: &str, combination_ids: &[String]) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                "initial_status",
                &InitialStatusRequest {
                    graphqa_id: batch_id,
                    combination_ids,
                },
            )
            .await?;
        Ok(())
    }

    async fn submit_combination(&self, submission: Submission<'_>) -> Result<SubmissionStatus> {
        self.post("graphqa", &submission.to_request()).await
    }

    async fn poll_batch_status(&self, batch_id: &str, question: &str) -> Result<BatchStatus> {
        self.post(
            "tasks/status",
            &TaskStatusRequest {
                graphqa_id: batch_id,
                question,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode as AxumStatus, routing::post};
    use serde_json::{Value, json};

    async fn check_previous(Json(body): Json<Value>) -> Json<Value> {
        let status = if body["question"] == "Is aspirin an NSAID?" {
            PREVIOUS_ANSWER_FOUND
        } else {
            "not found"
        };
        Json(json!({ "status": status }))
    }

    async fn tasks_status(Json(body): Json<Value>) -> Json<Value> {
        Json(json!({
            "status": crate::wire::ALL_TASKS_FINISHED,
            "completed": [body["graphqa_id"]],
        }))
    }

    async fn stub_backend() -> HttpAnalysisService {
        let app = Router::new()
            .route("/check_previous/", post(check_previous))
            .route("/tasks/status/", post(tasks_status))
            .route(
                "/answer/",
                post(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "answer store corrupt") }),
            )
            .route(
                "/initial_status/",
                post(|| async { AxumStatus::SERVICE_UNAVAILABLE }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        HttpAnalysisService::new(format!("http://{addr}/"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_base_url_is_normalised() {
        let service =
            HttpAnalysisService::new("http://localhost:8000/".to_string(), Duration::from_secs(5))
                .unwrap();
        assert_eq!(service.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_api_error_message() {
        let err = api_error("graphqa", StatusCode::BAD_GATEWAY, "upstream down".to_string());
        assert_eq!(
            err.to_string(),
            "API error [502] on graphqa: upstream down"
        );
    }

    #[tokio::test]
    async fn test_check_cached_matches_success_status() {
        let service = stub_backend().await;
        assert!(service.check_cached("Is aspirin an NSAID?").await.unwrap());
        assert!(!service.check_cached("Does coffee affect sleep?").await.unwrap());
    }

    #[tokio::test]
    async fn test_poll_batch_status_posts_to_tasks_status() {
        let service = stub_backend().await;
        let status = service
            .poll_batch_status("batch-7", "Does coffee affect sleep?")
            .await
            .unwrap();
        assert!(status.all_complete());
        assert_eq!(status.completed, vec!["batch-7".to_string()]);
    }

    #[tokio::test]
    async fn test_error_status_maps_to_api_error() {
        let service = stub_backend().await;
        match service.fetch_final_answer("Does coffee affect sleep?").await {
            Err(ServiceError::Api {
                endpoint,
                status,
                message,
            }) => {
                assert_eq!(endpoint, "answer");
                assert_eq!(status, 500);
                assert_eq!(message, "answer store corrupt");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_service_unavailable_status() {
        let service = stub_backend().await;
        let err = service
            .announce_batch("batch-7", &["c1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let service =
            HttpAnalysisService::new(format!("http://{addr}"), Duration::from_secs(5)).unwrap();
        let err = service.check_cached("anything").await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)), "{err:?}");
    }
}
