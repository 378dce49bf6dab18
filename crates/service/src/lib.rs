//! Boundary to the remote analysis backend: the `AnalysisService` trait the
//! dispatch stages program against, its wire types, and the HTTP client.

pub mod http;
pub mod wire;

pub use http::HttpAnalysisService;
pub use wire::{ALL_TASKS_FINISHED, BatchStatus, Submission, SubmissionStatus};

use async_trait::async_trait;
use plan::Entity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error [{status}] on {endpoint}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Extract the entities mentioned in a question.
    async fn extract_entities(&self, question: &str) -> Result<Vec<Entity>>;

    /// Whether the backend already holds an answer for this exact question.
    async fn check_cached(&self, question: &str) -> Result<bool>;

    async fn fetch_final_answer(&self, question: &str) -> Result<String>;

    /// Register a batch and its combination ids before any submission.
    async fn announce_batch(&self, batch_id: &str, combination_ids: &[String]) -> Result<()>;

    async fn submit_combination(&self, submission: Submission<'_>) -> Result<SubmissionStatus>;

    async fn poll_batch_status(&self, batch_id: &str, question: &str) -> Result<BatchStatus>;
}
