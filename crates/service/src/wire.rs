//! JSON bodies exchanged with the analysis backend.

use plan::{Combination, ConstituentSet, Entity, PathEdge, Term};
use serde::{Deserialize, Serialize};

/// Status string the backend reports once every combination of a batch is done.
pub const ALL_TASKS_FINISHED: &str = "All tasks are finished";

/// Status string `/check_previous/` reports for an already answered question.
pub const PREVIOUS_ANSWER_FOUND: &str = "success";

#[derive(Debug, Serialize)]
pub struct QuestionRequest<'a> {
    pub question: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct EntitiesResponse {
    pub entities_list: Vec<(String, Option<String>)>,
}

impl EntitiesResponse {
    pub fn into_entities(self) -> Vec<Entity> {
        self.entities_list
            .into_iter()
            .map(|(name, entity_type)| Entity::new(name, entity_type.unwrap_or_default()))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckPreviousResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct FinalAnswerResponse {
    pub final_answer: String,
}

#[derive(Debug, Serialize)]
pub struct InitialStatusRequest<'a> {
    pub graphqa_id: &'a str,
    pub combination_ids: &'a [String],
}

/// `[source, target]` path with its relationship label, as the backend stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePath {
    pub nodes: [String; 2],
    pub relationships: Vec<String>,
}

impl From<&PathEdge> for WirePath {
    fn from(edge: &PathEdge) -> Self {
        Self {
            nodes: [edge.source.clone(), edge.target.clone()],
            relationships: vec![edge.label.clone()],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GraphQaRequest<'a> {
    pub question: &'a str,
    pub entities_list: Vec<(&'a str, &'a str)>,
    pub constituents_dict: &'a ConstituentSet,
    pub constituents_paths: Vec<WirePath>,
    pub graphqa_id: &'a str,
    pub combination_id: &'a str,
}

/// Everything one combination submission carries.
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub question: &'a str,
    pub combination: &'a Combination,
    pub constituents: &'a ConstituentSet,
    pub edges: &'a [PathEdge],
    pub batch_id: &'a str,
    pub combination_id: &'a str,
}

impl<'a> Submission<'a> {
    pub fn to_request(&self) -> GraphQaRequest<'a> {
        GraphQaRequest {
            question: self.question,
            entities_list: self
                .combination
                .terms()
                .iter()
                .map(|Term { term, term_type }| (term.as_str(), term_type.as_str()))
                .collect(),
            constituents_dict: self.constituents,
            constituents_paths: self.edges.iter().map(WirePath::from).collect(),
            graphqa_id: self.batch_id,
            combination_id: self.combination_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmissionStatus {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusRequest<'a> {
    pub graphqa_id: &'a str,
    pub question: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BatchStatus {
    pub status: String,
    #[serde(default)]
    pub completed: Vec<String>,
}

impl BatchStatus {
    pub fn all_complete(&self) -> bool {
        self.status == ALL_TASKS_FINISHED
    }
}
