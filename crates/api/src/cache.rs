use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// In-process memo of resolved answers, keyed by question.
pub struct AnswerCache {
    answers: Arc<DashMap<String, String>>,
    max_entries: usize,
}

impl AnswerCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            answers: Arc::new(DashMap::new()),
            max_entries,
        }
    }

    pub fn set_answer(&self, question: &str, answer: String) {
        if self.max_entries == 0 {
            return;
        }
        if self.answers.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self
                .answers
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.answers.remove(&key);
            }
        }
        let key = self.hash_question(question);
        self.answers.insert(key, answer);
    }

    pub fn get_answer(&self, question: &str) -> Option<String> {
        let key = self.hash_question(question);
        self.answers.get(&key).map(|r| r.value().clone())
    }

    fn hash_question(&self, question: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(question.trim().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            answers_cached: self.answers.len(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CacheStats {
    pub answers_cached: usize,
}
