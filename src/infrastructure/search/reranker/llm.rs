//! Listwise reranking by a text-generation model
//!
//! The model sees the numbered candidates and returns the indices of the most
//! relevant ones, best first. Any failure falls back to the fused order.

use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::llm::{LlmProvider, LlmRequest};
use crate::domain::search::{RankedCandidate, Reranker};
use crate::domain::DomainError;

const RERANK_INSTRUCTION: &str = "You rank passages by how useful they are for answering a \
question. Reply with a JSON object {\"ranking\": [indices]} listing passage indices from most \
to least relevant. Omit passages that are irrelevant.";

/// Longest passage excerpt shown to the model, in characters
const MAX_PASSAGE_CHARS: usize = 1200;

#[derive(Debug)]
pub struct LlmReranker {
    provider: Arc<dyn LlmProvider>,
    model: String,
    /// Candidates sent to the model; the rest keep fused order behind them
    max_candidates: usize,
}

#[derive(Debug, Deserialize)]
struct RankingResponse {
    ranking: Vec<usize>,
}

impl LlmReranker {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_candidates: 20,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }

    fn build_prompt(&self, query: &str, candidates: &[RankedCandidate]) -> String {
        let mut prompt = format!("Question: {}\n\nPassages:\n", query);

        for (idx, candidate) in candidates.iter().enumerate() {
            let excerpt: String = candidate.text.chars().take(MAX_PASSAGE_CHARS).collect();
            let _ = writeln!(prompt, "[{}] {}\n", idx, excerpt.trim());
        }

        prompt
    }

    async fn ranking(&self, query: &str, candidates: &[RankedCandidate]) -> Result<Vec<usize>, DomainError> {
        let request = LlmRequest::builder()
            .system(RERANK_INSTRUCTION)
            .user(self.build_prompt(query, candidates))
            .temperature(0.0)
            .json_response()
            .build();

        let response = self.provider.chat(&self.model, request).await?;
        parse_ranking(response.content())
    }
}

fn parse_ranking(content: &str) -> Result<Vec<usize>, DomainError> {
    let json = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content,
    };

    serde_json::from_str::<RankingResponse>(json)
        .map(|r| r.ranking)
        .map_err(|e| DomainError::external("reranker", format!("Invalid ranking response: {}", e)))
}

/// Ranked indices first, then every unranked candidate in fused order
fn apply_ranking(candidates: Vec<RankedCandidate>, ranking: &[usize]) -> Vec<RankedCandidate> {
    let mut seen = HashSet::new();
    let mut order: Vec<usize> = ranking
        .iter()
        .copied()
        .filter(|&i| i < candidates.len() && seen.insert(i))
        .collect();
    order.extend((0..candidates.len()).filter(|i| !seen.contains(i)));

    let mut slots: Vec<Option<RankedCandidate>> = candidates.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<RankedCandidate>,
        top_n: usize,
    ) -> Result<Vec<RankedCandidate>, DomainError> {
        if candidates.len() <= 1 {
            candidates.truncate(top_n);
            return Ok(candidates);
        }

        let tail = if candidates.len() > self.max_candidates {
            candidates.split_off(self.max_candidates)
        } else {
            Vec::new()
        };

        let mut reranked = match self.ranking(query, &candidates).await {
            Ok(ranking) => {
                debug!(ranked = ranking.len(), "LLM rerank succeeded");
                apply_ranking(candidates, &ranking)
            }
            Err(e) => {
                warn!(error = %e, "LLM rerank failed, keeping fused order");
                candidates
            }
        };

        reranked.extend(tail);
        reranked.truncate(top_n);
        Ok(reranked)
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::{ChunkId, DocumentId};
    use crate::domain::llm::MockLlmProvider;

    fn candidates(ids: &[&str]) -> Vec<RankedCandidate> {
        ids.iter()
            .enumerate()
            .map(|(rank, id)| RankedCandidate {
                chunk_id: ChunkId::from_string(*id),
                document_id: DocumentId::new("doc-1").unwrap(),
                text: format!("passage {}", id),
                score: 1.0 / (rank as f32 + 1.0),
                semantic_rank: Some(rank),
                lexical_rank: None,
            })
            .collect()
    }

    fn ids(list: &[RankedCandidate]) -> Vec<&str> {
        list.iter().map(|c| c.chunk_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_applies_model_ranking() {
        let provider = MockLlmProvider::new("mock").with_response("```json\n{\"ranking\": [2, 0]}\n```");
        let reranker = LlmReranker::new(Arc::new(provider), "m");

        let result = reranker
            .rerank("q", candidates(&["a", "b", "c"]), 3)
            .await
            .unwrap();

        assert_eq!(ids(&result), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_falls_back_to_fused_order_on_error() {
        let provider = MockLlmProvider::new("mock").with_error("timeout");
        let reranker = LlmReranker::new(Arc::new(provider), "m");

        let result = reranker
            .rerank("q", candidates(&["a", "b", "c"]), 2)
            .await
            .unwrap();

        assert_eq!(ids(&result), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_garbage_response_falls_back() {
        let provider = MockLlmProvider::new("mock").with_response("I think b is best");
        let reranker = LlmReranker::new(Arc::new(provider), "m");

        let result = reranker
            .rerank("q", candidates(&["a", "b"]), 5)
            .await
            .unwrap();

        assert_eq!(ids(&result), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_only_head_is_sent_to_model() {
        let provider = MockLlmProvider::new("mock").with_handler(|req| {
            let prompt = req.last_user_message().unwrap_or_default();
            assert!(prompt.contains("[1] passage b"));
            assert!(!prompt.contains("passage c"));
            Ok("{\"ranking\": [1]}".to_string())
        });
        let reranker = LlmReranker::new(Arc::new(provider), "m").with_max_candidates(2);

        let result = reranker
            .rerank("q", candidates(&["a", "b", "c"]), 3)
            .await
            .unwrap();

        assert_eq!(ids(&result), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_apply_ranking_ignores_bad_indices() {
        let result = apply_ranking(candidates(&["a", "b", "c"]), &[7, 1, 1, 0]);
        assert_eq!(ids(&result), vec!["b", "a", "c"]);
    }
}
