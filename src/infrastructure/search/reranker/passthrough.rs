use async_trait::async_trait;

use crate::domain::search::{RankedCandidate, Reranker};
use crate::domain::DomainError;

/// Keeps the fused order and truncates
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(
        &self,
        _query: &str,
        mut candidates: Vec<RankedCandidate>,
        top_n: usize,
    ) -> Result<Vec<RankedCandidate>, DomainError> {
        candidates.truncate(top_n);
        Ok(candidates)
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}
