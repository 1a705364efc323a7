//! Second-pass ordering of fused candidates

use std::fmt::Debug;

use async_trait::async_trait;

use super::RankedCandidate;
use crate::domain::DomainError;

#[async_trait]
pub trait Reranker: Send + Sync + Debug {
    /// Returns at most `top_n` candidates, best first
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RankedCandidate>,
        top_n: usize,
    ) -> Result<Vec<RankedCandidate>, DomainError>;

    fn name(&self) -> &'static str;
}
