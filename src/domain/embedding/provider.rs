//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use super::{EmbeddingRequest, EmbeddingResponse};
use crate::domain::DomainError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError>;

    fn provider_name(&self) -> &'static str;

    /// Model used by the convenience methods below
    fn model(&self) -> &str;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let mut vectors = self.embed_texts(vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| DomainError::external(self.provider_name(), "empty embedding response"))
    }

    /// One vector per input, in input order
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        let response = self
            .embed(EmbeddingRequest::batch(self.model(), texts))
            .await?;
        response.into_ordered_vectors(expected)
    }
}
