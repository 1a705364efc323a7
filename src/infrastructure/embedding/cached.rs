//! Query-embedding cache

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::domain::embedding::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
use crate::domain::DomainError;

/// Caches single-text embeddings so repeated queries skip the provider.
/// Batch requests pass straight through.
#[derive(Debug)]
pub struct CachedEmbeddingProvider<P: EmbeddingProvider> {
    inner: P,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl<P: EmbeddingProvider> CachedEmbeddingProvider<P> {
    pub fn new(inner: P, ttl: Duration, capacity: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(capacity)
            .build();

        Self { inner, cache }
    }

    pub fn cache_size(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for CachedEmbeddingProvider<P> {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
        self.inner.embed(request).await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        if let Some(cached) = self.cache.get(text).await {
            tracing::debug!(provider = self.inner.provider_name(), "Cache hit for embedding");
            return Ok((*cached).clone());
        }

        let vector = self.inner.embed_text(text).await?;
        self.cache
            .insert(text.to_string(), Arc::new(vector.clone()))
            .await;

        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;

    #[tokio::test]
    async fn test_repeated_text_hits_cache() {
        let provider = CachedEmbeddingProvider::new(
            MockEmbeddingProvider::new("mock", 16),
            Duration::from_secs(60),
            100,
        );

        let first = provider.embed_text("what is bm25").await.unwrap();
        let second = provider.embed_text("what is bm25").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.inner().calls(), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let provider = CachedEmbeddingProvider::new(
            MockEmbeddingProvider::new("mock", 16).with_error("down"),
            Duration::from_secs(60),
            100,
        );

        assert!(provider.embed_text("q").await.is_err());
        assert!(provider.embed_text("q").await.is_err());
        assert_eq!(provider.inner().calls(), 2);
    }
}
