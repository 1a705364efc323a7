//! Strategy selection with graceful fallback

use std::sync::Arc;

use tracing::warn;

use super::{FixedSizeChunker, RecursiveChunker, SemanticChunker};
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::ingestion::{ChunkingConfig, ChunkingStrategy, ChunkingType, TextChunk};
use crate::domain::DomainError;

/// Turns parsed document text into ordered, non-empty chunks.
///
/// `Semantic` needs an embedding provider; without one, or when embedding
/// fails, the text is split structurally instead.
#[derive(Debug, Clone)]
pub struct ChunkSplitter {
    strategy: ChunkingType,
    config: ChunkingConfig,
    semantic: Option<SemanticChunker>,
}

impl ChunkSplitter {
    pub fn new(strategy: ChunkingType, config: ChunkingConfig) -> Result<Self, DomainError> {
        config.validate()?;
        Ok(Self {
            strategy,
            config,
            semantic: None,
        })
    }

    pub fn with_embeddings(
        mut self,
        embedder: Arc<dyn EmbeddingProvider>,
        breakpoint_percentile: f64,
    ) -> Self {
        self.semantic = Some(SemanticChunker::new(embedder, breakpoint_percentile));
        self
    }

    pub fn strategy(&self) -> ChunkingType {
        self.strategy
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub async fn split(&self, text: &str) -> Result<Vec<TextChunk>, DomainError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        match (self.strategy, &self.semantic) {
            (ChunkingType::Semantic, Some(semantic)) => {
                match semantic.chunk(text, &self.config).await {
                    Ok(chunks) => Ok(chunks),
                    Err(e) => {
                        warn!(error = %e, "Semantic splitting failed, falling back to recursive");
                        RecursiveChunker::new().chunk(text, &self.config)
                    }
                }
            }
            (ChunkingType::Semantic, None) | (ChunkingType::Recursive, _) => {
                RecursiveChunker::new().chunk(text, &self.config)
            }
            (ChunkingType::FixedSize, _) => FixedSizeChunker::new().chunk(text, &self.config),
        }
    }
}
