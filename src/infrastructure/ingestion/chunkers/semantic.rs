//! Embedding-driven breakpoint splitting

use std::sync::Arc;

use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use super::RecursiveChunker;
use crate::domain::embedding::{cosine_similarity, EmbeddingProvider};
use crate::domain::ingestion::chunker::helpers;
use crate::domain::ingestion::{ChunkMetadata, ChunkingConfig, TextChunk};
use crate::domain::DomainError;

/// Splits between sentences whose embeddings are unusually far apart.
///
/// Every sentence is embedded, the cosine distance between neighbours is
/// computed and a break is placed wherever the distance is above the
/// configured percentile of all distances. Segments that still exceed
/// `chunk_size` are split structurally.
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    embedder: Arc<dyn EmbeddingProvider>,
    breakpoint_percentile: f64,
}

impl SemanticChunker {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, breakpoint_percentile: f64) -> Self {
        Self {
            embedder,
            breakpoint_percentile: breakpoint_percentile.clamp(0.0, 100.0),
        }
    }

    fn sentences(text: &str) -> Vec<(usize, usize)> {
        text.split_sentence_bound_indices()
            .filter(|(_, s)| !s.trim().is_empty())
            .map(|(i, s)| (i, i + s.len()))
            .collect()
    }

    pub async fn chunk(
        &self,
        content: &str,
        config: &ChunkingConfig,
    ) -> Result<Vec<TextChunk>, DomainError> {
        config.validate()?;

        let sentences = Self::sentences(content);
        let mut segments: Vec<(usize, usize)> = Vec::new();

        if sentences.len() < 3 {
            segments.push((0, content.len()));
        } else {
            let texts = sentences
                .iter()
                .map(|&(s, e)| content[s..e].trim().to_string())
                .collect();
            let vectors = self.embedder.embed_texts(texts).await?;
            if vectors.len() != sentences.len() {
                return Err(DomainError::external(
                    self.embedder.provider_name(),
                    format!(
                        "expected {} embeddings, got {}",
                        sentences.len(),
                        vectors.len()
                    ),
                ));
            }

            let distances: Vec<f64> = vectors
                .windows(2)
                .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]) as f64)
                .collect();
            let threshold = percentile(&distances, self.breakpoint_percentile);
            debug!(
                sentences = sentences.len(),
                threshold, "Computed semantic breakpoint threshold"
            );

            let mut start = 0;
            for (idx, distance) in distances.iter().enumerate() {
                if *distance > threshold {
                    let cut = sentences[idx + 1].0;
                    segments.push((start, cut));
                    start = cut;
                }
            }
            segments.push((start, content.len()));
        }

        let chunks = segments
            .into_iter()
            .flat_map(|segment| RecursiveChunker::spans(content, segment, config))
            .enumerate()
            .map(|(idx, (s, e))| TextChunk::new(&content[s..e], ChunkMetadata::new(idx, s, e)))
            .collect();

        Ok(helpers::renumber(chunks))
    }
}

/// Linear-interpolated percentile of `values` (0..=100)
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;

    #[test]
    fn test_percentile() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 50.0), 3.0);
        assert_eq!(percentile(&values, 100.0), 5.0);
        assert!((percentile(&values, 95.0) - 4.8).abs() < 1e-9);
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[tokio::test]
    async fn test_breaks_on_topic_shift() {
        let embedder = Arc::new(MockEmbeddingProvider::new("mock", 64));
        let chunker = SemanticChunker::new(embedder, 70.0);
        let text = "Kettles boil water quickly. Kettles boil water safely. \
                    Kettles boil water quietly. Bicycles need tyre pressure checks. \
                    Bicycles need tyre pressure weekly.";

        let chunks = chunker
            .chunk(text, &ChunkingConfig::new(1000, 0))
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.starts_with("Kettles"));
        assert!(!chunks[0].content.contains("Bicycles"));
        assert!(chunks[1].content.starts_with("Bicycles"));
    }

    #[tokio::test]
    async fn test_short_text_skips_embedding() {
        let embedder = Arc::new(MockEmbeddingProvider::new("mock", 8));
        let chunker = SemanticChunker::new(embedder.clone(), 95.0);

        let chunks = chunker
            .chunk("Only one sentence here.", &ChunkingConfig::default())
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let embedder = Arc::new(MockEmbeddingProvider::new("mock", 8).with_error("down"));
        let chunker = SemanticChunker::new(embedder, 95.0);

        let result = chunker
            .chunk("One. Two. Three. Four.", &ChunkingConfig::default())
            .await;

        assert!(result.is_err());
    }
}
