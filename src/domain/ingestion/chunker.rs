//! Chunking strategy trait and types

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::domain::DomainError;

/// Size and overlap policy shared by every chunking strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive fixed-size windows in characters
    pub chunk_overlap: usize,
    /// Chunks shorter than this are merged into a neighbour or dropped
    pub min_chunk_size: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            min_chunk_size: 1,
        }
    }

    pub fn with_min_chunk_size(mut self, min_size: usize) -> Self {
        self.min_chunk_size = min_size;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.chunk_size == 0 {
            return Err(DomainError::validation("chunk_size must be greater than 0"));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(DomainError::validation(
                "chunk_overlap must be less than chunk_size",
            ));
        }

        if self.min_chunk_size > self.chunk_size {
            return Err(DomainError::validation(
                "min_chunk_size must be less than or equal to chunk_size",
            ));
        }

        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_size: 1,
        }
    }
}

/// Position of a chunk within its source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Sequence index (0-based, contiguous)
    pub chunk_index: usize,
    /// Byte offset where this chunk starts in the source text
    pub char_start: usize,
    /// Byte offset where this chunk ends in the source text
    pub char_end: usize,
}

impl ChunkMetadata {
    pub fn new(chunk_index: usize, char_start: usize, char_end: usize) -> Self {
        Self {
            chunk_index,
            char_start,
            char_end,
        }
    }
}

/// A slice of parsed text produced by a splitter, before it is persisted
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl TextChunk {
    pub fn new(content: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn index(&self) -> usize {
        self.metadata.chunk_index
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Synchronous splitting strategy
pub trait ChunkingStrategy: Send + Sync + Debug {
    fn chunk(&self, content: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>, DomainError>;

    fn name(&self) -> &'static str;
}

/// Helper functions for chunking. All offsets are byte offsets that land on
/// UTF-8 character boundaries.
pub mod helpers {
    use super::{ChunkMetadata, TextChunk};

    /// Largest char boundary that is `<= pos`
    pub fn floor_char_boundary(text: &str, pos: usize) -> usize {
        if pos >= text.len() {
            return text.len();
        }

        let mut idx = pos;
        while idx > 0 && !text.is_char_boundary(idx) {
            idx -= 1;
        }
        idx
    }

    /// Nearest whitespace boundary before `pos`, or `pos` itself if none
    pub fn find_word_boundary_before(text: &str, pos: usize) -> usize {
        let pos = floor_char_boundary(text, pos);

        if pos >= text.len() {
            return text.len();
        }

        match text[..pos].rfind(char::is_whitespace) {
            Some(idx) if idx > 0 => idx + text[idx..].chars().next().map_or(1, |c| c.len_utf8()),
            _ => pos,
        }
    }

    /// Nearest whitespace boundary at or after `pos`
    pub fn find_word_boundary_after(text: &str, pos: usize) -> usize {
        let pos = floor_char_boundary(text, pos);

        text[pos..]
            .find(char::is_whitespace)
            .map_or(text.len(), |offset| pos + offset)
    }

    pub fn normalize_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Drop blank pieces and renumber the rest from zero
    pub fn renumber(chunks: Vec<TextChunk>) -> Vec<TextChunk> {
        chunks
            .into_iter()
            .filter(|c| !c.is_empty())
            .enumerate()
            .map(|(idx, c)| {
                TextChunk::new(
                    c.content.trim(),
                    ChunkMetadata::new(idx, c.metadata.char_start, c.metadata.char_end),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(ChunkingConfig::default().validate().is_ok());
        assert!(ChunkingConfig::new(0, 0).validate().is_err());
        assert!(ChunkingConfig::new(100, 100).validate().is_err());
        assert!(ChunkingConfig::new(100, 10)
            .with_min_chunk_size(200)
            .validate()
            .is_err());
    }

    #[test]
    fn test_word_boundaries_respect_utf8() {
        let text = "xin chào thế giới";
        let before = helpers::find_word_boundary_before(text, 11);
        assert!(text.is_char_boundary(before));
        assert_eq!(&text[..before], "xin chào ");

        let after = helpers::find_word_boundary_after(text, 5);
        assert!(text.is_char_boundary(after));
        assert_eq!(&text[..after], "xin chào");
    }

    #[test]
    fn test_renumber_drops_blank_chunks() {
        let chunks = vec![
            TextChunk::new("first", ChunkMetadata::new(3, 0, 5)),
            TextChunk::new("   ", ChunkMetadata::new(4, 5, 8)),
            TextChunk::new(" second ", ChunkMetadata::new(7, 8, 16)),
        ];

        let renumbered = helpers::renumber(chunks);

        assert_eq!(renumbered.len(), 2);
        assert_eq!(renumbered[0].index(), 0);
        assert_eq!(renumbered[1].index(), 1);
        assert_eq!(renumbered[1].content, "second");
    }
}
