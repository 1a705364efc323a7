//! Fixed-size windows with overlap

use crate::domain::ingestion::chunker::helpers;
use crate::domain::ingestion::{ChunkMetadata, ChunkingConfig, ChunkingStrategy, TextChunk};
use crate::domain::DomainError;

/// Splits text into windows of at most `chunk_size` bytes. Windows end on a
/// word boundary when one is available and the next window starts
/// `chunk_overlap` bytes back, snapped to the start of a word.
#[derive(Debug, Clone, Default)]
pub struct FixedSizeChunker;

impl FixedSizeChunker {
    pub fn new() -> Self {
        Self
    }

    /// Byte ranges of the windows over `text`
    pub(crate) fn windows(text: &str, config: &ChunkingConfig) -> Vec<(usize, usize)> {
        let mut ranges = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let mut end = helpers::floor_char_boundary(text, start + config.chunk_size);

            if end < text.len() {
                let boundary = helpers::find_word_boundary_before(text, end);
                if boundary > start {
                    end = boundary;
                }
            }
            if end <= start {
                // chunk_size smaller than one character
                end = start + text[start..].chars().next().map_or(1, char::len_utf8);
            }

            ranges.push((start, end));
            if end >= text.len() {
                break;
            }

            let back = helpers::floor_char_boundary(text, end.saturating_sub(config.chunk_overlap));
            let next = helpers::find_word_boundary_before(text, back);
            start = if next > start { next } else { end };
        }

        ranges
    }
}

impl ChunkingStrategy for FixedSizeChunker {
    fn chunk(&self, content: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>, DomainError> {
        config.validate()?;

        let chunks = Self::windows(content, config)
            .into_iter()
            .enumerate()
            .map(|(idx, (start, end))| {
                TextChunk::new(&content[start..end], ChunkMetadata::new(idx, start, end))
            })
            .collect();

        Ok(helpers::renumber(chunks))
    }

    fn name(&self) -> &'static str {
        "fixed_size"
    }
}
