//! Structural splitting: paragraphs, then lines, then sentences, then words

use unicode_segmentation::UnicodeSegmentation;

use super::FixedSizeChunker;
use crate::domain::ingestion::chunker::helpers;
use crate::domain::ingestion::{ChunkMetadata, ChunkingConfig, ChunkingStrategy, TextChunk};
use crate::domain::DomainError;

type Span = (usize, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Paragraph,
    Line,
    Sentence,
    Word,
}

impl Level {
    fn finer(self) -> Option<Level> {
        match self {
            Self::Paragraph => Some(Self::Line),
            Self::Line => Some(Self::Sentence),
            Self::Sentence => Some(Self::Word),
            Self::Word => None,
        }
    }
}

/// Packs adjacent structural pieces into chunks of at most `chunk_size`
/// bytes. Pieces that are still too large are split at the next finer level,
/// and a single word longer than a chunk falls back to fixed windows.
#[derive(Debug, Clone, Default)]
pub struct RecursiveChunker;

impl RecursiveChunker {
    pub fn new() -> Self {
        Self
    }

    /// Cut points inside `span`, each piece ending just after its separator
    fn pieces(text: &str, span: Span, level: Level) -> Vec<Span> {
        let (from, to) = span;
        let slice = &text[from..to];

        let ends: Vec<usize> = match level {
            Level::Paragraph => slice.match_indices("\n\n").map(|(i, s)| i + s.len()).collect(),
            Level::Line => slice.match_indices('\n').map(|(i, s)| i + s.len()).collect(),
            Level::Sentence => slice
                .split_sentence_bound_indices()
                .map(|(i, s)| i + s.len())
                .collect(),
            Level::Word => slice
                .split_word_bound_indices()
                .filter(|(_, w)| w.chars().all(char::is_whitespace))
                .map(|(i, s)| i + s.len())
                .collect(),
        };

        let mut spans = Vec::new();
        let mut start = from;
        for end in ends.into_iter().map(|e| from + e) {
            if end > start && end < to {
                spans.push((start, end));
                start = end;
            }
        }
        spans.push((start, to));
        spans
    }

    fn pack(text: &str, span: Span, level: Level, config: &ChunkingConfig, out: &mut Vec<Span>) {
        if span.1 - span.0 <= config.chunk_size {
            out.push(span);
            return;
        }

        let parts = Self::pieces(text, span, level);
        if parts.len() <= 1 {
            return Self::descend(text, span, level, config, out);
        }

        let mut current: Option<Span> = None;
        for part in parts {
            current = match current {
                None => Some(part),
                Some((start, _)) if part.1 - start <= config.chunk_size => Some((start, part.1)),
                Some(full) => {
                    Self::flush(text, full, level, config, out);
                    Some(part)
                }
            };
        }
        if let Some(last) = current {
            Self::flush(text, last, level, config, out);
        }
    }

    fn flush(text: &str, span: Span, level: Level, config: &ChunkingConfig, out: &mut Vec<Span>) {
        if span.1 - span.0 > config.chunk_size {
            Self::descend(text, span, level, config, out);
        } else {
            out.push(span);
        }
    }

    fn descend(text: &str, span: Span, level: Level, config: &ChunkingConfig, out: &mut Vec<Span>) {
        match level.finer() {
            Some(finer) => Self::pack(text, span, finer, config, out),
            None => {
                let windows = FixedSizeChunker::windows(&text[span.0..span.1], config);
                out.extend(windows.into_iter().map(|(s, e)| (span.0 + s, span.0 + e)));
            }
        }
    }

    /// Spans covering `span`, starting at paragraph granularity
    pub(crate) fn spans(text: &str, span: Span, config: &ChunkingConfig) -> Vec<Span> {
        let mut out = Vec::new();
        Self::pack(text, span, Level::Paragraph, config, &mut out);
        out
    }
}

impl ChunkingStrategy for RecursiveChunker {
    fn chunk(&self, content: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>, DomainError> {
        config.validate()?;

        let chunks = Self::spans(content, (0, content.len()), config)
            .into_iter()
            .enumerate()
            .map(|(idx, (start, end))| {
                TextChunk::new(&content[start..end], ChunkMetadata::new(idx, start, end))
            })
            .collect();

        Ok(helpers::renumber(chunks))
    }

    fn name(&self) -> &'static str {
        "recursive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, size: usize) -> Vec<String> {
        RecursiveChunker::new()
            .chunk(text, &ChunkingConfig::new(size, 0))
            .unwrap()
            .into_iter()
            .map(|c| c.content)
            .collect()
    }

    #[test]
    fn test_paragraphs_are_packed_together() {
        let text = "First para.\n\nSecond para.\n\nThird para.";
        assert_eq!(chunk(text, 100), vec![text.to_string()]);
        assert_eq!(
            chunk(text, 30),
            vec!["First para.\n\nSecond para.", "Third para."]
        );
    }

    #[test]
    fn test_oversized_paragraph_splits_on_sentences() {
        let text = "Intro.\n\nThe kettle boils fast. It holds two litres. It is blue.";
        let chunks = chunk(text, 30);

        assert_eq!(
            chunks,
            vec![
                "Intro.",
                "The kettle boils fast.",
                "It holds two litres.",
                "It is blue."
            ]
        );
    }

    #[test]
    fn test_offsets_point_into_source() {
        let text = "One.\n\nTwo two.\n\nThree three three.";
        let chunks = RecursiveChunker::new()
            .chunk(text, &ChunkingConfig::new(12, 0))
            .unwrap();

        for c in &chunks {
            let source = &text[c.metadata.char_start..c.metadata.char_end];
            assert_eq!(source.trim(), c.content);
        }
    }

    #[test]
    fn test_giant_word_uses_fixed_windows() {
        let text = format!("short\n\n{}", "y".repeat(50));
        let chunks = chunk(&text, 20);

        assert_eq!(chunks[0], "short");
        assert!(chunks.iter().all(|c| c.len() <= 20));
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 55);
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk("", 10).is_empty());
    }
}
