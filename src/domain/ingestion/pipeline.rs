//! Ingestion pipeline types

use serde::{Deserialize, Serialize};

/// Format-specific extractor chosen from a file extension
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ParserType {
    PlainText,
    Csv,
    Markdown,
    Html,
    Json,
    Pdf,
    Docx,
    Xlsx,
}

impl ParserType {
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::PlainText => &["txt", "text"],
            Self::Csv => &["csv"],
            Self::Markdown => &["md", "markdown"],
            Self::Html => &["html", "htm"],
            Self::Json => &["json"],
            Self::Pdf => &["pdf"],
            Self::Docx => &["docx"],
            Self::Xlsx => &["xlsx"],
        }
    }

    pub fn all() -> [ParserType; 8] {
        [
            Self::PlainText,
            Self::Csv,
            Self::Markdown,
            Self::Html,
            Self::Json,
            Self::Pdf,
            Self::Docx,
            Self::Xlsx,
        ]
    }
}

/// How parsed text is cut into chunks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingType {
    /// Embedding breakpoints between sentences, falling back to `Recursive`
    #[default]
    Semantic,
    /// Paragraphs, then lines, then sentences, then words
    Recursive,
    /// Fixed windows with overlap
    FixedSize,
}

/// What the pipeline does when a chunk's situating context cannot be generated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContextFailurePolicy {
    /// Index the chunk with empty context and keep going
    #[default]
    Blank,
    /// Fail the whole document
    Abort,
}

/// Pipeline steps with the progress reported once each step completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionStep {
    Started,
    Downloaded,
    Parsed,
    Split,
    Contextualized,
    Indexed,
    Persisted,
    Completed,
}

impl IngestionStep {
    pub fn progress(&self) -> u8 {
        match self {
            Self::Started => 0,
            Self::Downloaded => 10,
            Self::Parsed => 20,
            Self::Split => 30,
            Self::Contextualized => 70,
            Self::Indexed => 85,
            Self::Persisted => 95,
            Self::Completed => 100,
        }
    }

    /// Progress while `done` of `total` chunks have been contextualized
    pub fn contextualize_progress(done: usize, total: usize) -> u8 {
        let start = Self::Split.progress() as usize;
        let end = Self::Contextualized.progress() as usize;

        if total == 0 {
            return end as u8;
        }

        (start + (end - start) * done.min(total) / total) as u8
    }
}

/// Outcome of one successful pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub chunk_count: usize,
    /// Chunks indexed without situating context
    pub blank_contexts: usize,
    /// The file was a product catalog and skipped indexing
    pub product_catalog: bool,
}
