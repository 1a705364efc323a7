//! Document ingestion domain types and traits
//!
//! This module provides:
//! - `DocumentParser` trait for extracting text from uploaded files
//! - `ChunkingStrategy` trait for splitting text into chunks
//! - `Contextualizer` trait for situating chunks within their document
//! - `JobQueue` trait and the `IngestionJob` state machine

pub mod chunker;
pub mod contextualizer;
pub mod job;
pub mod parser;
pub mod pipeline;
pub mod queue;
pub mod validation;

pub use chunker::{ChunkMetadata, ChunkingConfig, ChunkingStrategy, TextChunk};
pub use contextualizer::{contextualized_text, Contextualizer};
pub use job::{IngestionJob, JobId, JobState};
pub use parser::{DocumentMetadata, DocumentParser, ParsedDocument, ParserContent, ParserInput};
pub use pipeline::{
    ChunkingType, ContextFailurePolicy, IngestionStep, IngestionSummary, ParserType,
};
pub use queue::{JobPayload, JobQueue, ProgressEvent};
pub use validation::{
    detect_parser_from_filename, file_extension, object_key, require_parser_for,
    validate_file_name,
};

#[cfg(test)]
pub use contextualizer::mock::MockContextualizer;
