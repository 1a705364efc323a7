//! Document ingestion infrastructure
//!
//! Parsers turn uploaded bytes into text, chunkers cut the text, and the
//! pipeline contextualizes, indexes and persists the pieces. The worker
//! drives the pipeline from the job queue.

pub mod chunkers;
pub mod contextualizer;
pub mod factory;
pub mod parsers;
pub mod pipeline;
pub mod worker;

pub use chunkers::{ChunkSplitter, FixedSizeChunker, RecursiveChunker, SemanticChunker};
pub use contextualizer::LlmContextualizer;
pub use factory::ParserFactory;
pub use parsers::{
    is_product_catalog, load_product_catalog, CsvParser, DocxParser, HtmlParser,
    JsonParser, MarkdownParser, PdfParser, PlainTextParser, XlsxParser,
};
pub use pipeline::{purge_chunk_rows, IngestionPipeline, PipelineSettings, PipelineStores};
pub use worker::IngestionWorker;
