//! Chunking strategy implementations

mod fixed_size;
mod recursive;
mod semantic;
mod splitter;

pub use fixed_size::FixedSizeChunker;
pub use recursive::RecursiveChunker;
pub use semantic::{percentile, SemanticChunker};
pub use splitter::ChunkSplitter;
