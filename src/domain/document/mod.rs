//! Uploaded documents and the chunks ingested from them

mod chunk;
mod entity;

pub use chunk::{Chunk, ChunkId};
pub use entity::{Document, DocumentId, DocumentStatus};
