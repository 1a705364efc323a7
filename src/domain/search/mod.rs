//! Retrieval domain: index collaborators, rank fusion and reranking

mod fusion;
mod lexical;
mod reranker;
mod vector;

pub use fusion::{fuse, FusionWeights, RankedCandidate};
pub use lexical::{LexicalEntry, LexicalHit, LexicalIndex};
pub use reranker::Reranker;
pub use vector::{VectorHit, VectorIndex, VectorPayload, VectorQuery, VectorRecord};

use serde::{Deserialize, Serialize};

use crate::domain::document::{ChunkId, DocumentId};

/// One context string returned by retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub text: String,
    pub score: f32,
}

impl From<RankedCandidate> for RetrievedContext {
    fn from(candidate: RankedCandidate) -> Self {
        Self {
            chunk_id: candidate.chunk_id,
            document_id: candidate.document_id,
            text: candidate.text,
            score: candidate.score,
        }
    }
}
