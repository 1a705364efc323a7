//! Search infrastructure: index implementations, rank fusion and reranking

mod lexical;
mod rank_fusion;
pub mod reranker;
mod vector;

pub use lexical::{tokenize, InMemoryLexicalIndex};
pub use rank_fusion::{RankFusionEngine, RetrievalSettings, SearchMode};
pub use vector::InMemoryVectorIndex;

#[cfg(test)]
pub use vector::mock::FailingVectorIndex;
