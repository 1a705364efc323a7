//! Keyword search collaborator

use std::collections::BTreeSet;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::document::{ChunkId, DocumentId};
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::DomainError;

/// A chunk as the lexical index stores it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalEntry {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub original_text: String,
    pub contextualized_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalHit {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub score: f32,
    pub contextualized_text: String,
}

/// Inverted-index keyword search, one collection per knowledge base.
/// Writes are visible to the next `search` once they return.
#[async_trait]
pub trait LexicalIndex: Send + Sync + Debug {
    /// Upsert by chunk id; creates the collection on first write
    async fn index(&self, collection: &KnowledgeBaseId, entry: LexicalEntry)
        -> Result<(), DomainError>;

    async fn index_batch(
        &self,
        collection: &KnowledgeBaseId,
        entries: Vec<LexicalEntry>,
    ) -> Result<(), DomainError> {
        for entry in entries {
            self.index(collection, entry).await?;
        }
        Ok(())
    }

    /// Ranked by score; equal scores keep insertion order
    async fn search(
        &self,
        collection: &KnowledgeBaseId,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<LexicalHit>, DomainError>;

    /// Removes every chunk of `document_id`; 0 when the collection is missing
    async fn delete(
        &self,
        collection: &KnowledgeBaseId,
        document_id: &DocumentId,
    ) -> Result<usize, DomainError>;

    async fn delete_collection(&self, collection: &KnowledgeBaseId) -> Result<bool, DomainError>;

    /// Moves every entry of `from` into `to` and drops `from`
    async fn migrate(
        &self,
        from: &KnowledgeBaseId,
        to: &KnowledgeBaseId,
    ) -> Result<usize, DomainError>;

    /// Moves the entries of `documents` from `from` into `to`, leaving the
    /// rest of `from` in place
    async fn move_documents(
        &self,
        from: &KnowledgeBaseId,
        to: &KnowledgeBaseId,
        documents: &BTreeSet<DocumentId>,
    ) -> Result<usize, DomainError>;

    async fn count(&self, collection: &KnowledgeBaseId) -> Result<usize, DomainError>;

    /// Searches each collection and merges the hits by score
    async fn search_collections(
        &self,
        collections: &[KnowledgeBaseId],
        query: &str,
        top_k: usize,
    ) -> Result<Vec<LexicalHit>, DomainError> {
        let mut merged = Vec::new();

        for collection in collections {
            merged.extend(self.search(collection, query, top_k).await?);
        }

        merged.sort_by(|a, b| b.score.total_cmp(&a.score));
        merged.truncate(top_k);
        Ok(merged)
    }
}
