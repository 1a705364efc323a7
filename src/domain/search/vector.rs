//! Nearest-neighbour search collaborator

use std::collections::BTreeSet;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::document::{ChunkId, DocumentId};
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::DomainError;

/// Metadata stored next to each vector; the filter fields isolate writers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub knowledge_base_id: KnowledgeBaseId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub knowledge_base_ids: BTreeSet<KnowledgeBaseId>,
    pub top_k: usize,
    /// Skip quantization and score every candidate exactly
    pub exact: bool,
    pub score_threshold: Option<f32>,
}

impl VectorQuery {
    pub fn new(
        vector: Vec<f32>,
        knowledge_base_ids: BTreeSet<KnowledgeBaseId>,
        top_k: usize,
    ) -> Self {
        Self {
            vector,
            knowledge_base_ids,
            top_k,
            exact: false,
            score_threshold: None,
        }
    }

    pub fn exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    pub fn with_score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }
}

/// Cosine-similarity index over one shared collection, filtered by
/// knowledge base id on every read
#[async_trait]
pub trait VectorIndex: Send + Sync + Debug {
    /// Fails with `DimensionMismatch` when the vector length differs from
    /// the collection's, which is fixed by its first vector
    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<(), DomainError>;

    async fn upsert_batch(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), DomainError> {
        for record in records {
            self.upsert(collection, record).await?;
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &VectorQuery,
    ) -> Result<Vec<VectorHit>, DomainError>;

    async fn delete_by_document(
        &self,
        collection: &str,
        document_id: &DocumentId,
    ) -> Result<usize, DomainError>;

    async fn delete_by_knowledge_base(
        &self,
        collection: &str,
        knowledge_base_id: &KnowledgeBaseId,
    ) -> Result<usize, DomainError>;

    /// Rewrites the payload filter field of every vector owned by `from`
    async fn reassign_knowledge_base(
        &self,
        collection: &str,
        from: &KnowledgeBaseId,
        to: &KnowledgeBaseId,
    ) -> Result<usize, DomainError>;

    /// Rewrites the payload filter field of every vector of `documents`
    async fn reassign_documents(
        &self,
        collection: &str,
        documents: &BTreeSet<DocumentId>,
        to: &KnowledgeBaseId,
    ) -> Result<usize, DomainError>;

    async fn count_by_document(
        &self,
        collection: &str,
        document_id: &DocumentId,
    ) -> Result<usize, DomainError>;

    /// Approximate search that falls back to an exact pass when the
    /// approximate one comes back empty
    async fn search_with_fallback(
        &self,
        collection: &str,
        query: VectorQuery,
    ) -> Result<Vec<VectorHit>, DomainError> {
        let hits = self.search(collection, &query).await?;

        if !hits.is_empty() || query.exact {
            return Ok(hits);
        }

        tracing::debug!(collection, "Approximate vector search empty, retrying exact");
        self.search(collection, &query.exact(true).with_score_threshold(None))
            .await
    }
}
