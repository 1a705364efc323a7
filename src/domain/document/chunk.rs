//! Persisted chunk rows

use std::fmt;

use serde::{Deserialize, Serialize};

use super::DocumentId;
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::storage::{StorageEntity, StorageKey};

/// Chunk identifier; also the key shared by the lexical and vector indexes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for ChunkId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// A retrievable slice of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    id: ChunkId,
    document_id: DocumentId,
    knowledge_base_id: KnowledgeBaseId,
    sequence_index: usize,
    original_text: String,
    contextualized_text: String,
    vector_id: String,
}

impl Chunk {
    pub fn new(
        id: ChunkId,
        document_id: DocumentId,
        knowledge_base_id: KnowledgeBaseId,
        sequence_index: usize,
        original_text: impl Into<String>,
        contextualized_text: impl Into<String>,
        vector_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            document_id,
            knowledge_base_id,
            sequence_index,
            original_text: original_text.into(),
            contextualized_text: contextualized_text.into(),
            vector_id: vector_id.into(),
        }
    }

    pub fn id(&self) -> &ChunkId {
        &self.id
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn knowledge_base_id(&self) -> &KnowledgeBaseId {
        &self.knowledge_base_id
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    pub fn original_text(&self) -> &str {
        &self.original_text
    }

    pub fn contextualized_text(&self) -> &str {
        &self.contextualized_text
    }

    pub fn vector_id(&self) -> &str {
        &self.vector_id
    }

    pub fn reassign(&mut self, knowledge_base_id: KnowledgeBaseId) {
        self.knowledge_base_id = knowledge_base_id;
    }
}

impl StorageEntity for Chunk {
    type Key = ChunkId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}
