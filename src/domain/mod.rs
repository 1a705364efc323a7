//! Domain layer - Core business logic and entities

pub mod document;
pub mod embedding;
pub mod error;
pub mod ingestion;
pub mod knowledge_base;
pub mod llm;
pub mod object_store;
pub mod product;
pub mod retry;
pub mod search;
pub mod storage;
pub mod tool;

pub use document::{Chunk, ChunkId, Document, DocumentId, DocumentStatus};
pub use embedding::{cosine_similarity, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
pub use error::{DomainError, GraphViolation};
pub use ingestion::{
    ChunkingConfig, ChunkingStrategy, ChunkingType, ContextFailurePolicy, Contextualizer,
    DocumentParser, IngestionJob, JobId, JobPayload, JobQueue, JobState, ParsedDocument,
    ParserType, TextChunk,
};
pub use knowledge_base::{KnowledgeBase, KnowledgeBaseGraph, KnowledgeBaseId};
pub use llm::{LlmProvider, LlmRequest, LlmResponse, Message, MessageRole};
pub use object_store::ObjectStore;
pub use product::{Product, ProductCatalog, ProductMatch};
pub use retry::RetryPolicy;
pub use search::{
    FusionWeights, LexicalIndex, RankedCandidate, Reranker, RetrievedContext, VectorIndex,
};
pub use storage::{Storage, StorageEntity, StorageKey};
pub use tool::{RetrievalTool, ToolOutput};
