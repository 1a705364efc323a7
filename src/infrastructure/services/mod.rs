//! Services orchestrating the domain collaborators

mod document_service;
mod knowledge_base_service;
mod tool_service;

pub use document_service::{DocumentService, DocumentStatusReport};
pub use knowledge_base_service::{CreateKnowledgeBaseRequest, KnowledgeBaseService, MergeReport};
pub use tool_service::ToolRunner;
