//! Knowledge base domain: entities and the inheritance graph

mod entity;
mod graph;
mod validation;

pub use entity::{KnowledgeBase, KnowledgeBaseId};
pub use graph::{DeletionPlan, KnowledgeBaseGraph};
pub use validation::{validate_knowledge_base_id, KnowledgeBaseValidationError, MAX_KB_ID_LENGTH};
