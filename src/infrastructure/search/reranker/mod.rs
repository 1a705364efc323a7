//! Reranker implementations

mod llm;
mod passthrough;

pub use llm::LlmReranker;
pub use passthrough::PassthroughReranker;
