//! Retrieval tools exposed to chat assistants

use std::sync::Arc;

use serde::Serialize;

use super::knowledge_base::KnowledgeBaseId;
use super::product::{ProductCatalog, ProductMatch};
use super::search::RetrievedContext;

/// Answer used when retrieval finds nothing to ground on
pub const NO_CONTEXT_ANSWER: &str =
    "I could not find any relevant information in the knowledge base to answer this question.";

/// Closed set of tools an assistant can call
#[derive(Debug, Clone)]
pub enum RetrievalTool {
    /// Answer from a knowledge base and everything it inherits
    KnowledgeBaseQuery { knowledge_base_id: KnowledgeBaseId },
    /// Fuzzy lookup of products by name
    ProductSearch { catalog: Arc<ProductCatalog> },
}

impl RetrievalTool {
    pub fn name(&self) -> &'static str {
        match self {
            Self::KnowledgeBaseQuery { .. } => "knowledge_base_query",
            Self::ProductSearch { .. } => "product_search",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::KnowledgeBaseQuery { .. } => {
                "Answers questions using documents from a knowledge base"
            }
            Self::ProductSearch { .. } => "Useful tool for searching products by name",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolOutput {
    pub answer: String,
    pub contexts: Vec<RetrievedContext>,
    pub products: Vec<ProductMatch>,
}

impl ToolOutput {
    pub fn answer(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            ..Default::default()
        }
    }

    pub fn with_contexts(mut self, contexts: Vec<RetrievedContext>) -> Self {
        self.contexts = contexts;
        self
    }

    pub fn with_products(mut self, products: Vec<ProductMatch>) -> Self {
        self.products = products;
        self
    }
}
