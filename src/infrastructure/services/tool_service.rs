//! Tool execution for chat assistants

use std::sync::Arc;

use tracing::{debug, instrument};

use super::KnowledgeBaseService;
use crate::domain::llm::{LlmProvider, Message};
use crate::domain::product::format_matches;
use crate::domain::search::RetrievedContext;
use crate::domain::tool::{RetrievalTool, ToolOutput, NO_CONTEXT_ANSWER};
use crate::domain::DomainError;
use crate::infrastructure::search::{RankFusionEngine, SearchMode};

const PRODUCT_MATCHES: usize = 3;

const QA_SYSTEM_PROMPT: &str = "You answer questions using only the context passages provided. \
If the passages do not contain the answer, say that you do not know.";

/// Runs a [`RetrievalTool`] against the engine's collaborators
#[derive(Debug, Clone)]
pub struct ToolRunner {
    knowledge_bases: Arc<KnowledgeBaseService>,
    retrieval: Arc<RankFusionEngine>,
    llm: Arc<dyn LlmProvider>,
    model: String,
    top_k_per_source: usize,
}

impl ToolRunner {
    pub fn new(
        knowledge_bases: Arc<KnowledgeBaseService>,
        retrieval: Arc<RankFusionEngine>,
        llm: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        top_k_per_source: usize,
    ) -> Self {
        Self {
            knowledge_bases,
            retrieval,
            llm,
            model: model.into(),
            top_k_per_source,
        }
    }

    #[instrument(skip(self, tool), fields(tool = tool.name()))]
    pub async fn run(&self, tool: &RetrievalTool, input: &str) -> Result<ToolOutput, DomainError> {
        match tool {
            RetrievalTool::KnowledgeBaseQuery { knowledge_base_id } => {
                let kb = self.knowledge_bases.get_required(knowledge_base_id).await?;
                let scope = self.knowledge_bases.expand_scope(knowledge_base_id).await?;
                let mode = if kb.is_hybrid_search_enabled() {
                    SearchMode::Hybrid
                } else {
                    SearchMode::SemanticOnly
                };

                let contexts = self
                    .retrieval
                    .retrieve_with_mode(&scope, input, self.top_k_per_source, mode)
                    .await?;
                debug!(scope = scope.len(), contexts = contexts.len(), "Context retrieved");

                if contexts.is_empty() {
                    return Ok(ToolOutput::answer(NO_CONTEXT_ANSWER));
                }

                let answer = self.synthesize(input, &contexts).await?;
                Ok(ToolOutput::answer(answer).with_contexts(contexts))
            }
            RetrievalTool::ProductSearch { catalog } => {
                let matches = catalog.search(input, PRODUCT_MATCHES);
                Ok(ToolOutput::answer(format_matches(input, &matches)).with_products(matches))
            }
        }
    }

    /// Answers `question` from the retrieved passages, passed as a JSON array
    async fn synthesize(
        &self,
        question: &str,
        contexts: &[RetrievedContext],
    ) -> Result<String, DomainError> {
        let passages: Vec<&str> = contexts.iter().map(|c| c.text.as_str()).collect();
        let passages = serde_json::to_string(&passages)
            .map_err(|e| DomainError::internal(format!("failed to encode context: {}", e)))?;

        let prompt = format!("Context passages:\n{}\n\nQuestion: {}", passages, question);
        let answer = self
            .llm
            .complete(&self.model, QA_SYSTEM_PROMPT, vec![Message::user(prompt)])
            .await?;

        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::{Chunk, ChunkId, Document, DocumentId};
    use crate::domain::embedding::{EmbeddingProvider, MockEmbeddingProvider};
    use crate::domain::knowledge_base::{KnowledgeBase, KnowledgeBaseId};
    use crate::domain::llm::MockLlmProvider;
    use crate::domain::product::{Product, ProductCatalog};
    use crate::domain::search::{LexicalEntry, LexicalIndex, VectorIndex, VectorPayload, VectorRecord};
    use crate::infrastructure::search::reranker::PassthroughReranker;
    use crate::infrastructure::search::{InMemoryLexicalIndex, InMemoryVectorIndex, RetrievalSettings};
    use crate::infrastructure::services::CreateKnowledgeBaseRequest;
    use crate::infrastructure::storage::InMemoryStorage;

    struct Fixture {
        runner: ToolRunner,
        knowledge_bases: Arc<KnowledgeBaseService>,
        lexical: Arc<InMemoryLexicalIndex>,
        vector: Arc<InMemoryVectorIndex>,
        embedder: Arc<MockEmbeddingProvider>,
        llm: Arc<MockLlmProvider>,
    }

    fn fixture(llm: MockLlmProvider) -> Fixture {
        let lexical = Arc::new(InMemoryLexicalIndex::new());
        let vector = Arc::new(InMemoryVectorIndex::new(false));
        let embedder = Arc::new(MockEmbeddingProvider::new("mock", 64));
        let llm = Arc::new(llm);

        let knowledge_bases = Arc::new(KnowledgeBaseService::new(
            Arc::new(InMemoryStorage::<KnowledgeBase>::new()),
            Arc::new(InMemoryStorage::<Document>::new()),
            Arc::new(InMemoryStorage::<Chunk>::new()),
            lexical.clone(),
            vector.clone(),
            "chunks",
        ));
        let retrieval = Arc::new(RankFusionEngine::new(
            embedder.clone(),
            vector.clone(),
            lexical.clone(),
            Arc::new(PassthroughReranker),
            RetrievalSettings::default(),
        ));

        Fixture {
            runner: ToolRunner::new(knowledge_bases.clone(), retrieval, llm.clone(), "gpt-test", 10),
            knowledge_bases,
            lexical,
            vector,
            embedder,
            llm,
        }
    }

    async fn index(f: &Fixture, kb: &KnowledgeBaseId, text: &str) {
        let chunk_id = ChunkId::generate();
        let document_id = DocumentId::generate();
        f.lexical
            .index(
                kb,
                LexicalEntry {
                    chunk_id: chunk_id.clone(),
                    document_id: document_id.clone(),
                    original_text: text.to_string(),
                    contextualized_text: text.to_string(),
                },
            )
            .await
            .unwrap();
        f.vector
            .upsert(
                "chunks",
                VectorRecord {
                    id: chunk_id.as_str().to_string(),
                    vector: f.embedder.embed_text(text).await.unwrap(),
                    payload: VectorPayload {
                        chunk_id,
                        document_id,
                        knowledge_base_id: kb.clone(),
                        text: text.to_string(),
                    },
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_knowledge_base_query_passes_contexts_as_json() {
        let f = fixture(MockLlmProvider::new("mock").with_handler(|request| {
            let prompt = request.last_user_message().unwrap_or_default();
            assert!(prompt.contains("[\""), "{}", prompt);
            assert!(prompt.contains("Question: how fast do kettles boil"));
            Ok(" Very fast. ".to_string())
        }));
        let kb = f
            .knowledge_bases
            .create(CreateKnowledgeBaseRequest::new("owner", "kb").with_id("kb1"))
            .await
            .unwrap();
        index(&f, kb.id(), "Kettles boil water in two minutes").await;

        let tool = RetrievalTool::KnowledgeBaseQuery {
            knowledge_base_id: kb.id().clone(),
        };
        let output = f.runner.run(&tool, "how fast do kettles boil").await.unwrap();

        assert_eq!(output.answer, "Very fast.");
        assert_eq!(output.contexts.len(), 1);
        assert_eq!(f.llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_query_searches_inherited_knowledge_bases() {
        let f = fixture(MockLlmProvider::new("mock").with_response("from parent"));
        let parent = f
            .knowledge_bases
            .create(CreateKnowledgeBaseRequest::new("owner", "parent").with_id("parent"))
            .await
            .unwrap();
        let child = f.knowledge_bases.inherit(parent.id(), None).await.unwrap();
        index(&f, parent.id(), "Bicycles have two wheels").await;

        let tool = RetrievalTool::KnowledgeBaseQuery {
            knowledge_base_id: child,
        };
        let output = f.runner.run(&tool, "bicycles wheels").await.unwrap();

        assert_eq!(output.answer, "from parent");
        assert!(output.contexts[0].text.contains("Bicycles"));
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_answers_without_llm() {
        let f = fixture(MockLlmProvider::new("mock").with_response("unused"));
        let kb = f
            .knowledge_bases
            .create(CreateKnowledgeBaseRequest::new("owner", "kb").with_id("kb1"))
            .await
            .unwrap();

        let tool = RetrievalTool::KnowledgeBaseQuery {
            knowledge_base_id: kb.id().clone(),
        };
        let output = f.runner.run(&tool, "anything").await.unwrap();

        assert_eq!(output.answer, NO_CONTEXT_ANSWER);
        assert!(output.contexts.is_empty());
        assert_eq!(f.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_product_search_returns_top_three() {
        let f = fixture(MockLlmProvider::new("mock"));
        let product = |name: &str| Product {
            name: name.to_string(),
            price: "10".to_string(),
            description: String::new(),
            url: String::new(),
        };
        let catalog = ProductCatalog::new(vec![
            product("Steel Kettle"),
            product("Glass Kettle"),
            product("Road Bicycle"),
            product("Electric Kettle Pro"),
            product("Teapot"),
        ]);

        let tool = RetrievalTool::ProductSearch {
            catalog: Arc::new(catalog),
        };
        let output = f.runner.run(&tool, "kettle").await.unwrap();

        assert_eq!(output.products.len(), 3);
        assert!(output.products.iter().all(|m| m.product.name.contains("Kettle")));
        assert!(output.answer.starts_with("Products related to kettle:"));
    }
}
