//! Hybrid retrieval: vector and lexical search fused by weighted reciprocal rank

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::embedding::EmbeddingProvider;
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::search::{
    fuse, FusionWeights, LexicalHit, LexicalIndex, Reranker, RetrievedContext, VectorIndex,
    VectorQuery,
};
use crate::domain::DomainError;

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub weights: FusionWeights,
    /// Contexts returned after reranking
    pub top_n: usize,
    pub vector_collection: String,
    pub score_threshold: Option<f32>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            top_n: 5,
            vector_collection: "chunks".to_string(),
            score_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Hybrid,
    /// Vector search only; used for knowledge bases with hybrid search off
    SemanticOnly,
}

#[derive(Debug)]
pub struct RankFusionEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<dyn VectorIndex>,
    lexical_index: Arc<dyn LexicalIndex>,
    reranker: Arc<dyn Reranker>,
    settings: RetrievalSettings,
}

impl RankFusionEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vector_index: Arc<dyn VectorIndex>,
        lexical_index: Arc<dyn LexicalIndex>,
        reranker: Arc<dyn Reranker>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            vector_index,
            lexical_index,
            reranker,
            settings,
        }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub async fn retrieve(
        &self,
        knowledge_base_ids: &BTreeSet<KnowledgeBaseId>,
        query: &str,
        top_k_per_source: usize,
    ) -> Result<Vec<RetrievedContext>, DomainError> {
        self.retrieve_with_mode(knowledge_base_ids, query, top_k_per_source, SearchMode::Hybrid)
            .await
    }

    /// Context strings for `query`, best first. An empty result means nothing
    /// matched; an empty scope is an `InvalidScope` error.
    #[instrument(skip(self, knowledge_base_ids), fields(scope = knowledge_base_ids.len()))]
    pub async fn retrieve_with_mode(
        &self,
        knowledge_base_ids: &BTreeSet<KnowledgeBaseId>,
        query: &str,
        top_k_per_source: usize,
        mode: SearchMode,
    ) -> Result<Vec<RetrievedContext>, DomainError> {
        if knowledge_base_ids.is_empty() {
            return Err(DomainError::InvalidScope);
        }

        let semantic = async {
            let vector = self.embedder.embed_text(query).await?;
            let vector_query =
                VectorQuery::new(vector, knowledge_base_ids.clone(), top_k_per_source)
                    .with_score_threshold(self.settings.score_threshold);
            self.vector_index
                .search_with_fallback(&self.settings.vector_collection, vector_query)
                .await
        };

        let lexical = async {
            if mode == SearchMode::SemanticOnly {
                return Ok::<Vec<LexicalHit>, DomainError>(Vec::new());
            }

            let collections: Vec<KnowledgeBaseId> = knowledge_base_ids.iter().cloned().collect();
            self.lexical_index
                .search_collections(&collections, query, top_k_per_source)
                .await
        };

        let (semantic_hits, lexical_hits) = futures::try_join!(semantic, lexical)?;

        debug!(
            semantic = semantic_hits.len(),
            lexical = lexical_hits.len(),
            "Retrieved candidates"
        );

        let fused = fuse(&semantic_hits, &lexical_hits, self.settings.weights);
        if fused.is_empty() {
            return Ok(Vec::new());
        }

        let reranked = self
            .reranker
            .rerank(query, fused, self.settings.top_n)
            .await?;

        Ok(reranked.into_iter().map(RetrievedContext::from).collect())
    }
}
