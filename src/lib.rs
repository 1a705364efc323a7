//! Contextual retrieval engine
//!
//! Builds knowledge bases from uploaded documents and answers queries over
//! them:
//! - Ingestion pipeline: parse, split, contextualize, dual-index, persist
//! - Hybrid retrieval fused by weighted reciprocal rank, then reranked
//! - Knowledge base inheritance, expanding the search scope transitively

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use config::RerankerKind;
use domain::document::{Chunk, Document};
use domain::embedding::EmbeddingProvider;
use domain::ingestion::{ChunkingType, ProgressEvent};
use domain::knowledge_base::{KnowledgeBase, KnowledgeBaseId};
use domain::llm::LlmProvider;
use domain::object_store::ObjectStore;
use domain::search::{Reranker, RetrievedContext};
use domain::tool::{RetrievalTool, ToolOutput};
use domain::DomainError;
use infrastructure::embedding::{CachedEmbeddingProvider, OpenAiEmbeddingProvider};
use infrastructure::ingestion::{
    ChunkSplitter, IngestionPipeline, IngestionWorker, LlmContextualizer, PipelineStores,
};
use infrastructure::jobs::InMemoryJobQueue;
use infrastructure::llm::{HttpClient, OpenAiProvider};
use infrastructure::locks::KeyedLocks;
use infrastructure::object_store::LocalObjectStore;
use infrastructure::search::reranker::{LlmReranker, PassthroughReranker};
use infrastructure::search::{InMemoryLexicalIndex, InMemoryVectorIndex, RankFusionEngine};
use infrastructure::services::{DocumentService, KnowledgeBaseService, ToolRunner};
use infrastructure::storage::InMemoryStorage;

const QUERY_CACHE_TTL: Duration = Duration::from_secs(3600);
const QUERY_CACHE_CAPACITY: u64 = 10_000;

/// A running engine: services plus the background ingestion worker
#[derive(Debug)]
pub struct Engine {
    config: Arc<AppConfig>,
    knowledge_bases: Arc<KnowledgeBaseService>,
    documents: Arc<DocumentService>,
    retrieval: Arc<RankFusionEngine>,
    tools: ToolRunner,
    queue: Arc<InMemoryJobQueue>,
    shutdown: broadcast::Sender<()>,
    worker: JoinHandle<()>,
}

impl Engine {
    pub fn builder(config: AppConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn knowledge_bases(&self) -> &KnowledgeBaseService {
        &self.knowledge_bases
    }

    pub fn documents(&self) -> &DocumentService {
        &self.documents
    }

    pub fn tools(&self) -> &ToolRunner {
        &self.tools
    }

    /// Progress updates of every ingestion job
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        use domain::ingestion::JobQueue;
        self.queue.subscribe()
    }

    /// Hybrid retrieval over an explicit scope
    pub async fn retrieve(
        &self,
        knowledge_base_ids: &BTreeSet<KnowledgeBaseId>,
        query: &str,
        top_k_per_source: usize,
    ) -> Result<Vec<RetrievedContext>, DomainError> {
        self.retrieval
            .retrieve(knowledge_base_ids, query, top_k_per_source)
            .await
    }

    /// Answers `question` from a knowledge base and everything it inherits
    pub async fn ask(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        question: &str,
    ) -> Result<ToolOutput, DomainError> {
        let tool = RetrievalTool::KnowledgeBaseQuery {
            knowledge_base_id: knowledge_base_id.clone(),
        };
        self.tools.run(&tool, question).await
    }

    /// Uploads, queues and waits for one local file
    pub async fn ingest_path(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        path: &std::path::Path,
        timeout: Duration,
    ) -> Result<Document, DomainError> {
        let document = self.documents.upload_path(knowledge_base_id, path).await?;
        self.documents.process(document.id()).await?;
        self.documents.wait_until_settled(document.id(), timeout).await
    }

    /// Stops the worker; jobs already running finish on their own tasks
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.worker.await {
            tracing::warn!(error = %e, "Ingestion worker ended abnormally");
        }
    }
}

/// Wires the engine from configuration. Collaborators not supplied are
/// created from the `llm` and `storage` sections.
pub struct EngineBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmProvider>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            embedder: None,
            object_store: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_object_store(mut self, object_store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(object_store);
        self
    }

    /// Must run inside a Tokio runtime; the ingestion worker is spawned here
    pub async fn build(self) -> Result<Engine, DomainError> {
        let config = Arc::new(self.config);
        config.validate()?;

        let llm = match self.llm {
            Some(llm) => llm,
            None => Arc::new(OpenAiProvider::with_base_url(
                HttpClient::with_timeout(config.llm.request_timeout())?,
                config.llm.api_key()?,
                &config.llm.base_url,
            )) as Arc<dyn LlmProvider>,
        };

        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => Arc::new(CachedEmbeddingProvider::new(
                OpenAiEmbeddingProvider::with_base_url(
                    HttpClient::with_timeout(config.llm.request_timeout())?,
                    config.llm.api_key()?,
                    &config.llm.embedding_model,
                    &config.llm.base_url,
                ),
                QUERY_CACHE_TTL,
                QUERY_CACHE_CAPACITY,
            )) as Arc<dyn EmbeddingProvider>,
        };

        let object_store = self.object_store.unwrap_or_else(|| {
            Arc::new(LocalObjectStore::new(&config.storage.object_root)) as Arc<dyn ObjectStore>
        });

        let knowledge_base_rows = Arc::new(InMemoryStorage::<KnowledgeBase>::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let lexical = Arc::new(InMemoryLexicalIndex::new());
        let vector = Arc::new(InMemoryVectorIndex::new(config.retrieval.quantized_search));

        let stores = PipelineStores {
            documents: Arc::new(InMemoryStorage::<Document>::new()),
            chunks: Arc::new(InMemoryStorage::<Chunk>::new()),
            object_store,
            lexical: lexical.clone(),
            vector: vector.clone(),
            queue: queue.clone(),
            document_locks: Arc::new(KeyedLocks::new()),
        };

        let mut splitter = ChunkSplitter::new(config.chunking.strategy, config.chunking.config())?;
        if config.chunking.strategy == ChunkingType::Semantic {
            splitter = splitter.with_embeddings(embedder.clone(), config.chunking.breakpoint_percentile);
        }

        let pipeline = IngestionPipeline::new(
            stores.clone(),
            splitter,
            Arc::new(LlmContextualizer::new(llm.clone(), &config.llm.model)),
            embedder.clone(),
            config.retry.clone(),
            config.pipeline_settings(),
        );

        let reranker: Arc<dyn Reranker> = match config.retrieval.reranker {
            RerankerKind::Passthrough => Arc::new(PassthroughReranker),
            RerankerKind::Llm => Arc::new(LlmReranker::new(llm.clone(), &config.llm.model)),
        };

        let retrieval = Arc::new(RankFusionEngine::new(
            embedder,
            vector.clone(),
            lexical.clone(),
            reranker,
            config.retrieval.settings()?,
        ));

        let knowledge_bases = Arc::new(KnowledgeBaseService::new(
            knowledge_base_rows.clone(),
            stores.documents.clone(),
            stores.chunks.clone(),
            lexical,
            vector,
            &config.retrieval.vector_collection,
        ));

        let documents = Arc::new(DocumentService::new(
            knowledge_base_rows,
            stores,
            config.retry.clone(),
            &config.ingestion.bucket,
            &config.retrieval.vector_collection,
        ));

        let tools = ToolRunner::new(
            knowledge_bases.clone(),
            retrieval.clone(),
            llm,
            &config.llm.model,
            config.retrieval.top_k_per_source,
        );

        let receiver = queue
            .take_receiver()
            .await
            .ok_or_else(|| DomainError::internal("Job queue receiver already taken"))?;
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let worker = IngestionWorker::new(Arc::new(pipeline), config.ingestion.max_concurrent_jobs)
            .spawn(receiver, shutdown_rx);

        info!(
            chunking = ?config.chunking.strategy,
            reranker = ?config.retrieval.reranker,
            "Engine ready"
        );

        Ok(Engine {
            config,
            knowledge_bases,
            documents,
            retrieval,
            tools,
            queue,
            shutdown,
            worker,
        })
    }
}

/// Builds an engine backed by the OpenAI-compatible endpoints in `config`
pub async fn create_engine(config: AppConfig) -> Result<Engine, DomainError> {
    Engine::builder(config).build().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::domain::document::DocumentStatus;
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::llm::MockLlmProvider;
    use crate::infrastructure::object_store::InMemoryObjectStore;
    use crate::infrastructure::services::CreateKnowledgeBaseRequest;

    async fn engine() -> Engine {
        let mut config = AppConfig::default();
        config.chunking.strategy = ChunkingType::Recursive;
        config.chunking.chunk_size = 60;
        config.chunking.chunk_overlap = 0;
        config.retry.max_retries = 0;

        Engine::builder(config)
            .with_llm(Arc::new(
                MockLlmProvider::new("mock").with_response("Part of the household guide."),
            ))
            .with_embedder(Arc::new(MockEmbeddingProvider::new("mock", 256)))
            .with_object_store(Arc::new(InMemoryObjectStore::new()))
            .build()
            .await
            .unwrap()
    }

    async fn ingest(engine: &Engine, kb: &KnowledgeBaseId, name: &str, text: &str) {
        let document = engine
            .documents()
            .upload(kb, name, Bytes::from(text.to_string()))
            .await
            .unwrap();
        engine.documents().process(document.id()).await.unwrap();
        let settled = engine
            .documents()
            .wait_until_settled(document.id(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(settled.status(), DocumentStatus::Processed);
    }

    #[tokio::test]
    async fn test_end_to_end_retrieval_and_inheritance() {
        let engine = engine().await;
        let kbs = engine.knowledge_bases();
        let kb1 = kbs
            .create(CreateKnowledgeBaseRequest::new("owner", "Guide").with_id("kb1"))
            .await
            .unwrap()
            .id()
            .clone();
        let kb2 = kbs
            .create(CreateKnowledgeBaseRequest::new("owner", "Geology").with_id("kb2"))
            .await
            .unwrap()
            .id()
            .clone();

        ingest(
            &engine,
            &kb1,
            "guide.txt",
            "Kettles boil water in two minutes.\n\n\
             Bicycles need their tyres pumped weekly.\n\n\
             Green tea steeps for three minutes.",
        )
        .await;
        ingest(&engine, &kb2, "rocks.md", "Volcanoes erupt molten lava and ash.").await;

        let scope = kbs.expand_scope(&kb1).await.unwrap();
        assert_eq!(scope, BTreeSet::from([kb1.clone()]));

        let hits = engine.retrieve(&scope, "bicycles tyres pumped", 1).await.unwrap();
        assert!(hits[0].text.contains("Bicycles need their tyres"), "{:?}", hits);

        let hits = engine.retrieve(&scope, "volcanoes lava", 3).await.unwrap();
        assert!(hits.iter().all(|h| !h.text.contains("Volcanoes")));

        // kb1 inherits from kb2
        kbs.inherit(&kb2, Some(&kb1)).await.unwrap();
        let scope = kbs.expand_scope(&kb1).await.unwrap();
        assert_eq!(scope, BTreeSet::from([kb1.clone(), kb2.clone()]));

        let hits = engine.retrieve(&scope, "volcanoes lava", 1).await.unwrap();
        assert!(hits[0].text.contains("Volcanoes erupt"), "{:?}", hits);

        let output = engine.ask(&kb1, "what do volcanoes erupt").await.unwrap();
        assert!(!output.contexts.is_empty());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_scope_is_rejected() {
        let engine = engine().await;

        let result = engine.retrieve(&BTreeSet::new(), "anything", 5).await;

        assert!(matches!(result, Err(DomainError::InvalidScope)));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_progress_is_published() {
        let engine = engine().await;
        let mut progress = engine.subscribe_progress();
        let kb = engine
            .knowledge_bases()
            .create(CreateKnowledgeBaseRequest::new("owner", "kb").with_id("kb1"))
            .await
            .unwrap()
            .id()
            .clone();

        ingest(&engine, &kb, "notes.txt", "Short note about kettles.").await;

        let mut last = 0;
        while let Ok(event) = progress.try_recv() {
            assert!(event.percent >= last);
            last = event.percent;
        }
        assert_eq!(last, 100);
        engine.shutdown().await;
    }
}
