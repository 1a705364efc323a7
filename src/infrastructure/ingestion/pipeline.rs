//! Ingestion pipeline: drives one document from UPLOADED to PROCESSED

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::chunkers::ChunkSplitter;
use super::factory::ParserFactory;
use super::parsers::is_product_catalog;
use crate::domain::document::{Chunk, ChunkId, Document, DocumentId, DocumentStatus};
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::ingestion::{
    contextualized_text, require_parser_for, ContextFailurePolicy, Contextualizer, IngestionStep,
    IngestionSummary, JobId, JobQueue, JobState, ParserInput, ParserType, TextChunk,
};
use crate::domain::object_store::ObjectStore;
use crate::domain::retry::RetryPolicy;
use crate::domain::search::{LexicalEntry, LexicalIndex, VectorIndex, VectorPayload, VectorRecord};
use crate::domain::storage::Storage;
use crate::domain::DomainError;
use crate::infrastructure::locks::KeyedLocks;

/// Knobs of a pipeline run, taken from the `ingestion` and `retrieval` config sections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub bucket: String,
    pub vector_collection: String,
    pub contextualize_concurrency: usize,
    pub contextualize_timeout: Duration,
    pub context_failure_policy: ContextFailurePolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            bucket: "uploads".to_string(),
            vector_collection: "chunks".to_string(),
            contextualize_concurrency: 8,
            contextualize_timeout: Duration::from_secs(30),
            context_failure_policy: ContextFailurePolicy::Blank,
        }
    }
}

/// Collaborators the pipeline writes through
#[derive(Debug, Clone)]
pub struct PipelineStores {
    pub documents: Arc<dyn Storage<Document>>,
    pub chunks: Arc<dyn Storage<Chunk>>,
    pub object_store: Arc<dyn ObjectStore>,
    pub lexical: Arc<dyn LexicalIndex>,
    pub vector: Arc<dyn VectorIndex>,
    pub queue: Arc<dyn JobQueue>,
    /// Held by a run for its whole duration; retry and delete of the same
    /// document wait on it
    pub document_locks: Arc<KeyedLocks<DocumentId>>,
}

/// A chunk with everything needed to index and persist it
#[derive(Debug, Clone)]
struct PreparedChunk {
    id: ChunkId,
    sequence_index: usize,
    original: String,
    contextualized: String,
}

#[derive(Debug)]
pub struct IngestionPipeline {
    stores: PipelineStores,
    splitter: ChunkSplitter,
    contextualizer: Arc<dyn Contextualizer>,
    embedder: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    settings: PipelineSettings,
}

impl IngestionPipeline {
    pub fn new(
        stores: PipelineStores,
        splitter: ChunkSplitter,
        contextualizer: Arc<dyn Contextualizer>,
        embedder: Arc<dyn EmbeddingProvider>,
        retry: RetryPolicy,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            stores,
            splitter,
            contextualizer,
            embedder,
            retry,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs one dispatched job to completion and settles both the job and
    /// the document. Errors are recorded on the document, never returned.
    #[instrument(skip_all, fields(job_id = %job_id, document_id = %document_id))]
    pub async fn run(&self, job_id: &JobId, document_id: &DocumentId) {
        let _running = self.stores.document_locks.acquire(document_id).await;

        if let Err(e) = self.stores.queue.update_state(job_id, JobState::Running, None).await {
            // Cancelled while still queued
            info!(error = %e, "Job not started");
            self.settle_failed(job_id, document_id, "cancelled before start").await;
            return;
        }

        let snapshot = match self.stores.documents.get_required(document_id).await {
            Ok(document) => document,
            Err(e) => {
                warn!(error = %e, "Document vanished before ingestion");
                self.fail_job(job_id, e.to_string()).await;
                return;
            }
        };

        match self.ingest(job_id, &snapshot).await {
            Ok(summary) => {
                if let Err(e) = self.settle_succeeded(job_id, &snapshot).await {
                    self.settle_lost(job_id, &snapshot, e).await;
                    return;
                }
                info!(
                    chunks = summary.chunk_count,
                    blank_contexts = summary.blank_contexts,
                    product_catalog = summary.product_catalog,
                    "Document processed"
                );
            }
            Err(DomainError::Cancelled { message }) => {
                warn!(%message, "Ingestion cancelled");
                self.settle_failed(job_id, document_id, format!("cancelled: {}", message))
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "Ingestion failed");
                self.fail_job(job_id, e.to_string()).await;
                self.settle_failed(job_id, document_id, e.to_string()).await;
            }
        }
    }

    async fn fail_job(&self, job_id: &JobId, reason: String) {
        if let Err(e) = self
            .stores
            .queue
            .update_state(job_id, JobState::Failed, Some(reason))
            .await
        {
            warn!(error = %e, "Failed to record job failure");
        }
    }

    async fn settle_succeeded(&self, job_id: &JobId, snapshot: &Document) -> Result<(), DomainError> {
        let owner = job_id.clone();
        let knowledge_base_id = snapshot.knowledge_base_id().clone();
        self.stores
            .documents
            .modify(
                snapshot.id(),
                Box::new(move |doc: &mut Document| {
                    if !Self::owns(doc, &owner) || doc.knowledge_base_id() != &knowledge_base_id {
                        return Err(DomainError::cancelled("document settled by another request"));
                    }
                    doc.mark_processed()
                }),
            )
            .await?;

        if let Err(e) = self
            .stores
            .queue
            .update_state(job_id, JobState::Succeeded, None)
            .await
        {
            warn!(error = %e, "Failed to record job success");
        }
        Ok(())
    }

    /// The document was settled elsewhere after its chunks were committed.
    /// A cancel keeps the committed chunks; a delete or merge discards them.
    async fn settle_lost(&self, job_id: &JobId, snapshot: &Document, cause: DomainError) {
        let current = match self.stores.documents.get(snapshot.id()).await {
            Ok(current) => current,
            Err(e) => {
                error!(error = %e, "Failed to re-read document after ingestion");
                return;
            }
        };

        match current {
            Some(ref doc) if doc.knowledge_base_id() == snapshot.knowledge_base_id() => {
                warn!(error = %cause, "Stop requested after indexing, keeping committed chunks");
            }
            _ => {
                warn!(error = %cause, "Document removed or moved during ingestion, discarding its chunks");
                self.discard(snapshot, current.as_ref()).await;
                self.fail_job(job_id, "document removed or moved during ingestion".to_string())
                    .await;
                self.settle_failed(job_id, snapshot.id(), "knowledge base changed during ingestion")
                    .await;
            }
        }
    }

    /// The document is still processing on behalf of `job_id`
    fn owns(doc: &Document, job_id: &JobId) -> bool {
        doc.status() == DocumentStatus::Processing && doc.current_job_id() == Some(job_id)
    }

    /// Re-reads the row once both indexes are written. A cancel, delete or
    /// merge that landed before that point rolls the writes back.
    async fn ensure_owned(&self, job_id: &JobId, snapshot: &Document) -> Result<(), DomainError> {
        let current = self.stores.documents.get(snapshot.id()).await?;
        let owned = current.as_ref().is_some_and(|doc| {
            Self::owns(doc, job_id) && doc.knowledge_base_id() == snapshot.knowledge_base_id()
        });
        if owned {
            return Ok(());
        }

        self.discard(snapshot, current.as_ref()).await;
        if current.is_none_or(|doc| doc.knowledge_base_id() != snapshot.knowledge_base_id()) {
            // Nobody else settles the job of a deleted or moved document
            self.fail_job(job_id, "document removed or moved during ingestion".to_string())
                .await;
        }
        Err(DomainError::cancelled("document changed while indexing"))
    }

    /// Rolls back this document's writes under its original knowledge base
    /// and, if it was moved, under the new one too
    async fn discard(&self, snapshot: &Document, current: Option<&Document>) {
        self.rollback(snapshot).await;
        if let Some(moved) =
            current.filter(|doc| doc.knowledge_base_id() != snapshot.knowledge_base_id())
        {
            self.rollback(moved).await;
        }
    }

    async fn settle_failed(
        &self,
        job_id: &JobId,
        document_id: &DocumentId,
        reason: impl Into<String>,
    ) {
        let reason = reason.into();
        let job_id = job_id.clone();

        let result = self
            .stores
            .documents
            .modify(
                document_id,
                Box::new(move |doc: &mut Document| {
                    // Already settled by a cancel, or a newer attempt owns it
                    if !Self::owns(doc, &job_id) {
                        return Ok(());
                    }
                    doc.mark_failed(reason)
                }),
            )
            .await;

        match result {
            Ok(_) => {}
            Err(DomainError::NotFound { .. }) => debug!("Document deleted during ingestion"),
            Err(e) => error!(error = %e, "Failed to mark document failed"),
        }
    }

    async fn ensure_active(&self, job_id: &JobId, step: IngestionStep) -> Result<(), DomainError> {
        if self.stores.queue.get_state(job_id).await? == JobState::Cancelled {
            return Err(DomainError::cancelled(format!("stop requested before {:?}", step)));
        }
        Ok(())
    }

    async fn progress(&self, job_id: &JobId, percent: u8) -> Result<(), DomainError> {
        self.stores.queue.report_progress(job_id, percent).await
    }

    /// Steps 1-6; settling the document is left to [`Self::run`]
    pub async fn execute(
        &self,
        job_id: &JobId,
        document_id: &DocumentId,
    ) -> Result<IngestionSummary, DomainError> {
        let document = self.stores.documents.get_required(document_id).await?;
        self.ingest(job_id, &document).await
    }

    async fn ingest(&self, job_id: &JobId, document: &Document) -> Result<IngestionSummary, DomainError> {
        self.progress(job_id, IngestionStep::Started.progress()).await?;

        // Unsupported formats fail before anything is written
        let parser_type = require_parser_for(document.file_name())?;

        let bytes = self
            .retry
            .run("object store download", || {
                self.stores
                    .object_store
                    .get_object(&self.settings.bucket, document.storage_object_path())
            })
            .await?;
        self.progress(job_id, IngestionStep::Downloaded.progress()).await?;

        if parser_type == ParserType::Xlsx && is_product_catalog(&bytes)? {
            info!("Product catalog detected, skipping indexing");
            return Ok(IngestionSummary {
                product_catalog: true,
                ..Default::default()
            });
        }

        self.ensure_active(job_id, IngestionStep::Parsed).await?;
        let parsed = ParserFactory::create(parser_type)
            .parse(ParserInput::from_bytes(bytes.to_vec()).with_filename(document.file_name()))
            .await?;
        self.progress(job_id, IngestionStep::Parsed.progress()).await?;

        let pieces = self.splitter.split(&parsed.content).await?;
        self.progress(job_id, IngestionStep::Split.progress()).await?;

        if pieces.is_empty() {
            info!("Document has no text");
            return Ok(IngestionSummary::default());
        }

        self.ensure_active(job_id, IngestionStep::Contextualized).await?;
        let (prepared, blank_contexts) = self.contextualize(job_id, &parsed.content, pieces).await?;
        self.progress(job_id, IngestionStep::Contextualized.progress()).await?;

        self.ensure_active(job_id, IngestionStep::Indexed).await?;
        let vectors = self
            .retry
            .run("embed chunks", || {
                self.embedder
                    .embed_texts(prepared.iter().map(|c| c.contextualized.clone()).collect())
            })
            .await?;
        if vectors.len() != prepared.len() {
            return Err(DomainError::external(
                self.embedder.provider_name(),
                format!("expected {} embeddings, got {}", prepared.len(), vectors.len()),
            ));
        }

        self.index(document, &prepared, vectors).await?;
        self.ensure_owned(job_id, document).await?;
        self.progress(job_id, IngestionStep::Indexed.progress()).await?;

        // Both indexes are committed; a stop request from here on keeps them
        self.ensure_active(job_id, IngestionStep::Persisted).await?;
        if let Err(e) = self.persist(document, &prepared).await {
            self.rollback(document).await;
            return Err(e);
        }
        self.progress(job_id, IngestionStep::Persisted.progress()).await?;

        Ok(IngestionSummary {
            chunk_count: prepared.len(),
            blank_contexts,
            product_catalog: false,
        })
    }

    /// Fans out to the contextualizer with bounded concurrency. Each call is
    /// time-boxed; failures follow the configured policy.
    async fn contextualize(
        &self,
        job_id: &JobId,
        document_text: &str,
        pieces: Vec<TextChunk>,
    ) -> Result<(Vec<PreparedChunk>, usize), DomainError> {
        let (contexts, blank) = self.gather_contexts(job_id, document_text, &pieces).await?;

        let prepared = pieces
            .into_iter()
            .zip(contexts)
            .map(|(piece, context)| PreparedChunk {
                id: ChunkId::generate(),
                sequence_index: piece.index(),
                contextualized: contextualized_text(&context, &piece.content),
                original: piece.content,
            })
            .collect();

        Ok((prepared, blank))
    }

    /// Contexts in chunk order, whatever order the calls complete in
    async fn gather_contexts(
        &self,
        job_id: &JobId,
        document_text: &str,
        pieces: &[TextChunk],
    ) -> Result<(Vec<String>, usize), DomainError> {
        let total = pieces.len();
        let timeout = self.settings.contextualize_timeout;
        let mut contexts = vec![String::new(); total];
        let mut done = 0;
        let mut blank = 0;

        // Each call owns its inputs so the pipeline future stays Send
        let document: Arc<str> = Arc::from(document_text);
        let calls: Vec<_> = pieces
            .iter()
            .enumerate()
            .map(|(idx, piece)| {
                let contextualizer = self.contextualizer.clone();
                let document = document.clone();
                let chunk = piece.content.clone();
                async move {
                    let outcome =
                        tokio::time::timeout(timeout, contextualizer.contextualize(&document, &chunk))
                            .await
                            .unwrap_or_else(|_| {
                                Err(DomainError::external(
                                    "contextualizer",
                                    format!("timed out after {:?}", timeout),
                                ))
                            });
                    (idx, outcome)
                }
            })
            .collect();

        let mut results =
            stream::iter(calls).buffer_unordered(self.settings.contextualize_concurrency.max(1));

        while let Some((idx, outcome)) = results.next().await {
            match outcome {
                Ok(context) => contexts[idx] = context,
                Err(e) => match self.settings.context_failure_policy {
                    ContextFailurePolicy::Blank => {
                        warn!(chunk = idx, error = %e, "Contextualization failed, indexing without context");
                        blank += 1;
                    }
                    ContextFailurePolicy::Abort => return Err(e),
                },
            }
            done += 1;
            self.progress(job_id, IngestionStep::contextualize_progress(done, total))
                .await?;
        }

        Ok((contexts, blank))
    }

    /// Dual write. A failure on either side removes this document from both
    /// indexes before the error surfaces.
    async fn index(
        &self,
        document: &Document,
        prepared: &[PreparedChunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), DomainError> {
        let kb = document.knowledge_base_id();

        let entries: Vec<LexicalEntry> = prepared
            .iter()
            .map(|c| LexicalEntry {
                chunk_id: c.id.clone(),
                document_id: document.id().clone(),
                original_text: c.original.clone(),
                contextualized_text: c.contextualized.clone(),
            })
            .collect();

        let records: Vec<VectorRecord> = prepared
            .iter()
            .zip(vectors)
            .map(|(c, vector)| VectorRecord {
                id: c.id.as_str().to_string(),
                vector,
                payload: VectorPayload {
                    chunk_id: c.id.clone(),
                    document_id: document.id().clone(),
                    knowledge_base_id: kb.clone(),
                    text: c.contextualized.clone(),
                },
            })
            .collect();

        if let Err(e) = self
            .retry
            .run("lexical index write", || {
                self.stores.lexical.index_batch(kb, entries.clone())
            })
            .await
        {
            self.rollback(document).await;
            return Err(e);
        }

        if let Err(e) = self
            .retry
            .run("vector index write", || {
                self.stores
                    .vector
                    .upsert_batch(&self.settings.vector_collection, records.clone())
            })
            .await
        {
            self.rollback(document).await;
            return Err(DomainError::index_inconsistency(
                document.id().as_str(),
                format!("vector write failed after lexical write: {}", e),
            ));
        }

        Ok(())
    }

    async fn persist(&self, document: &Document, prepared: &[PreparedChunk]) -> Result<(), DomainError> {
        let rows: Vec<Chunk> = prepared
            .iter()
            .map(|c| {
                Chunk::new(
                    c.id.clone(),
                    document.id().clone(),
                    document.knowledge_base_id().clone(),
                    c.sequence_index,
                    c.original.clone(),
                    c.contextualized.clone(),
                    c.id.as_str(),
                )
            })
            .collect();

        self.retry
            .run("persist chunks", || self.stores.chunks.apply(rows.clone(), Vec::new()))
            .await
    }

    /// Removes every trace of a document's chunks from both indexes and the
    /// chunk table. Failures are logged; the caller reports the original error.
    pub async fn rollback(&self, document: &Document) {
        let kb = document.knowledge_base_id();
        let id = document.id();

        if let Err(e) = self.stores.lexical.delete(kb, id).await {
            error!(document_id = %id, error = %e, "Lexical rollback failed");
        }
        if let Err(e) = self
            .stores
            .vector
            .delete_by_document(&self.settings.vector_collection, id)
            .await
        {
            error!(document_id = %id, error = %e, "Vector rollback failed");
        }
        if let Err(e) = purge_chunk_rows(self.stores.chunks.as_ref(), id).await {
            error!(document_id = %id, error = %e, "Chunk row rollback failed");
        }
    }
}

/// Deletes every persisted chunk row of `document_id`
pub async fn purge_chunk_rows(
    chunks: &dyn Storage<Chunk>,
    document_id: &DocumentId,
) -> Result<usize, DomainError> {
    let keys: Vec<ChunkId> = chunks
        .find(&|c: &Chunk| c.document_id() == document_id)
        .await?
        .into_iter()
        .map(|c| c.id().clone())
        .collect();
    let count = keys.len();

    if count > 0 {
        chunks.apply(Vec::new(), keys).await?;
    }
    Ok(count)
}
