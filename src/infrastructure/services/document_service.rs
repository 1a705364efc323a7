//! Document service - upload, processing lifecycle and cascading delete

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::document::{Document, DocumentId, DocumentStatus};
use crate::domain::ingestion::{object_key, validate_file_name, IngestionJob, JobId, JobPayload};
use crate::domain::knowledge_base::{KnowledgeBase, KnowledgeBaseId};
use crate::domain::product::ProductCatalog;
use crate::domain::retry::RetryPolicy;
use crate::domain::storage::Storage;
use crate::domain::DomainError;
use crate::infrastructure::ingestion::{load_product_catalog, purge_chunk_rows, PipelineStores};

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A document together with the job currently or last processing it
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStatusReport {
    pub document: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<IngestionJob>,
}

impl DocumentStatusReport {
    pub fn progress_percent(&self) -> u8 {
        match (&self.job, self.document.status()) {
            (_, DocumentStatus::Processed) => 100,
            (Some(job), _) => job.progress_percent(),
            (None, _) => 0,
        }
    }
}

pub struct DocumentService {
    knowledge_bases: Arc<dyn Storage<KnowledgeBase>>,
    stores: PipelineStores,
    retry: RetryPolicy,
    bucket: String,
    vector_collection: String,
}

impl std::fmt::Debug for DocumentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentService")
            .field("bucket", &self.bucket)
            .field("vector_collection", &self.vector_collection)
            .finish()
    }
}

impl DocumentService {
    pub fn new(
        knowledge_bases: Arc<dyn Storage<KnowledgeBase>>,
        stores: PipelineStores,
        retry: RetryPolicy,
        bucket: impl Into<String>,
        vector_collection: impl Into<String>,
    ) -> Self {
        Self {
            knowledge_bases,
            stores,
            retry,
            bucket: bucket.into(),
            vector_collection: vector_collection.into(),
        }
    }

    pub async fn get(&self, id: &DocumentId) -> Result<Option<Document>, DomainError> {
        self.stores.documents.get(id).await
    }

    pub async fn get_required(&self, id: &DocumentId) -> Result<Document, DomainError> {
        self.get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Document '{}' not found", id)))
    }

    /// Documents of one knowledge base, oldest first
    pub async fn list(&self, knowledge_base_id: &KnowledgeBaseId) -> Result<Vec<Document>, DomainError> {
        let mut documents = self
            .stores
            .documents
            .find(&|d: &Document| d.knowledge_base_id() == knowledge_base_id)
            .await?;
        documents.sort_by_key(|d| d.created_at());
        Ok(documents)
    }

    /// Stores the file under `{knowledge_base_id}/{file_name}` and registers
    /// the document as UPLOADED
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn upload(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        file_name: &str,
        data: Bytes,
    ) -> Result<Document, DomainError> {
        validate_file_name(file_name)?;

        if !self.knowledge_bases.exists(knowledge_base_id).await? {
            return Err(DomainError::not_found(format!(
                "Knowledge base '{}' not found",
                knowledge_base_id
            )));
        }

        let duplicate = self
            .stores
            .documents
            .find(&|d: &Document| {
                d.knowledge_base_id() == knowledge_base_id && d.file_name() == file_name
            })
            .await?;
        if !duplicate.is_empty() {
            return Err(DomainError::conflict(format!(
                "File '{}' already exists in knowledge base '{}'",
                file_name, knowledge_base_id
            )));
        }

        let key = object_key(knowledge_base_id, file_name);
        let size = data.len() as u64;
        self.retry
            .run("object store upload", || {
                self.stores
                    .object_store
                    .put_object(&self.bucket, &key, data.clone())
            })
            .await?;

        let document = self
            .stores
            .documents
            .create(Document::new(knowledge_base_id.clone(), file_name, key, size))
            .await?;

        info!(document_id = %document.id(), "Document uploaded");
        Ok(document)
    }

    /// Reads a local file and uploads it under its own file name
    pub async fn upload_path(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        path: &Path,
    ) -> Result<Document, DomainError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DomainError::validation(format!("Invalid file path '{}'", path.display())))?;

        let data = tokio::fs::read(path).await.map_err(|e| {
            DomainError::storage(format!("failed to read {}: {}", path.display(), e))
        })?;

        self.upload(knowledge_base_id, file_name, Bytes::from(data)).await
    }

    /// Enqueues an UPLOADED document and moves it to PROCESSING
    #[instrument(skip(self))]
    pub async fn process(&self, id: &DocumentId) -> Result<JobId, DomainError> {
        let document = self.get_required(id).await?;
        if document.status() != DocumentStatus::Uploaded {
            return Err(DomainError::invalid_transition(format!(
                "document {} is {}, only UPLOADED documents can be processed",
                id,
                document.status()
            )));
        }

        let job_id = self.stores.queue.enqueue(JobPayload::new(id.clone())).await?;

        let attached = job_id.clone();
        let result = self
            .stores
            .documents
            .modify(
                id,
                Box::new(move |doc: &mut Document| {
                    doc.mark_processing()?;
                    doc.attach_job(attached);
                    Ok(())
                }),
            )
            .await;

        if let Err(e) = result {
            // Lost a race with another process call; the job must not run
            if let Err(cancel) = self.stores.queue.cancel(&job_id).await {
                warn!(job_id = %job_id, error = %cancel, "Failed to cancel orphaned job");
            }
            return Err(e);
        }

        info!(job_id = %job_id, "Document queued");
        Ok(job_id)
    }

    /// Discards every chunk a failed attempt left behind and queues the
    /// document again
    #[instrument(skip(self))]
    pub async fn retry(&self, id: &DocumentId) -> Result<JobId, DomainError> {
        // A cancelled attempt may still be writing; wait for it to unwind
        let _exclusive = self.stores.document_locks.acquire(id).await;
        let document = self.get_required(id).await?;
        if document.status() != DocumentStatus::Failed {
            return Err(DomainError::invalid_transition(format!(
                "document {} is {}, only FAILED documents can be retried",
                id,
                document.status()
            )));
        }

        self.purge_chunks(&document).await?;
        self.stores
            .documents
            .modify(id, Box::new(|doc: &mut Document| doc.reset_for_retry()))
            .await?;

        self.process(id).await
    }

    /// Stops a PROCESSING document. The document is FAILED as soon as this
    /// returns true; the worker notices at its next step boundary.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: &DocumentId) -> Result<bool, DomainError> {
        let document = self.get_required(id).await?;
        let Some(job_id) = document.current_job_id().cloned() else {
            return Ok(false);
        };
        if document.status() != DocumentStatus::Processing {
            return Ok(false);
        }

        self.stores.queue.cancel(&job_id).await?;

        let owner = job_id.clone();
        let updated = self
            .stores
            .documents
            .modify(
                id,
                Box::new(move |doc: &mut Document| {
                    if doc.status() != DocumentStatus::Processing
                        || doc.current_job_id() != Some(&owner)
                    {
                        return Err(DomainError::cancelled("document already settled"));
                    }
                    doc.mark_failed("cancelled by request")
                }),
            )
            .await;

        match updated {
            Ok(_) => {
                info!(job_id = %job_id, "Document cancelled");
                Ok(true)
            }
            Err(DomainError::Cancelled { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Removes the document, its chunks in both indexes and the chunk table,
    /// and the stored object
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &DocumentId) -> Result<(), DomainError> {
        let document = self.get_required(id).await?;

        if document.status() == DocumentStatus::Processing {
            self.cancel(id).await?;
        }

        let _exclusive = self.stores.document_locks.acquire(id).await;
        let document = self.get_required(id).await?;
        self.purge_chunks(&document).await?;

        if !self
            .stores
            .object_store
            .delete(&self.bucket, document.storage_object_path())
            .await?
        {
            warn!(key = document.storage_object_path(), "Stored object already gone");
        }

        self.stores.documents.delete(id).await?;
        info!("Document deleted");
        Ok(())
    }

    pub async fn status(&self, id: &DocumentId) -> Result<DocumentStatusReport, DomainError> {
        let document = self.get_required(id).await?;
        let job = match document.current_job_id() {
            Some(job_id) => self.stores.queue.get(job_id).await?,
            None => None,
        };

        Ok(DocumentStatusReport { document, job })
    }

    /// Polls until the document is PROCESSED or FAILED
    pub async fn wait_until_settled(
        &self,
        id: &DocumentId,
        timeout: Duration,
    ) -> Result<Document, DomainError> {
        let poll = async {
            loop {
                let document = self.get_required(id).await?;
                if document.status().is_settled() {
                    return Ok(document);
                }
                tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            DomainError::internal(format!(
                "document {} did not settle within {:?}",
                id, timeout
            ))
        })?
    }

    /// Product rows of an uploaded `.xlsx` catalog
    pub async fn load_product_catalog(&self, id: &DocumentId) -> Result<ProductCatalog, DomainError> {
        let document = self.get_required(id).await?;
        let bytes = self
            .retry
            .run("object store download", || {
                self.stores
                    .object_store
                    .get_object(&self.bucket, document.storage_object_path())
            })
            .await?;

        load_product_catalog(&bytes)
    }

    async fn purge_chunks(&self, document: &Document) -> Result<(), DomainError> {
        let id = document.id();

        let lexical = self
            .retry
            .run("lexical delete", || {
                self.stores.lexical.delete(document.knowledge_base_id(), id)
            })
            .await?;
        let vectors = self
            .retry
            .run("vector delete", || {
                self.stores
                    .vector
                    .delete_by_document(&self.vector_collection, id)
            })
            .await?;
        let rows = purge_chunk_rows(self.stores.chunks.as_ref(), id).await?;

        info!(document_id = %id, lexical, vectors, rows, "Chunks purged");
        Ok(())
    }
}
