//! Background worker draining the job queue

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::pipeline::IngestionPipeline;
use crate::infrastructure::jobs::QueuedJob;

/// Runs dispatched jobs through the pipeline, at most `max_concurrent_jobs`
/// at a time
#[derive(Debug, Clone)]
pub struct IngestionWorker {
    pipeline: Arc<IngestionPipeline>,
    permits: Arc<Semaphore>,
}

impl IngestionWorker {
    pub fn new(pipeline: Arc<IngestionPipeline>, max_concurrent_jobs: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    pub fn spawn(
        self,
        receiver: mpsc::UnboundedReceiver<QueuedJob>,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver, shutdown))
    }

    /// Returns when the queue closes or shutdown is signalled. Jobs already
    /// started keep running on their own tasks.
    pub async fn run(
        self,
        mut receiver: mpsc::UnboundedReceiver<QueuedJob>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            max_concurrent_jobs = self.permits.available_permits(),
            "Ingestion worker started"
        );

        loop {
            let job = tokio::select! {
                job = receiver.recv() => job,
                _ = shutdown.recv() => {
                    info!("Ingestion worker shutting down");
                    break;
                }
            };

            let Some(job) = job else {
                debug!("Job queue closed");
                break;
            };

            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    warn!(error = %e, "Worker semaphore closed");
                    break;
                }
            };

            let pipeline = self.pipeline.clone();
            tokio::spawn(async move {
                pipeline.run(&job.job_id, &job.payload.document_id).await;
                drop(permit);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::document::{Chunk, Document, DocumentStatus};
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::ingestion::{
        object_key, ChunkingConfig, ChunkingType, JobPayload, JobQueue, MockContextualizer,
    };
    use crate::domain::knowledge_base::KnowledgeBaseId;
    use crate::domain::object_store::ObjectStore;
    use crate::domain::retry::RetryPolicy;
    use crate::domain::storage::Storage;
    use crate::infrastructure::ingestion::chunkers::ChunkSplitter;
    use crate::infrastructure::ingestion::pipeline::{PipelineSettings, PipelineStores};
    use crate::infrastructure::jobs::InMemoryJobQueue;
    use crate::infrastructure::locks::KeyedLocks;
    use crate::infrastructure::object_store::InMemoryObjectStore;
    use crate::infrastructure::search::{InMemoryLexicalIndex, InMemoryVectorIndex};
    use crate::infrastructure::storage::InMemoryStorage;

    #[tokio::test]
    async fn test_worker_processes_queued_documents() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let object_store = Arc::new(InMemoryObjectStore::new());
        let documents = Arc::new(InMemoryStorage::<Document>::new());
        let stores = PipelineStores {
            documents: documents.clone(),
            chunks: Arc::new(InMemoryStorage::<Chunk>::new()),
            object_store: object_store.clone(),
            lexical: Arc::new(InMemoryLexicalIndex::new()),
            vector: Arc::new(InMemoryVectorIndex::default()),
            queue: queue.clone(),
            document_locks: Arc::new(KeyedLocks::new()),
        };
        let pipeline = IngestionPipeline::new(
            stores,
            ChunkSplitter::new(ChunkingType::Recursive, ChunkingConfig::new(80, 0)).unwrap(),
            Arc::new(MockContextualizer::new()),
            Arc::new(MockEmbeddingProvider::new("mock", 16)),
            RetryPolicy::none(),
            PipelineSettings::default(),
        );

        let kb = KnowledgeBaseId::new("kb1").unwrap();
        let mut ids = Vec::new();
        for name in ["a.txt", "b.md", "c.txt"] {
            let key = object_key(&kb, name);
            object_store
                .put_object("uploads", &key, format!("Contents of {}", name).into_bytes().into())
                .await
                .unwrap();
            let mut doc = Document::new(kb.clone(), name, key, 16);
            let job_id = queue.enqueue(JobPayload::new(doc.id().clone())).await.unwrap();
            doc.mark_processing().unwrap();
            doc.attach_job(job_id);
            ids.push(documents.create(doc).await.unwrap().id().clone());
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let receiver = queue.take_receiver().await.unwrap();
        let handle = IngestionWorker::new(Arc::new(pipeline), 2).spawn(receiver, shutdown_rx);

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let mut settled = 0;
                for id in &ids {
                    if documents.get_required(id).await.unwrap().status().is_settled() {
                        settled += 1;
                    }
                }
                if settled == ids.len() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        for id in &ids {
            assert_eq!(
                documents.get_required(id).await.unwrap().status(),
                DocumentStatus::Processed
            );
        }

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
