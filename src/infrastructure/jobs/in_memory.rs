//! Process-local job queue
//!
//! Job records live in a map; dispatch goes through an unbounded channel
//! whose receiving end is handed to exactly one worker.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::debug;

use crate::domain::ingestion::{IngestionJob, JobId, JobPayload, JobQueue, JobState, ProgressEvent};
use crate::domain::DomainError;

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// A dispatched job as the worker receives it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub payload: JobPayload,
}

#[derive(Debug)]
pub struct InMemoryJobQueue {
    jobs: RwLock<HashMap<JobId, IngestionJob>>,
    sender: mpsc::UnboundedSender<QueuedJob>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<QueuedJob>>>,
    progress: broadcast::Sender<ProgressEvent>,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (progress, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);

        Self {
            jobs: RwLock::new(HashMap::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
            progress,
        }
    }

    /// Dispatch stream for the worker; `None` once taken
    pub async fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<QueuedJob>> {
        self.receiver.lock().await.take()
    }

    fn missing(job_id: &JobId) -> DomainError {
        DomainError::not_found(format!("Job '{}' not found", job_id))
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, payload: JobPayload) -> Result<JobId, DomainError> {
        let job = IngestionJob::new(payload.document_id.clone());
        let job_id = job.id().clone();

        self.jobs.write().await.insert(job_id.clone(), job);

        self.sender
            .send(QueuedJob {
                job_id: job_id.clone(),
                payload,
            })
            .map_err(|_| DomainError::internal("Job queue is closed"))?;

        debug!(job_id = %job_id, "Job enqueued");
        Ok(job_id)
    }

    async fn report_progress(&self, job_id: &JobId, percent: u8) -> Result<(), DomainError> {
        let event = {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get_mut(job_id).ok_or_else(|| Self::missing(job_id))?;

            if !job.advance_progress(percent) {
                return Ok(());
            }

            ProgressEvent {
                job_id: job_id.clone(),
                document_id: job.document_id().clone(),
                percent: job.progress_percent(),
            }
        };

        // No subscribers is fine
        let _ = self.progress.send(event);
        Ok(())
    }

    async fn get_state(&self, job_id: &JobId) -> Result<JobState, DomainError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|job| job.state())
            .ok_or_else(|| Self::missing(job_id))
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<IngestionJob>, DomainError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn update_state(
        &self,
        job_id: &JobId,
        state: JobState,
        error: Option<String>,
    ) -> Result<IngestionJob, DomainError> {
        let (job, completed) = {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get_mut(job_id).ok_or_else(|| Self::missing(job_id))?;
            let before = job.progress_percent();

            match state {
                JobState::Queued => {
                    return Err(DomainError::invalid_transition(format!(
                        "job {} cannot return to QUEUED",
                        job_id
                    )));
                }
                JobState::Running => job.mark_running()?,
                JobState::Succeeded => job.mark_succeeded()?,
                JobState::Failed => job.mark_failed(error.unwrap_or_default())?,
                JobState::Cancelled => job.mark_cancelled()?,
            }

            let completed = job.progress_percent() != before;
            (job.clone(), completed)
        };

        if completed {
            let _ = self.progress.send(ProgressEvent {
                job_id: job_id.clone(),
                document_id: job.document_id().clone(),
                percent: job.progress_percent(),
            });
        }

        Ok(job)
    }

    async fn cancel(&self, job_id: &JobId) -> Result<bool, DomainError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| Self::missing(job_id))?;

        if job.state().is_terminal() {
            return Ok(false);
        }

        job.mark_cancelled()?;
        debug!(job_id = %job_id, "Job cancelled");
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::DocumentId;

    fn payload() -> JobPayload {
        JobPayload::new(DocumentId::generate())
    }

    #[tokio::test]
    async fn test_enqueue_dispatches_once() {
        let queue = InMemoryJobQueue::new();
        let mut receiver = queue.take_receiver().await.unwrap();
        assert!(queue.take_receiver().await.is_none());

        let job_id = queue.enqueue(payload()).await.unwrap();

        let dispatched = receiver.recv().await.unwrap();
        assert_eq!(dispatched.job_id, job_id);
        assert_eq!(queue.get_state(&job_id).await.unwrap(), JobState::Queued);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_published() {
        let queue = InMemoryJobQueue::new();
        let mut events = queue.subscribe();
        let job_id = queue.enqueue(payload()).await.unwrap();
        queue
            .update_state(&job_id, JobState::Running, None)
            .await
            .unwrap();

        queue.report_progress(&job_id, 20).await.unwrap();
        queue.report_progress(&job_id, 10).await.unwrap();
        queue.report_progress(&job_id, 40).await.unwrap();
        queue
            .update_state(&job_id, JobState::Succeeded, None)
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event.percent);
        }
        assert_eq!(seen, vec![20, 40, 100]);
        assert_eq!(queue.get(&job_id).await.unwrap().unwrap().progress_percent(), 100);
    }

    #[tokio::test]
    async fn test_cancel_only_unfinished_jobs() {
        let queue = InMemoryJobQueue::new();
        let queued = queue.enqueue(payload()).await.unwrap();
        let done = queue.enqueue(payload()).await.unwrap();
        queue.update_state(&done, JobState::Running, None).await.unwrap();
        queue.update_state(&done, JobState::Succeeded, None).await.unwrap();

        assert!(queue.cancel(&queued).await.unwrap());
        assert_eq!(queue.get_state(&queued).await.unwrap(), JobState::Cancelled);
        assert!(!queue.cancel(&done).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_records_error() {
        let queue = InMemoryJobQueue::new();
        let job_id = queue.enqueue(payload()).await.unwrap();
        queue.update_state(&job_id, JobState::Running, None).await.unwrap();

        let job = queue
            .update_state(&job_id, JobState::Failed, Some("parser exploded".into()))
            .await
            .unwrap();

        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.last_error(), Some("parser exploded"));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let queue = InMemoryJobQueue::new();
        let missing = JobId::generate();

        assert!(queue.get(&missing).await.unwrap().is_none());
        assert!(matches!(
            queue.get_state(&missing).await,
            Err(DomainError::NotFound { .. })
        ));
    }
}
