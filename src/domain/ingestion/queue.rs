//! Job queue collaborator

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::job::{IngestionJob, JobId, JobState};
use crate::domain::document::DocumentId;
use crate::domain::DomainError;

/// What a worker needs to run one ingestion attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub document_id: DocumentId,
}

impl JobPayload {
    pub fn new(document_id: DocumentId) -> Self {
        Self { document_id }
    }
}

/// Accepted progress update, published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub document_id: DocumentId,
    pub percent: u8,
}

/// Queue-implementation-agnostic job primitives used by the pipeline
#[async_trait]
pub trait JobQueue: Send + Sync + Debug {
    async fn enqueue(&self, payload: JobPayload) -> Result<JobId, DomainError>;

    /// Progress never moves backwards; stale values are dropped silently
    async fn report_progress(&self, job_id: &JobId, percent: u8) -> Result<(), DomainError>;

    async fn get_state(&self, job_id: &JobId) -> Result<JobState, DomainError>;

    async fn get(&self, job_id: &JobId) -> Result<Option<IngestionJob>, DomainError>;

    /// Moves the job to `state`; `error` is recorded when the state is `Failed`
    async fn update_state(
        &self,
        job_id: &JobId,
        state: JobState,
        error: Option<String>,
    ) -> Result<IngestionJob, DomainError>;

    /// Returns false when the job had already finished
    async fn cancel(&self, job_id: &JobId) -> Result<bool, DomainError>;

    fn subscribe(&self) -> broadcast::Receiver<ProgressEvent>;
}
