//! Document entity and its processing status

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ingestion::JobId;
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::storage::{StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Document identifier, `doc-{uuid}` when generated
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();

        if id.trim().is_empty() {
            return Err(DomainError::invalid_id("Document ID cannot be empty"));
        }

        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(format!("doc-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for DocumentId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Processing status of an uploaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    #[default]
    Uploaded,
    Processing,
    Processed,
    Failed,
}

impl DocumentStatus {
    /// Forward-only transitions; `Failed -> Uploaded` is reserved for retry.
    pub fn can_transition_to(&self, target: DocumentStatus) -> bool {
        matches!(
            (self, target),
            (Self::Uploaded, Self::Processing)
                | (Self::Processing, Self::Processed)
                | (Self::Processing, Self::Failed)
                | (Self::Failed, Self::Uploaded)
        )
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uploaded => write!(f, "UPLOADED"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Processed => write!(f, "PROCESSED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One uploaded file, owned by exactly one knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    knowledge_base_id: KnowledgeBaseId,
    file_name: String,
    storage_object_path: String,
    status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_job_id: Option<JobId>,
    file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        knowledge_base_id: KnowledgeBaseId,
        file_name: impl Into<String>,
        storage_object_path: impl Into<String>,
        file_size: u64,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: DocumentId::generate(),
            knowledge_base_id,
            file_name: file_name.into(),
            storage_object_path: storage_object_path.into(),
            status: DocumentStatus::Uploaded,
            current_job_id: None,
            file_size,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn knowledge_base_id(&self) -> &KnowledgeBaseId {
        &self.knowledge_base_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Lower-cased extension of the file name, without the dot
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    pub fn storage_object_path(&self) -> &str {
        &self.storage_object_path
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    pub fn current_job_id(&self) -> Option<&JobId> {
        self.current_job_id.as_ref()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn transition(&mut self, target: DocumentStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(target) {
            return Err(DomainError::invalid_transition(format!(
                "document {} cannot move from {} to {}",
                self.id, self.status, target
            )));
        }

        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_processing(&mut self) -> Result<(), DomainError> {
        self.transition(DocumentStatus::Processing)?;
        self.last_error = None;
        Ok(())
    }

    pub fn attach_job(&mut self, job_id: JobId) {
        self.current_job_id = Some(job_id);
        self.updated_at = Utc::now();
    }

    pub fn mark_processed(&mut self) -> Result<(), DomainError> {
        self.transition(DocumentStatus::Processed)
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), DomainError> {
        self.transition(DocumentStatus::Failed)?;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Return a failed document to `Uploaded` once its chunks are purged
    pub fn reset_for_retry(&mut self) -> Result<(), DomainError> {
        self.transition(DocumentStatus::Uploaded)?;
        self.current_job_id = None;
        self.last_error = None;
        Ok(())
    }

    pub fn reassign(&mut self, knowledge_base_id: KnowledgeBaseId) {
        self.knowledge_base_id = knowledge_base_id;
        self.updated_at = Utc::now();
    }
}

impl StorageEntity for Document {
    type Key = DocumentId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}
