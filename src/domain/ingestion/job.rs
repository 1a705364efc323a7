//! Ingestion job records

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::document::DocumentId;
use crate::domain::storage::{StorageEntity, StorageKey};
use crate::domain::DomainError;

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^job-[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$").unwrap()
});

/// Validated job identifier: `job-{uuid}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();

        if !ID_PATTERN.is_match(&id) {
            return Err(DomainError::invalid_id(format!(
                "Invalid job ID '{}': must be in format job-{{uuid}}",
                id
            )));
        }

        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(format!("job-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JobId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for JobId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, target: JobState) -> bool {
        match (self, target) {
            (Self::Queued, Self::Running) => true,
            (Self::Queued, Self::Cancelled) => true,

            (Self::Running, Self::Succeeded) => true,
            (Self::Running, Self::Failed) => true,
            (Self::Running, Self::Cancelled) => true,

            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "QUEUED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Queue-side record of one ingestion attempt for a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    id: JobId,
    document_id: DocumentId,
    state: JobState,
    progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

impl IngestionJob {
    pub fn new(document_id: DocumentId) -> Self {
        let now = Utc::now();

        Self {
            id: JobId::generate(),
            document_id,
            state: JobState::Queued,
            progress_percent: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    fn transition(&mut self, target: JobState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(target) {
            return Err(DomainError::invalid_transition(format!(
                "job {} cannot move from {} to {}",
                self.id, self.state, target
            )));
        }

        self.state = target;
        self.updated_at = Utc::now();

        if target.is_terminal() {
            self.finished_at = Some(self.updated_at);
        }

        Ok(())
    }

    pub fn mark_running(&mut self) -> Result<(), DomainError> {
        self.transition(JobState::Running)
    }

    pub fn mark_succeeded(&mut self) -> Result<(), DomainError> {
        self.transition(JobState::Succeeded)?;
        self.progress_percent = 100;
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), DomainError> {
        self.transition(JobState::Failed)?;
        self.last_error = Some(error.into());
        Ok(())
    }

    pub fn mark_cancelled(&mut self) -> Result<(), DomainError> {
        self.transition(JobState::Cancelled)
    }

    /// Records progress; values at or below the current one are ignored.
    /// Returns whether the stored value moved.
    pub fn advance_progress(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);

        if self.state.is_terminal() || percent <= self.progress_percent {
            return false;
        }

        self.progress_percent = percent;
        self.updated_at = Utc::now();
        true
    }
}

impl StorageEntity for IngestionJob {
    type Key = JobId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}
