use std::fmt;

use thiserror::Error;

/// Knowledge base graph rule that a mutation would break
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphViolation {
    /// Target already has a parent under the single-parent policy
    AlreadyInheriting,
    /// Target already lists the source as a parent
    AlreadyRelated,
    /// The new edge would close a cycle
    CycleDetected,
    /// A knowledge base cannot inherit from itself
    SelfReference,
}

impl fmt::Display for GraphViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInheriting => write!(f, "target already inherits from a knowledge base"),
            Self::AlreadyRelated => write!(f, "target already lists source as a parent"),
            Self::CycleDetected => write!(f, "inheritance would introduce a cycle"),
            Self::SelfReference => write!(f, "knowledge base cannot inherit from itself"),
        }
    }
}

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid ID format: {message}")]
    InvalidId { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Unsupported format: '{extension}'")]
    UnsupportedFormat { extension: String },

    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("Index inconsistency for document {document_id}: {message}")]
    IndexInconsistency {
        document_id: String,
        message: String,
    },

    #[error("Graph invariant violation: {0}")]
    GraphInvariant(GraphViolation),

    #[error("Invalid scope: at least one knowledge base id is required")]
    InvalidScope,

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid state transition: {message}")]
    InvalidTransition { message: String },

    #[error("Cancelled: {message}")]
    Cancelled { message: String },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn unsupported_format(extension: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            extension: extension.into(),
        }
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn index_inconsistency(document_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IndexInconsistency {
            document_id: document_id.into(),
            message: message.into(),
        }
    }

    pub fn graph(violation: GraphViolation) -> Self {
        Self::GraphInvariant(violation)
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition {
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Whether a call that failed with this error may be attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService { .. } | Self::Storage { .. })
    }

    pub fn graph_violation(&self) -> Option<GraphViolation> {
        match self {
            Self::GraphInvariant(v) => Some(*v),
            _ => None,
        }
    }
}
