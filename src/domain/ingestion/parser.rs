//! Document parser trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::domain::DomainError;

/// Raw file content handed to a parser
#[derive(Debug, Clone)]
pub enum ParserContent {
    Text(String),
    Bytes(Vec<u8>),
}

impl ParserContent {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn bytes(content: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(content.into())
    }

    pub fn as_text(&self) -> Result<String, DomainError> {
        match self {
            Self::Text(s) => Ok(s.clone()),
            Self::Bytes(b) => String::from_utf8(b.clone())
                .map_err(|e| DomainError::validation(format!("Invalid UTF-8: {}", e))),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Bytes(b) => b,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParserInput {
    pub content: ParserContent,
    pub filename: Option<String>,
}

impl ParserInput {
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            content: ParserContent::text(content),
            filename: None,
        }
    }

    pub fn from_bytes(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: ParserContent::bytes(content),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl DocumentMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Plain text extracted from a file
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl ParsedDocument {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Format-specific text extractor, selected by file extension
#[async_trait]
pub trait DocumentParser: Send + Sync + Debug {
    /// Lower-case extensions without the dot
    fn supported_extensions(&self) -> &[&str];

    async fn parse(&self, input: ParserInput) -> Result<ParsedDocument, DomainError>;

    fn supports_file(&self, filename: &str) -> bool {
        std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_lowercase();
                self.supported_extensions().iter().any(|s| *s == e)
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_content_as_text() {
        assert_eq!(ParserContent::text("hello").as_text().unwrap(), "hello");
        assert_eq!(
            ParserContent::bytes(b"bytes".to_vec()).as_text().unwrap(),
            "bytes"
        );
        assert!(ParserContent::bytes(vec![0xff, 0xfe]).as_text().is_err());
    }

    #[test]
    fn test_parsed_document_is_empty() {
        assert!(ParsedDocument::new("  \n ", DocumentMetadata::new()).is_empty());
        assert!(!ParsedDocument::new("text", DocumentMetadata::new()).is_empty());
    }
}
