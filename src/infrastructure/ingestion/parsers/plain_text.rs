//! Plain text parser (`.txt`, `.text`)

use async_trait::async_trait;

use crate::domain::ingestion::{DocumentMetadata, DocumentParser, ParsedDocument, ParserInput};
use crate::domain::DomainError;

#[derive(Debug, Clone, Default)]
pub struct PlainTextParser;

impl PlainTextParser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentParser for PlainTextParser {
    fn supported_extensions(&self) -> &[&str] {
        &["txt", "text"]
    }

    async fn parse(&self, input: ParserInput) -> Result<ParsedDocument, DomainError> {
        let raw = input.content.as_text()?;
        // Windows line endings would defeat paragraph detection downstream
        let content = raw.trim_start_matches('\u{feff}').replace("\r\n", "\n");

        let mut metadata = DocumentMetadata::new().with_mime_type("text/plain");
        if let Some(filename) = input.filename {
            metadata = metadata.with_source(filename);
        }

        Ok(ParsedDocument::new(content, metadata))
    }
}
