//! PDF parser backed by `pdf-extract`

use async_trait::async_trait;

use crate::domain::ingestion::{DocumentMetadata, DocumentParser, ParsedDocument, ParserInput};
use crate::domain::DomainError;

#[derive(Debug, Clone, Default)]
pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }

    /// Collapse the extractor's layout whitespace into paragraphs
    fn tidy(raw: &str) -> String {
        let mut paragraphs = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in raw.lines().map(str::trim) {
            if line.is_empty() {
                if !current.is_empty() {
                    paragraphs.push(current.join(" "));
                    current.clear();
                }
            } else {
                current.push(line);
            }
        }
        if !current.is_empty() {
            paragraphs.push(current.join(" "));
        }

        paragraphs.join("\n\n")
    }
}

#[async_trait]
impl DocumentParser for PdfParser {
    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }

    async fn parse(&self, input: ParserInput) -> Result<ParsedDocument, DomainError> {
        let bytes = input.content.as_bytes().to_vec();

        let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| DomainError::internal(format!("PDF extraction task failed: {}", e)))?
            .map_err(|e| DomainError::validation(format!("PDF extraction failed: {}", e)))?;

        let mut metadata = DocumentMetadata::new().with_mime_type("application/pdf");
        if let Some(filename) = input.filename {
            metadata = metadata.with_source(filename);
        }

        Ok(ParsedDocument::new(Self::tidy(&raw), metadata))
    }
}
