//! Word (`.docx`) parser

use async_trait::async_trait;

use super::ooxml;
use crate::domain::ingestion::{DocumentMetadata, DocumentParser, ParsedDocument, ParserInput};
use crate::domain::DomainError;

const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Clone, Default)]
pub struct DocxParser;

impl DocxParser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentParser for DocxParser {
    fn supported_extensions(&self) -> &[&str] {
        &["docx"]
    }

    async fn parse(&self, input: ParserInput) -> Result<ParsedDocument, DomainError> {
        let mut package = ooxml::open(input.content.as_bytes())?;
        let xml = ooxml::read_part(&mut package, "word/document.xml")?;
        let paragraphs = ooxml::docx_paragraphs(&xml)?;

        let mut metadata = DocumentMetadata::new().with_mime_type(MIME_DOCX);
        if let Some(filename) = input.filename {
            metadata = metadata.with_source(filename);
        }

        Ok(ParsedDocument::new(paragraphs.join("\n\n"), metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ingestion::parsers::ooxml::fixtures;

    #[tokio::test]
    async fn test_parse_paragraphs() {
        let bytes = fixtures::docx(&["Opening hours", "Mon to Fri &amp; weekends", "  "]);
        let parser = DocxParser::new();

        let parsed = parser
            .parse(ParserInput::from_bytes(bytes).with_filename("hours.docx"))
            .await
            .unwrap();

        assert_eq!(parsed.content, "Opening hours\n\nMon to Fri & weekends");
    }

    #[tokio::test]
    async fn test_parse_requires_document_part() {
        let bytes = fixtures::xlsx(&[("Sheet1", vec![vec!["a"]])]);
        let result = DocxParser::new().parse(ParserInput::from_bytes(bytes)).await;

        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }
}
