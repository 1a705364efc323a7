//! Parser selection by file extension

use std::sync::Arc;

use crate::domain::ingestion::{require_parser_for, DocumentParser, ParserType};
use crate::domain::DomainError;

use super::parsers::{
    CsvParser, DocxParser, HtmlParser, JsonParser, MarkdownParser, PdfParser, PlainTextParser,
    XlsxParser,
};

#[derive(Debug, Default)]
pub struct ParserFactory;

impl ParserFactory {
    pub fn create(parser_type: ParserType) -> Arc<dyn DocumentParser> {
        match parser_type {
            ParserType::PlainText => Arc::new(PlainTextParser::new()),
            ParserType::Csv => Arc::new(CsvParser::new()),
            ParserType::Markdown => Arc::new(MarkdownParser::new()),
            ParserType::Html => Arc::new(HtmlParser::new()),
            ParserType::Json => Arc::new(JsonParser::new()),
            ParserType::Pdf => Arc::new(PdfParser::new()),
            ParserType::Docx => Arc::new(DocxParser::new()),
            ParserType::Xlsx => Arc::new(XlsxParser::new()),
        }
    }

    /// Parser for `filename`, or `UnsupportedFormat`
    pub fn for_file(filename: &str) -> Result<Arc<dyn DocumentParser>, DomainError> {
        require_parser_for(filename).map(Self::create)
    }

    pub fn supported_extensions() -> Vec<&'static str> {
        ParserType::all()
            .iter()
            .flat_map(|t| t.extensions().iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_parser_claims_its_extensions() {
        for parser_type in ParserType::all() {
            let parser = ParserFactory::create(parser_type);
            for ext in parser_type.extensions() {
                assert!(
                    parser.supports_file(&format!("file.{}", ext)),
                    "{:?} should accept .{}",
                    parser_type,
                    ext
                );
            }
        }
    }

    #[test]
    fn test_for_file() {
        assert!(ParserFactory::for_file("Report.PDF").is_ok());
        assert!(matches!(
            ParserFactory::for_file("archive.zip"),
            Err(DomainError::UnsupportedFormat { .. })
        ));
        assert!(ParserFactory::for_file("README").is_err());
    }

    #[test]
    fn test_supported_extensions() {
        let exts = ParserFactory::supported_extensions();
        for ext in ["txt", "md", "html", "json", "pdf", "docx", "xlsx"] {
            assert!(exts.contains(&ext));
        }
    }
}
