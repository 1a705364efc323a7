//! Comma-separated values parser (`.csv`)
//!
//! Each record becomes one line with its cells joined by ` | `, the same
//! rendering spreadsheet rows get, so cells never run together and line
//! based chunking keeps records whole. Quoted fields may hold separators,
//! doubled quotes and line breaks.

use async_trait::async_trait;

use crate::domain::ingestion::{DocumentMetadata, DocumentParser, ParsedDocument, ParserInput};
use crate::domain::DomainError;

const CELL_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Default)]
pub struct CsvParser;

impl CsvParser {
    pub fn new() -> Self {
        Self
    }

    /// Splits `text` into records of unquoted, untrimmed fields
    fn records(text: &str) -> Result<Vec<Vec<String>>, DomainError> {
        let mut records = Vec::new();
        let mut record = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            if quoted {
                match c {
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    '"' => quoted = false,
                    _ => field.push(c),
                }
                continue;
            }

            match c {
                '"' if field.is_empty() => quoted = true,
                ',' => record.push(std::mem::take(&mut field)),
                '\r' if chars.peek() == Some(&'\n') => {}
                '\n' => {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                _ => field.push(c),
            }
        }

        if quoted {
            return Err(DomainError::validation("Invalid CSV: unterminated quoted field"));
        }
        if !field.is_empty() || !record.is_empty() {
            record.push(field);
            records.push(record);
        }

        Ok(records)
    }

    fn render(records: &[Vec<String>]) -> String {
        records
            .iter()
            .map(|record| {
                record
                    .iter()
                    // Line breaks inside a cell would split the record
                    .map(|cell| cell.split_whitespace().collect::<Vec<_>>().join(" "))
                    .filter(|cell| !cell.is_empty())
                    .collect::<Vec<_>>()
                    .join(CELL_SEPARATOR)
            })
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl DocumentParser for CsvParser {
    fn supported_extensions(&self) -> &[&str] {
        &["csv"]
    }

    async fn parse(&self, input: ParserInput) -> Result<ParsedDocument, DomainError> {
        let raw = input.content.as_text()?;
        let records = Self::records(raw.trim_start_matches('\u{feff}'))?;

        let mut metadata = DocumentMetadata::new().with_mime_type("text/csv");
        if let Some(filename) = input.filename {
            metadata = metadata.with_source(filename);
        }

        Ok(ParsedDocument::new(Self::render(&records), metadata))
    }
}
