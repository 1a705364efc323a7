//! JSON parser: flattens values into `path: value` lines so keys stay searchable

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::ingestion::{DocumentMetadata, DocumentParser, ParsedDocument, ParserInput};
use crate::domain::DomainError;

#[derive(Debug, Clone, Default)]
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        Self
    }

    fn flatten(prefix: &str, value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten(&path, child, out);
                }
            }
            Value::Array(items) => {
                for (idx, child) in items.iter().enumerate() {
                    Self::flatten(&format!("{}[{}]", prefix, idx), child, out);
                }
            }
            Value::Null => {}
            Value::String(s) if prefix.is_empty() => out.push(s.clone()),
            Value::String(s) => out.push(format!("{}: {}", prefix, s)),
            other if prefix.is_empty() => out.push(other.to_string()),
            other => out.push(format!("{}: {}", prefix, other)),
        }
    }
}

#[async_trait]
impl DocumentParser for JsonParser {
    fn supported_extensions(&self) -> &[&str] {
        &["json"]
    }

    async fn parse(&self, input: ParserInput) -> Result<ParsedDocument, DomainError> {
        let raw = input.content.as_text()?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| DomainError::validation(format!("Invalid JSON: {}", e)))?;

        let mut lines = Vec::new();
        Self::flatten("", &value, &mut lines);

        let mut metadata = DocumentMetadata::new().with_mime_type("application/json");
        if let Some(filename) = input.filename {
            metadata = metadata.with_source(filename);
        }

        Ok(ParsedDocument::new(lines.join("\n"), metadata))
    }
}
