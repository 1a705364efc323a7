//! Markdown parser
//!
//! Renders the event stream into plain text with one block per paragraph,
//! heading, list or code fence. Blocks are separated by a blank line so the
//! splitters can use them as natural break points.

use async_trait::async_trait;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag};

use crate::domain::ingestion::{DocumentMetadata, DocumentParser, ParsedDocument, ParserInput};
use crate::domain::DomainError;

#[derive(Debug, Clone, Default)]
pub struct MarkdownParser;

#[derive(Default)]
struct BlockWriter {
    blocks: Vec<String>,
    current: String,
    title: Option<String>,
    in_h1: bool,
    list_depth: usize,
}

impl BlockWriter {
    fn flush(&mut self) {
        let block = self.current.trim();
        if !block.is_empty() {
            self.blocks.push(block.to_string());
        }
        self.current.clear();
    }

    fn newline(&mut self) {
        if !self.current.is_empty() && !self.current.ends_with('\n') {
            self.current.push('\n');
        }
    }

    fn finish(mut self) -> (String, Option<String>) {
        self.flush();
        (self.blocks.join("\n\n"), self.title)
    }
}

impl MarkdownParser {
    pub fn new() -> Self {
        Self
    }

    fn render(markdown: &str) -> (String, Option<String>) {
        let mut w = BlockWriter::default();

        for event in Parser::new(markdown) {
            match event {
                Event::Start(Tag::Heading(level, ..)) => {
                    w.flush();
                    w.in_h1 = level == HeadingLevel::H1 && w.title.is_none();
                }
                Event::End(Tag::Heading(..)) => {
                    if w.in_h1 {
                        w.title = Some(w.current.trim().to_string());
                        w.in_h1 = false;
                    }
                    w.flush();
                }
                Event::Start(Tag::Paragraph) if w.list_depth == 0 => w.flush(),
                Event::End(Tag::Paragraph) if w.list_depth == 0 => w.flush(),
                Event::Start(Tag::List(_)) => {
                    if w.list_depth == 0 {
                        w.flush();
                    }
                    w.list_depth += 1;
                }
                Event::End(Tag::List(_)) => {
                    w.list_depth = w.list_depth.saturating_sub(1);
                    if w.list_depth == 0 {
                        w.flush();
                    }
                }
                Event::Start(Tag::Item) => {
                    w.newline();
                    w.current.push_str("- ");
                }
                Event::Start(Tag::CodeBlock(_)) => w.flush(),
                Event::End(Tag::CodeBlock(_)) => w.flush(),
                Event::Text(t) | Event::Code(t) => w.current.push_str(&t),
                Event::SoftBreak => w.current.push(' '),
                Event::HardBreak => w.current.push('\n'),
                _ => {}
            }
        }

        w.finish()
    }
}

#[async_trait]
impl DocumentParser for MarkdownParser {
    fn supported_extensions(&self) -> &[&str] {
        &["md", "markdown"]
    }

    async fn parse(&self, input: ParserInput) -> Result<ParsedDocument, DomainError> {
        let raw = input.content.as_text()?;
        let (content, title) = Self::render(&raw);

        let mut metadata = DocumentMetadata::new().with_mime_type("text/markdown");
        if let Some(title) = title {
            metadata = metadata.with_title(title);
        }
        if let Some(filename) = input.filename {
            metadata = metadata.with_source(filename);
        }

        Ok(ParsedDocument::new(content, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocks_are_separated_by_blank_lines() {
        let parser = MarkdownParser::new();
        let md = "# Shipping\n\nWe ship **worldwide**.\nOrders leave in 2 days.\n\n## Returns\n\n- 30 days\n- receipt required";

        let parsed = parser.parse(ParserInput::from_text(md)).await.unwrap();

        assert_eq!(
            parsed.content,
            "Shipping\n\nWe ship worldwide. Orders leave in 2 days.\n\nReturns\n\n- 30 days\n- receipt required"
        );
        assert_eq!(parsed.metadata.title.as_deref(), Some("Shipping"));
    }

    #[tokio::test]
    async fn test_code_blocks_are_kept() {
        let parser = MarkdownParser::new();
        let md = "Run `make`:\n\n```sh\nmake install\n```";

        let parsed = parser.parse(ParserInput::from_text(md)).await.unwrap();

        assert!(parsed.content.contains("Run make:"));
        assert!(parsed.content.contains("make install"));
    }

    #[tokio::test]
    async fn test_title_requires_h1() {
        let parser = MarkdownParser::new();
        let parsed = parser
            .parse(ParserInput::from_text("## Second level\n\nBody"))
            .await
            .unwrap();

        assert!(parsed.metadata.title.is_none());
    }
}
