//! HTML parser built on `scraper`

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::domain::ingestion::{DocumentMetadata, DocumentParser, ParsedDocument, ParserInput};
use crate::domain::DomainError;

const SKIPPED: &[&str] = &["script", "style", "noscript", "head", "template"];
const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "h1", "h2", "h3", "h4", "h5", "h6",
    "li", "tr", "table", "ul", "ol", "pre", "blockquote",
];

#[derive(Debug, Clone, Default)]
pub struct HtmlParser;

impl HtmlParser {
    pub fn new() -> Self {
        Self
    }

    fn title(document: &Html) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    }

    fn collect(element: ElementRef<'_>, blocks: &mut Vec<String>, current: &mut String) {
        for node in element.children() {
            if let Some(child) = ElementRef::wrap(node) {
                let tag = child.value().name();
                if SKIPPED.contains(&tag) {
                    continue;
                }
                if tag == "br" {
                    current.push('\n');
                    continue;
                }

                let block = BLOCKS.contains(&tag);
                if block {
                    Self::push_block(blocks, current);
                }
                Self::collect(child, blocks, current);
                if block {
                    Self::push_block(blocks, current);
                }
            } else if let Some(text) = node.value().as_text() {
                current.push_str(text);
            }
        }
    }

    fn push_block(blocks: &mut Vec<String>, current: &mut String) {
        let block = current
            .lines()
            .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !block.is_empty() {
            blocks.push(block);
        }
        current.clear();
    }

    fn text(document: &Html) -> String {
        let root = Selector::parse("body")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .unwrap_or_else(|| document.root_element());

        let mut blocks = Vec::new();
        let mut current = String::new();
        Self::collect(root, &mut blocks, &mut current);
        Self::push_block(&mut blocks, &mut current);
        blocks.join("\n\n")
    }
}

#[async_trait]
impl DocumentParser for HtmlParser {
    fn supported_extensions(&self) -> &[&str] {
        &["html", "htm"]
    }

    async fn parse(&self, input: ParserInput) -> Result<ParsedDocument, DomainError> {
        let raw = input.content.as_text()?;
        // `Html` is not Send, keep it out of any await
        let (content, title) = {
            let document = Html::parse_document(&raw);
            (Self::text(&document), Self::title(&document))
        };

        let mut metadata = DocumentMetadata::new().with_mime_type("text/html");
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
    async fn test_parse_blocks_and_title() {
        let parser = HtmlParser::new();
        let html = r#"
            <html>
            <head><title>Store FAQ</title><style>p { color: red; }</style></head>
            <body>
                <h1>Delivery</h1>
                <p>Parcels   arrive within
                   five days.</p>
                <script>var tracking = 'hidden';</script>
                <ul><li>Express</li><li>Standard</li></ul>
            </body>
            </html>
        "#;

        let parsed = parser.parse(ParserInput::from_text(html)).await.unwrap();

        assert_eq!(parsed.metadata.title.as_deref(), Some("Store FAQ"));
        assert_eq!(
            parsed.content,
            "Delivery\n\nParcels arrive within\nfive days.\n\nExpress\n\nStandard"
        );
        assert!(!parsed.content.contains("hidden"));
        assert!(!parsed.content.contains("color"));
    }

    #[tokio::test]
    async fn test_parse_fragment_without_body() {
        let parser = HtmlParser::new();
        let parsed = parser
            .parse(ParserInput::from_text("<p>one</p><p>two</p>"))
            .await
            .unwrap();

        assert_eq!(parsed.content, "one\n\ntwo");
    }
}
