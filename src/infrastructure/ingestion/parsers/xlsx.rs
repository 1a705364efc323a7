//! Spreadsheet (`.xlsx`) parser and product catalog loading
//!
//! A workbook with a sheet whose name contains "product" is a product
//! catalog: it is not chunked, its rows back the product search tool.

use async_trait::async_trait;

use super::ooxml::{self, Sheet};
use crate::domain::ingestion::{DocumentMetadata, DocumentParser, ParsedDocument, ParserInput};
use crate::domain::product::{Product, ProductCatalog};
use crate::domain::DomainError;

const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const CATALOG_MARKER: &str = "product";

fn is_catalog_sheet(name: &str) -> bool {
    name.to_lowercase().contains(CATALOG_MARKER)
}

/// Checks sheet names only; cell data is not read
pub fn is_product_catalog(bytes: &[u8]) -> Result<bool, DomainError> {
    let mut package = ooxml::open(bytes)?;
    let sheets = ooxml::workbook_sheets(&mut package)?;
    Ok(sheets.iter().any(|(name, _)| is_catalog_sheet(name)))
}

/// Rows of the first product sheet. Columns are found by header
/// (`name`, `price`, `description`, `url`) and default to that order.
pub fn load_product_catalog(bytes: &[u8]) -> Result<ProductCatalog, DomainError> {
    let sheet = ooxml::read_sheets(bytes)?
        .into_iter()
        .find(|s| is_catalog_sheet(&s.name))
        .ok_or_else(|| DomainError::validation("Workbook has no product sheet"))?;

    let Some((header, rows)) = sheet.rows.split_first() else {
        return Ok(ProductCatalog::new(Vec::new()));
    };

    let column = |label: &str, fallback: usize| {
        header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(label))
            .unwrap_or(fallback)
    };
    let (name, price, description, url) = (
        column("name", 0),
        column("price", 1),
        column("description", 2),
        column("url", 3),
    );
    let cell = |row: &[String], idx: usize| row.get(idx).cloned().unwrap_or_default();

    let products = rows
        .iter()
        .filter(|row| !cell(row.as_slice(), name).trim().is_empty())
        .map(|row| Product {
            name: cell(row.as_slice(), name),
            price: cell(row.as_slice(), price),
            description: cell(row.as_slice(), description),
            url: cell(row.as_slice(), url),
        })
        .collect();

    Ok(ProductCatalog::new(products))
}

#[derive(Debug, Clone, Default)]
pub struct XlsxParser;

impl XlsxParser {
    pub fn new() -> Self {
        Self
    }

    fn render(sheets: &[Sheet]) -> String {
        sheets
            .iter()
            .filter(|s| !s.rows.is_empty())
            .map(|s| {
                let rows: Vec<String> = s
                    .rows
                    .iter()
                    .map(|r| {
                        r.iter()
                            .map(|c| c.trim())
                            .filter(|c| !c.is_empty())
                            .collect::<Vec<_>>()
                            .join(" | ")
                    })
                    .collect();
                format!("{}\n{}", s.name, rows.join("\n"))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
impl DocumentParser for XlsxParser {
    fn supported_extensions(&self) -> &[&str] {
        &["xlsx"]
    }

    async fn parse(&self, input: ParserInput) -> Result<ParsedDocument, DomainError> {
        let sheets = ooxml::read_sheets(input.content.as_bytes())?;

        let mut metadata = DocumentMetadata::new().with_mime_type(MIME_XLSX);
        if let Some(filename) = input.filename {
            metadata = metadata.with_source(filename);
        }

        Ok(ParsedDocument::new(Self::render(&sheets), metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ingestion::parsers::ooxml::fixtures;

    fn catalog_bytes() -> Vec<u8> {
        fixtures::xlsx(&[
            ("notes", vec![vec!["internal"]]),
            (
                "Products",
                vec![
                    vec!["url", "name", "price", "description"],
                    vec!["https://shop/p1", "Blue Kettle", "25", "1.7l steel kettle"],
                    vec!["https://shop/p2", "", "10", "nameless row"],
                    vec!["https://shop/p3", "Red Toaster", "40", "two slots"],
                ],
            ),
        ])
    }

    #[test]
    fn test_detects_catalog_by_sheet_name() {
        assert!(is_product_catalog(&catalog_bytes()).unwrap());

        let plain = fixtures::xlsx(&[("Budget", vec![vec!["q1", "100"]])]);
        assert!(!is_product_catalog(&plain).unwrap());
    }

    #[test]
    fn test_load_catalog_maps_columns_by_header() {
        let catalog = load_product_catalog(&catalog_bytes()).unwrap();

        assert_eq!(catalog.len(), 2);
        let kettle = &catalog.products()[0];
        assert_eq!(kettle.name, "Blue Kettle");
        assert_eq!(kettle.price, "25");
        assert_eq!(kettle.description, "1.7l steel kettle");
        assert_eq!(kettle.url, "https://shop/p1");
    }

    #[test]
    fn test_load_catalog_without_product_sheet() {
        let plain = fixtures::xlsx(&[("Budget", vec![vec!["q1", "100"]])]);
        assert!(load_product_catalog(&plain).is_err());
    }

    #[tokio::test]
    async fn test_parse_renders_rows() {
        let bytes = fixtures::xlsx(&[("Budget", vec![vec!["quarter", "spend"], vec!["q1", "100"]])]);

        let parsed = XlsxParser::new()
            .parse(ParserInput::from_bytes(bytes))
            .await
            .unwrap();

        assert_eq!(parsed.content, "Budget\nquarter | spend\nq1 | 100");
    }
}
