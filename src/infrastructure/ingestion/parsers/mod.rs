//! Document parser implementations, one per supported format

mod csv;
mod docx;
mod html;
mod json;
mod markdown;
pub(crate) mod ooxml;
mod pdf;
mod plain_text;
mod xlsx;

pub use csv::CsvParser;
pub use docx::DocxParser;
pub use html::HtmlParser;
pub use json::JsonParser;
pub use markdown::MarkdownParser;
pub use pdf::PdfParser;
pub use plain_text::PlainTextParser;
pub use xlsx::{is_product_catalog, load_product_catalog, XlsxParser};
