//! Validation helpers for ingestion

use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::DomainError;

use super::pipeline::ParserType;

/// Lower-cased extension of a file name, without the dot
pub fn file_extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

pub fn detect_parser_from_filename(filename: &str) -> Option<ParserType> {
    let ext = file_extension(filename)?;

    ParserType::all()
        .into_iter()
        .find(|p| p.extensions().contains(&ext.as_str()))
}

/// Like [`detect_parser_from_filename`] but fails with `UnsupportedFormat`
pub fn require_parser_for(filename: &str) -> Result<ParserType, DomainError> {
    detect_parser_from_filename(filename).ok_or_else(|| {
        DomainError::unsupported_format(file_extension(filename).unwrap_or_default())
    })
}

/// Object storage key for an uploaded file: `{knowledge_base_id}/{file_name}`
pub fn object_key(knowledge_base_id: &KnowledgeBaseId, file_name: &str) -> String {
    format!("{}/{}", knowledge_base_id, file_name)
}

/// File names become object keys, so path separators are rejected
pub fn validate_file_name(file_name: &str) -> Result<(), DomainError> {
    if file_name.trim().is_empty() {
        return Err(DomainError::validation("File name cannot be empty"));
    }

    if file_name.len() > 255 {
        return Err(DomainError::validation(
            "File name cannot exceed 255 characters",
        ));
    }

    if file_name.contains('/') || file_name.contains('\\') || file_name == ".." {
        return Err(DomainError::validation(format!(
            "File name '{}' must not contain path separators",
            file_name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_parser_from_filename() {
        assert_eq!(detect_parser_from_filename("a.txt"), Some(ParserType::PlainText));
        assert_eq!(detect_parser_from_filename("a.CSV"), Some(ParserType::Csv));
        assert_eq!(detect_parser_from_filename("a.md"), Some(ParserType::Markdown));
        assert_eq!(detect_parser_from_filename("index.HTM"), Some(ParserType::Html));
        assert_eq!(detect_parser_from_filename("data.json"), Some(ParserType::Json));
        assert_eq!(detect_parser_from_filename("paper.pdf"), Some(ParserType::Pdf));
        assert_eq!(detect_parser_from_filename("memo.docx"), Some(ParserType::Docx));
        assert_eq!(detect_parser_from_filename("sheet.xlsx"), Some(ParserType::Xlsx));
        assert_eq!(detect_parser_from_filename("binary.exe"), None);
        assert_eq!(detect_parser_from_filename("README"), None);
    }

    #[test]
    fn test_require_parser_for_unsupported() {
        let err = require_parser_for("slides.pptx").unwrap_err();
        assert!(matches!(
            err,
            DomainError::UnsupportedFormat { ref extension } if extension == "pptx"
        ));
    }

    #[test]
    fn test_object_key() {
        let kb = KnowledgeBaseId::new("kb1").unwrap();
        assert_eq!(object_key(&kb, "guide.pdf"), "kb1/guide.pdf");
    }

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("guide.pdf").is_ok());
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("../etc/passwd").is_err());
        assert!(validate_file_name("a\\b.txt").is_err());
    }
}
