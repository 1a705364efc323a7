//! Shared reading of Office Open XML packages (zip + XML parts)

use std::collections::HashMap;
use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::domain::DomainError;

/// Decompressed size limit for a single part
const MAX_PART_BYTES: u64 = 50 * 1024 * 1024;
const MAX_SHEETS: usize = 100;
const MAX_CELLS_PER_SHEET: usize = 100_000;

pub(crate) type Package<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn malformed(message: impl std::fmt::Display) -> DomainError {
    DomainError::validation(format!("Malformed OOXML package: {}", message))
}

pub(crate) fn open(bytes: &[u8]) -> Result<Package<'_>, DomainError> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(malformed)
}

pub(crate) fn read_part(package: &mut Package<'_>, name: &str) -> Result<Vec<u8>, DomainError> {
    let entry = package
        .by_name(name)
        .map_err(|e| malformed(format!("{}: {}", name, e)))?;

    let mut out = Vec::new();
    entry
        .take(MAX_PART_BYTES)
        .read_to_end(&mut out)
        .map_err(malformed)?;

    if out.len() as u64 >= MAX_PART_BYTES {
        return Err(malformed(format!("{} exceeds {} bytes", name, MAX_PART_BYTES)));
    }

    Ok(out)
}

fn attribute(element: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Text of a `word/document.xml` part, one line per `w:p` paragraph
pub(crate) fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, DomainError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(malformed)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) if e.local_name().as_ref() == b"t" => in_text = false,
            Event::Empty(e) if matches!(e.local_name().as_ref(), b"tab") => current.push('\t'),
            Event::Empty(e) if matches!(e.local_name().as_ref(), b"br" | b"cr") => {
                current.push('\n')
            }
            Event::Text(t) if in_text => current.push_str(&t.unescape().map_err(malformed)?),
            Event::End(e) if e.local_name().as_ref() == b"p" => {
                let paragraph = current.trim();
                if !paragraph.is_empty() {
                    paragraphs.push(paragraph.to_string());
                }
                current.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

/// One worksheet as a dense grid of cell strings
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

/// `(sheet name, part path)` in workbook order
pub(crate) fn workbook_sheets(package: &mut Package<'_>) -> Result<Vec<(String, String)>, DomainError> {
    let workbook = read_part(package, "xl/workbook.xml")?;
    let targets = match read_part(package, "xl/_rels/workbook.xml.rels") {
        Ok(rels) => relationship_targets(&rels)?,
        Err(_) => HashMap::new(),
    };

    let mut reader = Reader::from_reader(workbook.as_slice());
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(malformed)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attribute(&e, b"name").unwrap_or_default();
                let position = sheets.len() + 1;
                let path = attribute(&e, b"id")
                    .and_then(|rid| targets.get(&rid).cloned())
                    .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", position));
                sheets.push((name, path));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

fn relationship_targets(xml: &[u8]) -> Result<HashMap<String, String>, DomainError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(malformed)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attribute(&e, b"Id"), attribute(&e, b"Target"))
                {
                    let path = match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", target),
                    };
                    targets.insert(id, path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

fn shared_strings(package: &mut Package<'_>) -> Result<Vec<String>, DomainError> {
    // Workbooks with only numbers have no shared string table
    let Ok(xml) = read_part(package, "xl/sharedStrings.xml") else {
        return Ok(Vec::new());
    };

    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(malformed)? {
            Event::Start(e) if e.local_name().as_ref() == b"si" => current.clear(),
            Event::End(e) if e.local_name().as_ref() == b"si" => {
                strings.push(std::mem::take(&mut current))
            }
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) if e.local_name().as_ref() == b"t" => in_text = false,
            Event::Text(t) if in_text => current.push_str(&t.unescape().map_err(malformed)?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

/// Zero-based column of a cell reference such as `C12`
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let index = letters
        .iter()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize);
    Some(index - 1)
}

fn sheet_rows(xml: &[u8], strings: &[String]) -> Result<Vec<Vec<String>>, DomainError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut column = 0usize;
    let mut cell_type = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut cells = 0usize;

    loop {
        match reader.read_event_into(&mut buf).map_err(malformed)? {
            Event::Start(e) if e.local_name().as_ref() == b"row" => row.clear(),
            Event::End(e) if e.local_name().as_ref() == b"row" => {
                if row.iter().any(|c| !c.trim().is_empty()) {
                    rows.push(std::mem::take(&mut row));
                }
                if cells >= MAX_CELLS_PER_SHEET {
                    break;
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                column = attribute(&e, b"r")
                    .and_then(|r| column_index(&r))
                    .unwrap_or(row.len());
                cell_type = attribute(&e, b"t").unwrap_or_default();
                value.clear();
            }
            Event::End(e) if e.local_name().as_ref() == b"c" => {
                let text = match cell_type.as_str() {
                    "s" => value
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| strings.get(i).cloned())
                        .unwrap_or_default(),
                    _ => value.trim().to_string(),
                };
                if row.len() <= column {
                    row.resize(column + 1, String::new());
                }
                row[column] = text;
                cells += 1;
            }
            Event::Start(e) if matches!(e.local_name().as_ref(), b"v" | b"t") => in_value = true,
            Event::End(e) if matches!(e.local_name().as_ref(), b"v" | b"t") => in_value = false,
            Event::Text(t) if in_value => value.push_str(&t.unescape().map_err(malformed)?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

/// Every worksheet of an `.xlsx` package, in workbook order
pub(crate) fn read_sheets(bytes: &[u8]) -> Result<Vec<Sheet>, DomainError> {
    let mut package = open(bytes)?;
    let strings = shared_strings(&mut package)?;
    let mut sheets = Vec::new();

    for (name, path) in workbook_sheets(&mut package)?.into_iter().take(MAX_SHEETS) {
        let xml = read_part(&mut package, &path)?;
        let rows = sheet_rows(&xml, &strings)?;
        sheets.push(Sheet { name, rows });
    }

    Ok(sheets)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Minimal in-memory OOXML packages for parser tests

    use std::io::Write;

    use zip::write::SimpleFileOptions;

    fn package(parts: &[(&str, String)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, body) in parts {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        package(&[("word/document.xml", xml)])
    }

    /// Workbook whose cells are all shared strings; `sheets` is `(name, rows)`
    pub fn xlsx(sheets: &[(&str, Vec<Vec<&str>>)]) -> Vec<u8> {
        let mut strings: Vec<String> = Vec::new();
        let mut parts = Vec::new();
        let mut sheet_entries = String::new();
        let mut rels = String::new();

        for (n, (name, rows)) in sheets.iter().enumerate() {
            let id = n + 1;
            sheet_entries.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                name, id, id
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="worksheet" Target="worksheets/sheet{}.xml"/>"#,
                id, id
            ));

            let mut data = String::new();
            for (r, row) in rows.iter().enumerate() {
                data.push_str(&format!(r#"<row r="{}">"#, r + 1));
                for (c, cell) in row.iter().enumerate() {
                    if cell.is_empty() {
                        continue;
                    }
                    strings.push(cell.to_string());
                    let column = (b'A' + c as u8) as char;
                    data.push_str(&format!(
                        r#"<c r="{}{}" t="s"><v>{}</v></c>"#,
                        column,
                        r + 1,
                        strings.len() - 1
                    ));
                }
                data.push_str("</row>");
            }
            parts.push((
                format!("xl/worksheets/sheet{}.xml", id),
                format!(
                    r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
                    data
                ),
            ));
        }

        let shared: String = strings.iter().map(|s| format!("<si><t>{}</t></si>", s)).collect();
        parts.push((
            "xl/workbook.xml".to_string(),
            format!(
                r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>{}</sheets></workbook>"#,
                sheet_entries
            ),
        ));
        parts.push((
            "xl/_rels/workbook.xml.rels".to_string(),
            format!(
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{}</Relationships>"#,
                rels
            ),
        ));
        parts.push(("xl/sharedStrings.xml".to_string(), format!("<sst>{}</sst>", shared)));

        let borrowed: Vec<(&str, String)> =
            parts.iter().map(|(n, b)| (n.as_str(), b.clone())).collect();
        package(&borrowed)
    }
}
