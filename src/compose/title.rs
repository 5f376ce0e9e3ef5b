//! Title extraction
//!
//! A document's TOC title is the text of its first top-level heading, or
//! its file name when it has none.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::docx::xml::{attr_local, local_name, resolve_entity, skip_element};
use crate::docx::{DocumentXml, DocxPackage, ElementKind, StyleSheet};
use crate::error::Result;
use crate::input::InputDocument;

/// One line of the table of contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleEntry {
    /// Index of the source document in merge order
    pub ordinal: usize,
    pub title: String,
    /// Outline level, always 1
    pub level: u8,
}

/// Normalized names of first-level heading styles across common locales
const HEADING1_PREFIXES: &[&str] = &[
    "heading1",
    "überschrift1",
    "titre1",
    "título1",
    "titolo1",
    "kop1",
    "rubrik1",
    "otsikko1",
    "nagłówek1",
    "заголовок1",
    "judul1",
    "tajuk1",
];

/// Resolve TOC entries for every input, in input order
pub fn resolve_titles(inputs: &[InputDocument]) -> Vec<TitleEntry> {
    inputs
        .iter()
        .enumerate()
        .map(|(ordinal, input)| TitleEntry {
            ordinal,
            title: title_or(
                &input.raw_bytes,
                fallback_title(&input.display_name, ordinal),
            ),
            level: 1,
        })
        .collect()
}

/// Title of a document, or `fallback_name` without directories or extension
/// when no heading can be found
///
/// Never fails; unreadable packages fall back too.
pub fn resolve_title(raw_bytes: &[u8], fallback_name: &str) -> String {
    title_or(raw_bytes, fallback_title(fallback_name, 0))
}

fn title_or(raw_bytes: &[u8], fallback: String) -> String {
    match heading_title(raw_bytes) {
        Ok(Some(title)) => title,
        Ok(None) => {
            debug!("No top-level heading, using file name {}", fallback);
            fallback
        }
        Err(e) => {
            debug!("Could not read heading, using file name {}: {}", fallback, e);
            fallback
        }
    }
}

/// File name without directories or extension; `Document <n>` if that is empty
pub fn fallback_title(display_name: &str, ordinal: usize) -> String {
    let base = display_name.rsplit(['/', '\\']).next().unwrap_or(display_name);
    let stem = match base.rfind('.') {
        Some(dot) => &base[..dot],
        None => base,
    };
    let stem = stem.trim();
    if stem.is_empty() {
        format!("Document {}", ordinal + 1)
    } else {
        stem.to_string()
    }
}

/// Whether a style name (or id) denotes a first-level heading
///
/// `Heading 1 Char` matches, `Heading 10` does not.
pub fn is_top_level_heading(style: &str) -> bool {
    let normalized: String = style
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    HEADING1_PREFIXES.iter().any(|prefix| {
        normalized
            .strip_prefix(prefix)
            .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
    })
}

fn heading_title(raw_bytes: &[u8]) -> Result<Option<String>> {
    let package = DocxPackage::from_bytes(raw_bytes)?;
    let styles = match package.part_text("word/styles.xml")? {
        Some(xml) => StyleSheet::parse(&xml)?,
        None => StyleSheet::default(),
    };
    let document = DocumentXml::parse(&package.require_text(&package.main_document_name()?)?)?;

    for element in &document.elements {
        if element.kind == ElementKind::Other {
            continue;
        }
        for (style_id, text) in paragraphs(&element.xml)? {
            let Some(style_id) = style_id else { continue };
            let name = styles.display_name(&style_id).unwrap_or(&style_id);
            let text = text.trim();
            if is_top_level_heading(name) && !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
    }
    Ok(None)
}

/// `(style id, text)` of every paragraph in a body element, in order
///
/// Text boxes, fallback content and deleted runs are skipped.
fn paragraphs(xml: &str) -> Result<Vec<(Option<String>, String)>> {
    let mut reader = Reader::from_str(xml);
    let mut found = Vec::new();
    let mut current: Option<(Option<String>, String)> = None;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"txbxContent" | b"Fallback" | b"del" | b"moveFrom" => skip_element(&mut reader)?,
                b"p" => current = Some((None, String::new())),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match local_name(e.name().as_ref()) {
                b"pStyle" => {
                    if let Some((style, _)) = current.as_mut() {
                        *style = attr_local(&e, b"val");
                    }
                }
                b"tab" => {
                    if let Some((_, text)) = current.as_mut() {
                        text.push(' ');
                    }
                }
                b"p" => found.push((None, String::new())),
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Event::GeneralRef(r) if in_text => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&resolve_entity(r.as_ref()));
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"t" => in_text = false,
                b"p" => found.extend(current.take()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_names() {
        assert!(is_top_level_heading("heading 1"));
        assert!(is_top_level_heading("Heading1"));
        assert!(is_top_level_heading("Heading 1 Char"));
        assert!(is_top_level_heading("Überschrift 1"));
        assert!(!is_top_level_heading("Heading 10"));
        assert!(!is_top_level_heading("heading 2"));
        assert!(!is_top_level_heading("Title"));
    }

    #[test]
    fn test_fallback_title() {
        assert_eq!(fallback_title("a_abstract.docx", 0), "a_abstract");
        assert_eq!(fallback_title("papers/b.study.docx", 3), "b.study");
        assert_eq!(fallback_title("dir\\win.docx", 0), "win");
        assert_eq!(fallback_title(".docx", 4), "Document 5");
        assert_eq!(fallback_title("papers/.DOCX", 0), "Document 1");
        assert_eq!(fallback_title("notes", 0), "notes");
        assert_eq!(fallback_title("", 4), "Document 5");
    }

    #[test]
    fn test_paragraph_text() {
        let xml = r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Fish</w:t><w:tab/><w:t>&amp; Chips</w:t></w:r><w:del><w:r><w:delText>gone</w:delText></w:r></w:del><w:r><w:instrText>PAGE</w:instrText></w:r></w:p>"#;
        let paras = paragraphs(xml).unwrap();
        assert_eq!(paras, vec![(Some("Heading1".to_string()), "Fish & Chips".to_string())]);
    }

    #[test]
    fn test_table_paragraphs() {
        let xml = r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>a</w:t></w:r></w:p><w:p/></w:tc></w:tr></w:tbl>"#;
        let paras = paragraphs(xml).unwrap();
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].1, "a");
    }

    #[test]
    fn test_garbage_falls_back() {
        assert_eq!(resolve_title(b"not a docx", "paper"), "paper");
    }

    #[test]
    fn test_fallback_strips_path_and_extension() {
        assert_eq!(resolve_title(b"not a docx", "papers/a_abstract.docx"), "a_abstract");
        assert_eq!(resolve_title(b"not a docx", "C:\\talks\\b.docx"), "b");
    }
}
