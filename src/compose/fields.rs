//! Deferred field markup
//!
//! Every number in the composite (TOC page numbers, page counters, totals) is
//! a field the word processor computes when it updates fields. This module
//! writes those fields as complex field runs (`fldChar` begin / instrText /
//! separate / result / end), including nested fields for formulas.

use crate::docx::xml::{escape, escape_text, local_name, visit_attrs};
use crate::error::{Error, Result};

/// Prefix of every bookmark the composer inserts
pub const BOOKMARK_PREFIX: &str = "_Proc";

/// Bookmark on the paragraph that closes the TOC section
pub const TOC_END_BOOKMARK: &str = "_ProcTocEnd";

/// Bookmark marking the first content position of document `ordinal` (0-based)
pub fn document_bookmark(ordinal: usize) -> String {
    format!("{}Doc{}", BOOKMARK_PREFIX, ordinal + 1)
}

/// Make a title safe to embed in a quoted field argument
///
/// Double quotes become single quotes, backslashes (the field escape
/// character) become slashes and control characters become spaces.
/// Applying it twice changes nothing.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '\\' => '/',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}

/// Check that a TOC tag is a single ASCII letter
pub fn validate_tag(tag: &str) -> Result<()> {
    let mut chars = tag.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Ok(()),
        _ => Err(Error::InstructionInjection(format!(
            "TOC tag must be a single letter, got {:?}",
            tag
        ))),
    }
}

/// Check an instruction fragment for unbalanced or escaped quotes and control characters
pub fn validate_instruction(instruction: &str) -> Result<()> {
    if instruction.contains("\\\"") {
        return Err(Error::InstructionInjection(format!(
            "escaped quote in {:?}",
            instruction
        )));
    }
    if instruction.chars().filter(|&c| c == '"').count() % 2 != 0 {
        return Err(Error::InstructionInjection(format!(
            "unbalanced quotes in {:?}",
            instruction
        )));
    }
    if instruction.chars().any(char::is_control) {
        return Err(Error::InstructionInjection(format!(
            "control character in {:?}",
            instruction
        )));
    }
    Ok(())
}

/// Character formatting applied to generated runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunProps {
    pub hidden: bool,
    /// Font size in half-points
    pub size: Option<u32>,
}

impl RunProps {
    pub fn hidden() -> Self {
        Self {
            hidden: true,
            ..Default::default()
        }
    }

    pub fn to_xml(&self) -> String {
        if !self.hidden && self.size.is_none() {
            return String::new();
        }
        let mut xml = String::from("<w:rPr>");
        if self.hidden {
            xml.push_str("<w:vanish/>");
        }
        if let Some(size) = self.size {
            xml.push_str(&format!("<w:sz w:val=\"{0}\"/><w:szCs w:val=\"{0}\"/>", size));
        }
        xml.push_str("</w:rPr>");
        xml
    }
}

/// A run of literal text
pub fn text_run(text: &str, props: &RunProps) -> String {
    if text.is_empty() {
        return String::new();
    }
    format!(
        "<w:r>{}<w:t xml:space=\"preserve\">{}</w:t></w:r>",
        props.to_xml(),
        escape_text(text)
    )
}

/// A run holding a single tab character
pub fn tab_run(props: &RunProps) -> String {
    format!("<w:r>{}<w:tab/></w:r>", props.to_xml())
}

/// A run holding a hard page break
pub fn page_break_run() -> String {
    "<w:r><w:br w:type=\"page\"/></w:r>".to_string()
}

/// `w:bookmarkStart` / `w:bookmarkEnd` pair around nothing
pub fn bookmark(id: u32, name: &str) -> String {
    format!(
        "<w:bookmarkStart w:id=\"{id}\" w:name=\"{}\"/><w:bookmarkEnd w:id=\"{id}\"/>",
        escape(name)
    )
}

/// True when a body element carries a bookmark inserted for a document start
pub fn is_document_marker(xml: &str) -> Result<bool> {
    let prefix = format!("{}Doc", BOOKMARK_PREFIX);
    if !xml.contains(&prefix) {
        return Ok(false);
    }
    let mut found = false;
    visit_attrs(xml, |elem, key, value| {
        found |= local_name(elem) == b"bookmarkStart"
            && local_name(key) == b"name"
            && value.starts_with(&prefix);
    })?;
    Ok(found)
}

/// One piece of a field instruction
#[derive(Debug, Clone, PartialEq)]
pub enum InstrPart {
    Text(String),
    Nested(Field),
}

/// A deferred field: instruction plus the placeholder shown until update
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub parts: Vec<InstrPart>,
    /// Result text shown before the first update; `None` writes no result
    pub placeholder: Option<String>,
    /// Ask the word processor to recompute this field on open
    pub dirty: bool,
}

impl Field {
    pub fn new(instruction: impl Into<String>, placeholder: Option<&str>) -> Self {
        Self {
            parts: vec![InstrPart::Text(instruction.into())],
            placeholder: placeholder.map(str::to_string),
            dirty: false,
        }
    }

    /// Current page number
    pub fn page() -> Self {
        Self::new("PAGE", Some("1"))
    }

    /// Pages in the whole document
    pub fn num_pages() -> Self {
        Self::new("NUMPAGES", Some("1"))
    }

    /// Displayed page number of a bookmark
    pub fn page_ref(bookmark: &str, hyperlink: bool) -> Self {
        let switch = if hyperlink { " \\h" } else { "" };
        Self::new(format!("PAGEREF {}{}", bookmark, switch), Some("?"))
    }

    /// Pages after the TOC section: `= {NUMPAGES} - {PAGEREF _ProcTocEnd}`
    pub fn content_pages() -> Self {
        Self {
            parts: vec![
                InstrPart::Text("= ".to_string()),
                InstrPart::Nested(Self::num_pages()),
                InstrPart::Text(" - ".to_string()),
                InstrPart::Nested(Self::page_ref(TOC_END_BOOKMARK, false)),
            ],
            placeholder: Some("1".to_string()),
            dirty: false,
        }
    }

    /// Current date in the given picture format
    pub fn date(picture: &str, placeholder: &str) -> Self {
        Self::new(format!("DATE \\@ \"{}\"", picture), Some(placeholder))
    }

    /// Table of contents entry collected by `TOC \f <tag>`
    pub fn tc(title: &str, tag: &str, level: u8) -> Self {
        Self::new(
            format!("TC \"{}\" \\f {} \\l {}", sanitize_title(title), tag, level),
            None,
        )
    }

    /// Table of contents built from TC entries with the given tag
    pub fn toc(tag: &str, placeholder: &str) -> Self {
        Self {
            dirty: true,
            ..Self::new(format!("TOC \\h \\z \\f {}", tag), Some(placeholder))
        }
    }

    /// Instruction text with nested fields in braces, as a word processor shows it
    pub fn instruction(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                InstrPart::Text(text) => text.clone(),
                InstrPart::Nested(field) => format!("{{ {} }}", field.instruction()),
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        for part in &self.parts {
            match part {
                InstrPart::Text(text) => validate_instruction(text)?,
                InstrPart::Nested(field) => field.validate()?,
            }
        }
        Ok(())
    }

    /// Complex field runs for this field
    pub fn to_runs(&self, props: &RunProps) -> Result<String> {
        self.validate()?;
        let rpr = props.to_xml();
        let mut xml = String::new();
        self.write_runs(&rpr, &mut xml);
        Ok(xml)
    }

    fn write_runs(&self, rpr: &str, xml: &mut String) {
        let dirty = if self.dirty { " w:dirty=\"true\"" } else { "" };
        xml.push_str(&format!(
            "<w:r>{}<w:fldChar w:fldCharType=\"begin\"{}/></w:r>",
            rpr, dirty
        ));
        for part in &self.parts {
            match part {
                InstrPart::Text(text) => xml.push_str(&format!(
                    "<w:r>{}<w:instrText xml:space=\"preserve\"> {} </w:instrText></w:r>",
                    rpr,
                    escape_text(text.trim())
                )),
                InstrPart::Nested(field) => field.write_runs(rpr, xml),
            }
        }
        if let Some(placeholder) = &self.placeholder {
            xml.push_str(&format!("<w:r>{}<w:fldChar w:fldCharType=\"separate\"/></w:r>", rpr));
            xml.push_str(&format!(
                "<w:r>{}<w:t xml:space=\"preserve\">{}</w:t></w:r>",
                rpr,
                escape_text(placeholder)
            ));
        }
        xml.push_str(&format!("<w:r>{}<w:fldChar w:fldCharType=\"end\"/></w:r>", rpr));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::xml::collect_text;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title(r#"The "Best" Study"#), "The 'Best' Study");
        assert_eq!(sanitize_title("Line\none\ttab"), "Line one tab");
        assert_eq!(sanitize_title("Plain"), "Plain");
        assert_eq!(sanitize_title("Paths under C:\\"), "Paths under C:/");
        let once = sanitize_title("a\\\"b");
        assert_eq!(sanitize_title(&once), once);
    }

    #[test]
    fn test_validate_tag() {
        assert!(validate_tag("P").is_ok());
        assert!(validate_tag("x").is_ok());
        assert!(matches!(validate_tag(""), Err(Error::InstructionInjection(_))));
        assert!(matches!(validate_tag("PP"), Err(Error::InstructionInjection(_))));
        assert!(matches!(validate_tag("\""), Err(Error::InstructionInjection(_))));
        assert!(matches!(validate_tag("1"), Err(Error::InstructionInjection(_))));
    }

    #[test]
    fn test_validate_instruction() {
        assert!(validate_instruction(r#"TC "a" \f P"#).is_ok());
        assert!(validate_instruction(r#"TC "a"" \f P"#).is_err());
        assert!(validate_instruction("PAGE\r").is_err());
        assert!(validate_instruction(r#"TC "C:\" \f P"#).is_err());
        assert!(validate_instruction(r#"DATE \@ "MMMM d, yyyy""#).is_ok());
    }

    #[test]
    fn test_tc_field_neutralizes_quotes() {
        let field = Field::tc(r#"Say "hi""#, "P", 1);
        assert_eq!(field.instruction(), r#"TC "Say 'hi'" \f P \l 1"#);
        assert!(field.validate().is_ok());
    }

    #[test]
    fn test_tc_field_neutralizes_backslash() {
        let field = Field::tc("Paths under C:\\", "P", 1);
        assert_eq!(field.instruction(), r#"TC "Paths under C:/" \f P \l 1"#);
        assert!(field.validate().is_ok());
    }

    #[test]
    fn test_content_pages_formula() {
        assert_eq!(
            Field::content_pages().instruction(),
            "= { NUMPAGES } - { PAGEREF _ProcTocEnd }"
        );
    }

    #[test]
    fn test_runs_are_balanced() {
        let xml = Field::content_pages().to_runs(&RunProps::default()).unwrap();
        assert_eq!(xml.matches("fldCharType=\"begin\"").count(), 3);
        assert_eq!(xml.matches("fldCharType=\"separate\"").count(), 3);
        assert_eq!(xml.matches("fldCharType=\"end\"").count(), 3);
        assert_eq!(
            collect_text(&xml, b"instrText").unwrap(),
            " =  NUMPAGES  -  PAGEREF _ProcTocEnd "
        );
    }

    #[test]
    fn test_tc_has_no_result() {
        let xml = Field::tc("Intro", "P", 1).to_runs(&RunProps::hidden()).unwrap();
        assert!(!xml.contains("separate"));
        assert_eq!(xml.matches("<w:vanish/>").count(), 3);
    }

    #[test]
    fn test_toc_is_dirty() {
        let xml = Field::toc("P", "Update fields").to_runs(&RunProps::default()).unwrap();
        assert!(xml.starts_with(r#"<w:r><w:fldChar w:fldCharType="begin" w:dirty="true"/></w:r>"#));
        assert!(xml.contains(r#"TOC \h \z \f P"#));
    }

    #[test]
    fn test_escaping_in_runs() {
        let run = text_run("A & B <c>", &RunProps::default());
        assert_eq!(run, r#"<w:r><w:t xml:space="preserve">A &amp; B &lt;c&gt;</w:t></w:r>"#);
        assert_eq!(text_run("", &RunProps::default()), "");
    }

    #[test]
    fn test_document_marker_detection() {
        let marker = format!("<w:p>{}</w:p>", bookmark(9, &document_bookmark(0)));
        assert!(is_document_marker(&marker).unwrap());
        assert!(!is_document_marker(&format!("<w:p>{}</w:p>", bookmark(9, TOC_END_BOOKMARK))).unwrap());
        assert!(!is_document_marker("<w:p><w:r><w:t>_ProcDoc1</w:t></w:r></w:p>").unwrap());
    }

    #[test]
    fn test_document_marker_parse_error() {
        let broken = r#"<w:p><w:bookmarkStart w:id="1" w:name="_ProcDoc1"></w:p>"#;
        assert!(is_document_marker(broken).is_err());
    }
}
