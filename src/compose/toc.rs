//! Table of contents frontmatter and per-document marker paragraphs

use super::fields::{bookmark, document_bookmark, tab_run, text_run, validate_tag, Field, RunProps};
use super::title::TitleEntry;
use crate::docx::xml::escape;
use crate::docx::BodyElement;
use crate::error::Result;
use crate::layout::PageGeometry;

/// Style of the heading above the table of contents
pub const TOC_HEADING_STYLE: &str = "ProcTocHeading";
/// Style of the optional proceedings title
pub const TOC_TITLE_STYLE: &str = "ProcTocTitle";

/// How TOC entries find the documents they point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TocStrategy {
    /// Hidden `TC` fields collected by a `TOC \f <tag>` field
    #[default]
    TagScoped,
    /// Literal rows with `PAGEREF` fields pointing at hidden bookmarks
    Bookmarks,
}

/// Options for the table of contents
#[derive(Debug, Clone)]
pub struct TocOptions {
    pub strategy: TocStrategy,
    /// Single letter scoping `TC` entries to this table
    pub tag: String,
    /// Heading shown above the entries
    pub heading: String,
    /// Optional proceedings title shown above the heading
    pub title: Option<String>,
}

impl Default for TocOptions {
    fn default() -> Self {
        Self {
            strategy: TocStrategy::TagScoped,
            tag: "P".to_string(),
            heading: "Table of Contents".to_string(),
            title: None,
        }
    }
}

/// Style definitions the frontmatter paragraphs refer to
pub fn reserved_styles() -> Vec<(&'static str, String)> {
    vec![
        (
            TOC_TITLE_STYLE,
            format!(
                "<w:style w:type=\"paragraph\" w:customStyle=\"1\" w:styleId=\"{}\">\
                 <w:name w:val=\"Proceedings Title\"/><w:basedOn w:val=\"Normal\"/><w:next w:val=\"Normal\"/>\
                 <w:pPr><w:spacing w:before=\"240\" w:after=\"240\"/><w:jc w:val=\"center\"/></w:pPr>\
                 <w:rPr><w:b/><w:bCs/><w:sz w:val=\"32\"/><w:szCs w:val=\"32\"/></w:rPr></w:style>",
                TOC_TITLE_STYLE
            ),
        ),
        (
            TOC_HEADING_STYLE,
            format!(
                "<w:style w:type=\"paragraph\" w:customStyle=\"1\" w:styleId=\"{}\">\
                 <w:name w:val=\"Proceedings TOC Heading\"/><w:basedOn w:val=\"Normal\"/><w:next w:val=\"Normal\"/>\
                 <w:pPr><w:spacing w:before=\"240\" w:after=\"240\"/><w:jc w:val=\"center\"/></w:pPr>\
                 <w:rPr><w:b/><w:bCs/><w:sz w:val=\"28\"/><w:szCs w:val=\"28\"/></w:rPr></w:style>",
                TOC_HEADING_STYLE
            ),
        ),
    ]
}

fn styled_paragraph(style: &str, text: &str) -> BodyElement {
    BodyElement::paragraph(format!(
        "<w:p><w:pPr><w:pStyle w:val=\"{}\"/></w:pPr>{}</w:p>",
        style,
        text_run(text, &RunProps::default())
    ))
}

/// Paragraphs placed before all content: title, heading and the entries
///
/// The paragraph that closes the TOC section is added by the assembler.
pub fn frontmatter(
    entries: &[TitleEntry],
    options: &TocOptions,
    geometry: &PageGeometry,
) -> Result<Vec<BodyElement>> {
    let mut elements = Vec::new();
    if let Some(title) = options.title.as_deref().filter(|t| !t.trim().is_empty()) {
        elements.push(styled_paragraph(TOC_TITLE_STYLE, title));
    }
    elements.push(styled_paragraph(TOC_HEADING_STYLE, &options.heading));

    match options.strategy {
        TocStrategy::TagScoped => {
            validate_tag(&options.tag)?;
            let field = Field::toc(
                &options.tag,
                "Update fields to build the table of contents.",
            );
            elements.push(BodyElement::paragraph(format!(
                "<w:p>{}</w:p>",
                field.to_runs(&RunProps::default())?
            )));
        }
        TocStrategy::Bookmarks => {
            for entry in entries {
                elements.push(bookmark_row(entry, geometry)?);
            }
        }
    }
    Ok(elements)
}

/// `title ........ page` row linking to the document's bookmark
fn bookmark_row(entry: &TitleEntry, geometry: &PageGeometry) -> Result<BodyElement> {
    let anchor = document_bookmark(entry.ordinal);
    let plain = RunProps::default();
    let page = Field::page_ref(&anchor, true).to_runs(&plain)?;
    Ok(BodyElement::paragraph(format!(
        "<w:p><w:pPr><w:tabs><w:tab w:val=\"right\" w:leader=\"dot\" w:pos=\"{}\"/></w:tabs></w:pPr>\
         <w:hyperlink w:anchor=\"{}\" w:history=\"1\">{}{}{}</w:hyperlink></w:p>",
        geometry.right_tab().twips(),
        escape(&anchor),
        text_run(&entry.title, &plain),
        tab_run(&plain),
        page
    )))
}

/// Invisible paragraph at the first content position of a document
///
/// Always carries the document's bookmark; with the tag-scoped strategy it
/// also holds the hidden `TC` entry.
pub fn marker_paragraph(
    entry: &TitleEntry,
    options: &TocOptions,
    bookmark_id: u32,
) -> Result<BodyElement> {
    let tc = match options.strategy {
        TocStrategy::TagScoped => {
            validate_tag(&options.tag)?;
            Field::tc(&entry.title, &options.tag, entry.level).to_runs(&RunProps::hidden())?
        }
        TocStrategy::Bookmarks => String::new(),
    };
    Ok(BodyElement::paragraph(format!(
        "<w:p><w:pPr><w:spacing w:before=\"0\" w:after=\"0\" w:line=\"240\" w:lineRule=\"auto\"/>\
         <w:rPr><w:vanish/></w:rPr></w:pPr>{}{}</w:p>",
        bookmark(bookmark_id, &document_bookmark(entry.ordinal)),
        tc
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::xml::collect_text;
    use crate::error::Error;

    fn entry(ordinal: usize, title: &str) -> TitleEntry {
        TitleEntry {
            ordinal,
            title: title.to_string(),
            level: 1,
        }
    }

    #[test]
    fn test_tag_scoped_frontmatter() {
        let options = TocOptions {
            title: Some("Annual Meeting".to_string()),
            ..Default::default()
        };
        let elements = frontmatter(&[entry(0, "A")], &options, &PageGeometry::default()).unwrap();
        assert_eq!(elements.len(), 3);
        assert!(elements[0].xml.contains(TOC_TITLE_STYLE));
        assert_eq!(collect_text(&elements[1].xml, b"t").unwrap(), "Table of Contents");
        assert!(elements[2].xml.contains(r#"TOC \h \z \f P"#));
    }

    #[test]
    fn test_bookmark_rows_keep_original_title() {
        let options = TocOptions {
            strategy: TocStrategy::Bookmarks,
            ..Default::default()
        };
        let entries = [entry(0, r#"The "Quoted" One"#), entry(1, "Second & Last")];
        let elements = frontmatter(&entries, &options, &PageGeometry::default()).unwrap();
        assert_eq!(elements.len(), 3);
        assert!(elements[1].xml.contains(r#"w:anchor="_ProcDoc1""#));
        assert!(elements[1].xml.contains("The \"Quoted\" One"));
        assert!(elements[1].xml.contains(r#"PAGEREF _ProcDoc1 \h"#));
        assert!(elements[2].xml.contains("Second &amp; Last"));
        let right = PageGeometry::default().right_tab().twips();
        assert!(elements[2].xml.contains(&format!("w:pos=\"{}\"", right)));
    }

    #[test]
    fn test_marker_paragraph() {
        let marker = marker_paragraph(&entry(2, r#"A "B""#), &TocOptions::default(), 40).unwrap();
        assert!(marker.xml.contains(r#"w:name="_ProcDoc3""#));
        assert!(marker.xml.contains(r#"w:id="40""#));
        assert_eq!(
            collect_text(&marker.xml, b"instrText").unwrap(),
            r#" TC "A 'B'" \f P \l 1 "#
        );
    }

    #[test]
    fn test_bookmark_marker_has_no_tc() {
        let options = TocOptions {
            strategy: TocStrategy::Bookmarks,
            ..Default::default()
        };
        let marker = marker_paragraph(&entry(0, "A"), &options, 1).unwrap();
        assert!(!marker.xml.contains("instrText"));
        assert!(marker.xml.contains("_ProcDoc1"));
    }

    #[test]
    fn test_bad_tag_rejected() {
        let options = TocOptions {
            tag: "P\" \\o".to_string(),
            ..Default::default()
        };
        let result = frontmatter(&[], &options, &PageGeometry::default());
        assert!(matches!(result, Err(Error::InstructionInjection(_))));
    }
}
