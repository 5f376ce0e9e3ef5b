//! Composite footer: left / center / right sections with page counters

use chrono::NaiveDate;

use super::fields::{tab_run, text_run, Field, RunProps};
use crate::date::{format_date, WORD_DATE_PICTURE};
use crate::docx::xml::{R_NS, W_NS, XML_DECL};
use crate::error::Result;
use crate::layout::PageGeometry;

/// What `[pages]` counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TotalPages {
    /// Every page, TOC included (`NUMPAGES`)
    #[default]
    Document,
    /// Only pages after the TOC section
    Content,
}

/// Options for the footer shown on every content page
///
/// Section text may contain `[page]`, `[pages]` and `[date]`; `|` or `[br]`
/// start a new line.
#[derive(Debug, Clone)]
pub struct FooterOptions {
    pub left: Option<String>,
    pub center: Option<String>,
    pub right: Option<String>,
    /// Fixed date for `[date]`; `None` inserts a date field instead
    pub date: Option<NaiveDate>,
    pub total: TotalPages,
    /// Font size in half-points
    pub font_size: Option<u32>,
}

impl Default for FooterOptions {
    fn default() -> Self {
        Self {
            left: None,
            center: Some("Page [page] of [pages]".to_string()),
            right: None,
            date: None,
            total: TotalPages::Document,
            font_size: None,
        }
    }
}

/// Full `w:ftr` part for the given options and section layout
pub fn footer_part(options: &FooterOptions, geometry: &PageGeometry) -> Result<String> {
    let left = lines(options.left.as_deref());
    let center = lines(options.center.as_deref());
    let right = lines(options.right.as_deref());
    let count = left.len().max(center.len()).max(right.len()).max(1);

    let props = RunProps {
        size: options.font_size,
        ..Default::default()
    };
    let mut xml = format!("{}<w:ftr xmlns:w=\"{}\" xmlns:r=\"{}\">", XML_DECL, W_NS, R_NS);
    for i in 0..count {
        xml.push_str(&format!(
            "<w:p><w:pPr><w:tabs><w:tab w:val=\"center\" w:pos=\"{}\"/><w:tab w:val=\"right\" w:pos=\"{}\"/></w:tabs>\
             <w:spacing w:before=\"0\" w:after=\"0\"/></w:pPr>",
            geometry.center_tab().twips(),
            geometry.right_tab().twips()
        ));
        xml.push_str(&expand(cell(&left, i), options, &props)?);
        if !cell(&center, i).is_empty() || !cell(&right, i).is_empty() {
            xml.push_str(&tab_run(&props));
            xml.push_str(&expand(cell(&center, i), options, &props)?);
        }
        if !cell(&right, i).is_empty() {
            xml.push_str(&tab_run(&props));
            xml.push_str(&expand(cell(&right, i), options, &props)?);
        }
        xml.push_str("</w:p>");
    }
    xml.push_str("</w:ftr>");
    Ok(xml)
}

/// Line `i` of a footer section, empty past its last line
fn cell(section: &[String], i: usize) -> &str {
    section.get(i).map(String::as_str).unwrap_or("")
}

/// Split section text on line-break markers
fn lines(text: Option<&str>) -> Vec<String> {
    let Some(text) = text else {
        return Vec::new();
    };
    text.split('\n')
        .flat_map(|line| line.split('|'))
        .flat_map(|part| part.split("[br]"))
        .flat_map(|part| part.split("[BR]"))
        .map(|s| s.trim_end_matches('\r').to_string())
        .collect()
}

const PLACEHOLDERS: &[&str] = &["[pages]", "[page]", "[date]"];

/// Runs for one line of section text with placeholders replaced by fields
fn expand(line: &str, options: &FooterOptions, props: &RunProps) -> Result<String> {
    let mut xml = String::new();
    let mut rest = line;
    loop {
        let next = PLACEHOLDERS
            .iter()
            .filter_map(|p| find_ignore_case(rest, p).map(|at| (at, *p)))
            .min_by_key(|(at, _)| *at);
        let Some((at, placeholder)) = next else {
            xml.push_str(&text_run(rest, props));
            return Ok(xml);
        };
        xml.push_str(&text_run(&rest[..at], props));
        let runs = match placeholder {
            "[page]" => Field::page().to_runs(props)?,
            "[pages]" => match options.total {
                TotalPages::Document => Field::num_pages().to_runs(props)?,
                TotalPages::Content => Field::content_pages().to_runs(props)?,
            },
            _ => match options.date {
                Some(date) => text_run(&format_date(&date), props),
                None => Field::date(WORD_DATE_PICTURE, "").to_runs(props)?,
            },
        };
        xml.push_str(&runs);
        rest = &rest[at + placeholder.len()..];
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::xml::collect_text;

    #[test]
    fn test_default_footer() {
        let xml = footer_part(&FooterOptions::default(), &PageGeometry::default()).unwrap();
        assert!(xml.contains("<w:ftr "));
        assert_eq!(xml.matches("<w:p>").count(), 1);
        assert_eq!(collect_text(&xml, b"instrText").unwrap(), " PAGE  NUMPAGES ");
        let text = collect_text(&xml, b"t").unwrap();
        assert_eq!(text, "Page 1 of 1");
    }

    #[test]
    fn test_content_total() {
        let options = FooterOptions {
            total: TotalPages::Content,
            ..Default::default()
        };
        let xml = footer_part(&options, &PageGeometry::default()).unwrap();
        assert!(collect_text(&xml, b"instrText").unwrap().contains("PAGEREF _ProcTocEnd"));
    }

    #[test]
    fn test_multiline_sections() {
        let options = FooterOptions {
            left: Some("Proceedings|Vol. 3".to_string()),
            center: None,
            right: Some("[date]".to_string()),
            date: NaiveDate::from_ymd_opt(2024, 11, 20),
            ..Default::default()
        };
        let xml = footer_part(&options, &PageGeometry::default()).unwrap();
        assert_eq!(xml.matches("<w:p>").count(), 2);
        let text = collect_text(&xml, b"t").unwrap();
        assert_eq!(text, "ProceedingsNovember 20, 2024Vol. 3");
        assert!(!xml.contains("instrText"));
    }

    #[test]
    fn test_date_field_when_not_fixed() {
        let options = FooterOptions {
            center: Some("[DATE]".to_string()),
            ..Default::default()
        };
        let xml = footer_part(&options, &PageGeometry::default()).unwrap();
        assert!(collect_text(&xml, b"instrText").unwrap().contains("DATE \\@ \"MMMM d, yyyy\""));
    }

    #[test]
    fn test_lines() {
        assert_eq!(lines(Some("a|b[br]c")), vec!["a", "b", "c"]);
        assert!(lines(None).is_empty());
    }

    #[test]
    fn test_uneven_sections() {
        let sections = lines(Some("one|two"));
        assert_eq!(cell(&sections, 1), "two");
        assert_eq!(cell(&sections, 2), "");
        assert_eq!(cell(&[], 0), "");
    }

    #[test]
    fn test_font_size() {
        let options = FooterOptions {
            font_size: Some(18),
            ..Default::default()
        };
        let xml = footer_part(&options, &PageGeometry::default()).unwrap();
        assert!(xml.contains(r#"<w:sz w:val="18"/>"#));
        assert!(!footer_part(&FooterOptions::default(), &PageGeometry::default())
            .unwrap()
            .contains("<w:sz "));
    }
}
