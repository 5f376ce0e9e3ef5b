//! Page numbering normalization on the reopened composite
//!
//! Imported documents bring their own numbering restarts, header and footer
//! references and title-page settings. All of that is cleared, then exactly
//! one restart-to-1 and one footer reference are placed on the first
//! content section. Every later section links to it and keeps counting.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info};

use super::fields::is_document_marker;
use super::footer::{footer_part, FooterOptions};
use crate::docx::rels::{relative_target, types};
use crate::docx::xml::{find_element, insert_before_root_end, local_name, position, remove_elements, skip_element, R_NS};
use crate::docx::{content_types, DocumentXml, DocxPackage, ElementKind, SectionProperties};
use crate::error::{Error, Result};

/// What a composite section holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionRole {
    /// Frontmatter with the table of contents
    Toc,
    /// Sub-document content
    Content,
}

/// Numbering policy of one composite section after normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNumberingState {
    pub role: SectionRole,
    /// Page number the section restarts at, if any
    pub restart: Option<u32>,
    /// Whether the section shows page numbers
    pub numbered: bool,
    /// Whether numbering carries on from the previous section
    pub continues_previous: bool,
}

/// Settings elements that must come after `w:updateFields`
const AFTER_UPDATE_FIELDS: &[&[u8]] = &[
    b"hdrShapeDefaults",
    b"footnotePr",
    b"endnotePr",
    b"compat",
    b"docVars",
    b"rsids",
    b"mathPr",
    b"attachedSchema",
    b"themeFontLang",
    b"clrSchemeMapping",
    b"doNotIncludeSubdocsInStats",
    b"doNotAutoCompressPictures",
    b"forceUpgrade",
    b"captions",
    b"readModeInkLockDown",
    b"smartTagType",
    b"schemaLibrary",
    b"shapeDefaults",
    b"doNotEmbedSmartTags",
    b"decimalSymbol",
    b"listSeparator",
    b"docId",
    b"chartTrackingRefBased",
];

/// Where a section's properties live in the body
enum Location {
    /// `w:pPr/w:sectPr` of the body element at this index
    Paragraph(usize),
    /// The body-level `w:sectPr`
    Body,
}

struct Section {
    location: Location,
    /// Index of the first body element in the section
    first_element: usize,
    props: SectionProperties,
}

/// Normalize numbering and footers of a composite; returns the section ledger
pub fn normalize(
    package: &mut DocxPackage,
    footer: &FooterOptions,
) -> Result<Vec<SectionNumberingState>> {
    let main = package.main_document_name()?;
    let mut document = DocumentXml::parse(&package.require_text(&main)?)?;
    let mut sections = collect_sections(&document)?;
    if sections.len() < 2 {
        return Err(Error::EmptyInput);
    }

    let r_prefix = match document.prefix_for(R_NS) {
        Some(prefix) => prefix,
        None => {
            document.declare_namespace("r", R_NS);
            "r".to_string()
        }
    };
    let footer_id = add_footer(package, &main, footer, &sections[1].props)?;

    let mut stripped = 0;
    for (index, section) in sections.iter_mut().enumerate() {
        let props = &mut section.props;
        if props.strip_restart()? {
            stripped += 1;
        }
        props.unlink_headers_footers();
        props.remove("titlePg");

        if index == 1 {
            props.set_restart(1)?;
            props.set_section_type("nextPage");
            props.set_footer_reference("default", &footer_id, &r_prefix);
        } else if index > 1 && starts_document(&document, section.first_element)? {
            props.set_section_type("nextPage");
        }
    }
    debug!("Removed {} inherited numbering restarts", stripped);

    let ledger: Vec<SectionNumberingState> = sections
        .iter()
        .enumerate()
        .map(|(index, section)| {
            let restart = section.props.restart();
            SectionNumberingState {
                role: if index == 0 { SectionRole::Toc } else { SectionRole::Content },
                restart,
                numbered: index > 0,
                continues_previous: index > 0 && restart.is_none(),
            }
        })
        .collect();

    for section in sections {
        match section.location {
            Location::Paragraph(index) => {
                let element = &mut document.elements[index];
                element.xml = replace_sect_pr(&element.xml, &section.props.to_xml())?;
            }
            Location::Body => document.final_sect_pr = Some(section.props.to_xml()),
        }
    }
    package.set_part(&main, document.to_xml().into_bytes());

    let settings_part = match package.relationships(&main)?.find_by_type(types::SETTINGS) {
        Some(rel) => crate::docx::rels::resolve_target(&main, &rel.target),
        None => "word/settings.xml".to_string(),
    };
    let settings = package.require_text(&settings_part)?;
    package.set_part(&settings_part, set_update_fields(&settings)?.into_bytes());

    info!("Normalized numbering across {} sections", ledger.len());
    Ok(ledger)
}

/// Whether the body element at `index` is a document marker paragraph
fn starts_document(document: &DocumentXml, index: usize) -> Result<bool> {
    match document.elements.get(index) {
        Some(element) => is_document_marker(&element.xml),
        None => Ok(false),
    }
}

/// Sections in document order, each with the body index where it starts
fn collect_sections(document: &DocumentXml) -> Result<Vec<Section>> {
    let mut sections = Vec::new();
    let mut first_element = 0;
    for (index, element) in document.elements.iter().enumerate() {
        if element.kind != ElementKind::Paragraph {
            continue;
        }
        if let Some(xml) = paragraph_sect_pr(&element.xml)? {
            sections.push(Section {
                location: Location::Paragraph(index),
                first_element,
                props: SectionProperties::parse(xml)?,
            });
            first_element = index + 1;
        }
    }
    let props = match document.final_sect_pr.as_deref() {
        Some(xml) => SectionProperties::parse(xml)?,
        None => SectionProperties::with_geometry(&Default::default()),
    };
    sections.push(Section {
        location: Location::Body,
        first_element,
        props,
    });
    Ok(sections)
}

/// The `w:sectPr` inside a paragraph's own `w:pPr`
fn paragraph_sect_pr(paragraph: &str) -> Result<Option<&str>> {
    let Some(ppr) = ppr_range(paragraph)? else {
        return Ok(None);
    };
    let ppr_xml = &paragraph[ppr];
    Ok(find_element(ppr_xml, b"sectPr")?.map(|range| &ppr_xml[range]))
}

/// Byte range of the paragraph's direct `w:pPr` child
fn ppr_range(paragraph: &str) -> Result<Option<std::ops::Range<usize>>> {
    let mut reader = Reader::from_str(paragraph);
    let mut depth = 0usize;
    loop {
        let start = position(&reader);
        match reader.read_event()? {
            Event::Start(e) if depth == 1 && local_name(e.name().as_ref()) == b"pPr" => {
                skip_element(&mut reader)?;
                return Ok(Some(start..position(&reader)));
            }
            Event::Start(_) if depth == 1 => skip_element(&mut reader)?,
            Event::Start(_) => depth += 1,
            Event::End(_) | Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn replace_sect_pr(paragraph: &str, sect_pr: &str) -> Result<String> {
    let Some(ppr) = ppr_range(paragraph)? else {
        return Ok(paragraph.to_string());
    };
    let Some(inner) = find_element(&paragraph[ppr.clone()], b"sectPr")? else {
        return Ok(paragraph.to_string());
    };
    let start = ppr.start + inner.start;
    let end = ppr.start + inner.end;
    Ok(format!("{}{}{}", &paragraph[..start], sect_pr, &paragraph[end..]))
}

/// Add the composite footer part and return its relationship id
fn add_footer(
    package: &mut DocxPackage,
    main: &str,
    options: &FooterOptions,
    first_content: &SectionProperties,
) -> Result<String> {
    let part = package.unique_part_name("word/footer1.xml");
    package.set_part(&part, footer_part(options, &first_content.geometry())?.into_bytes());

    let mut content = package.content_types()?;
    content.set_override(&part, content_types::FOOTER);
    package.set_content_types(&content);

    let mut rels = package.relationships(main)?;
    let id = rels.add(types::FOOTER, &relative_target(main, &part), false);
    package.set_relationships(main, &rels);
    Ok(id)
}

/// Turn on `w:updateFields` so the word processor recomputes every field on open
pub fn set_update_fields(settings: &str) -> Result<String> {
    let settings = remove_elements(settings, &[b"updateFields"])?;
    let markup = "<w:updateFields w:val=\"true\"/>";

    let mut reader = Reader::from_str(&settings);
    let mut depth = 0usize;
    loop {
        let start = position(&reader);
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e)
                if depth == 1 && AFTER_UPDATE_FIELDS.contains(&local_name(e.name().as_ref())) =>
            {
                return Ok(format!("{}{}{}", &settings[..start], markup, &settings[start..]));
            }
            Event::Start(_) if depth == 1 => skip_element(&mut reader)?,
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(insert_before_root_end(&settings, markup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_update_fields_before_compat() {
        let settings = r#"<w:settings xmlns:w="urn:w"><w:zoom w:percent="100"/><w:compat><w:x/></w:compat><w:rsids/></w:settings>"#;
        assert_eq!(
            set_update_fields(settings).unwrap(),
            r#"<w:settings xmlns:w="urn:w"><w:zoom w:percent="100"/><w:updateFields w:val="true"/><w:compat><w:x/></w:compat><w:rsids/></w:settings>"#
        );
    }

    #[test]
    fn test_update_fields_replaces_existing() {
        let settings = r#"<w:settings xmlns:w="urn:w"><w:updateFields w:val="false"/></w:settings>"#;
        assert_eq!(
            set_update_fields(settings).unwrap(),
            r#"<w:settings xmlns:w="urn:w"><w:updateFields w:val="true"/></w:settings>"#
        );
    }

    #[test]
    fn test_paragraph_sect_pr() {
        let p = r#"<w:p><w:pPr><w:spacing/><w:sectPr><w:pgSz w:w="1"/></w:sectPr></w:pPr><w:r><w:t>x</w:t></w:r></w:p>"#;
        assert_eq!(
            paragraph_sect_pr(p).unwrap(),
            Some(r#"<w:sectPr><w:pgSz w:w="1"/></w:sectPr>"#)
        );
        let replaced = replace_sect_pr(p, "<w:sectPr/>").unwrap();
        assert_eq!(
            replaced,
            r#"<w:p><w:pPr><w:spacing/><w:sectPr/></w:pPr><w:r><w:t>x</w:t></w:r></w:p>"#
        );
        assert_eq!(paragraph_sect_pr("<w:p><w:r/></w:p>").unwrap(), None);
    }
}
