//! Document assembly: splice sub-document bodies into one composite
//!
//! Body markup is copied verbatim apart from the ids that only make sense
//! inside the source package: relationship ids (images, charts, links),
//! list numbering ids, and numeric element ids such as bookmarks. Parts the
//! body points at are copied along with their own relationships.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use super::fields::{bookmark, page_break_run, TOC_END_BOOKMARK};
use super::title::TitleEntry;
use super::toc::{marker_paragraph, reserved_styles, TocStrategy};
use super::{BoundaryDiscipline, ComposeOptions};
use crate::docx::numbering::remap_num_ids;
use crate::docx::rels::{relative_target, resolve_target, types};
use crate::docx::styles::append_styles;
use crate::docx::xml::{
    collect_text, declare_root_namespaces, local_name, prefix, remove_elements, rewrite_attrs,
    root_namespaces, visit_attrs,
};
use crate::docx::{
    content_types, BodyElement, ContentTypes, DocumentXml, DocxPackage, NumberingDefinitions,
    Relationship, Relationships, SectionProperties, StyleSheet,
};
use crate::error::{Error, Result};
use crate::input::InputDocument;

/// Main document part of the composite
const MAIN_PART: &str = "word/document.xml";

/// Elements that point into parts the composite does not carry
const UNCARRIED: &[&str] = &[
    "headerReference",
    "footerReference",
    "footnoteReference",
    "endnoteReference",
    "commentReference",
    "commentRangeStart",
    "commentRangeEnd",
];

/// A sub-document opened for merging
#[derive(Debug)]
pub struct SubDocument {
    pub name: String,
    package: DocxPackage,
    main_part: String,
    rels: Relationships,
    types: ContentTypes,
    pub document: DocumentXml,
}

impl SubDocument {
    /// Open an input as a package; any failure is fatal for the run
    pub fn open(input: &InputDocument) -> Result<Self> {
        Self::open_package(input).map_err(|e| Error::malformed(&input.display_name, e))
    }

    fn open_package(input: &InputDocument) -> Result<Self> {
        let package = DocxPackage::from_bytes(&input.raw_bytes)?;
        let main_part = package.main_document_name()?;
        let document = DocumentXml::parse(&package.require_text(&main_part)?)?;
        Ok(Self {
            name: input.display_name.clone(),
            rels: package.relationships(&main_part)?,
            types: package.content_types()?,
            main_part,
            document,
            package,
        })
    }

    /// Section properties closing the document's body
    pub fn final_section(&self) -> Result<Option<SectionProperties>> {
        self.document
            .final_sect_pr
            .as_deref()
            .map(SectionProperties::parse)
            .transpose()
    }

    /// Text of a part the main document points at by relationship type
    fn related_text(&self, rel_type: &str) -> Result<Option<String>> {
        match self.rels.find_by_type(rel_type) {
            Some(rel) if !rel.external => {
                self.package.part_text(&resolve_target(&self.main_part, &rel.target))
            }
            _ => Ok(None),
        }
    }
}

/// Section properties of the TOC section: the first document's page layout
pub fn toc_section(first: Option<&SubDocument>) -> Result<SectionProperties> {
    let section = match first {
        Some(sub) => sub.final_section()?.map(|s| s.layout_only()),
        None => None,
    };
    Ok(section.unwrap_or_else(|| SectionProperties::with_geometry(&Default::default())))
}

/// Generated paragraphs that precede all content, plus their section layout
#[derive(Debug, Clone)]
pub struct Frontmatter {
    pub elements: Vec<BodyElement>,
    pub section: SectionProperties,
}

/// Body of one sub-document after its ids were moved into the composite
struct Imported {
    elements: Vec<BodyElement>,
    final_section: Option<SectionProperties>,
}

/// Merge the frontmatter and every sub-document into one package
pub fn assemble(
    frontmatter: Frontmatter,
    subs: &[SubDocument],
    entries: &[TitleEntry],
    options: &ComposeOptions,
) -> Result<DocxPackage> {
    let mut assembler = Assembler::new(subs.first())?;

    let mut imported = Vec::with_capacity(subs.len());
    for (i, sub) in subs.iter().enumerate() {
        debug!("Importing {} ({} body elements)", sub.name, sub.document.elements.len());
        if options.toc.strategy == TocStrategy::TagScoped && uses_tc_tag(sub, &options.toc.tag)? {
            warn!(
                "{} already contains TC fields tagged {}; they will appear in the table of contents",
                sub.name, options.toc.tag
            );
        }
        imported.push(assembler.import(sub, i == 0)?);
    }

    // Everything we add goes above the highest id any sub-document used
    let toc_end_id = assembler.allocate_id()?;
    let mut elements = frontmatter.elements;
    elements.push(section_break(&frontmatter.section, &bookmark(toc_end_id, TOC_END_BOOKMARK)));

    let count = imported.len();
    let mut final_section = None;
    for (i, doc) in imported.into_iter().enumerate() {
        let entry = entries
            .get(i)
            .ok_or_else(|| Error::Serialization(format!("no title entry for document {}", i + 1)))?;
        elements.push(marker_paragraph(entry, &options.toc, assembler.allocate_id()?)?);
        elements.extend(doc.elements);

        let section = doc.final_section.unwrap_or_else(|| frontmatter.section.clone());
        if i + 1 == count {
            final_section = Some(section);
            break;
        }
        match options.boundary {
            BoundaryDiscipline::PageBreak => elements.push(page_break_paragraph()),
            BoundaryDiscipline::SectionBreak => {
                let mut section = section;
                section.set_section_type("nextPage");
                elements.push(section_break(&section, ""));
            }
        }
    }

    info!(
        "Assembled {} documents into {} body elements",
        count,
        elements.len()
    );
    assembler.finish(elements, final_section)
}

/// Paragraph whose mark closes a section with the given properties
fn section_break(section: &SectionProperties, content: &str) -> BodyElement {
    BodyElement::paragraph(format!(
        "<w:p><w:pPr><w:spacing w:before=\"0\" w:after=\"0\"/>{}</w:pPr>{}</w:p>",
        section.to_xml(),
        content
    ))
}

fn page_break_paragraph() -> BodyElement {
    BodyElement::paragraph(format!("<w:p>{}</w:p>", page_break_run()))
}

/// Whether a sub-document already has `TC` entries scoped to `tag`
fn uses_tc_tag(sub: &SubDocument, tag: &str) -> Result<bool> {
    for element in &sub.document.elements {
        if !element.xml.contains("TC") {
            continue;
        }
        let mut instructions = vec![collect_text(&element.xml, b"instrText")?];
        visit_attrs(&element.xml, |elem, key, value| {
            if local_name(elem) == b"fldSimple" && local_name(key) == b"instr" {
                instructions.push(value.to_string());
            }
        })?;
        if instructions.iter().any(|instr| is_tc_with_tag(instr, tag)) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_tc_with_tag(instruction: &str, tag: &str) -> bool {
    let tokens: Vec<&str> = instruction.split_whitespace().collect();
    tokens.iter().any(|t| *t == "TC")
        && tokens
            .windows(2)
            .any(|w| w[0].eq_ignore_ascii_case("\\f") && w[1].trim_matches('"').eq_ignore_ascii_case(tag))
}

struct Assembler {
    package: DocxPackage,
    rels: Relationships,
    types: ContentTypes,
    document: DocumentXml,
    ignorable: Vec<String>,
    numbering: NumberingDefinitions,
    styles_xml: String,
    style_ids: HashSet<String>,
    imported_styles: Vec<String>,
    /// Lowest numeric element id not used by anything imported so far
    next_id: u32,
}

impl Assembler {
    fn new(first: Option<&SubDocument>) -> Result<Self> {
        let package = DocxPackage::skeleton();
        let namespaces = match first {
            Some(sub) => sub.document.namespaces(),
            None => DocumentXml::parse(&package.require_text(MAIN_PART)?)?.namespaces(),
        };
        let styles_xml = package.require_text("word/styles.xml")?;
        Ok(Self {
            rels: package.relationships(MAIN_PART)?,
            types: package.content_types()?,
            document: DocumentXml::empty(&namespaces),
            ignorable: Vec::new(),
            numbering: NumberingDefinitions::default(),
            style_ids: StyleSheet::parse(&styles_xml)?.iter().map(|s| s.id.clone()).collect(),
            styles_xml,
            imported_styles: Vec::new(),
            next_id: 0,
            package,
        })
    }

    fn allocate_id(&mut self) -> Result<u32> {
        let id = self.next_id;
        self.next_id = id
            .checked_add(1)
            .ok_or_else(|| Error::Serialization("no free bookmark id left".to_string()))?;
        Ok(id)
    }

    fn import(&mut self, sub: &SubDocument, is_first: bool) -> Result<Imported> {
        let num_map = self.merge_numbering(sub)?;
        self.merge_styles(sub, is_first, &num_map)?;
        self.merge_namespaces(sub);
        if is_first {
            self.copy_shared_parts(sub)?;
        }

        let rel_prefixes = sub.document.relationship_prefixes();
        let is_rel_attr = |key: &[u8]| {
            prefix(key).is_some_and(|p| rel_prefixes.iter().any(|r| r.as_bytes() == p))
        };

        // First pass: which relationships are used, and how high ids go
        let mut used_rels: Vec<String> = Vec::new();
        let mut max_id: Option<u32> = None;
        let sect_pr = sub.document.final_sect_pr.as_deref().unwrap_or("");
        for xml in sub.document.elements.iter().map(|e| e.xml.as_str()).chain([sect_pr]) {
            visit_attrs(xml, |_, key, value| {
                if is_rel_attr(key) {
                    if !used_rels.iter().any(|r| r == value) {
                        used_rels.push(value.to_string());
                    }
                } else if local_name(key) == b"id" {
                    if let Ok(id) = value.trim().parse::<u32>() {
                        max_id = Some(max_id.map_or(id, |m| m.max(id)));
                    }
                }
            })
            .map_err(|e| Error::malformed(&sub.name, e))?;
        }

        let mut rel_map = HashMap::new();
        let mut copied = HashMap::new();
        for old in used_rels {
            if let Some(new) = self.map_relationship(sub, &old, &mut copied)? {
                rel_map.insert(old, new);
            }
        }

        let offset = self.next_id;
        if let Some(max) = max_id {
            self.next_id = offset
                .checked_add(max)
                .and_then(|id| id.checked_add(1))
                .ok_or_else(|| Error::malformed(&sub.name, "element ids exceed the id range"))?;
        }

        let uncarried: Vec<&[u8]> = UNCARRIED.iter().map(|name| name.as_bytes()).collect();
        let rewrite = |xml: &str| -> Result<String> {
            let xml = if UNCARRIED.iter().any(|name| xml.contains(name)) {
                remove_elements(xml, &uncarried)?
            } else {
                xml.to_string()
            };
            let xml = rewrite_attrs(&xml, |_, key, value| {
                if is_rel_attr(key) {
                    return rel_map.get(value).cloned();
                }
                if local_name(key) == b"id" && offset > 0 {
                    return value
                        .trim()
                        .parse::<u32>()
                        .ok()
                        .and_then(|id| id.checked_add(offset))
                        .map(|id| id.to_string());
                }
                None
            })?;
            remap_num_ids(&xml, &num_map)
        };

        let mut elements = Vec::with_capacity(sub.document.elements.len());
        for element in &sub.document.elements {
            elements.push(BodyElement {
                kind: element.kind,
                xml: rewrite(&element.xml).map_err(|e| Error::malformed(&sub.name, e))?,
            });
        }
        let final_section = match sub.document.final_sect_pr.as_deref() {
            Some(xml) => {
                let mut section = rewrite(xml)
                    .and_then(|xml| SectionProperties::parse(&xml))
                    .map_err(|e| Error::malformed(&sub.name, e))?;
                section.unlink_headers_footers();
                Some(section)
            }
            None => None,
        };
        Ok(Imported {
            elements,
            final_section,
        })
    }

    fn merge_numbering(&mut self, sub: &SubDocument) -> Result<HashMap<u32, u32>> {
        match sub.related_text(types::NUMBERING)? {
            Some(xml) => self.numbering.merge_from(&NumberingDefinitions::parse(&xml)?),
            None => Ok(HashMap::new()),
        }
    }

    /// Seed styles from the first document; later documents add only new ids
    fn merge_styles(
        &mut self,
        sub: &SubDocument,
        is_first: bool,
        num_map: &HashMap<u32, u32>,
    ) -> Result<()> {
        let Some(xml) = sub.related_text(types::STYLES)? else {
            return Ok(());
        };
        let xml = remap_num_ids(&xml, num_map)?;
        if is_first {
            self.style_ids = StyleSheet::parse(&xml)?.iter().map(|s| s.id.clone()).collect();
            self.styles_xml = xml;
            return Ok(());
        }

        let sheet = StyleSheet::parse(&xml)?;
        let mut added = 0;
        for style in sheet.iter() {
            if self.style_ids.insert(style.id.clone()) {
                self.imported_styles.push(style.xml.clone());
                added += 1;
            }
        }
        if added > 0 {
            debug!("Imported {} styles from {}", added, sub.name);
            self.styles_xml = declare_root_namespaces(&self.styles_xml, &root_namespaces(&xml)?)?;
        }
        Ok(())
    }

    fn merge_namespaces(&mut self, sub: &SubDocument) {
        for (prefix, uri) in sub.document.namespaces() {
            if let Some(existing) = self.document.declare_namespace(&prefix, &uri) {
                warn!(
                    "{}: namespace prefix {} is bound to {} here but {} in the composite",
                    sub.name, prefix, uri, existing
                );
            }
        }
        for prefix in sub.document.ignorable() {
            if !self.ignorable.contains(&prefix) {
                self.ignorable.push(prefix);
            }
        }
    }

    /// Theme and font table of the first document
    fn copy_shared_parts(&mut self, sub: &SubDocument) -> Result<()> {
        let mut copied = HashMap::new();
        for rel_type in [types::THEME, types::FONT_TABLE] {
            let Some(rel) = sub.rels.find_by_type(rel_type).filter(|r| !r.external) else {
                continue;
            };
            let source = resolve_target(&sub.main_part, &rel.target);
            if !sub.package.contains(&source) {
                continue;
            }
            let dest = self.copy_part(sub, &source, &mut copied)?;
            self.rels.add(rel_type, &relative_target(MAIN_PART, &dest), false);
        }
        Ok(())
    }

    /// Recreate one of the sub-document's relationships on the composite
    fn map_relationship(
        &mut self,
        sub: &SubDocument,
        old_id: &str,
        copied: &mut HashMap<String, String>,
    ) -> Result<Option<String>> {
        let Some(rel) = sub.rels.get(old_id) else {
            warn!("{}: reference to unknown relationship {}", sub.name, old_id);
            return Ok(None);
        };
        if rel.rel_type == types::HEADER || rel.rel_type == types::FOOTER {
            return Ok(None);
        }
        if rel.external {
            return Ok(Some(self.rels.add(&rel.rel_type, &rel.target, true)));
        }
        let source = resolve_target(&sub.main_part, &rel.target);
        let dest = self.copy_part(sub, &source, copied)?;
        Ok(Some(self.rels.add(
            &rel.rel_type,
            &relative_target(MAIN_PART, &dest),
            false,
        )))
    }

    /// Copy a part (and everything it references) under a free name
    fn copy_part(
        &mut self,
        sub: &SubDocument,
        source: &str,
        copied: &mut HashMap<String, String>,
    ) -> Result<String> {
        if let Some(dest) = copied.get(source) {
            return Ok(dest.clone());
        }
        let data = sub
            .package
            .part(source)
            .ok_or_else(|| Error::malformed(&sub.name, format!("missing part {}", source)))?
            .to_vec();
        let dest = self.package.unique_part_name(source);
        copied.insert(source.to_string(), dest.clone());
        self.package.set_part(&dest, data);
        if let Some(content_type) = sub.types.content_type(source) {
            self.types.adopt(&dest, content_type);
        }

        let part_rels = sub.package.relationships(source)?;
        if !part_rels.is_empty() {
            let mut dest_rels = Relationships::default();
            for rel in part_rels.iter() {
                let target_part = resolve_target(source, &rel.target);
                if rel.external || !sub.package.contains(&target_part) {
                    dest_rels.insert(rel.clone());
                    continue;
                }
                let target_dest = self.copy_part(sub, &target_part, copied)?;
                dest_rels.insert(Relationship {
                    target: relative_target(&dest, &target_dest),
                    ..rel.clone()
                });
            }
            self.package.set_relationships(&dest, &dest_rels);
        }
        Ok(dest)
    }

    fn finish(
        mut self,
        elements: Vec<BodyElement>,
        final_section: Option<SectionProperties>,
    ) -> Result<DocxPackage> {
        for (id, xml) in reserved_styles() {
            if self.style_ids.insert(id.to_string()) {
                self.imported_styles.push(xml);
            }
        }
        let styles = append_styles(&self.styles_xml, &self.imported_styles);
        self.package.set_part("word/styles.xml", styles.into_bytes());

        if !self.numbering.is_empty() {
            self.package
                .set_part("word/numbering.xml", self.numbering.to_xml().into_bytes());
            self.rels.add(types::NUMBERING, "numbering.xml", false);
            self.types
                .set_override("word/numbering.xml", content_types::NUMBERING);
        }

        self.document.set_ignorable(&self.ignorable);
        self.document.elements = elements;
        let final_section = final_section
            .unwrap_or_else(|| SectionProperties::with_geometry(&Default::default()));
        self.document.final_sect_pr = Some(final_section.to_xml());
        self.package.set_part(MAIN_PART, self.document.to_xml().into_bytes());

        self.package.set_relationships(MAIN_PART, &self.rels);
        self.package.set_content_types(&self.types);
        Ok(self.package)
    }
}
