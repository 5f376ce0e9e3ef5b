//! Package relationships (`*.rels` parts)

use quick_xml::events::Event;
use quick_xml::Reader;

use super::xml::{attr_local, escape, local_name, PKG_REL_NS, XML_DECL};
use crate::error::Result;

/// Relationship type URIs used by the composer
pub mod types {
    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
    pub const NUMBERING: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering";
    pub const SETTINGS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/settings";
    pub const THEME: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";
    pub const FONT_TABLE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/fontTable";
    pub const FOOTER: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
    pub const HEADER: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
}

/// One relationship entry
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// The relationships of a single source part
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    entries: Vec<Relationship>,
}

impl Relationships {
    /// Parse a `.rels` part
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut entries = Vec::new();
        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"Relationship" => {
                    let id = attr_local(&e, b"Id").unwrap_or_default();
                    let rel_type = attr_local(&e, b"Type").unwrap_or_default();
                    let target = attr_local(&e, b"Target").unwrap_or_default();
                    let external = attr_local(&e, b"TargetMode")
                        .is_some_and(|mode| mode.eq_ignore_ascii_case("External"));
                    entries.push(Relationship {
                        id,
                        rel_type,
                        target,
                        external,
                    });
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(Self { entries })
    }

    /// Serialize back to a `.rels` part
    pub fn to_xml(&self) -> String {
        let mut xml = String::from(XML_DECL);
        xml.push_str(&format!("<Relationships xmlns=\"{}\">", PKG_REL_NS));
        for rel in &self.entries {
            xml.push_str(&format!(
                "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"{}/>",
                escape(&rel.id),
                escape(&rel.rel_type),
                escape(&rel.target),
                if rel.external { " TargetMode=\"External\"" } else { "" }
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.entries.iter().find(|r| r.id == id)
    }

    pub fn find_by_type(&self, rel_type: &str) -> Option<&Relationship> {
        self.entries.iter().find(|r| r.rel_type == rel_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a relationship under a fresh `rIdN` and return the id
    pub fn add(&mut self, rel_type: &str, target: &str, external: bool) -> String {
        let next = self
            .entries
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
            .max()
            .unwrap_or(0)
            + 1;
        let mut id = format!("rId{}", next);
        let mut bump = next;
        while self.get(&id).is_some() {
            bump += 1;
            id = format!("rId{}", bump);
        }
        self.entries.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external,
        });
        id
    }

    /// Add a relationship keeping a caller-chosen id
    pub fn insert(&mut self, rel: Relationship) {
        self.entries.retain(|r| r.id != rel.id);
        self.entries.push(rel);
    }
}

/// Name of the `.rels` part that belongs to a source part
///
/// `word/document.xml` → `word/_rels/document.xml.rels`
pub fn rels_part_name(part: &str) -> String {
    match part.rfind('/') {
        Some(i) => format!("{}/_rels/{}.rels", &part[..i], &part[i + 1..]),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against its source part into a part name
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match source_part.rfind('/') {
        Some(i) => source_part[..i].split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Express a part name as a target relative to a source part's folder
pub fn relative_target(source_part: &str, part: &str) -> String {
    let base = match source_part.rfind('/') {
        Some(i) => &source_part[..=i],
        None => "",
    };
    match part.strip_prefix(base) {
        Some(rest) => rest.to_string(),
        None => format!("/{}", part),
    }
}
