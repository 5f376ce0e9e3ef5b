//! Main document part split into root, body elements and final section

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::xml::{escape, local_name, position, skip_element, unescape_raw, MC_NS, R_NS};
use crate::error::{Error, Result};

/// Coarse kind of a body-level element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Paragraph,
    Table,
    Other,
}

/// One body-level element kept as raw markup
#[derive(Debug, Clone, PartialEq)]
pub struct BodyElement {
    pub kind: ElementKind,
    pub xml: String,
}

impl BodyElement {
    pub fn paragraph(xml: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Paragraph,
            xml: xml.into(),
        }
    }
}

/// `word/document.xml`, taken apart just enough to splice bodies together
#[derive(Debug, Clone)]
pub struct DocumentXml {
    /// XML declaration and anything else before the root element
    pub prolog: String,
    /// Qualified root name, usually `w:document`
    pub root_name: String,
    /// Root attributes, decoded, in document order (namespace declarations included)
    pub root_attrs: Vec<(String, String)>,
    /// Raw siblings of the body inside the root (e.g. `w:background`)
    pub before_body: String,
    /// Qualified body name, usually `w:body`
    pub body_name: String,
    pub elements: Vec<BodyElement>,
    /// Body-level `w:sectPr` closing the last section
    pub final_sect_pr: Option<String>,
}

impl DocumentXml {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut doc = DocumentXml {
            prolog: String::new(),
            root_name: String::new(),
            root_attrs: Vec::new(),
            before_body: String::new(),
            body_name: String::new(),
            elements: Vec::new(),
            final_sect_pr: None,
        };

        // Root element
        loop {
            let start = position(&reader);
            match reader.read_event()? {
                Event::Start(e) => {
                    doc.prolog = xml[..start].to_string();
                    doc.root_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    doc.root_attrs = decoded_attrs(&e);
                    break;
                }
                Event::Eof => return Err(Error::MissingPart("document root element".into())),
                _ => {}
            }
        }

        // Children of the root up to and including the body
        loop {
            let start = position(&reader);
            match reader.read_event()? {
                Event::Start(e) if local_name(e.name().as_ref()) == b"body" => {
                    doc.body_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    break;
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"body" => {
                    doc.body_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    return Ok(doc);
                }
                Event::Start(_) => {
                    skip_element(&mut reader)?;
                    doc.before_body.push_str(&xml[start..position(&reader)]);
                }
                Event::Empty(_) => doc.before_body.push_str(&xml[start..position(&reader)]),
                Event::End(_) | Event::Eof => {
                    return Err(Error::MissingPart("document body".into()));
                }
                _ => {}
            }
        }

        // Body children
        loop {
            let start = position(&reader);
            let (kind, is_start) = match reader.read_event()? {
                Event::Start(e) => (kind_of(e.name().as_ref()), true),
                Event::Empty(e) => (kind_of(e.name().as_ref()), false),
                Event::End(_) | Event::Eof => break,
                _ => continue,
            };
            if is_start {
                skip_element(&mut reader)?;
            }
            let raw = &xml[start..position(&reader)];
            match kind {
                Some(kind) => doc.elements.push(BodyElement {
                    kind,
                    xml: raw.to_string(),
                }),
                None => doc.final_sect_pr = Some(raw.to_string()),
            }
        }

        Ok(doc)
    }

    /// A document with the given root namespaces and no content
    pub fn empty(namespaces: &[(String, String)]) -> Self {
        Self {
            prolog: super::xml::XML_DECL.to_string(),
            root_name: "w:document".to_string(),
            root_attrs: namespaces
                .iter()
                .map(|(prefix, uri)| (format!("xmlns:{}", prefix), uri.clone()))
                .collect(),
            before_body: String::new(),
            body_name: "w:body".to_string(),
            elements: Vec::new(),
            final_sect_pr: None,
        }
    }

    /// `(prefix, uri)` for every namespace declared on the root
    pub fn namespaces(&self) -> Vec<(String, String)> {
        self.root_attrs
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix("xmlns:")
                    .map(|prefix| (prefix.to_string(), value.clone()))
            })
            .collect()
    }

    /// Prefixes listed in `mc:Ignorable`
    pub fn ignorable(&self) -> Vec<String> {
        let mc_prefix = self.prefix_for(MC_NS);
        self.root_attrs
            .iter()
            .filter(|(key, _)| {
                key.rsplit_once(':')
                    .is_some_and(|(p, local)| local == "Ignorable" && Some(p) == mc_prefix.as_deref())
            })
            .flat_map(|(_, value)| value.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    /// Prefix bound to a namespace URI on the root
    pub fn prefix_for(&self, uri: &str) -> Option<String> {
        self.namespaces()
            .into_iter()
            .find(|(_, u)| u == uri)
            .map(|(prefix, _)| prefix)
    }

    /// Prefixes whose attributes carry relationship ids
    pub fn relationship_prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self
            .namespaces()
            .into_iter()
            .filter(|(_, uri)| uri == R_NS)
            .map(|(prefix, _)| prefix)
            .collect();
        if !prefixes.iter().any(|p| p == "r") {
            prefixes.push("r".to_string());
        }
        prefixes
    }

    /// Declare a namespace on the root unless the prefix is already bound
    ///
    /// Returns the URI already bound to the prefix when it differs.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) -> Option<String> {
        let key = format!("xmlns:{}", prefix);
        match self.root_attrs.iter().find(|(k, _)| *k == key) {
            Some((_, existing)) if existing == uri => None,
            Some((_, existing)) => Some(existing.clone()),
            None => {
                self.root_attrs.push((key, uri.to_string()));
                None
            }
        }
    }

    /// Set `mc:Ignorable` to the given prefixes (declaring `mc` if needed)
    pub fn set_ignorable(&mut self, prefixes: &[String]) {
        let declared: Vec<String> = self.namespaces().into_iter().map(|(p, _)| p).collect();
        let usable: Vec<&str> = prefixes
            .iter()
            .filter(|p| declared.contains(p))
            .map(String::as_str)
            .collect();
        if usable.is_empty() {
            return;
        }
        let mc = match self.prefix_for(MC_NS) {
            Some(prefix) => prefix,
            None => {
                self.declare_namespace("mc", MC_NS);
                "mc".to_string()
            }
        };
        let key = format!("{}:Ignorable", mc);
        let value = usable.join(" ");
        match self.root_attrs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.root_attrs.push((key, value)),
        }
    }

    pub fn to_xml(&self) -> String {
        let capacity: usize = self.elements.iter().map(|e| e.xml.len()).sum::<usize>() + 1024;
        let mut xml = String::with_capacity(capacity);
        xml.push_str(&self.prolog);
        xml.push('<');
        xml.push_str(&self.root_name);
        for (key, value) in &self.root_attrs {
            xml.push_str(&format!(" {}=\"{}\"", key, escape(value)));
        }
        xml.push('>');
        xml.push_str(&self.before_body);
        xml.push_str(&format!("<{}>", self.body_name));
        for element in &self.elements {
            xml.push_str(&element.xml);
        }
        if let Some(sect_pr) = &self.final_sect_pr {
            xml.push_str(sect_pr);
        }
        xml.push_str(&format!("</{}></{}>", self.body_name, self.root_name));
        xml
    }
}

/// `None` marks the body-level `w:sectPr`
fn kind_of(name: &[u8]) -> Option<ElementKind> {
    match local_name(name) {
        b"p" => Some(ElementKind::Paragraph),
        b"tbl" => Some(ElementKind::Table),
        b"sectPr" => None,
        _ => Some(ElementKind::Other),
    }
}

fn decoded_attrs(e: &BytesStart) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|a| {
            (
                String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                unescape_raw(&a.value),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::xml::W_NS;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:wpc="http://schemas.microsoft.com/office/word/2010/wordprocessingCanvas" xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:w14="http://schemas.microsoft.com/office/word/2010/wordml" mc:Ignorable="w14"><w:background w:color="FFFFFF"/><w:body><w:p><w:r><w:t>One</w:t></w:r></w:p>
<w:tbl><w:tr><w:tc><w:p/></w:tc></w:tr></w:tbl><w:sdt><w:sdtContent/></w:sdt><w:sectPr><w:pgSz w:w="12240" w:h="15840"/></w:sectPr></w:body></w:document>"#;

    #[test]
    fn test_parse_document() {
        let doc = DocumentXml::parse(DOC).unwrap();
        assert_eq!(doc.root_name, "w:document");
        assert_eq!(doc.body_name, "w:body");
        assert_eq!(doc.before_body, r#"<w:background w:color="FFFFFF"/>"#);
        let kinds: Vec<ElementKind> = doc.elements.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ElementKind::Paragraph, ElementKind::Table, ElementKind::Other]);
        assert_eq!(doc.elements[0].xml, "<w:p><w:r><w:t>One</w:t></w:r></w:p>");
        assert_eq!(
            doc.final_sect_pr.as_deref(),
            Some(r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/></w:sectPr>"#)
        );
    }

    #[test]
    fn test_namespaces_and_ignorable() {
        let doc = DocumentXml::parse(DOC).unwrap();
        assert_eq!(doc.prefix_for(W_NS).as_deref(), Some("w"));
        assert_eq!(doc.ignorable(), vec!["w14".to_string()]);
        assert_eq!(doc.relationship_prefixes(), vec!["r".to_string()]);
    }

    #[test]
    fn test_round_trip_is_stable() {
        let doc = DocumentXml::parse(DOC).unwrap();
        let reparsed = DocumentXml::parse(&doc.to_xml()).unwrap();
        assert_eq!(reparsed.elements, doc.elements);
        assert_eq!(reparsed.final_sect_pr, doc.final_sect_pr);
        assert_eq!(reparsed.root_attrs, doc.root_attrs);
    }

    #[test]
    fn test_declare_namespace_reports_conflicts() {
        let mut doc = DocumentXml::empty(&[("w".to_string(), W_NS.to_string())]);
        assert_eq!(doc.declare_namespace("w", W_NS), None);
        assert_eq!(doc.declare_namespace("r", R_NS), None);
        assert_eq!(doc.declare_namespace("w", "urn:other"), Some(W_NS.to_string()));
    }

    #[test]
    fn test_set_ignorable_declares_mc() {
        let mut doc = DocumentXml::empty(&[
            ("w".to_string(), W_NS.to_string()),
            ("w14".to_string(), "http://schemas.microsoft.com/office/word/2010/wordml".to_string()),
        ]);
        doc.set_ignorable(&["w14".to_string(), "w15".to_string()]);
        assert_eq!(doc.prefix_for(MC_NS).as_deref(), Some("mc"));
        assert_eq!(doc.ignorable(), vec!["w14".to_string()]);
    }
}
