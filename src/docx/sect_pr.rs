//! Section properties (`w:sectPr`)

use quick_xml::events::Event;
use quick_xml::Reader;

use super::xml::{attr_local, escape, local_name, position, prefix, skip_element, top_level_elements, unescape_raw, visit_attrs};
use crate::error::{Error, Result};
use crate::layout::{Length, Margins, PageDimensions, PageGeometry};

/// Child order mandated by the WordprocessingML schema
const CHILD_ORDER: &[&str] = &[
    "headerReference",
    "footerReference",
    "footnotePr",
    "endnotePr",
    "type",
    "pgSz",
    "pgMar",
    "paperSrc",
    "pgBorders",
    "lnNumType",
    "pgNumType",
    "cols",
    "formProt",
    "vAlign",
    "noEndnote",
    "titlePg",
    "textDirection",
    "bidi",
    "rtlGutter",
    "docGrid",
    "printerSettings",
    "sectPrChange",
];

fn order_of(local: &str) -> usize {
    CHILD_ORDER
        .iter()
        .position(|name| *name == local)
        .unwrap_or(CHILD_ORDER.len())
}

#[derive(Debug, Clone, PartialEq)]
struct Child {
    local: String,
    xml: String,
}

/// A parsed `w:sectPr` whose children can be edited individually
#[derive(Debug, Clone, PartialEq)]
pub struct SectionProperties {
    /// Namespace prefix used for the element and generated children
    prefix: String,
    /// Raw attributes of the start tag (` w:rsidR="..."`), kept verbatim
    attrs: String,
    children: Vec<Child>,
}

impl SectionProperties {
    /// Parse a raw `<w:sectPr>` element
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        loop {
            let start = position(&reader);
            let (name, empty) = match reader.read_event()? {
                Event::Start(e) => (e.name().as_ref().to_vec(), false),
                Event::Empty(e) => (e.name().as_ref().to_vec(), true),
                Event::Eof => return Err(Error::MissingPart("sectPr element".into())),
                _ => continue,
            };
            if local_name(&name) != b"sectPr" {
                return Err(Error::MissingPart("sectPr element".into()));
            }
            let tag_end = position(&reader);
            let tag = &xml[start..tag_end];
            let name_len = name.len() + 1;
            let attrs = tag[name_len..tag.len() - if empty { 2 } else { 1 }].to_string();
            let prefix = prefix(&name)
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .unwrap_or_default();

            let mut children = Vec::new();
            if !empty {
                skip_element(&mut reader)?;
                let inner_end = xml[..position(&reader)].rfind("</").unwrap_or(tag_end);
                for child in top_level_elements(&xml[tag_end..inner_end])? {
                    let local = child_local(child);
                    children.push(Child {
                        local,
                        xml: child.to_string(),
                    });
                }
            }
            return Ok(Self {
                prefix,
                attrs,
                children,
            });
        }
    }

    /// Empty section properties using the `w` prefix
    pub fn new() -> Self {
        Self {
            prefix: "w".to_string(),
            attrs: String::new(),
            children: Vec::new(),
        }
    }

    /// Section properties carrying the given page size and margins
    pub fn with_geometry(geometry: &PageGeometry) -> Self {
        let mut props = Self::new();
        props.set_geometry(geometry);
        props
    }

    fn qualified(&self, local: &str) -> String {
        if self.prefix.is_empty() {
            local.to_string()
        } else {
            format!("{}:{}", self.prefix, local)
        }
    }

    #[cfg(test)]
    fn has(&self, local: &str) -> bool {
        self.children.iter().any(|c| c.local == local)
    }

    pub fn child(&self, local: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.local == local)
            .map(|c| c.xml.as_str())
    }

    /// Remove every child with this local name; returns how many were removed
    pub fn remove(&mut self, local: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|c| c.local != local);
        before - self.children.len()
    }

    /// Insert a child in schema order, replacing an existing one of the same name
    pub fn set(&mut self, local: &str, xml: String) {
        if let Some(existing) = self.children.iter_mut().find(|c| c.local == local) {
            existing.xml = xml;
            return;
        }
        self.insert(local, xml);
    }

    fn insert(&mut self, local: &str, xml: String) {
        let order = order_of(local);
        let at = self
            .children
            .iter()
            .position(|c| order_of(&c.local) > order)
            .unwrap_or(self.children.len());
        self.children.insert(
            at,
            Child {
                local: local.to_string(),
                xml,
            },
        );
    }

    /// Drop header and footer references so the section links to the previous one
    pub fn unlink_headers_footers(&mut self) -> usize {
        self.remove("headerReference") + self.remove("footerReference")
    }

    /// Attach a footer part (by relationship id) to this section
    pub fn set_footer_reference(&mut self, kind: &str, rel_id: &str, r_prefix: &str) {
        let xml = format!(
            "<{} {}=\"{}\" {}:id=\"{}\"/>",
            self.qualified("footerReference"),
            self.qualified("type"),
            escape(kind),
            r_prefix,
            escape(rel_id)
        );
        self.children
            .retain(|c| !(c.local == "footerReference" && c.xml.contains(&format!("\"{}\"", kind))));
        self.insert("footerReference", xml);
    }

    /// Start value of page numbering, if this section restarts it
    pub fn restart(&self) -> Option<u32> {
        let pg_num = self.child("pgNumType")?;
        let mut reader = Reader::from_str(pg_num);
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    return attr_local(&e, b"start").and_then(|v| v.trim().parse().ok());
                }
                Ok(Event::Eof) | Err(_) => return None,
                _ => {}
            }
        }
    }

    /// Remove any numbering restart; returns true if one was present
    ///
    /// Other `pgNumType` attributes (format, chapter style) are kept; the
    /// element is dropped when nothing is left on it.
    pub fn strip_restart(&mut self) -> Result<bool> {
        if !self.pg_num_type_has_start()? {
            return Ok(false);
        }
        let Some(pg_num) = self.child("pgNumType").map(str::to_string) else {
            return Ok(false);
        };
        let stripped = strip_attribute(&pg_num, b"start")?;
        if is_bare_element(&stripped) {
            self.remove("pgNumType");
        } else {
            self.set("pgNumType", stripped);
        }
        Ok(true)
    }

    fn pg_num_type_has_start(&self) -> Result<bool> {
        let mut found = false;
        if let Some(pg_num) = self.child("pgNumType") {
            visit_attrs(pg_num, |_, key, _| found |= local_name(key) == b"start")?;
        }
        Ok(found)
    }

    /// Restart page numbering at `start`
    pub fn set_restart(&mut self, start: u32) -> Result<()> {
        let attr = self.qualified("start");
        let xml = match self.child("pgNumType").map(str::to_string) {
            Some(existing) => {
                let stripped = strip_attribute(&existing, b"start")?;
                add_attribute(&stripped, &attr, &start.to_string())
            }
            None => format!("<{} {}=\"{}\"/>", self.qualified("pgNumType"), attr, start),
        };
        self.set("pgNumType", xml);
        Ok(())
    }

    /// Section start type (`nextPage` when absent)
    #[cfg(test)]
    fn section_type(&self) -> String {
        self.child("type")
            .and_then(|xml| {
                let mut reader = Reader::from_str(xml);
                match reader.read_event() {
                    Ok(Event::Empty(e)) | Ok(Event::Start(e)) => attr_local(&e, b"val"),
                    _ => None,
                }
            })
            .unwrap_or_else(|| "nextPage".to_string())
    }

    pub fn set_section_type(&mut self, value: &str) {
        let xml = format!(
            "<{} {}=\"{}\"/>",
            self.qualified("type"),
            self.qualified("val"),
            escape(value)
        );
        self.set("type", xml);
    }

    /// Page size and margins, falling back to A4 with one-inch margins
    pub fn geometry(&self) -> PageGeometry {
        let mut geometry = PageGeometry::default();
        if let Some(xml) = self.child("pgSz") {
            let w = twips_attr(xml, b"w");
            let h = twips_attr(xml, b"h");
            if let (Some(w), Some(h)) = (w, h) {
                geometry.page = PageDimensions {
                    width: Length::from_twips(w),
                    height: Length::from_twips(h),
                };
            }
        }
        if let Some(xml) = self.child("pgMar") {
            let side = |key: &[u8], fallback: Length| twips_attr(xml, key).map_or(fallback, Length::from_twips);
            geometry.margins = Margins {
                top: side(b"top", geometry.margins.top),
                bottom: side(b"bottom", geometry.margins.bottom),
                left: side(b"left", geometry.margins.left),
                right: side(b"right", geometry.margins.right),
            };
        }
        geometry
    }

    /// Copy page size and margins into this section
    pub fn set_geometry(&mut self, geometry: &PageGeometry) {
        let pg_sz = format!(
            "<{} {}=\"{}\" {}=\"{}\"/>",
            self.qualified("pgSz"),
            self.qualified("w"),
            geometry.page.width.twips(),
            self.qualified("h"),
            geometry.page.height.twips()
        );
        let m = &geometry.margins;
        let pg_mar = format!(
            "<{} {}=\"{}\" {}=\"{}\" {}=\"{}\" {}=\"{}\" {}=\"708\" {}=\"708\" {}=\"0\"/>",
            self.qualified("pgMar"),
            self.qualified("top"),
            m.top.twips(),
            self.qualified("right"),
            m.right.twips(),
            self.qualified("bottom"),
            m.bottom.twips(),
            self.qualified("left"),
            m.left.twips(),
            self.qualified("header"),
            self.qualified("footer"),
            self.qualified("gutter"),
        );
        self.set("pgSz", pg_sz);
        self.set("pgMar", pg_mar);
    }

    /// Copy only the page layout children (size, margins, columns, grid)
    pub fn layout_only(&self) -> Self {
        let keep = ["pgSz", "pgMar", "cols", "docGrid"];
        Self {
            prefix: self.prefix.clone(),
            attrs: String::new(),
            children: self
                .children
                .iter()
                .filter(|c| keep.contains(&c.local.as_str()))
                .cloned()
                .collect(),
        }
    }

    pub fn to_xml(&self) -> String {
        let name = self.qualified("sectPr");
        if self.children.is_empty() {
            return format!("<{}{}/>", name, self.attrs);
        }
        let mut xml = format!("<{}{}>", name, self.attrs);
        for child in &self.children {
            xml.push_str(&child.xml);
        }
        xml.push_str(&format!("</{}>", name));
        xml
    }
}

impl Default for SectionProperties {
    fn default() -> Self {
        Self::new()
    }
}

fn child_local(xml: &str) -> String {
    let name_end = xml[1..]
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .map_or(xml.len(), |i| i + 1);
    let qualified = &xml[1..name_end];
    String::from_utf8_lossy(local_name(qualified.as_bytes())).into_owned()
}

fn twips_attr(xml: &str, key: &[u8]) -> Option<i64> {
    let mut reader = Reader::from_str(xml);
    match reader.read_event() {
        Ok(Event::Empty(e)) | Ok(Event::Start(e)) => attr_local(&e, key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|v| v.round() as i64),
        _ => None,
    }
}

/// Drop one attribute (by local name) from a single element
fn strip_attribute(xml: &str, local: &[u8]) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    loop {
        let start = position(&reader);
        let event = reader.read_event()?;
        let end = position(&reader);
        match event {
            Event::Start(e) | Event::Empty(e) => {
                let empty = xml[start..end].ends_with("/>");
                out.push('<');
                out.push_str(&String::from_utf8_lossy(e.name().as_ref()));
                for attr in e.attributes().flatten() {
                    if local_name(attr.key.as_ref()) == local {
                        continue;
                    }
                    out.push_str(&format!(
                        " {}=\"{}\"",
                        String::from_utf8_lossy(attr.key.as_ref()),
                        escape(&unescape_raw(&attr.value))
                    ));
                }
                out.push_str(if empty { "/>" } else { ">" });
            }
            Event::Eof => break,
            _ => out.push_str(&xml[start..end]),
        }
    }
    Ok(out)
}

fn add_attribute(xml: &str, key: &str, value: &str) -> String {
    let close = if xml.trim_end().ends_with("/>") {
        xml.rfind("/>")
    } else {
        xml.find('>')
    };
    match close {
        Some(at) => format!("{} {}=\"{}\"{}", &xml[..at], key, escape(value), &xml[at..]),
        None => xml.to_string(),
    }
}

fn is_bare_element(xml: &str) -> bool {
    let trimmed = xml.trim();
    trimmed.ends_with("/>") && !trimmed.contains('=')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SECT: &str = r#"<w:sectPr w:rsidR="00A1"><w:headerReference w:type="default" r:id="rId8"/><w:footerReference w:type="default" r:id="rId9"/><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1800" w:bottom="1440" w:left="1800" w:header="720" w:footer="720" w:gutter="0"/><w:pgNumType w:fmt="lowerRoman" w:start="3"/><w:cols w:space="720"/><w:titlePg/></w:sectPr>"#;

    #[test]
    fn test_parse_children() {
        let props = SectionProperties::parse(SECT).unwrap();
        assert!(props.has("headerReference"));
        assert!(props.has("titlePg"));
        assert_eq!(props.restart(), Some(3));
        assert_eq!(props.section_type(), "nextPage");
    }

    #[test]
    fn test_round_trip_keeps_attrs() {
        let props = SectionProperties::parse(SECT).unwrap();
        assert_eq!(props.to_xml(), SECT);
    }

    #[test]
    fn test_strip_restart_keeps_format() {
        let mut props = SectionProperties::parse(SECT).unwrap();
        assert!(props.strip_restart().unwrap());
        assert_eq!(props.restart(), None);
        assert_eq!(props.child("pgNumType"), Some(r#"<w:pgNumType w:fmt="lowerRoman"/>"#));
        assert!(!props.strip_restart().unwrap());
    }

    #[test]
    fn test_strip_restart_drops_bare_element() {
        let mut props =
            SectionProperties::parse(r#"<w:sectPr><w:pgNumType w:start="1"/></w:sectPr>"#).unwrap();
        assert!(props.strip_restart().unwrap());
        assert!(!props.has("pgNumType"));
    }

    #[test]
    fn test_set_restart_in_schema_order() {
        let mut props = SectionProperties::parse(
            r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:cols w:space="708"/></w:sectPr>"#,
        )
        .unwrap();
        props.set_restart(1).unwrap();
        props.set_section_type("nextPage");
        assert_eq!(
            props.to_xml(),
            r#"<w:sectPr><w:type w:val="nextPage"/><w:pgSz w:w="11906" w:h="16838"/><w:pgNumType w:start="1"/><w:cols w:space="708"/></w:sectPr>"#
        );
    }

    #[test]
    fn test_unlink_and_attach_footer() {
        let mut props = SectionProperties::parse(SECT).unwrap();
        assert_eq!(props.unlink_headers_footers(), 2);
        props.set_footer_reference("default", "rId42", "r");
        let xml = props.to_xml();
        assert!(xml.starts_with(r#"<w:sectPr w:rsidR="00A1"><w:footerReference w:type="default" r:id="rId42"/>"#));
    }

    #[test]
    fn test_geometry() {
        let props = SectionProperties::parse(SECT).unwrap();
        let geometry = props.geometry();
        assert_eq!(geometry.page.width.twips(), 12240);
        assert_eq!(geometry.margins.left.twips(), 1800);
        assert_eq!(geometry.text_width().twips(), 12240 - 3600);
    }

    #[test]
    fn test_empty_sect_pr() {
        let props = SectionProperties::parse("<w:sectPr/>").unwrap();
        assert_eq!(props.to_xml(), "<w:sectPr/>");
        assert_eq!(props.geometry(), PageGeometry::default());
    }

    #[test]
    fn test_layout_only() {
        let props = SectionProperties::parse(SECT).unwrap().layout_only();
        assert!(props.has("pgSz") && props.has("pgMar") && props.has("cols"));
        assert!(!props.has("footerReference") && !props.has("pgNumType") && !props.has("titlePg"));
    }
}
