//! `[Content_Types].xml` handling

use quick_xml::events::Event;
use quick_xml::Reader;

use super::xml::{attr_local, escape, local_name, CT_NS, XML_DECL};
use crate::error::Result;

pub const DOCUMENT_MAIN: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
pub const STYLES: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
pub const SETTINGS: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml";
pub const NUMBERING: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml";
pub const FOOTER: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml";
pub const RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";

/// Default (by extension) and override (by part name) content types
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut types = Self::default();
        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) => match local_name(e.name().as_ref()) {
                    b"Default" => {
                        if let (Some(ext), Some(ct)) =
                            (attr_local(&e, b"Extension"), attr_local(&e, b"ContentType"))
                        {
                            types.defaults.push((ext.to_ascii_lowercase(), ct));
                        }
                    }
                    b"Override" => {
                        if let (Some(name), Some(ct)) =
                            (attr_local(&e, b"PartName"), attr_local(&e, b"ContentType"))
                        {
                            types.overrides.push((name.trim_start_matches('/').to_string(), ct));
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(types)
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from(XML_DECL);
        xml.push_str(&format!("<Types xmlns=\"{}\">", CT_NS));
        for (ext, ct) in &self.defaults {
            xml.push_str(&format!(
                "<Default Extension=\"{}\" ContentType=\"{}\"/>",
                escape(ext),
                escape(ct)
            ));
        }
        for (name, ct) in &self.overrides {
            xml.push_str(&format!(
                "<Override PartName=\"/{}\" ContentType=\"{}\"/>",
                escape(name),
                escape(ct)
            ));
        }
        xml.push_str("</Types>");
        xml
    }

    /// Content type of a part: its override, else the default for its extension
    pub fn content_type(&self, part: &str) -> Option<&str> {
        if let Some((_, ct)) = self.overrides.iter().find(|(name, _)| name.eq_ignore_ascii_case(part)) {
            return Some(ct);
        }
        let ext = part.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase())?;
        self.defaults
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, ct)| ct.as_str())
    }

    pub fn ensure_default(&mut self, ext: &str, content_type: &str) {
        let ext = ext.to_ascii_lowercase();
        if !self.defaults.iter().any(|(e, _)| *e == ext) {
            self.defaults.push((ext, content_type.to_string()));
        }
    }

    pub fn set_override(&mut self, part: &str, content_type: &str) {
        self.overrides.retain(|(name, _)| !name.eq_ignore_ascii_case(part));
        self.overrides.push((part.to_string(), content_type.to_string()));
    }

    /// Register `content_type` for a newly added part
    ///
    /// Binary media get an extension default when none exists yet; XML parts
    /// and anything that disagrees with an existing default get an override.
    pub fn adopt(&mut self, part: &str, content_type: &str) {
        if self.content_type(part) == Some(content_type) {
            return;
        }
        match part.rsplit_once('.') {
            Some((_, ext))
                if !ext.eq_ignore_ascii_case("xml")
                    && !self.defaults.iter().any(|(e, _)| e.eq_ignore_ascii_case(ext)) =>
            {
                self.ensure_default(ext, content_type)
            }
            _ => self.set_override(part, content_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPES: &str = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="PNG" ContentType="image/png"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

    #[test]
    fn test_lookup() {
        let types = ContentTypes::parse(TYPES).unwrap();
        assert_eq!(types.content_type("word/document.xml"), Some(DOCUMENT_MAIN));
        assert_eq!(types.content_type("word/media/image1.png"), Some("image/png"));
        assert_eq!(types.content_type("word/media/image1.emf"), None);
    }

    #[test]
    fn test_adopt_prefers_defaults() {
        let mut types = ContentTypes::parse(TYPES).unwrap();
        types.adopt("word/media/image2.jpeg", "image/jpeg");
        types.adopt("word/footer1.xml", FOOTER);
        let xml = types.to_xml();
        assert!(xml.contains("<Default Extension=\"jpeg\" ContentType=\"image/jpeg\"/>"));
        assert!(xml.contains("<Override PartName=\"/word/footer1.xml\""));
    }
}
