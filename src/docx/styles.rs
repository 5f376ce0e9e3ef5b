//! Style definitions (`word/styles.xml`)

use quick_xml::events::Event;
use quick_xml::Reader;

use super::xml::{attr_local, find_element, insert_before_root_end, local_name, position, skip_element};
use crate::error::Result;

/// One `w:style` definition
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub id: String,
    /// Display name (`w:name`), e.g. "heading 1"
    pub name: Option<String>,
    /// `paragraph`, `character`, `table` or `numbering`
    pub kind: String,
    pub xml: String,
}

/// The style table of a document
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    styles: Vec<Style>,
}

impl StyleSheet {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut styles = Vec::new();
        let mut depth = 0usize;
        loop {
            let start = position(&reader);
            match reader.read_event()? {
                Event::Start(e) if depth == 1 && local_name(e.name().as_ref()) == b"style" => {
                    let id = attr_local(&e, b"styleId").unwrap_or_default();
                    let kind = attr_local(&e, b"type").unwrap_or_else(|| "paragraph".to_string());
                    skip_element(&mut reader)?;
                    let raw = &xml[start..position(&reader)];
                    styles.push(Style {
                        id,
                        name: style_name(raw)?,
                        kind,
                        xml: raw.to_string(),
                    });
                }
                Event::Empty(e) if depth == 1 && local_name(e.name().as_ref()) == b"style" => {
                    styles.push(Style {
                        id: attr_local(&e, b"styleId").unwrap_or_default(),
                        name: None,
                        kind: attr_local(&e, b"type").unwrap_or_else(|| "paragraph".to_string()),
                        xml: xml[start..position(&reader)].to_string(),
                    });
                }
                Event::Start(_) if depth >= 1 => skip_element(&mut reader)?,
                Event::Start(_) => depth += 1,
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(Self { styles })
    }

    pub fn get(&self, id: &str) -> Option<&Style> {
        self.styles.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Display name of a style, if it has one
    pub fn display_name(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(|s| s.name.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Style> {
        self.styles.iter()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

fn style_name(style_xml: &str) -> Result<Option<String>> {
    let Some(range) = find_element(style_xml, b"name")? else {
        return Ok(None);
    };
    let mut reader = Reader::from_str(&style_xml[range]);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => return Ok(attr_local(&e, b"val")),
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Append style definitions to a styles part
pub fn append_styles(styles_xml: &str, additions: &[String]) -> String {
    if additions.is_empty() {
        return styles_xml.to_string();
    }
    insert_before_root_end(styles_xml, &additions.concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:docDefaults><w:rPrDefault><w:rPr><w:sz w:val="22"/></w:rPr></w:rPrDefault></w:docDefaults>
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
  <w:style w:type="paragraph" w:styleId="berschrift1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/></w:style>
  <w:style w:type="character" w:styleId="Emph"/>
</w:styles>"#;

    #[test]
    fn test_parse_styles() {
        let sheet = StyleSheet::parse(STYLES).unwrap();
        assert_eq!(sheet.len(), 3);
        assert_eq!(sheet.display_name("berschrift1"), Some("heading 1"));
        assert_eq!(sheet.get("Emph").unwrap().kind, "character");
        assert_eq!(sheet.display_name("Emph"), None);
        assert!(!sheet.contains("Heading1"));
    }

    #[test]
    fn test_append_styles() {
        let extra = r#"<w:style w:type="paragraph" w:styleId="Quote"><w:name w:val="Quote"/></w:style>"#;
        let merged = append_styles(STYLES, &[extra.to_string()]);
        let sheet = StyleSheet::parse(&merged).unwrap();
        assert_eq!(sheet.len(), 4);
        assert!(merged.trim_end().ends_with("</w:styles>"));
    }
}
