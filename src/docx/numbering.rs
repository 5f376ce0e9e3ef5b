//! List numbering definitions (`word/numbering.xml`)
//!
//! Every sub-document numbers its lists from 1, so definitions are merged
//! by shifting ids above the ones already present and rewriting the
//! `w:numId` references in the imported body.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::xml::{attr_local, escape, local_name, position, remove_elements, rewrite_attrs, skip_element, unescape_raw, W_NS, XML_DECL};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
struct Definition {
    id: u32,
    xml: String,
}

/// Merged `w:abstractNum` and `w:num` definitions
#[derive(Debug, Clone, Default)]
pub struct NumberingDefinitions {
    /// Root attributes (namespace declarations), unioned across merges
    root_attrs: Vec<(String, String)>,
    abstract_nums: Vec<Definition>,
    nums: Vec<Definition>,
}

impl NumberingDefinitions {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut defs = Self::default();
        let mut depth = 0usize;
        loop {
            let start = position(&reader);
            match reader.read_event()? {
                Event::Start(e) if depth == 0 => {
                    defs.root_attrs = decoded_attrs(&e);
                    depth = 1;
                }
                Event::Start(e) if depth == 1 => {
                    let local = local_name(e.name().as_ref()).to_vec();
                    let id = id_attr(&e, &local);
                    skip_element(&mut reader)?;
                    defs.push(&local, id, &xml[start..position(&reader)])?;
                }
                Event::Empty(e) if depth == 1 => {
                    let local = local_name(e.name().as_ref()).to_vec();
                    let id = id_attr(&e, &local);
                    defs.push(&local, id, &xml[start..position(&reader)])?;
                }
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(defs)
    }

    fn push(&mut self, local: &[u8], id: Option<u32>, raw: &str) -> Result<()> {
        let Some(id) = id else {
            return Ok(());
        };
        match local {
            // Picture bullets reference images we do not carry; Word falls
            // back to the level text when the reference is gone.
            b"abstractNum" => self.abstract_nums.push(Definition {
                id,
                xml: remove_elements(raw, &[b"lvlPicBulletId"])?,
            }),
            b"num" => self.nums.push(Definition {
                id,
                xml: raw.to_string(),
            }),
            _ => {}
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.abstract_nums.is_empty() && self.nums.is_empty()
    }

    pub fn num_ids(&self) -> Vec<u32> {
        self.nums.iter().map(|n| n.id).collect()
    }

    /// Abstract definition a concrete list instance points at
    pub fn abstract_for(&self, num_id: u32) -> Option<u32> {
        let num = self.nums.iter().find(|n| n.id == num_id)?;
        let mut found = None;
        super::xml::visit_attrs(&num.xml, |elem, key, value| {
            if local_name(elem) == b"abstractNumId" && local_name(key) == b"val" {
                found = value.trim().parse().ok();
            }
        })
        .ok()?;
        found
    }

    /// Merge another document's definitions, returning its `numId` mapping
    pub fn merge_from(&mut self, other: &NumberingDefinitions) -> Result<HashMap<u32, u32>> {
        let abstract_offset = self.abstract_nums.iter().map(|d| d.id + 1).max().unwrap_or(0);
        let num_offset = self.nums.iter().map(|d| d.id).max().unwrap_or(0);

        for (key, value) in &other.root_attrs {
            if key.starts_with("xmlns") && !self.root_attrs.iter().any(|(k, _)| k == key) {
                self.root_attrs.push((key.clone(), value.clone()));
            }
        }

        for def in &other.abstract_nums {
            let id = def.id + abstract_offset;
            let xml = rewrite_attrs(&def.xml, |elem, key, _| {
                (local_name(elem) == b"abstractNum" && local_name(key) == b"abstractNumId")
                    .then(|| id.to_string())
            })?;
            self.abstract_nums.push(Definition { id, xml });
        }

        let mut map = HashMap::new();
        for def in &other.nums {
            let id = def.id + num_offset;
            let xml = rewrite_attrs(&def.xml, |elem, key, value| match local_name(elem) {
                b"num" if local_name(key) == b"numId" => Some(id.to_string()),
                b"abstractNumId" if local_name(key) == b"val" => value
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .map(|old| (old + abstract_offset).to_string()),
                _ => None,
            })?;
            map.insert(def.id, id);
            self.nums.push(Definition { id, xml });
        }
        Ok(map)
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from(XML_DECL);
        xml.push_str("<w:numbering");
        if !self.root_attrs.iter().any(|(k, _)| k == "xmlns:w") {
            xml.push_str(&format!(" xmlns:w=\"{}\"", W_NS));
        }
        for (key, value) in &self.root_attrs {
            xml.push_str(&format!(" {}=\"{}\"", key, escape(value)));
        }
        xml.push('>');
        for def in self.abstract_nums.iter().chain(self.nums.iter()) {
            xml.push_str(&def.xml);
        }
        xml.push_str("</w:numbering>");
        xml
    }
}

/// Rewrite `w:numId` references in body markup through a merge mapping
///
/// `numId` 0 means "no numbering" and is left alone, as is any id the
/// mapping does not know.
pub fn remap_num_ids(fragment: &str, map: &HashMap<u32, u32>) -> Result<String> {
    if map.is_empty() {
        return Ok(fragment.to_string());
    }
    rewrite_attrs(fragment, |elem, key, value| {
        if local_name(elem) != b"numId" || local_name(key) != b"val" {
            return None;
        }
        let old: u32 = value.trim().parse().ok()?;
        map.get(&old).map(|new| new.to_string())
    })
}

fn id_attr(e: &BytesStart, local: &[u8]) -> Option<u32> {
    let key: &[u8] = match local {
        b"abstractNum" => b"abstractNumId",
        b"num" => b"numId",
        _ => return None,
    };
    attr_local(e, key).and_then(|v| v.trim().parse().ok())
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

    fn numbering(abstract_id: u32, num_id: u32) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering xmlns:w="{}" xmlns:w15="http://schemas.microsoft.com/office/word/2012/wordml"><w:abstractNum w:abstractNumId="{a}"><w:lvl w:ilvl="0"><w:lvlPicBulletId w:val="0"/><w:numFmt w:val="decimal"/></w:lvl></w:abstractNum><w:num w:numId="{n}"><w:abstractNumId w:val="{a}"/></w:num></w:numbering>"#,
            W_NS,
            a = abstract_id,
            n = num_id
        )
    }

    #[test]
    fn test_parse() {
        let defs = NumberingDefinitions::parse(&numbering(0, 1)).unwrap();
        assert_eq!(defs.num_ids(), vec![1]);
        assert_eq!(defs.abstract_for(1), Some(0));
        assert!(!defs.to_xml().contains("lvlPicBulletId"));
    }

    #[test]
    fn test_merge_shifts_ids() {
        let mut merged = NumberingDefinitions::default();
        let first = merged
            .merge_from(&NumberingDefinitions::parse(&numbering(0, 1)).unwrap())
            .unwrap();
        assert_eq!(first.get(&1), Some(&1));

        let second = merged
            .merge_from(&NumberingDefinitions::parse(&numbering(0, 1)).unwrap())
            .unwrap();
        assert_eq!(second.get(&1), Some(&2));
        assert_eq!(merged.num_ids(), vec![1, 2]);
        assert_eq!(merged.abstract_for(2), Some(1));

        let xml = merged.to_xml();
        assert!(xml.contains("xmlns:w15="));
        let reparsed = NumberingDefinitions::parse(&xml).unwrap();
        assert_eq!(reparsed.num_ids(), vec![1, 2]);
    }

    #[test]
    fn test_remap_num_ids() {
        let body = r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr></w:p><w:p><w:pPr><w:numPr><w:numId w:val="0"/></w:numPr></w:pPr></w:p>"#;
        let map = HashMap::from([(1, 7)]);
        let out = remap_num_ids(body, &map).unwrap();
        assert!(out.contains(r#"<w:numId w:val="7"/>"#));
        assert!(out.contains(r#"<w:numId w:val="0"/>"#));
        assert!(out.contains(r#"<w:ilvl w:val="0"/>"#));
    }
}
