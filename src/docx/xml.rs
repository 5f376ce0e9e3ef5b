//! Low-level XML helpers shared by the package layer
//!
//! Everything here works on raw markup slices so that content we do not
//! understand passes through untouched. Only start tags whose attributes
//! actually change are re-serialized.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::Result;

/// WordprocessingML main namespace
pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
/// Office document relationships namespace (`r:` prefix)
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
/// Markup compatibility namespace (`mc:` prefix)
pub const MC_NS: &str = "http://schemas.openxmlformats.org/markup-compatibility/2006";
/// Package relationships namespace
pub const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
/// Content types namespace
pub const CT_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// Standard XML declaration written at the top of every generated part
pub const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n";

/// Strip the namespace prefix from a qualified name
pub fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

/// Namespace prefix of a qualified name, if any
pub fn prefix(name: &[u8]) -> Option<&[u8]> {
    name.iter().position(|&b| b == b':').map(|i| &name[..i])
}

/// Decode a raw (escaped) attribute value or text slice
pub fn unescape_raw(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    match quick_xml::escape::unescape(&text) {
        Ok(value) => value.into_owned(),
        Err(_) => text.into_owned(),
    }
}

/// Escape text for attribute values
pub fn escape(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}

/// Escape text for element content (quotes are left alone)
pub fn escape_text(text: &str) -> Cow<'_, str> {
    quick_xml::escape::partial_escape(text)
}

/// Look up an attribute by its local name, ignoring the prefix
pub fn attr_local(e: &BytesStart, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == local)
        .map(|a| unescape_raw(&a.value))
}

/// Resolve a general entity reference event (`&amp;`, `&#x2019;`, ...) to text
pub fn resolve_entity(name: &[u8]) -> String {
    let reference = format!("&{};", String::from_utf8_lossy(name));
    match quick_xml::escape::unescape(&reference) {
        Ok(value) => value.into_owned(),
        Err(_) => String::new(),
    }
}

/// Byte offset of the reader as `usize`
pub(crate) fn position(reader: &Reader<&[u8]>) -> usize {
    reader.buffer_position() as usize
}

/// Consume events until the element whose start tag was just read is closed
pub(crate) fn skip_element(reader: &mut Reader<&[u8]>) -> Result<()> {
    let mut depth = 1usize;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

/// Raw slices of every top-level element in a fragment
///
/// Whitespace, comments and processing instructions between elements are
/// dropped.
pub fn top_level_elements(fragment: &str) -> Result<Vec<&str>> {
    let mut reader = Reader::from_str(fragment);
    let mut elements = Vec::new();
    loop {
        let start = position(&reader);
        match reader.read_event()? {
            Event::Start(_) => {
                skip_element(&mut reader)?;
                elements.push(&fragment[start..position(&reader)]);
            }
            Event::Empty(_) => elements.push(&fragment[start..position(&reader)]),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(elements)
}

/// Serialize a start tag with the given raw attribute list
fn write_start_tag(out: &mut String, name: &[u8], attrs: &[(Vec<u8>, String)], empty: bool) {
    out.push('<');
    out.push_str(&String::from_utf8_lossy(name));
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(&String::from_utf8_lossy(key));
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }
    out.push_str(if empty { "/>" } else { ">" });
}

/// Rewrite attribute values throughout a fragment
///
/// The callback receives the element's qualified name, the attribute's
/// qualified name and its decoded value; returning `Some` replaces the value.
/// Markup that the callback leaves alone is copied byte-for-byte.
pub fn rewrite_attrs<F>(fragment: &str, mut rewrite: F) -> Result<String>
where
    F: FnMut(&[u8], &[u8], &str) -> Option<String>,
{
    let mut reader = Reader::from_str(fragment);
    let mut out = String::with_capacity(fragment.len());
    loop {
        let start = position(&reader);
        let event = reader.read_event()?;
        let end = position(&reader);
        let (e, empty) = match &event {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::Eof => break,
            _ => {
                out.push_str(&fragment[start..end]);
                continue;
            }
        };

        let mut changed = false;
        let mut attrs = Vec::new();
        for attr in e.attributes().flatten() {
            let value = unescape_raw(&attr.value);
            match rewrite(e.name().as_ref(), attr.key.as_ref(), &value) {
                Some(new_value) if new_value != value => {
                    changed = true;
                    attrs.push((attr.key.as_ref().to_vec(), new_value));
                }
                _ => attrs.push((attr.key.as_ref().to_vec(), value)),
            }
        }

        if changed {
            write_start_tag(&mut out, e.name().as_ref(), &attrs, empty);
        } else {
            out.push_str(&fragment[start..end]);
        }
    }
    Ok(out)
}

/// Visit every attribute in a fragment without changing it
pub fn visit_attrs<F>(fragment: &str, mut visit: F) -> Result<()>
where
    F: FnMut(&[u8], &[u8], &str),
{
    let mut reader = Reader::from_str(fragment);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                for attr in e.attributes().flatten() {
                    visit(e.name().as_ref(), attr.key.as_ref(), &unescape_raw(&attr.value));
                }
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

/// Remove every element (with its subtree) whose local name is listed
pub fn remove_elements(fragment: &str, locals: &[&[u8]]) -> Result<String> {
    let mut reader = Reader::from_str(fragment);
    let mut out = String::with_capacity(fragment.len());
    loop {
        let start = position(&reader);
        let event = reader.read_event()?;
        let end = position(&reader);
        match event {
            Event::Start(e) if locals.contains(&local_name(e.name().as_ref())) => {
                skip_element(&mut reader)?;
            }
            Event::Empty(e) if locals.contains(&local_name(e.name().as_ref())) => {}
            Event::Eof => break,
            _ => out.push_str(&fragment[start..end]),
        }
    }
    Ok(out)
}

/// Byte range of the first element with the given local name
pub fn find_element(fragment: &str, local: &[u8]) -> Result<Option<std::ops::Range<usize>>> {
    let mut reader = Reader::from_str(fragment);
    loop {
        let start = position(&reader);
        match reader.read_event()? {
            Event::Start(e) if local_name(e.name().as_ref()) == local => {
                skip_element(&mut reader)?;
                return Ok(Some(start..position(&reader)));
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == local => {
                return Ok(Some(start..position(&reader)));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Concatenated text of every element with the given local name
pub fn collect_text(fragment: &str, local: &[u8]) -> Result<String> {
    let mut reader = Reader::from_str(fragment);
    let mut depth_inside = 0usize;
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth_inside > 0 || local_name(e.name().as_ref()) == local {
                    depth_inside += 1;
                }
            }
            Event::End(_) => depth_inside = depth_inside.saturating_sub(1),
            Event::Text(t) if depth_inside > 0 => text.push_str(&String::from_utf8_lossy(t.as_ref())),
            Event::GeneralRef(r) if depth_inside > 0 => text.push_str(&resolve_entity(r.as_ref())),
            Event::Eof => return Ok(text),
            _ => {}
        }
    }
}

/// `(prefix, uri)` of every namespace declared on the root element
pub fn root_namespaces(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(e
                    .attributes()
                    .flatten()
                    .filter_map(|a| {
                        let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
                        key.strip_prefix("xmlns:")
                            .map(|p| (p.to_string(), unescape_raw(&a.value)))
                    })
                    .collect());
            }
            Event::Eof => return Ok(Vec::new()),
            _ => {}
        }
    }
}

/// Add namespace declarations to the root element for prefixes it lacks
pub fn declare_root_namespaces(xml: &str, namespaces: &[(String, String)]) -> Result<String> {
    let existing = root_namespaces(xml)?;
    let missing: String = namespaces
        .iter()
        .filter(|(prefix, _)| !existing.iter().any(|(p, _)| p == prefix))
        .map(|(prefix, uri)| format!(" xmlns:{}=\"{}\"", prefix, escape(uri)))
        .collect();
    if missing.is_empty() {
        return Ok(xml.to_string());
    }

    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(_) | Event::Empty(_) => {
                let end = position(&reader);
                let close = if xml[..end].ends_with("/>") { end - 2 } else { end - 1 };
                let mut out = String::with_capacity(xml.len() + missing.len());
                out.push_str(&xml[..close]);
                out.push_str(&missing);
                out.push_str(&xml[close..]);
                return Ok(out);
            }
            Event::Eof => return Ok(xml.to_string()),
            _ => {}
        }
    }
}

/// Insert markup immediately before the closing tag of the root element
pub fn insert_before_root_end(xml: &str, markup: &str) -> String {
    match xml.rfind("</") {
        Some(pos) => {
            let mut out = String::with_capacity(xml.len() + markup.len());
            out.push_str(&xml[..pos]);
            out.push_str(markup);
            out.push_str(&xml[pos..]);
            out
        }
        None => xml.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_local_name_and_prefix() {
        assert_eq!(local_name(b"w:p"), b"p");
        assert_eq!(local_name(b"body"), b"body");
        assert_eq!(prefix(b"r:id"), Some(&b"r"[..]));
        assert_eq!(prefix(b"id"), None);
    }

    #[test]
    fn test_rewrite_attrs_only_touches_changed_tags() {
        let xml = r#"<w:p w:rsidR="00AB"><w:r><a:blip r:embed="rId4"/></w:r><w:t xml:space="preserve">a &amp; b</w:t></w:p>"#;
        let out = rewrite_attrs(xml, |_, key, value| {
            (key == b"r:embed" && value == "rId4").then(|| "rId9".to_string())
        })
        .unwrap();
        assert_eq!(
            out,
            r#"<w:p w:rsidR="00AB"><w:r><a:blip r:embed="rId9"/></w:r><w:t xml:space="preserve">a &amp; b</w:t></w:p>"#
        );
    }

    #[test]
    fn test_rewrite_attrs_escapes_new_values() {
        let out = rewrite_attrs(r#"<x a="1"/>"#, |_, _, _| Some("<\"&".to_string())).unwrap();
        assert_eq!(out, r#"<x a="&lt;&quot;&amp;"/>"#);
    }

    #[test]
    fn test_remove_elements() {
        let xml = r#"<w:sectPr><w:headerReference w:type="default" r:id="rId1"/><w:footerReference w:type="default" r:id="rId2"></w:footerReference><w:pgSz w:w="11906"/></w:sectPr>"#;
        let out = remove_elements(xml, &[b"headerReference", b"footerReference"]).unwrap();
        assert_eq!(out, r#"<w:sectPr><w:pgSz w:w="11906"/></w:sectPr>"#);
    }

    #[test]
    fn test_top_level_elements() {
        let xml = "<a><b/></a>\n  <c/><!-- note --><d>t</d>";
        let elements = top_level_elements(xml).unwrap();
        assert_eq!(elements, vec!["<a><b/></a>", "<c/>", "<d>t</d>"]);
    }

    #[test]
    fn test_collect_text_resolves_entities() {
        let xml = r#"<w:p><w:r><w:t>Fish &amp; Chips</w:t></w:r><w:r><w:instrText>PAGE</w:instrText></w:r></w:p>"#;
        assert_eq!(collect_text(xml, b"t").unwrap(), "Fish & Chips");
        assert_eq!(collect_text(xml, b"instrText").unwrap(), "PAGE");
    }

    #[test]
    fn test_declare_root_namespaces() {
        let xml = r#"<?xml version="1.0"?><w:styles xmlns:w="urn:w"><w:style/></w:styles>"#;
        let namespaces = vec![
            ("w".to_string(), "urn:w".to_string()),
            ("w14".to_string(), "urn:w14".to_string()),
        ];
        let out = declare_root_namespaces(xml, &namespaces).unwrap();
        assert_eq!(
            out,
            r#"<?xml version="1.0"?><w:styles xmlns:w="urn:w" xmlns:w14="urn:w14"><w:style/></w:styles>"#
        );
        assert_eq!(root_namespaces(&out).unwrap().len(), 2);
        assert_eq!(declare_root_namespaces(&out, &namespaces).unwrap(), out);
    }

    #[test]
    fn test_find_element() {
        let xml = r#"<w:p><w:pPr><w:sectPr><w:pgSz/></w:sectPr></w:pPr></w:p>"#;
        let range = find_element(xml, b"sectPr").unwrap().unwrap();
        assert_eq!(&xml[range], "<w:sectPr><w:pgSz/></w:sectPr>");
        assert!(find_element(xml, b"tbl").unwrap().is_none());
    }
}
