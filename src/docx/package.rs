//! DOCX package container: the zip archive and its parts

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::content_types::{self, ContentTypes};
use super::rels::{self, rels_part_name, resolve_target, Relationships};
use super::xml::{R_NS, W_NS, XML_DECL};
use crate::error::{Error, Result};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const PACKAGE_RELS_PART: &str = "_rels/.rels";

/// An opened DOCX package
///
/// Parts are kept in archive order as raw bytes; nothing is parsed until a
/// caller asks for it.
#[derive(Debug, Clone, Default)]
pub struct DocxPackage {
    parts: Vec<(String, Vec<u8>)>,
}

impl DocxPackage {
    /// Open a package from its zip bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().trim_start_matches('/').to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            parts.push((name, data));
        }

        let package = Self { parts };
        if !package.contains(CONTENT_TYPES_PART) {
            return Err(Error::MissingPart(CONTENT_TYPES_PART.to_string()));
        }
        Ok(package)
    }

    /// Serialize the package to zip bytes
    ///
    /// `[Content_Types].xml` is always written first.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let ordered = self
            .parts
            .iter()
            .filter(|(name, _)| name == CONTENT_TYPES_PART)
            .chain(self.parts.iter().filter(|(name, _)| name != CONTENT_TYPES_PART));

        for (name, data) in ordered {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }

    /// A minimal, valid, empty document
    pub fn skeleton() -> Self {
        let mut package = Self::default();

        let mut types = ContentTypes::default();
        types.ensure_default("rels", content_types::RELATIONSHIPS);
        types.ensure_default("xml", "application/xml");
        types.set_override("word/document.xml", content_types::DOCUMENT_MAIN);
        types.set_override("word/styles.xml", content_types::STYLES);
        types.set_override("word/settings.xml", content_types::SETTINGS);
        package.set_part(CONTENT_TYPES_PART, types.to_xml().into_bytes());

        let mut package_rels = Relationships::default();
        package_rels.add(rels::types::OFFICE_DOCUMENT, "word/document.xml", false);
        package.set_part(PACKAGE_RELS_PART, package_rels.to_xml().into_bytes());

        let mut doc_rels = Relationships::default();
        doc_rels.add(rels::types::STYLES, "styles.xml", false);
        doc_rels.add(rels::types::SETTINGS, "settings.xml", false);
        package.set_part(&rels_part_name("word/document.xml"), doc_rels.to_xml().into_bytes());

        package.set_part("word/document.xml", skeleton_document().into_bytes());
        package.set_part("word/styles.xml", skeleton_styles().into_bytes());
        package.set_part("word/settings.xml", skeleton_settings().into_bytes());
        package
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.iter().any(|(n, _)| n == name)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    /// A part decoded as UTF-8 text, if present
    pub fn part_text(&self, name: &str) -> Result<Option<String>> {
        match self.part(name) {
            Some(data) => Ok(Some(decode_text(data)?)),
            None => Ok(None),
        }
    }

    /// A part decoded as UTF-8 text that must exist
    pub fn require_text(&self, name: &str) -> Result<String> {
        self.part_text(name)?
            .ok_or_else(|| Error::MissingPart(name.to_string()))
    }

    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.parts.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = data,
            None => self.parts.push((name.to_string(), data)),
        }
    }

    #[cfg(test)]
    fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }

    /// Name of the main document part, found through the package relationships
    pub fn main_document_name(&self) -> Result<String> {
        let package_rels = self.relationships("")?;
        Ok(package_rels
            .find_by_type(rels::types::OFFICE_DOCUMENT)
            .map(|rel| resolve_target("", &rel.target))
            .unwrap_or_else(|| "word/document.xml".to_string()))
    }

    /// Relationships of a part (`""` for the package itself); empty when absent
    pub fn relationships(&self, part: &str) -> Result<Relationships> {
        let name = if part.is_empty() {
            PACKAGE_RELS_PART.to_string()
        } else {
            rels_part_name(part)
        };
        match self.part_text(&name)? {
            Some(xml) => Relationships::parse(&xml),
            None => Ok(Relationships::default()),
        }
    }

    pub fn set_relationships(&mut self, part: &str, relationships: &Relationships) {
        let name = if part.is_empty() {
            PACKAGE_RELS_PART.to_string()
        } else {
            rels_part_name(part)
        };
        self.set_part(&name, relationships.to_xml().into_bytes());
    }

    pub fn content_types(&self) -> Result<ContentTypes> {
        ContentTypes::parse(&self.require_text(CONTENT_TYPES_PART)?)
    }

    pub fn set_content_types(&mut self, types: &ContentTypes) {
        self.set_part(CONTENT_TYPES_PART, types.to_xml().into_bytes());
    }

    /// A part name based on `desired` that is not yet taken
    ///
    /// `word/media/image1.png` becomes `word/media/image1_2.png`, `_3`, ...
    pub fn unique_part_name(&self, desired: &str) -> String {
        if !self.contains(desired) {
            return desired.to_string();
        }
        let (stem, ext) = match desired.rfind('.') {
            Some(dot) if dot > desired.rfind('/').map_or(0, |s| s + 1) => {
                (&desired[..dot], &desired[dot..])
            }
            _ => (desired, ""),
        };
        (2..)
            .map(|n| format!("{}_{}{}", stem, n, ext))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| desired.to_string())
    }
}

/// Decode part bytes as UTF-8, tolerating a byte-order mark
pub fn decode_text(data: &[u8]) -> Result<String> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    Ok(String::from_utf8(data.to_vec())?)
}

fn skeleton_document() -> String {
    format!(
        "{}<w:document xmlns:w=\"{}\" xmlns:r=\"{}\"><w:body><w:sectPr>\
         <w:pgSz w:w=\"11906\" w:h=\"16838\"/>\
         <w:pgMar w:top=\"1440\" w:right=\"1440\" w:bottom=\"1440\" w:left=\"1440\" w:header=\"708\" w:footer=\"708\" w:gutter=\"0\"/>\
         </w:sectPr></w:body></w:document>",
        XML_DECL, W_NS, R_NS
    )
}

fn skeleton_styles() -> String {
    format!(
        "{}<w:styles xmlns:w=\"{}\">\
         <w:docDefaults><w:rPrDefault><w:rPr>\
         <w:rFonts w:ascii=\"Calibri\" w:hAnsi=\"Calibri\" w:eastAsia=\"Calibri\" w:cs=\"Times New Roman\"/>\
         <w:sz w:val=\"22\"/><w:szCs w:val=\"22\"/>\
         </w:rPr></w:rPrDefault>\
         <w:pPrDefault><w:pPr><w:spacing w:after=\"160\" w:line=\"259\" w:lineRule=\"auto\"/></w:pPr></w:pPrDefault>\
         </w:docDefaults>\
         <w:style w:type=\"paragraph\" w:default=\"1\" w:styleId=\"Normal\"><w:name w:val=\"Normal\"/><w:qFormat/></w:style>\
         </w:styles>",
        XML_DECL, W_NS
    )
}

fn skeleton_settings() -> String {
    format!(
        "{}<w:settings xmlns:w=\"{}\">\
         <w:defaultTabStop w:val=\"720\"/>\
         <w:characterSpacingControl w:val=\"doNotCompress\"/>\
         <w:compat><w:compatSetting w:name=\"compatibilityMode\" w:uri=\"http://schemas.microsoft.com/office/word\" w:val=\"15\"/></w:compat>\
         </w:settings>",
        XML_DECL, W_NS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skeleton_round_trip() {
        let package = DocxPackage::skeleton();
        let bytes = package.to_bytes().unwrap();
        let reopened = DocxPackage::from_bytes(&bytes).unwrap();

        assert_eq!(reopened.part_names().next(), Some(CONTENT_TYPES_PART));
        assert_eq!(reopened.main_document_name().unwrap(), "word/document.xml");
        assert!(reopened.require_text("word/document.xml").unwrap().contains("<w:body>"));
        let types = reopened.content_types().unwrap();
        assert_eq!(
            types.content_type("word/styles.xml"),
            Some(content_types::STYLES)
        );
    }

    #[test]
    fn test_not_a_zip() {
        let result = DocxPackage::from_bytes(b"definitely not a zip archive");
        assert!(matches!(result, Err(Error::Zip(_))));
    }

    #[test]
    fn test_zip_without_content_types() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("hello.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"hi").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let result = DocxPackage::from_bytes(&bytes);
        assert!(matches!(result, Err(Error::MissingPart(_))));
    }

    #[test]
    fn test_unique_part_name() {
        let mut package = DocxPackage::skeleton();
        assert_eq!(package.unique_part_name("word/media/image1.png"), "word/media/image1.png");
        package.set_part("word/media/image1.png", vec![1]);
        assert_eq!(package.unique_part_name("word/media/image1.png"), "word/media/image1_2.png");
        package.set_part("word/media/image1_2.png", vec![2]);
        assert_eq!(package.unique_part_name("word/media/image1.png"), "word/media/image1_3.png");
    }

    #[test]
    fn test_decode_text_strips_bom() {
        assert_eq!(decode_text(b"\xEF\xBB\xBF<a/>").unwrap(), "<a/>");
    }
}
