//! Proceedings composition
//!
//! The pipeline runs once per call:
//! 1. resolve a title for every input
//! 2. build the TOC frontmatter and a hidden marker per document
//! 3. assemble all bodies into one package
//! 4. freeze: write the package out and read it back
//! 5. normalize page numbering and footers on the reopened package
//!
//! Nothing is kept between calls, and an error anywhere discards the whole
//! composite.

pub mod assemble;
pub mod fields;
pub mod footer;
pub mod normalize;
pub mod title;
pub mod toc;

pub use assemble::{Frontmatter, SubDocument};
pub use footer::{FooterOptions, TotalPages};
pub use normalize::{SectionNumberingState, SectionRole};
pub use title::{resolve_title, resolve_titles, TitleEntry};
pub use toc::{TocOptions, TocStrategy};

use tracing::info;

use crate::docx::DocxPackage;
use crate::error::{Error, Result};
use crate::input::InputDocument;

/// How consecutive documents are separated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryDiscipline {
    /// A page break between documents; one content section overall
    #[default]
    PageBreak,
    /// A next-page section break after every document, keeping each
    /// document's own page layout
    SectionBreak,
}

/// Options for a composition run
#[derive(Debug, Clone, Default)]
pub struct ComposeOptions {
    pub toc: TocOptions,
    pub boundary: BoundaryDiscipline,
    pub footer: FooterOptions,
}

/// The finished composite document
#[derive(Debug, Clone)]
pub struct Composite {
    /// The `.docx` package
    pub bytes: Vec<u8>,
    /// TOC entries in merge order
    pub entries: Vec<TitleEntry>,
    /// Numbering ledger, one entry per section
    pub sections: Vec<SectionNumberingState>,
}

/// Merge documents into one proceedings document
///
/// # Example
///
/// ```no_run
/// use docx_proceedings::compose::{compose, ComposeOptions};
/// use docx_proceedings::input::from_paths;
/// use std::path::PathBuf;
///
/// let inputs = from_paths(&[PathBuf::from("1 intro.docx"), PathBuf::from("2 methods.docx")])?;
/// let composite = compose(&inputs, &ComposeOptions::default())?;
/// std::fs::write("proceedings.docx", &composite.bytes)?;
/// # Ok::<(), docx_proceedings::Error>(())
/// ```
pub fn compose(inputs: &[InputDocument], options: &ComposeOptions) -> Result<Composite> {
    if inputs.is_empty() {
        return Err(Error::EmptyInput);
    }
    if options.toc.strategy == TocStrategy::TagScoped {
        fields::validate_tag(&options.toc.tag)?;
    }

    let entries = resolve_titles(inputs);
    info!("Resolved {} titles", entries.len());

    let subs = inputs
        .iter()
        .map(SubDocument::open)
        .collect::<Result<Vec<_>>>()?;

    let section = assemble::toc_section(subs.first())?;
    let frontmatter = Frontmatter {
        elements: toc::frontmatter(&entries, &options.toc, &section.geometry())?,
        section,
    };
    let package = assemble::assemble(frontmatter, &subs, &entries, options)?;

    let mut package = freeze(&package)?;
    let sections = normalize::normalize(&mut package, &options.footer)?;

    let bytes = package
        .to_bytes()
        .map_err(|e| Error::Serialization(e.to_string()))?;
    info!("Composite written: {} bytes", bytes.len());

    Ok(Composite {
        bytes,
        entries,
        sections,
    })
}

/// Write a package to bytes and open it again
fn freeze(package: &DocxPackage) -> Result<DocxPackage> {
    let bytes = package
        .to_bytes()
        .map_err(|e| Error::Serialization(e.to_string()))?;
    DocxPackage::from_bytes(&bytes).map_err(|e| Error::Serialization(e.to_string()))
}
