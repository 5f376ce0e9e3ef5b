//! Thin WordprocessingML package layer
//!
//! Just enough of the OOXML container to split bodies apart, copy the parts
//! they reference, and write a composite back out. Markup we do not need to
//! understand is carried as raw text.

pub mod body;
pub mod content_types;
pub mod numbering;
pub mod package;
pub mod rels;
pub mod sect_pr;
pub mod styles;
pub mod xml;

pub use body::{BodyElement, DocumentXml, ElementKind};
pub use content_types::ContentTypes;
pub use numbering::NumberingDefinitions;
pub use package::DocxPackage;
pub use rels::{Relationship, Relationships};
pub use sect_pr::SectionProperties;
pub use styles::StyleSheet;
