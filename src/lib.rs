//! DOCX Proceedings Library
//!
//! Merges word-processor documents into a single proceedings document.
//! This library provides functionality to:
//! - Collect inputs from zip archives or files in a stable order
//! - Extract a title for each document from its first heading
//! - Build a table of contents that the word processor fills in
//! - Start every document on a new page with continuous page numbers
//! - Add a "Page X of Y" footer to every content page
//!
//! Page numbers are never computed here: the composite carries fields
//! (`TOC`, `PAGE`, `NUMPAGES`, `PAGEREF`) and asks the word processor to
//! update them when the file is opened.
//!
//! # Example
//!
//! ```no_run
//! use docx_proceedings::compose::{compose, ComposeOptions};
//! use docx_proceedings::input::from_archive;
//!
//! let archive = std::fs::read("abstracts.zip").expect("Failed to read archive");
//! let inputs = from_archive(&archive).expect("Failed to read entries");
//! let composite = compose(&inputs, &ComposeOptions::default()).expect("Failed to merge");
//! std::fs::write("proceedings.docx", composite.bytes).expect("Failed to write");
//! ```

pub mod compose;
pub mod date;
pub mod docx;
pub mod error;
pub mod input;
pub mod layout;

// Re-export commonly used items
pub use compose::{compose, ComposeOptions, Composite};
pub use error::{Error, Result};
pub use input::InputDocument;
