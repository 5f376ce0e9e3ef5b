//! Error types for the proceedings composer

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the proceedings composer
#[derive(Error, Debug)]
pub enum Error {
    /// No eligible documents were supplied
    #[error("No input documents: at least one .docx is required")]
    EmptyInput,

    /// A sub-document could not be opened as a DOCX package
    #[error("Malformed document {name}: {reason}")]
    MalformedSubDocument { name: String, reason: String },

    /// A field instruction would be malformed if emitted
    #[error("Refusing to emit malformed field instruction: {0}")]
    InstructionInjection(String),

    /// Writing or reopening the composite failed
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A required package part is absent
    #[error("Missing package part: {0}")]
    MissingPart(String),

    /// ZIP container error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Part content is not UTF-8
    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Date parsing error
    #[error("Invalid date expression: {0}")]
    InvalidDateExpression(String),
}

impl Error {
    /// Wrap any error raised while opening a sub-document as fatal
    pub(crate) fn malformed(name: &str, reason: impl std::fmt::Display) -> Self {
        Error::MalformedSubDocument {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}
