//! Document collaborator for WordprocessingML packages.
//!
//! Loads a `.docx` buffer into a `MarkupTree`, extracts the records the
//! matching pipeline consumes (tag contexts, target paragraphs, checkboxes)
//! and re-serialises a mutated tree into a loadable package.

pub mod types;
pub mod xml;
pub mod tree;
pub mod extract;
pub mod package;

#[cfg(test)]
pub(crate) mod fixtures;

pub use types::*;
pub use tree::{MarkupTree, TreeScan};
pub use extract::{
    contains_placeholder, extract_checkboxes, extract_tag_contexts, extract_target_paragraphs,
    find_placeholders, placeholder_names, strip_placeholders, PlaceholderHit,
};
pub use package::{detect_format, DocumentCodec, DocxCodec, DocxPackage, RawXmlCodec};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkupError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Document exceeds size limit ({0} bytes)")]
    TooLarge(usize),

    #[error("Package part missing: {0}")]
    MissingPart(String),

    #[error("Malformed markup: {0}")]
    Malformed(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
