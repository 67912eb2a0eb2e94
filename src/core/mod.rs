//! Core conversion modules
//!
//! - `latex`: segmenter, structural parser, inline formatter, math adapter
//! - `markdown`: line-based Markdown reader
//! - `bibtex`: BibTeX database reader and reference formatter

pub mod bibtex;
pub mod latex;
pub mod markdown;

use texdocx_ir::Document;

use crate::core::latex::LabelTable;
use crate::utils::error::ConversionWarning;

/// Everything one conversion produces
#[derive(Debug, Clone, Default)]
pub struct ConversionOutput {
    /// The block tree handed to the emitter
    pub document: Document,
    /// Labels in definition order (LaTeX only)
    pub labels: LabelTable,
    /// Recoverable problems, in source order
    pub warnings: Vec<ConversionWarning>,
    /// Document title, when the source declares one
    pub title: Option<String>,
}

impl ConversionOutput {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            ..Self::default()
        }
    }

    /// Returns true if there were any warnings during conversion
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
