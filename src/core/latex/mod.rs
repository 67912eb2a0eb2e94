//! LaTeX to block tree converter
//!
//! Raw source is segmented by [`engine`] into fragments, then a single pass
//! over the fragments builds the block tree. Equations are handed to the
//! [`math`] adapter; everything the parser cannot interpret is kept as text
//! and reported as a warning.

pub mod context;
pub mod engine;
mod environment;
mod markup;
pub mod math;
mod utils;

pub use context::{
    ConversionState, ConvertOptions, LabelEntry, LabelKind, LabelTable, LatexConverter,
};
pub use math::{
    MathAdapter, MathConverter, MathError, MathFallback, MathOptions, TexmathConverter,
};

use crate::core::ConversionOutput;

/// Convert a LaTeX document with default options
pub fn latex_to_document(input: &str) -> ConversionOutput {
    LatexConverter::new().convert(input)
}

/// Convert a LaTeX document with custom options
pub fn latex_to_document_with_options(input: &str, options: ConvertOptions) -> ConversionOutput {
    LatexConverter::with_options(options).convert(input)
}
