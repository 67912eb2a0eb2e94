//! Utility modules
//!
//! This module contains utilities and helpers:
//! - Error types, result types and conversion warnings
//! - LaTeX accent and symbol tables
//! - The JSON warning report

pub mod error;
pub mod report;
pub mod unicode;

// Re-export commonly used items
pub use error::{ConversionError, ConversionResult, ConversionWarning, WarningKind};
pub use report::ConversionReport;
