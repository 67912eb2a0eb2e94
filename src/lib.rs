//! # texdocx
//!
//! LaTeX, Markdown and BibTeX to Word (`.docx`) converter with native OMML
//! equations.
//!
//! ## Features
//!
//! - **Structural LaTeX parsing**: sections, paragraphs, nested lists, floats,
//!   display equations and labels, in one pass over the source
//! - **Native equations**: math is converted to OMML through `texmath`; when
//!   that fails the equation is kept as its LaTeX source
//! - **Best effort**: malformed input produces warnings, never an abort
//! - **Markdown and BibTeX**: lighter readers sharing the same block tree
//!
//! ## Usage
//!
//! ```rust
//! use texdocx::{convert_source_with, InputFormat, MathAdapter};
//! use texdocx_ir::Block;
//!
//! let out = convert_source_with(
//!     "\\section{Theory}\nText with \\textbf{bold}.",
//!     InputFormat::Latex,
//!     &texdocx::ConvertOptions::whole_input(),
//!     MathAdapter::disabled(),
//! )
//! .unwrap();
//! assert_eq!(out.document.blocks[0], Block::heading(1, "Theory"));
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use texdocx_docx_backend::DocxWriter;

/// Core conversion modules
pub mod core;

/// Utility modules
pub mod utils;

// Re-export core conversion types
pub use core::bibtex::{convert_bibtex, format_reference, parse_bibtex, BibDatabase, BibEntry};
pub use core::latex::{
    latex_to_document, latex_to_document_with_options, ConvertOptions, LabelEntry, LabelKind,
    LabelTable, LatexConverter, MathAdapter, MathConverter, MathError, MathOptions,
    TexmathConverter,
};
pub use core::markdown::convert_markdown;
pub use core::ConversionOutput;

// Re-export utilities
pub use utils::error::{ConversionError, ConversionResult, ConversionWarning, WarningKind};
pub use utils::report::ConversionReport;

/// Source language of an input document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    Latex,
    Markdown,
    Bibtex,
}

impl InputFormat {
    /// Format implied by a file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "tex" | "ltx" | "latex" => Some(InputFormat::Latex),
            "md" | "markdown" => Some(InputFormat::Markdown),
            "bib" => Some(InputFormat::Bibtex),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            InputFormat::Latex => "latex",
            InputFormat::Markdown => "markdown",
            InputFormat::Bibtex => "bibtex",
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detect the format of a document from its content.
///
/// Scores LaTeX and Markdown indicators; BibTeX wins outright when the text
/// starts with entries. Ties go to LaTeX.
pub fn detect_format(input: &str) -> InputFormat {
    let trimmed = input.trim_start();
    let bib_entries = input.matches("\n@").count() + usize::from(trimmed.starts_with('@'));
    if trimmed.starts_with('@') || (bib_entries > 0 && !input.contains("\\begin")) {
        let lower = trimmed.to_ascii_lowercase();
        if ["@article", "@book", "@inproceedings", "@misc", "@string", "@comment"]
            .iter()
            .any(|prefix| lower.contains(prefix))
        {
            return InputFormat::Bibtex;
        }
    }

    let latex_score: i32 = if input.contains("\\documentclass") { 10 } else { 0 }
        + if input.contains("\\begin{document}") { 10 } else { 0 }
        + if input.contains("\\section") { 5 } else { 0 }
        + if input.contains("\\begin{") { 3 } else { 0 }
        + (input.matches('\\').count() as i32).min(20);

    let markdown_score: i32 = if input.starts_with("# ") { 10 } else { 0 }
        + (input.matches("\n#").count() as i32) * 5
        + (input.matches("\n- ").count() as i32) * 2
        + (input.matches("**").count() as i32)
        + (input.matches("```").count() as i32) * 3;

    if markdown_score > latex_score {
        InputFormat::Markdown
    } else {
        InputFormat::Latex
    }
}

/// Format for a file: its extension first, then its content.
pub fn detect_file_format(path: &Path, content: &str) -> InputFormat {
    InputFormat::from_extension(path).unwrap_or_else(|| detect_format(content))
}

/// Convert source text with options and the math converter they describe.
pub fn convert_source(
    input: &str,
    format: InputFormat,
    options: &ConvertOptions,
) -> ConversionResult<ConversionOutput> {
    convert_source_with(input, format, options, MathAdapter::from_options(&options.math))
}

/// Convert source text with an explicit math adapter.
pub fn convert_source_with(
    input: &str,
    format: InputFormat,
    options: &ConvertOptions,
    math: MathAdapter,
) -> ConversionResult<ConversionOutput> {
    log::debug!("converting {} bytes of {}", input.len(), format);
    match format {
        InputFormat::Latex => Ok(LatexConverter::with_options(options.clone())
            .with_math_adapter(math)
            .convert(input)),
        InputFormat::Markdown => Ok(convert_markdown(input, &math)),
        InputFormat::Bibtex => convert_bibtex(input),
    }
}

/// Default output location: `<stem>.docx` in the current directory.
pub fn output_path_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let file = format!("{}.docx", stem);
    match std::env::current_dir() {
        Ok(dir) => dir.join(file),
        Err(_) => PathBuf::from(file),
    }
}

/// Write a conversion result as a `.docx` package.
pub fn write_docx(output: &ConversionOutput, path: impl AsRef<Path>) -> ConversionResult<()> {
    let path = path.as_ref();
    let mut writer = DocxWriter::from_document(&output.document);
    if let Some(title) = &output.title {
        writer = writer.with_title(title.clone());
    }
    writer.save(path).map_err(|e| {
        ConversionError::io(format!("cannot write '{}': {}", path.display(), e))
    })?;
    log::info!("wrote {} paragraphs to {}", writer.paragraph_count(), path.display());
    Ok(())
}

/// Read, convert and write one file. `format` overrides detection.
pub fn convert_file(
    input: &Path,
    output: &Path,
    format: Option<InputFormat>,
    options: &ConvertOptions,
) -> ConversionResult<ConversionOutput> {
    let content = fs::read_to_string(input).map_err(|e| {
        ConversionError::io(format!("cannot read '{}': {}", input.display(), e))
    })?;
    let format = format.unwrap_or_else(|| detect_file_format(input, &content));
    log::info!("{} detected as {}", input.display(), format);
    let result = convert_source(&content, format, options)?;
    write_docx(&result, output)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            InputFormat::from_extension(Path::new("a/paper.TEX")),
            Some(InputFormat::Latex)
        );
        assert_eq!(
            InputFormat::from_extension(Path::new("notes.md")),
            Some(InputFormat::Markdown)
        );
        assert_eq!(
            InputFormat::from_extension(Path::new("refs.bib")),
            Some(InputFormat::Bibtex)
        );
        assert_eq!(InputFormat::from_extension(Path::new("README")), None);
    }

    #[test]
    fn test_detect_format_from_content() {
        assert_eq!(
            detect_format("\\documentclass{article}\n\\begin{document}x\\end{document}"),
            InputFormat::Latex
        );
        assert_eq!(
            detect_format("# Notes\n\n- one\n- two\n\nSome **bold** text"),
            InputFormat::Markdown
        );
        assert_eq!(
            detect_format("% refs\n@article{a, title={T}}\n"),
            InputFormat::Bibtex
        );
        assert_eq!(detect_format("plain words"), InputFormat::Latex);
    }

    #[test]
    fn test_output_path_uses_stem() {
        let path = output_path_for(Path::new("/some/dir/paper.tex"));
        assert_eq!(path.file_name().unwrap(), "paper.docx");
        assert_ne!(path.parent(), Some(Path::new("/some/dir")));
    }

    #[test]
    fn test_convert_source_dispatch() {
        let options = ConvertOptions::without_math();
        let md = convert_source("# Title", InputFormat::Markdown, &options).unwrap();
        assert_eq!(md.title.as_deref(), Some("Title"));
        assert!(convert_source("no entries", InputFormat::Bibtex, &options).is_err());
    }
}
