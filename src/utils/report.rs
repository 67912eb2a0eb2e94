//! Warning report written by `tex2docx --report`.

use std::fs;
use std::path::Path;

use serde::Serialize;
use texdocx_ir::Block;

use crate::core::latex::LabelTable;
use crate::core::ConversionOutput;
use crate::utils::error::{ConversionResult, ConversionWarning};

#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub input: String,
    pub format: String,
    pub output: Option<String>,
    /// Blocks in the tree, nested ones included
    pub blocks: usize,
    pub equations: usize,
    pub converted_equations: usize,
    pub labels: LabelTable,
    pub warnings: Vec<ConversionWarning>,
}

impl ConversionReport {
    pub fn new(
        input: impl Into<String>,
        format: impl Into<String>,
        output: &ConversionOutput,
    ) -> Self {
        let mut blocks = 0usize;
        let mut equations = 0usize;
        let mut converted_equations = 0usize;
        for block in output.document.walk() {
            blocks += 1;
            if let Block::Equation(eq) = block {
                equations += 1;
                if eq.is_converted() {
                    converted_equations += 1;
                }
            }
        }
        Self {
            input: input.into(),
            format: format.into(),
            output: None,
            blocks,
            equations,
            converted_equations,
            labels: output.labels.clone(),
            warnings: output.warnings.clone(),
        }
    }

    pub fn with_output(mut self, path: impl Into<String>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn to_json(&self) -> ConversionResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ConversionResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::latex::{ConvertOptions, LatexConverter};

    #[test]
    fn test_report_counts_and_json() {
        let out = LatexConverter::with_options(ConvertOptions {
            skip_preamble: false,
            ..ConvertOptions::without_math()
        })
        .convert("\\section{A}\\label{s}\n$$x$$\n\\begin{itemize}\\item \\[y\\]\\end{itemize}\\foo");
        let report = ConversionReport::new("a.tex", "latex", &out).with_output("a.docx");

        assert_eq!(report.equations, 2);
        assert_eq!(report.converted_equations, 0);
        assert_eq!(report.blocks, 5);
        assert!(!report.is_clean());

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["output"], "a.docx");
        assert_eq!(json["labels"]["s"]["kind"], "section");
        assert_eq!(json["warnings"][0]["kind"], "math-conversion");
    }
}
