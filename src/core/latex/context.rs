//! Core state and structures for LaTeX conversion
//!
//! This module contains the converter, its options and the per-document
//! parse context: the environment stack, the paragraph buffer, the label
//! side-table and the collected warnings.

use fxhash::FxHashMap;
use indexmap::IndexMap;
use serde::Serialize;
use texdocx_ir::{Block, Document, FigureKind, Inline, ListItem};

use super::engine::{skip_preamble, tokenize, tokenize_document, FragmentKind};
use super::math::{MathAdapter, MathConverter, MathOptions};
use crate::core::ConversionOutput;
use crate::utils::error::ConversionWarning;

// =============================================================================
// Conversion Options
// =============================================================================

/// Options for LaTeX conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Start at `\begin{document}` (or the first sectioning command)
    /// Default: true
    pub skip_preamble: bool,

    /// Equation conversion settings
    pub math: MathOptions,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            skip_preamble: true,
            math: MathOptions::default(),
        }
    }
}

impl ConvertOptions {
    /// Create new options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with math settings taken from the environment
    pub fn from_env() -> Self {
        Self {
            math: MathOptions::from_env(),
            ..Self::default()
        }
    }

    /// Keep every equation as literal source; no external converter runs
    pub fn without_math() -> Self {
        Self {
            math: MathOptions::disabled(),
            ..Self::default()
        }
    }

    /// Treat the whole input as body text
    pub fn whole_input() -> Self {
        Self {
            skip_preamble: false,
            ..Self::default()
        }
    }
}

// =============================================================================
// Labels
// =============================================================================

/// What a label was attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelKind {
    Section,
    Equation,
    Figure,
    Table,
    Item,
    Other,
}

impl From<FigureKind> for LabelKind {
    fn from(kind: FigureKind) -> Self {
        match kind {
            FigureKind::Figure => LabelKind::Figure,
            FigureKind::Table => LabelKind::Table,
        }
    }
}

/// One entry of the label side-table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelEntry {
    pub kind: LabelKind,
    /// 1-based position of the owning block among blocks of the same kind
    pub ordinal: usize,
    /// Byte offset of the `\label` in the source
    pub offset: usize,
}

/// Labels in definition order; the first definition of a key wins.
pub type LabelTable = IndexMap<String, LabelEntry>;

// =============================================================================
// Environment frames
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ListFrame {
    pub name: String,
    pub ordered: bool,
    /// `description` lists render `\item[term]` in bold
    pub description: bool,
    pub items: Vec<ListItem>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FigureFrame {
    pub name: String,
    pub kind: FigureKind,
    pub caption: Option<Vec<Inline>>,
    pub label: Option<String>,
    pub offset: usize,
}

/// An open environment
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    List(ListFrame),
    Figure(FigureFrame),
    Bibliography { offset: usize },
    /// Environments that only group content (center, quote, minipage, unknown ones)
    Transparent { name: String, offset: usize },
}

impl Frame {
    pub fn name(&self) -> &str {
        match self {
            Frame::List(list) => &list.name,
            Frame::Figure(figure) => &figure.name,
            Frame::Bibliography { .. } => "thebibliography",
            Frame::Transparent { name, .. } => name,
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            Frame::List(list) => list.offset,
            Frame::Figure(figure) => figure.offset,
            Frame::Bibliography { offset } | Frame::Transparent { offset, .. } => *offset,
        }
    }
}

/// What the previous non-blank fragment produced; a following `\label`
/// attaches to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recent {
    #[default]
    Nothing,
    Heading,
    Equation,
}

// =============================================================================
// Conversion State
// =============================================================================

/// Conversion state for one document
#[derive(Debug, Default)]
pub struct ConversionState {
    /// Stack of open environments
    pub env_stack: Vec<Frame>,
    /// Finished top-level blocks
    pub blocks: Vec<Block>,
    /// Runs of the paragraph being built
    pub paragraph: Vec<Inline>,
    pub labels: LabelTable,
    pub warnings: Vec<ConversionWarning>,
    /// Blocks created so far, per label kind
    pub counters: FxHashMap<LabelKind, usize>,
    pub recent: Recent,
    /// Render math as its source text (headings, document title)
    pub math_as_text: bool,
    /// `\title{}` from the preamble
    pub title: Option<String>,
    /// Arguments currently being formatted, outermost first
    pub argument_depth: usize,
}

impl ConversionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new environment onto the stack
    pub fn push_env(&mut self, frame: Frame) {
        self.env_stack.push(frame);
    }

    /// Pop the current environment from the stack
    pub fn pop_env(&mut self) -> Option<Frame> {
        self.env_stack.pop()
    }

    /// Get current environment
    pub fn current_env(&self) -> Option<&Frame> {
        self.env_stack.last()
    }

    /// True when content is inside a figure or table float
    pub fn in_figure(&self) -> bool {
        self.env_stack
            .iter()
            .any(|frame| matches!(frame, Frame::Figure(_)))
    }

    /// Count one more block of `kind` and return the new count
    pub fn next_counter(&mut self, kind: LabelKind) -> usize {
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn counter(&self, kind: LabelKind) -> usize {
        self.counters.get(&kind).copied().unwrap_or(0)
    }
}

// =============================================================================
// Converter
// =============================================================================

/// The LaTeX structural converter
pub struct LatexConverter {
    pub(crate) state: ConversionState,
    pub(crate) options: ConvertOptions,
    pub(crate) math: MathAdapter,
}

impl Default for LatexConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl LatexConverter {
    /// Create a new converter with default options
    pub fn new() -> Self {
        Self::with_options(ConvertOptions::default())
    }

    /// Create a new converter with custom options
    pub fn with_options(options: ConvertOptions) -> Self {
        let math = MathAdapter::from_options(&options.math);
        Self {
            state: ConversionState::new(),
            options,
            math,
        }
    }

    /// Replace the equation converter
    pub fn with_math_converter(mut self, converter: impl MathConverter + 'static) -> Self {
        self.math = MathAdapter::new(converter);
        self
    }

    pub fn with_math_adapter(mut self, math: MathAdapter) -> Self {
        self.math = math;
        self
    }

    /// Get a reference to the current options
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert a LaTeX source into a block tree
    pub fn convert(&mut self, src: &str) -> ConversionOutput {
        self.state = ConversionState::new();

        let lexed = if self.options.skip_preamble {
            let start = skip_preamble(src);
            self.read_preamble(&src[..start]);
            tokenize_document(src)
        } else {
            tokenize(src)
        };
        log::debug!("segmented into {} fragments", lexed.fragments.len());
        self.state.warnings.extend(lexed.warnings);

        let end = src.len();
        self.parse_fragments(&lexed.fragments, end);

        let state = std::mem::take(&mut self.state);
        let mut warnings = state.warnings;
        for warning in &mut warnings {
            warning.resolve_line(src);
        }
        warnings.sort_by_key(|w| w.offset.unwrap_or(usize::MAX));

        log::info!(
            "converted LaTeX: {} blocks, {} labels, {} warnings",
            state.blocks.len(),
            state.labels.len(),
            warnings.len()
        );
        ConversionOutput {
            document: Document::new(state.blocks),
            labels: state.labels,
            warnings,
            title: state.title,
        }
    }

    /// Pick up `\title{}` from the preamble.
    fn read_preamble(&mut self, preamble: &str) {
        let lexed = tokenize(preamble);
        let title = lexed.fragments.iter().find_map(|frag| match &frag.kind {
            FragmentKind::Command(cmd) if cmd.name == "title" => cmd.arg(0).cloned(),
            _ => None,
        });
        if let Some(arg) = title {
            let text = self.plain_argument(&arg);
            if !text.is_empty() {
                self.state.title = Some(text);
            }
        }
    }

    /// Record a warning
    pub(crate) fn warn(&mut self, warning: ConversionWarning) {
        log::warn!("{}", warning);
        self.state.warnings.push(warning);
    }

    /// Register a label; the first definition of a key is kept.
    pub(crate) fn register_label(&mut self, key: &str, kind: LabelKind, offset: usize) {
        if self.state.labels.contains_key(key) {
            self.warn(ConversionWarning::duplicate_label(key).at(offset));
            return;
        }
        let ordinal = match kind {
            LabelKind::Item | LabelKind::Other => self.state.next_counter(kind),
            _ => self.state.counter(kind),
        };
        log::debug!("label '{}' -> {:?} #{}", key, kind, ordinal);
        self.state.labels.insert(
            key.to_string(),
            LabelEntry {
                kind,
                ordinal,
                offset,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_presets() {
        assert!(ConvertOptions::default().skip_preamble);
        assert!(!ConvertOptions::whole_input().skip_preamble);
        assert!(!ConvertOptions::without_math().math.enabled);
    }

    #[test]
    fn test_state_counters() {
        let mut state = ConversionState::new();
        assert_eq!(state.counter(LabelKind::Equation), 0);
        assert_eq!(state.next_counter(LabelKind::Equation), 1);
        assert_eq!(state.next_counter(LabelKind::Equation), 2);
        assert_eq!(state.counter(LabelKind::Figure), 0);
    }

    #[test]
    fn test_frame_names() {
        let frame = Frame::Transparent {
            name: "center".into(),
            offset: 3,
        };
        assert_eq!(frame.name(), "center");
        assert_eq!(frame.offset(), 3);
        assert_eq!(Frame::Bibliography { offset: 0 }.name(), "thebibliography");
    }

    #[test]
    fn test_first_label_definition_wins() {
        let mut conv = LatexConverter::with_options(ConvertOptions::without_math());
        conv.register_label("eq:a", LabelKind::Equation, 5);
        conv.register_label("eq:a", LabelKind::Figure, 50);
        assert_eq!(conv.state.labels["eq:a"].offset, 5);
        assert_eq!(conv.state.labels["eq:a"].kind, LabelKind::Equation);
        assert_eq!(conv.state.warnings.len(), 1);
    }
}
