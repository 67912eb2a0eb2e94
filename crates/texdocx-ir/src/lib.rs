//! Block tree shared by every texdocx frontend and the docx backend.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterate over every block, depth first, including blocks nested in list items.
    pub fn walk(&self) -> impl Iterator<Item = &Block> {
        let mut stack: Vec<&Block> = self.blocks.iter().rev().collect();
        std::iter::from_fn(move || {
            let block = stack.pop()?;
            if let Block::List { items, .. } = block {
                for item in items.iter().rev() {
                    stack.extend(item.blocks.iter().rev());
                }
            }
            Some(block)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Block {
    /// Level 0 is the title style, 1..=4 map onto Heading1..Heading4.
    Heading { level: u8, text: String },
    Paragraph(Vec<Inline>),
    List { ordered: bool, items: Vec<ListItem> },
    Figure(FigureBlock),
    Equation(EquationBlock),
}

impl Block {
    pub fn paragraph(runs: Vec<Inline>) -> Self {
        Block::Paragraph(runs)
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Block::Heading {
            level,
            text: text.into(),
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Block::Figure(figure) => figure.label.as_deref(),
            Block::Equation(eq) => eq.label.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ListItem {
    pub runs: Vec<Inline>,
    /// Nested lists and display equations that belong to this item.
    pub blocks: Vec<Block>,
}

impl ListItem {
    pub fn new(runs: Vec<Inline>) -> Self {
        Self {
            runs,
            blocks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty() && self.blocks.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FigureKind {
    #[default]
    Figure,
    Table,
}

impl FigureKind {
    pub fn display_name(self) -> &'static str {
        match self {
            FigureKind::Figure => "Figure",
            FigureKind::Table => "Table",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FigureBlock {
    pub kind: FigureKind,
    pub caption: Option<Vec<Inline>>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EquationBlock {
    /// `Inline::Math` with converted markup, or a plain `Inline::Text` fallback.
    pub content: Inline,
    /// LaTeX source handed to the math converter.
    pub source: String,
    /// Originating environment (`equation`, `align*`, ...), `None` for `$$`/`\[`.
    pub env: Option<String>,
    pub label: Option<String>,
}

impl EquationBlock {
    pub fn is_converted(&self) -> bool {
        matches!(self.content, Inline::Math(_))
    }

    /// Multi-line environments keep their alignment semantics downstream.
    pub fn is_multiline(&self) -> bool {
        self.env.as_deref().is_some_and(|env| {
            matches!(
                env.trim_end_matches('*'),
                "align" | "gather" | "multline" | "eqnarray"
            )
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub monospace: bool,
    pub subscript: bool,
    pub superscript: bool,
}

impl RunStyle {
    pub const PLAIN: RunStyle = RunStyle {
        bold: false,
        italic: false,
        monospace: false,
        subscript: false,
        superscript: false,
    };

    pub fn bold() -> Self {
        Self {
            bold: true,
            ..Self::PLAIN
        }
    }

    pub fn italic() -> Self {
        Self {
            italic: true,
            ..Self::PLAIN
        }
    }

    pub fn monospace() -> Self {
        Self {
            monospace: true,
            ..Self::PLAIN
        }
    }

    pub fn subscript() -> Self {
        Self {
            subscript: true,
            ..Self::PLAIN
        }
    }

    pub fn superscript() -> Self {
        Self {
            superscript: true,
            ..Self::PLAIN
        }
    }

    pub fn is_plain(&self) -> bool {
        *self == Self::PLAIN
    }

    /// Combine an outer style with an inner one. Sub- and superscript are
    /// mutually exclusive; the innermost wins.
    pub fn merge(self, inner: RunStyle) -> RunStyle {
        let (subscript, superscript) = if inner.subscript || inner.superscript {
            (inner.subscript, inner.superscript)
        } else {
            (self.subscript, self.superscript)
        };
        RunStyle {
            bold: self.bold || inner.bold,
            italic: self.italic || inner.italic,
            monospace: self.monospace || inner.monospace,
            subscript,
            superscript,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Inline {
    Text { text: String, style: RunStyle },
    /// Equation markup (OMML) embedded verbatim by the backend.
    Math(String),
    LineBreak,
}

impl Inline {
    pub fn plain(text: impl Into<String>) -> Self {
        Inline::Text {
            text: text.into(),
            style: RunStyle::PLAIN,
        }
    }

    pub fn styled(text: impl Into<String>, style: RunStyle) -> Self {
        Inline::Text {
            text: text.into(),
            style,
        }
    }

    pub fn is_whitespace(&self) -> bool {
        match self {
            Inline::Text { text, .. } => text.trim().is_empty(),
            Inline::Math(_) => false,
            Inline::LineBreak => false,
        }
    }
}

/// Concatenate the visible text of a run sequence. Math runs contribute nothing.
pub fn plain_text(runs: &[Inline]) -> String {
    let mut out = String::new();
    for run in runs {
        match run {
            Inline::Text { text, .. } => out.push_str(text),
            Inline::LineBreak => out.push(' '),
            Inline::Math(_) => {}
        }
    }
    out
}

/// Merge adjacent text runs that share a style, collapse whitespace to single
/// spaces and trim the ends of the sequence.
pub fn normalize_runs(runs: Vec<Inline>) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::with_capacity(runs.len());
    for run in runs {
        match run {
            Inline::Text { text, style } => {
                let text = collapse_whitespace(&text);
                if text.is_empty() {
                    continue;
                }
                if let Some(Inline::Text {
                    text: prev,
                    style: prev_style,
                }) = out.last_mut()
                {
                    if *prev_style == style {
                        if prev.ends_with(' ') && text.starts_with(' ') {
                            prev.push_str(&text[1..]);
                        } else {
                            prev.push_str(&text);
                        }
                        continue;
                    }
                    if prev.ends_with(' ') && text.starts_with(' ') {
                        out.push(Inline::Text {
                            text: text[1..].to_string(),
                            style,
                        });
                        continue;
                    }
                }
                out.push(Inline::Text { text, style });
            }
            Inline::LineBreak => {
                if let Some(Inline::Text { text, .. }) = out.last_mut() {
                    let trimmed = text.trim_end().len();
                    text.truncate(trimmed);
                }
                out.push(Inline::LineBreak);
            }
            math => out.push(math),
        }
    }
    trim_runs(out)
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn trim_runs(mut runs: Vec<Inline>) -> Vec<Inline> {
    while matches!(runs.first(), Some(Inline::LineBreak)) {
        runs.remove(0);
    }
    while matches!(runs.last(), Some(Inline::LineBreak)) {
        runs.pop();
    }
    if let Some(Inline::Text { text, .. }) = runs.first_mut() {
        *text = text.trim_start().to_string();
    }
    if let Some(Inline::Text { text, .. }) = runs.last_mut() {
        *text = text.trim_end().to_string();
    }
    for i in 1..runs.len() {
        if matches!(runs[i - 1], Inline::LineBreak) {
            if let Inline::Text { text, .. } = &mut runs[i] {
                *text = text.trim_start().to_string();
            }
        }
    }
    runs.retain(|run| !matches!(run, Inline::Text { text, .. } if text.is_empty()));
    runs
}
