//! Fragment definitions for the LaTeX segmenter.
//!
//! A fragment is a classified span of source text. The lexer produces them in
//! source order, without gaps or overlaps, and the structural parser consumes
//! them linearly.

use std::fmt;

use super::spec::command_spec;

/// A brace-delimited argument together with the offset of its first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub text: String,
    pub offset: usize,
}

impl Argument {
    pub fn new(text: impl Into<String>, offset: usize) -> Self {
        Argument {
            text: text.into(),
            offset,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }
}

/// A command invocation or environment boundary with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Name without the backslash; a trailing `*` is kept (`section*`).
    pub name: String,
    /// The `[...]` argument, if the command takes one and it was present.
    pub optional: Option<Argument>,
    pub args: Vec<Argument>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Command {
            name: name.into(),
            optional: None,
            args: Vec::new(),
        }
    }

    /// Name with any trailing star removed.
    pub fn base_name(&self) -> &str {
        self.name.trim_end_matches('*')
    }

    pub fn is_starred(&self) -> bool {
        self.name.ends_with('*')
    }

    /// Expected number of brace arguments, `None` for unknown commands.
    pub fn arity(&self) -> Option<usize> {
        command_spec(self.base_name()).map(|spec| spec.args as usize)
    }

    pub fn is_known(&self) -> bool {
        self.arity().is_some()
    }

    /// True when a known command received all of its arguments.
    pub fn is_complete(&self) -> bool {
        match self.arity() {
            Some(arity) => self.args.len() >= arity,
            None => true,
        }
    }

    pub fn arg(&self, idx: usize) -> Option<&Argument> {
        self.args.get(idx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentKind {
    /// Plain text, already normalized (`~` -> space, grouping braces removed).
    Text(String),
    /// An escaped special character (`\%`, `\&`, `\{`, ...).
    Escape(char),
    /// `\\` or `\newline`.
    LineBreak,
    /// `$...$` or `\(...\)`.
    InlineMath(String),
    /// `$$...$$`, `\[...\]` or an equation-family environment.
    DisplayMath { body: String, env: Option<String> },
    Command(Command),
    BeginEnv(Command),
    EndEnv(String),
    /// `verbatim`/`lstlisting` bodies and `\verb` spans, kept literally.
    Verbatim(String),
    /// `%` comments and `comment` environments.
    Comment,
}

/// A classified span of source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub kind: FragmentKind,
    /// Exact source text covered by the fragment.
    pub raw: String,
    /// Byte offset of `raw` in the original source.
    pub offset: usize,
}

impl Fragment {
    pub fn new(kind: FragmentKind, raw: impl Into<String>, offset: usize) -> Self {
        Fragment {
            kind,
            raw: raw.into(),
            offset,
        }
    }

    pub fn text(text: impl Into<String>, raw: impl Into<String>, offset: usize) -> Self {
        Fragment::new(FragmentKind::Text(text.into()), raw, offset)
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, FragmentKind::Comment)
    }

    /// Whitespace-only text or a comment: invisible between structural pieces.
    pub fn is_blank(&self) -> bool {
        match &self.kind {
            FragmentKind::Text(text) => text.trim().is_empty(),
            FragmentKind::Comment => true,
            _ => false,
        }
    }

    pub fn as_command(&self) -> Option<&Command> {
        match &self.kind {
            FragmentKind::Command(cmd) => Some(cmd),
            _ => None,
        }
    }

    /// Check if this is a specific command
    pub fn is_command(&self, name: &str) -> bool {
        matches!(&self.kind, FragmentKind::Command(cmd) if cmd.name == name)
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Normalize a raw text span: `~` becomes a space, grouping braces vanish.
pub fn normalize_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '{' && *c != '}')
        .map(|c| if c == '~' { ' ' } else { c })
        .collect()
}
