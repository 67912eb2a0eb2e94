//! Error handling for texdocx conversions
//!
//! Fatal errors ([`ConversionError`]) only come from the I/O boundary or from
//! input that cannot be interpreted at all. Everything the parsers can recover
//! from is recorded as a [`ConversionWarning`] and conversion carries on.

use std::fmt;

use serde::Serialize;

/// Conversion error type
#[derive(Debug, Clone)]
pub enum ConversionError {
    /// Invalid input - nothing usable could be recovered
    InvalidInput { message: String },
    /// IO error (unreadable input, unwritable output)
    IoError { message: String },
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::InvalidInput { message } => {
                write!(f, "Invalid input: {}", message)
            }
            ConversionError::IoError { message } => {
                write!(f, "IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConversionError {}

impl From<std::io::Error> for ConversionError {
    fn from(err: std::io::Error) -> Self {
        ConversionError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ConversionError {
    fn from(err: serde_json::Error) -> Self {
        ConversionError::IoError {
            message: err.to_string(),
        }
    }
}

impl ConversionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ConversionError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        ConversionError::IoError {
            message: message.into(),
        }
    }
}

/// Result type for conversion operations
pub type ConversionResult<T> = Result<T, ConversionError>;

// =============================================================================
// Warning System
// =============================================================================

/// Kind of warning generated during conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// `\begin{x}` without a matching `\end{x}`, or a stray `\end{x}`
    UnmatchedEnvironment,
    /// A `{` group still open at end of input
    UnterminatedGroup,
    /// A math delimiter still open at end of input
    UnterminatedMath,
    /// An unknown command was passed through as literal text
    UnknownCommand,
    /// A known command had fewer brace arguments than it takes
    MissingArgument,
    /// The external math converter failed; literal source was kept
    MathConversion,
    /// A label key was defined more than once
    DuplicateLabel,
    /// Content that does not fit its context (e.g. `\item` outside a list)
    Misplaced,
    /// General parsing issue
    ParseError,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::UnmatchedEnvironment => write!(f, "unmatched environment"),
            WarningKind::UnterminatedGroup => write!(f, "unterminated group"),
            WarningKind::UnterminatedMath => write!(f, "unterminated math"),
            WarningKind::UnknownCommand => write!(f, "unknown command"),
            WarningKind::MissingArgument => write!(f, "missing argument"),
            WarningKind::MathConversion => write!(f, "math conversion"),
            WarningKind::DuplicateLabel => write!(f, "duplicate label"),
            WarningKind::Misplaced => write!(f, "misplaced content"),
            WarningKind::ParseError => write!(f, "parse error"),
        }
    }
}

/// A non-fatal issue found while converting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionWarning {
    pub kind: WarningKind,
    pub message: String,
    /// Byte offset into the original source
    pub offset: Option<usize>,
    /// 1-based line, filled in once the whole source is known
    pub line: Option<usize>,
    /// Location context (e.g. "\\foo" or "figure")
    pub location: Option<String>,
}

impl ConversionWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        ConversionWarning {
            kind,
            message: message.into(),
            offset: None,
            line: None,
            location: None,
        }
    }

    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn unmatched_environment(name: &str, message: impl Into<String>) -> Self {
        ConversionWarning::new(WarningKind::UnmatchedEnvironment, message)
            .with_location(name.to_string())
    }

    pub fn unterminated_group(context: &str) -> Self {
        ConversionWarning::new(
            WarningKind::UnterminatedGroup,
            "Unterminated brace group; argument runs to end of input",
        )
        .with_location(context.to_string())
    }

    pub fn unclosed_brace() -> Self {
        ConversionWarning::new(WarningKind::UnterminatedGroup, "Brace group is never closed")
            .with_location("{".to_string())
    }

    pub fn nesting_too_deep(limit: usize) -> Self {
        ConversionWarning::new(
            WarningKind::ParseError,
            format!("Arguments nested deeper than {} levels kept as source text", limit),
        )
    }

    pub fn unterminated_math(delimiter: &str) -> Self {
        ConversionWarning::new(
            WarningKind::UnterminatedMath,
            format!("Math opened with '{}' is never closed", delimiter),
        )
        .with_location(delimiter.to_string())
    }

    pub fn unknown_command(name: &str) -> Self {
        ConversionWarning::new(
            WarningKind::UnknownCommand,
            format!("Unknown command '\\{}' kept as literal text", name),
        )
        .with_location(format!("\\{}", name))
    }

    pub fn missing_argument(name: &str, expected: usize, found: usize) -> Self {
        ConversionWarning::new(
            WarningKind::MissingArgument,
            format!(
                "'\\{}' takes {} argument(s) but {} were given; kept as literal text",
                name, expected, found
            ),
        )
        .with_location(format!("\\{}", name))
    }

    pub fn math_conversion(source: &str, reason: impl fmt::Display) -> Self {
        let preview: String = source.chars().take(40).collect();
        ConversionWarning::new(
            WarningKind::MathConversion,
            format!("Equation kept as text ({})", reason),
        )
        .with_location(preview)
    }

    pub fn duplicate_label(key: &str) -> Self {
        ConversionWarning::new(
            WarningKind::DuplicateLabel,
            format!("Label '{}' already defined; first definition kept", key),
        )
        .with_location(key.to_string())
    }

    pub fn misplaced(what: &str, message: impl Into<String>) -> Self {
        ConversionWarning::new(WarningKind::Misplaced, message).with_location(what.to_string())
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        ConversionWarning::new(WarningKind::ParseError, msg)
    }

    /// Resolve `line` from `offset` against the full source text.
    pub fn resolve_line(&mut self, source: &str) {
        if let Some(offset) = self.offset {
            self.line = Some(line_of(source, offset));
        }
    }
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(line) = self.line {
            write!(f, " line {}", line)?;
        } else if let Some(offset) = self.offset {
            write!(f, " offset {}", offset)?;
        }
        if let Some(ref loc) = self.location {
            write!(f, " {}", loc)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// 1-based line number of a byte offset.
pub fn line_of(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}
