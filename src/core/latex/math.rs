//! Math conversion adapter
//!
//! Equation spans are handed to an external LaTeX-to-OMML converter
//! (`texmath --from tex --to omml`). The adapter owns the clean-up applied
//! before the call, the validation of what comes back, and the fallback to
//! literal source text when anything goes wrong.

use std::fmt;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex::Regex;
use texdocx_ir::Inline;

use crate::utils::error::ConversionWarning;

/// Default time allowed for one external conversion.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const OMML_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/math";

lazy_static! {
    /// Null delimiters such as `\Bigl.` or `\big.`
    static ref NULL_DELIMITER: Regex = Regex::new(r"\\[Bb]igg?[lr]?\.").unwrap();
    /// Sizing prefixes such as `\Bigl(`; `\bigcup` and friends are left alone
    static ref SIZE_PREFIX: Regex = Regex::new(r"\\[Bb]igg?[lr]?\b\s*").unwrap();
    /// Opening tag of the inner `<m:oMath>` element (not `<m:oMathPara>`)
    static ref OMATH_OPEN: Regex = Regex::new(r"<m:oMath[\s>]").unwrap();
}

// =============================================================================
// Errors
// =============================================================================

/// Why an external conversion produced no usable markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    /// The converter could not be started
    Unavailable(String),
    /// The converter exited with a failure status
    Failed { status: Option<i32>, stderr: String },
    /// The converter did not finish in time
    Timeout(Duration),
    /// Output did not look like OMML
    Malformed(String),
    /// Nothing to convert, or nothing came back
    Empty,
    /// Math conversion is switched off
    Disabled,
}

impl fmt::Display for MathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MathError::Unavailable(reason) => write!(f, "converter unavailable: {}", reason),
            MathError::Failed { status, stderr } => {
                match status {
                    Some(code) => write!(f, "converter exited with status {}", code)?,
                    None => write!(f, "converter was terminated")?,
                }
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr.lines().next().unwrap_or(stderr))?;
                }
                Ok(())
            }
            MathError::Timeout(limit) => {
                write!(f, "converter timed out after {:.1}s", limit.as_secs_f64())
            }
            MathError::Malformed(output) => {
                let preview: String = output.chars().take(40).collect();
                write!(f, "unexpected converter output '{}'", preview)
            }
            MathError::Empty => write!(f, "empty equation"),
            MathError::Disabled => write!(f, "math conversion disabled"),
        }
    }
}

impl std::error::Error for MathError {}

// =============================================================================
// Options
// =============================================================================

/// Options for equation conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathOptions {
    /// Convert equations at all; when false every span falls back to text
    /// Default: true
    pub enabled: bool,

    /// Explicit path of the `texmath` executable
    /// Default: `~/.local/bin/texmath` if present, else `texmath` on PATH
    pub texmath: Option<PathBuf>,

    /// Time allowed per equation
    /// Default: 5 seconds
    pub timeout: Duration,
}

impl Default for MathOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            texmath: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl MathOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep every equation as literal source
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Defaults overridden by `TEXDOCX_TEXMATH` and `TEXDOCX_MATH_TIMEOUT`
    /// (seconds).
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(path) = std::env::var("TEXDOCX_TEXMATH") {
            if !path.trim().is_empty() {
                options.texmath = Some(PathBuf::from(path));
            }
        }
        if let Some(secs) = std::env::var("TEXDOCX_MATH_TIMEOUT")
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| *secs > 0.0)
        {
            options.timeout = Duration::from_secs_f64(secs);
        }
        options
    }

    /// The executable to run.
    pub fn resolve_texmath(&self) -> PathBuf {
        if let Some(path) = &self.texmath {
            return path.clone();
        }
        if let Some(home) = std::env::var_os("HOME") {
            let local = PathBuf::from(home).join(".local/bin/texmath");
            if local.is_file() {
                return local;
            }
        }
        PathBuf::from("texmath")
    }
}

// =============================================================================
// Converters
// =============================================================================

/// Something that turns LaTeX math into an OMML fragment.
pub trait MathConverter {
    fn convert(&self, latex: &str, display: bool) -> Result<String, MathError>;
}

impl<F> MathConverter for F
where
    F: Fn(&str, bool) -> Result<String, MathError>,
{
    fn convert(&self, latex: &str, display: bool) -> Result<String, MathError> {
        self(latex, display)
    }
}

/// Runs `texmath --from tex --to omml` once per equation.
#[derive(Debug, Clone)]
pub struct TexmathConverter {
    program: PathBuf,
    timeout: Duration,
}

impl TexmathConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_options(options: &MathOptions) -> Self {
        Self::new(options.resolve_texmath()).with_timeout(options.timeout)
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl MathConverter for TexmathConverter {
    fn convert(&self, latex: &str, _display: bool) -> Result<String, MathError> {
        let mut child = Command::new(&self.program)
            .args(["--from", "tex", "--to", "omml"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                MathError::Unavailable(format!("{}: {}", self.program.display(), e))
            })?;

        // Drain both pipes on their own threads so the timeout poll below
        // never blocks on a full pipe.
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(latex.as_bytes()) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MathError::Unavailable(e.to_string()));
            }
        }

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(MathError::Timeout(self.timeout));
                }
                Ok(None) => thread::sleep(Duration::from_millis(5)),
                Err(e) => return Err(MathError::Unavailable(e.to_string())),
            }
        };

        let stdout = stdout.map(join_reader).unwrap_or_default();
        let stderr = stderr.map(join_reader).unwrap_or_default();
        if !status.success() {
            return Err(MathError::Failed {
                status: status.code(),
                stderr,
            });
        }
        Ok(stdout.trim().to_string())
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Converter used when math conversion is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledConverter;

impl MathConverter for DisabledConverter {
    fn convert(&self, _latex: &str, _display: bool) -> Result<String, MathError> {
        Err(MathError::Disabled)
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Literal text standing in for an equation that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathFallback {
    pub run: Inline,
    pub warning: ConversionWarning,
}

/// A converted equation run, or the fallback run plus its warning.
pub type MathResult = Result<Inline, MathFallback>;

/// The single boundary to the external equation converter.
pub struct MathAdapter {
    converter: Box<dyn MathConverter>,
}

impl fmt::Debug for MathAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MathAdapter").finish_non_exhaustive()
    }
}

impl Default for MathAdapter {
    fn default() -> Self {
        Self::from_options(&MathOptions::default())
    }
}

impl MathAdapter {
    pub fn new(converter: impl MathConverter + 'static) -> Self {
        Self {
            converter: Box::new(converter),
        }
    }

    pub fn disabled() -> Self {
        Self::new(DisabledConverter)
    }

    pub fn from_options(options: &MathOptions) -> Self {
        if options.enabled {
            Self::new(TexmathConverter::from_options(options))
        } else {
            Self::disabled()
        }
    }

    /// Convert one equation span.
    ///
    /// `offset` is the source position of the span, used for the warning on
    /// failure.
    pub fn convert(&self, source: &str, display: bool, offset: usize) -> MathResult {
        let cleaned = clean_delimiters(source.trim());
        let result = if cleaned.trim().is_empty() {
            Err(MathError::Empty)
        } else {
            self.converter
                .convert(cleaned.trim(), display)
                .and_then(|omml| prepare_omml(&omml, display))
        };
        match result {
            Ok(markup) => {
                log::debug!(
                    "converted {} equation at {} ({} bytes of OMML)",
                    if display { "display" } else { "inline" },
                    offset,
                    markup.len()
                );
                Ok(Inline::Math(markup))
            }
            Err(err) => {
                let warning = ConversionWarning::math_conversion(source.trim(), &err).at(offset);
                log::warn!("{}", warning);
                Err(MathFallback {
                    run: Inline::plain(source.trim()),
                    warning,
                })
            }
        }
    }
}

/// Strip null delimiters and sizing prefixes the converter handles poorly.
pub fn clean_delimiters(latex: &str) -> String {
    let without_null = NULL_DELIMITER.replace_all(latex, "");
    SIZE_PREFIX.replace_all(&without_null, "").into_owned()
}

/// Validate converter output and shape it for inline or display use.
///
/// Inline runs need the bare `<m:oMath>`; display paragraphs need an
/// `<m:oMathPara>`. Both get the math namespace declared on the root.
pub fn prepare_omml(output: &str, display: bool) -> Result<String, MathError> {
    let output = output.trim();
    if output.is_empty() {
        return Err(MathError::Empty);
    }
    if !output.starts_with("<m:oMath") {
        return Err(MathError::Malformed(output.to_string()));
    }

    let is_para = output.starts_with("<m:oMathPara");
    let inner = if is_para {
        let start = OMATH_OPEN
            .find(output)
            .map(|m| m.start())
            .ok_or_else(|| MathError::Malformed(output.to_string()))?;
        let end = output
            .rfind("</m:oMath>")
            .map(|idx| idx + "</m:oMath>".len())
            .filter(|end| *end > start)
            .ok_or_else(|| MathError::Malformed(output.to_string()))?;
        &output[start..end]
    } else {
        output
    };

    if display {
        let para = if is_para {
            output.to_string()
        } else {
            format!("<m:oMathPara>{}</m:oMathPara>", inner)
        };
        Ok(declare_namespace(&para, "<m:oMathPara"))
    } else {
        Ok(declare_namespace(inner, "<m:oMath"))
    }
}

fn declare_namespace(markup: &str, root: &str) -> String {
    let head_end = markup.find('>').unwrap_or(markup.len());
    if markup[..head_end].contains("xmlns:m=") {
        return markup.to_string();
    }
    format!(
        "{} xmlns:m=\"{}\"{}",
        root,
        OMML_NS,
        &markup[root.len()..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::WarningKind;
    use pretty_assertions::assert_eq;

    const PARA: &str = "<m:oMathPara><m:oMath><m:r><m:t>x</m:t></m:r></m:oMath></m:oMathPara>";

    #[test]
    fn test_clean_delimiters() {
        assert_eq!(clean_delimiters(r"\Bigl. x \Bigr|"), " x |");
        assert_eq!(clean_delimiters(r"\bigl( a \bigr)"), "( a )");
        assert_eq!(clean_delimiters(r"\bigcup_i A_i \Big\{"), r"\bigcup_i A_i \{");
    }

    #[test]
    fn test_prepare_inline_extracts_inner_math() {
        let inline = prepare_omml(PARA, false).unwrap();
        assert!(inline.starts_with("<m:oMath xmlns:m="));
        assert!(inline.ends_with("</m:oMath>"));
        assert!(!inline.contains("oMathPara"));
    }

    #[test]
    fn test_prepare_display_wraps_bare_math() {
        let display = prepare_omml("<m:oMath><m:r><m:t>y</m:t></m:r></m:oMath>", true).unwrap();
        assert!(display.starts_with("<m:oMathPara xmlns:m="));
        assert!(display.ends_with("</m:oMath></m:oMathPara>"));
    }

    #[test]
    fn test_prepare_rejects_garbage() {
        assert!(matches!(
            prepare_omml("error: parse failed", true),
            Err(MathError::Malformed(_))
        ));
        assert_eq!(prepare_omml("  ", false), Err(MathError::Empty));
    }

    #[test]
    fn test_adapter_success() {
        let adapter = MathAdapter::new(|_: &str, _: bool| -> Result<String, MathError> {
            Ok(PARA.to_string())
        });
        let run = adapter.convert("x", true, 0).unwrap();
        assert!(matches!(run, Inline::Math(ref m) if m.contains("oMathPara")));
    }

    #[test]
    fn test_adapter_passes_cleaned_source() {
        let adapter = MathAdapter::new(|latex: &str, _: bool| -> Result<String, MathError> {
            assert_eq!(latex, "( a )");
            Ok(PARA.to_string())
        });
        assert!(adapter.convert(r" \Bigl( a \Bigr) ", false, 0).is_ok());
    }

    #[test]
    fn test_adapter_failure_falls_back_to_source() {
        let adapter = MathAdapter::new(|_: &str, _: bool| -> Result<String, MathError> {
            Err(MathError::Failed {
                status: Some(1),
                stderr: "unexpected }".into(),
            })
        });
        let fallback = adapter.convert(" a^{2 ", false, 42).unwrap_err();
        assert_eq!(fallback.run, Inline::plain("a^{2"));
        assert_eq!(fallback.warning.kind, WarningKind::MathConversion);
        assert_eq!(fallback.warning.offset, Some(42));
        assert!(fallback.warning.message.contains("status 1"));
    }

    #[test]
    fn test_disabled_adapter() {
        let fallback = MathAdapter::disabled().convert("E=mc^2", true, 0).unwrap_err();
        assert_eq!(fallback.run, Inline::plain("E=mc^2"));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let converter = TexmathConverter::new("/nonexistent/texmath-binary");
        assert!(matches!(
            converter.convert("x", false),
            Err(MathError::Unavailable(_))
        ));
    }

    #[test]
    fn test_options_resolve_explicit_path() {
        let options = MathOptions {
            texmath: Some(PathBuf::from("/opt/texmath")),
            ..MathOptions::default()
        };
        assert_eq!(options.resolve_texmath(), PathBuf::from("/opt/texmath"));
        assert!(!MathOptions::disabled().enabled);
    }
}
