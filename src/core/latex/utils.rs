//! Utility functions for LaTeX conversion
//!
//! This module contains pure utility functions that don't depend on converter state.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LABEL_CMD: Regex = Regex::new(r"\\label\s*\{").unwrap();
    static ref EQUATION_TAGS: Regex = Regex::new(r"\\(?:nonumber|notag)\b").unwrap();
    static ref SIZE_WRAPPER: Regex = Regex::new(r"\\(resizebox|scalebox)\s*\{").unwrap();
    /// Blank line: paragraph separator in running text
    pub static ref PARAGRAPH_BREAK: Regex = Regex::new(r"\n[ \t]*\n").unwrap();
}

// =============================================================================
// Brace Utilities
// =============================================================================

/// Index of the `}` matching the `{` at `open`, honoring escapes.
pub fn matching_brace(s: &str, open: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Position of the next `{` at or after `from`, skipping only whitespace.
fn next_group(s: &str, from: usize) -> Option<usize> {
    let rest = s.get(from..)?;
    let skipped = rest.len() - rest.trim_start().len();
    (rest.as_bytes().get(skipped) == Some(&b'{')).then_some(from + skipped)
}

// =============================================================================
// Equation Bodies
// =============================================================================

/// Remove every `\label{...}` from a math body, returning the keys in order.
pub fn take_labels(body: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(body.len());
    let mut labels = Vec::new();
    let mut rest = 0usize;
    while let Some(m) = LABEL_CMD.find_at(body, rest) {
        let open = m.end() - 1;
        let Some(close) = matching_brace(body, open) else {
            break;
        };
        out.push_str(&body[rest..m.start()]);
        let key = body[open + 1..close].trim();
        if !key.is_empty() {
            labels.push(key.to_string());
        }
        rest = close + 1;
    }
    out.push_str(&body[rest..]);
    (out, labels)
}

/// Drop `\nonumber` and `\notag`.
pub fn strip_equation_tags(body: &str) -> String {
    EQUATION_TAGS.replace_all(body, "").into_owned()
}

/// Replace `\resizebox{w}{h}{X}` and `\scalebox{f}{X}` by `X`, dropping any
/// math delimiters around `X`.
pub fn unwrap_size_wrappers(body: &str) -> String {
    let mut current = body.to_string();
    let mut search_from = 0usize;
    while let Some(caps) = SIZE_WRAPPER.captures_at(&current, search_from) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let skip = if &caps[1] == "resizebox" { 2 } else { 1 };
        let mut open = whole.end - 1;
        let mut ok = true;
        for _ in 0..skip {
            match matching_brace(&current, open).and_then(|close| next_group(&current, close + 1)) {
                Some(next) => open = next,
                None => {
                    ok = false;
                    break;
                }
            }
        }
        let close = if ok { matching_brace(&current, open) } else { None };
        let Some(close) = close else {
            search_from = whole.end;
            continue;
        };
        let inner = strip_math_delimiters(current[open + 1..close].trim()).to_string();
        current.replace_range(whole.start..close + 1, &inner);
        search_from = whole.start + inner.len();
    }
    current
}

/// `$x$`, `$$x$$`, `\(x\)` and `\[x\]` -> `x`.
pub fn strip_math_delimiters(s: &str) -> &str {
    let pairs = [("$$", "$$"), ("\\[", "\\]"), ("\\(", "\\)"), ("$", "$")];
    for (open, close) in pairs {
        if s.len() >= open.len() + close.len() && s.starts_with(open) && s.ends_with(close) {
            return s[open.len()..s.len() - close.len()].trim();
        }
    }
    s
}

/// Clean a display-math body: labels out, equation tags and size wrappers
/// removed, whitespace trimmed.
pub fn prepare_equation_body(body: &str) -> (String, Vec<String>) {
    let (without_labels, labels) = take_labels(body);
    let cleaned = unwrap_size_wrappers(&strip_equation_tags(&without_labels));
    (cleaned.trim().to_string(), labels)
}

/// Split a comma separated key list (`\cite{a, b}`) into trimmed keys.
pub fn split_keys(keys: &str) -> Vec<&str> {
    keys.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_matching_brace() {
        assert_eq!(matching_brace("{a{b}c}", 0), Some(6));
        assert_eq!(matching_brace("{a\\}b}", 0), Some(5));
        assert_eq!(matching_brace("{open", 0), None);
        assert_eq!(matching_brace("x", 0), None);
    }

    #[test]
    fn test_take_labels() {
        let (body, labels) = take_labels("a = b \\label{eq:1} \\\\ c \\label {eq:2}");
        assert_eq!(body, "a = b  \\\\ c ");
        assert_eq!(labels, vec!["eq:1", "eq:2"]);
    }

    #[test]
    fn test_strip_equation_tags() {
        assert_eq!(strip_equation_tags("a \\nonumber \\\\ b \\notag"), "a  \\\\ b ");
    }

    #[test]
    fn test_unwrap_resizebox() {
        assert_eq!(
            unwrap_size_wrappers("\\resizebox{0.9\\textwidth}{!}{$x + y$}"),
            "x + y"
        );
        assert_eq!(unwrap_size_wrappers("a \\scalebox{0.8}{b} c"), "a b c");
        assert_eq!(unwrap_size_wrappers("\\resizebox{w}"), "\\resizebox{w}");
    }

    #[test]
    fn test_prepare_equation_body() {
        let (body, labels) =
            prepare_equation_body("\n  E = mc^2 \\label{eq:energy} \\nonumber\n");
        assert_eq!(body, "E = mc^2");
        assert_eq!(labels, vec!["eq:energy"]);
    }

    #[test]
    fn test_split_keys() {
        assert_eq!(split_keys(" a, b ,,c"), vec!["a", "b", "c"]);
    }
}
