//! BibTeX to block tree converter
//!
//! Reads a `.bib` database (entries, `@string` macros, `#` concatenation,
//! month abbreviations) and renders one reference paragraph per entry under a
//! "Bibliography" heading. Entries that cannot be read are skipped with a
//! warning.

use indexmap::IndexMap;
use phf::phf_map;
use texdocx_ir::{Block, Document, Inline, RunStyle};

use crate::core::ConversionOutput;
use crate::utils::error::{ConversionError, ConversionResult, ConversionWarning};
use crate::utils::unicode::latex_to_unicode;

/// Predefined month macros
static MONTHS: phf::Map<&'static str, &'static str> = phf_map! {
    "jan" => "January",
    "feb" => "February",
    "mar" => "March",
    "apr" => "April",
    "may" => "May",
    "jun" => "June",
    "jul" => "July",
    "aug" => "August",
    "sep" => "September",
    "oct" => "October",
    "nov" => "November",
    "dec" => "December",
};

/// Heading placed above the reference list
pub const BIBLIOGRAPHY_HEADING: &str = "Bibliography";

/// One database entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    /// Lowercased entry type (`article`, `book`, ...)
    pub entry_type: String,
    pub key: String,
    /// Lowercased field names in source order, values flattened to Unicode
    pub fields: IndexMap<String, String>,
    /// Byte offset of the `@`
    pub offset: usize,
}

impl BibEntry {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Parsed database plus the problems found while reading it
#[derive(Debug, Clone, Default)]
pub struct BibDatabase {
    pub entries: Vec<BibEntry>,
    pub warnings: Vec<ConversionWarning>,
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a BibTeX database.
pub fn parse_bibtex(src: &str) -> BibDatabase {
    let mut db = BibDatabase::default();
    let mut macros: IndexMap<String, String> = IndexMap::new();
    let bytes = src.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'@' {
            i += 1;
            continue;
        }
        let start = i;
        let mut j = i + 1;
        while j < bytes.len() && bytes[j].is_ascii_alphabetic() {
            j += 1;
        }
        let entry_type = src[start + 1..j].to_ascii_lowercase();
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if entry_type.is_empty() || j >= bytes.len() || !matches!(bytes[j], b'{' | b'(') {
            db.warnings.push(
                ConversionWarning::parse_error("Stray '@' outside of an entry ignored").at(start),
            );
            i = start + 1;
            continue;
        }

        let (open, close) = if bytes[j] == b'{' { (b'{', b'}') } else { (b'(', b')') };
        let Some(end) = entry_end(bytes, j + 1, open, close) else {
            db.warnings.push(
                ConversionWarning::parse_error(format!("@{} entry is never closed", entry_type))
                    .at(start),
            );
            break;
        };
        let body = &src[j + 1..end];
        i = end + 1;

        match entry_type.as_str() {
            "comment" | "preamble" => {}
            "string" => read_string_macro(body, &mut macros),
            _ => match read_entry(&entry_type, body, &macros) {
                Ok((key, fields)) => {
                    if db.entries.iter().any(|entry| entry.key == key) {
                        db.warnings
                            .push(ConversionWarning::duplicate_label(&key).at(start));
                        continue;
                    }
                    log::debug!(
                        "bib entry @{}{{{}}} with {} fields",
                        entry_type,
                        key,
                        fields.len()
                    );
                    db.entries.push(BibEntry {
                        entry_type,
                        key,
                        fields,
                        offset: start,
                    });
                }
                Err(message) => {
                    let warning = ConversionWarning::parse_error(message).at(start);
                    log::warn!("{}", warning);
                    db.warnings.push(warning);
                }
            },
        }
    }
    db
}

/// Index of the delimiter closing an entry body starting at `from`.
fn entry_end(bytes: &[u8], from: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 1i32;
    let mut in_quote = false;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' && depth == 1 && bytes[i - 1] != b'\\' {
            in_quote = !in_quote;
        }
        if !in_quote {
            if b == open || (open == b'(' && b == b'{') {
                depth += 1;
            } else if b == close || (open == b'(' && b == b'}') {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

fn read_string_macro(body: &str, macros: &mut IndexMap<String, String>) {
    let Some((name, value)) = body.split_once('=') else {
        return;
    };
    let name = name.trim().to_ascii_lowercase();
    if name.is_empty() {
        return;
    }
    let value = expand_value(value.trim(), macros);
    macros.insert(name, value);
}

/// Read `key, field = value, ...`.
fn read_entry(
    entry_type: &str,
    body: &str,
    macros: &IndexMap<String, String>,
) -> Result<(String, IndexMap<String, String>), String> {
    let Some((key, rest)) = body.split_once(',') else {
        let key = body.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(format!("@{} entry without a citation key skipped", entry_type));
        }
        return Ok((key.to_string(), IndexMap::new()));
    };
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) || key.contains('=') {
        return Err(format!("@{} entry without a citation key skipped", entry_type));
    }

    let bytes = rest.as_bytes();
    let mut fields = IndexMap::new();
    let mut idx = 0usize;
    while idx < bytes.len() {
        while idx < bytes.len() && (bytes[idx].is_ascii_whitespace() || bytes[idx] == b',') {
            idx += 1;
        }
        if idx >= bytes.len() {
            break;
        }
        let field_start = idx;
        while idx < bytes.len()
            && (bytes[idx].is_ascii_alphanumeric()
                || matches!(bytes[idx], b'_' | b'-' | b':' | b'.'))
        {
            idx += 1;
        }
        let field = rest[field_start..idx].to_ascii_lowercase();
        while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        if field.is_empty() || idx >= bytes.len() || bytes[idx] != b'=' {
            return Err(format!("Malformed field in entry '{}'; entry skipped", key));
        }
        let (raw, next) = read_value(rest, idx + 1);
        idx = next;

        let expanded = expand_value(&raw, macros);
        let value = match field.as_str() {
            "url" | "doi" => expanded.replace(['{', '}'], ""),
            _ => collapse_whitespace(&latex_to_unicode(&expanded)),
        };
        fields.entry(field).or_insert(value);
    }
    Ok((key.to_string(), fields))
}

/// Raw text of a field value up to the next top-level comma.
fn read_value(body: &str, start: usize) -> (String, usize) {
    let bytes = body.as_bytes();
    let mut idx = start;
    let mut depth = 0i32;
    let mut in_quote = false;
    while idx < bytes.len() {
        let b = bytes[idx];
        if b == b'"' && depth == 0 && (idx == 0 || bytes[idx - 1] != b'\\') {
            in_quote = !in_quote;
        }
        if !in_quote {
            match b {
                b'{' => depth += 1,
                b'}' => depth = (depth - 1).max(0),
                b',' if depth == 0 => break,
                _ => {}
            }
        }
        idx += 1;
    }
    let value = body[start..idx].trim().to_string();
    if idx < bytes.len() {
        idx += 1;
    }
    (value, idx)
}

/// Resolve `#` concatenation, delimiters and macros.
fn expand_value(value: &str, macros: &IndexMap<String, String>) -> String {
    let mut out = String::new();
    for part in split_concat(value) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let resolved = if part.len() >= 2 && part.starts_with('{') && part.ends_with('}') {
            &part[1..part.len() - 1]
        } else if part.len() >= 2 && part.starts_with('"') && part.ends_with('"') {
            &part[1..part.len() - 1]
        } else {
            let name = part.to_ascii_lowercase();
            macros
                .get(&name)
                .map(String::as_str)
                .or_else(|| MONTHS.get(name.as_str()).copied())
                .unwrap_or(part)
        };
        out.push_str(resolved);
    }
    out
}

fn split_concat(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut last = 0usize;
    for (idx, ch) in value.char_indices() {
        match ch {
            '"' if depth == 0 => in_quote = !in_quote,
            '{' if !in_quote => depth += 1,
            '}' if !in_quote => depth = (depth - 1).max(0),
            '#' if depth == 0 && !in_quote => {
                parts.push(&value[last..idx]);
                last = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[last..]);
    parts
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// =============================================================================
// Formatting
// =============================================================================

/// "A", "A and B", "A, B, and C"
pub fn format_author_list(authors: &str) -> String {
    let names: Vec<&str> = authors
        .split(" and ")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    match names.as_slice() {
        [] => String::new(),
        [one] => one.to_string(),
        [first, second] => format!("{} and {}", first, second),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    }
}

fn quoted_title(entry: &BibEntry) -> Option<String> {
    entry.get("title").map(|title| format!("\"{}\"", title))
}

fn format_article(entry: &BibEntry) -> Vec<String> {
    let mut parts = Vec::new();
    parts.extend(entry.get("author").map(format_author_list));
    parts.extend(quoted_title(entry));
    parts.extend(entry.get("journal").map(str::to_string));

    let vol_num: Vec<String> = [
        entry.get("volume").map(|v| format!("vol. {}", v)),
        entry.get("number").map(|n| format!("no. {}", n)),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !vol_num.is_empty() {
        parts.push(vol_num.join(", "));
    }

    parts.extend(entry.get("pages").map(|p| format!("pp. {}", p)));
    let date: Vec<&str> = [entry.get("month"), entry.get("year")]
        .into_iter()
        .flatten()
        .collect();
    if !date.is_empty() {
        parts.push(date.join(" "));
    }
    parts.extend(entry.get("doi").map(|d| format!("doi: {}", d)));
    parts
}

fn format_inproceedings(entry: &BibEntry) -> Vec<String> {
    let mut parts = Vec::new();
    parts.extend(entry.get("author").map(format_author_list));
    parts.extend(quoted_title(entry));
    parts.extend(entry.get("booktitle").map(|b| format!("in {}", b)));
    parts.extend(entry.get("year").map(str::to_string));
    parts.extend(entry.get("pages").map(|p| format!("p. {}", p)));
    parts.extend(entry.get("doi").map(|d| format!("doi: {}", d)));
    parts
}

fn format_book(entry: &BibEntry) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(author) = entry.get("author") {
        parts.push(format_author_list(author));
    } else if let Some(editor) = entry.get("editor") {
        parts.push(format!("{} (Ed.)", format_author_list(editor)));
    }
    parts.extend(entry.get("title").map(str::to_string));
    parts.extend(entry.get("publisher").map(str::to_string));
    parts.extend(entry.get("year").map(str::to_string));
    parts.extend(entry.get("edition").map(|e| format!("{} ed.", e)));
    parts
}

fn format_generic(entry: &BibEntry) -> Vec<String> {
    let mut parts = Vec::new();
    parts.extend(entry.get("author").map(format_author_list));
    parts.extend(quoted_title(entry));
    parts.extend(entry.get("year").map(str::to_string));
    parts
}

/// Render an entry as a single reference string.
pub fn format_reference(entry: &BibEntry) -> String {
    let parts = match entry.entry_type.as_str() {
        "article" => format_article(entry),
        "inproceedings" | "conference" => format_inproceedings(entry),
        "book" => format_book(entry),
        _ => format_generic(entry),
    };
    format!("{}.", parts.join(", "))
}

// =============================================================================
// Conversion
// =============================================================================

/// Convert a BibTeX database into a block tree.
///
/// Fails only when the input has content but no readable entry.
pub fn convert_bibtex(src: &str) -> ConversionResult<ConversionOutput> {
    let db = parse_bibtex(src);
    if db.entries.is_empty() && !src.trim().is_empty() {
        return Err(ConversionError::invalid("no BibTeX entries found"));
    }

    let mut blocks = Vec::with_capacity(db.entries.len() + 1);
    blocks.push(Block::heading(1, BIBLIOGRAPHY_HEADING));
    for entry in &db.entries {
        blocks.push(Block::Paragraph(vec![
            Inline::styled(format!("[{}] ", entry.key), RunStyle::bold()),
            Inline::plain(format_reference(entry)),
        ]));
    }

    let mut warnings = db.warnings;
    for warning in &mut warnings {
        warning.resolve_line(src);
    }
    warnings.sort_by_key(|w| w.offset.unwrap_or(usize::MAX));
    log::info!(
        "converted BibTeX: {} references, {} warnings",
        db.entries.len(),
        warnings.len()
    );

    Ok(ConversionOutput {
        document: Document::new(blocks),
        labels: Default::default(),
        warnings,
        title: Some(BIBLIOGRAPHY_HEADING.to_string()),
    })
}
