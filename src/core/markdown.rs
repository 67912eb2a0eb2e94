//! Markdown to block tree converter
//!
//! A line-based reader for the Markdown subset found in notes and drafts:
//! ATX headings, bullet and numbered lists, fenced code, `$$` display math
//! (possibly spanning lines) and inline `$math$`, `**bold**`, `*italic*` and
//! `` `code` ``. Blank lines separate paragraphs; consecutive text lines join.

use lazy_static::lazy_static;
use regex::Regex;
use texdocx_ir::{
    normalize_runs, plain_text, Block, Document, EquationBlock, Inline, ListItem, RunStyle,
};

use crate::core::latex::MathAdapter;
use crate::core::ConversionOutput;
use crate::utils::error::ConversionWarning;

lazy_static! {
    static ref HEADING: Regex = Regex::new(r"^(#{1,6})\s+(.*?)\s*#*\s*$").unwrap();
    static ref BULLET: Regex = Regex::new(r"^\s{0,3}[-*+]\s+(.*)$").unwrap();
    static ref NUMBERED: Regex = Regex::new(r"^\s{0,3}\d+[.)]\s+(.*)$").unwrap();
    static ref RULE: Regex = Regex::new(r"^\s*(?:-{3,}|\*{3,}|_{3,})\s*$").unwrap();
    static ref QUOTE: Regex = Regex::new(r"^\s{0,3}>\s?").unwrap();
}

/// Convert Markdown source into a block tree
pub fn convert_markdown(src: &str, math: &MathAdapter) -> ConversionOutput {
    let mut reader = MarkdownReader::new(src, math);
    reader.run();
    reader.finish()
}

/// An open list: ordered flag and its items
struct OpenList {
    ordered: bool,
    items: Vec<ListItem>,
}

struct MarkdownReader<'a> {
    src: &'a str,
    math: &'a MathAdapter,
    blocks: Vec<Block>,
    paragraph: Vec<Inline>,
    list: Option<OpenList>,
    warnings: Vec<ConversionWarning>,
    title: Option<String>,
    /// Headings keep math as source text
    math_as_text: bool,
}

impl<'a> MarkdownReader<'a> {
    fn new(src: &'a str, math: &'a MathAdapter) -> Self {
        Self {
            src,
            math,
            blocks: Vec::new(),
            paragraph: Vec::new(),
            list: None,
            warnings: Vec::new(),
            title: None,
            math_as_text: false,
        }
    }

    /// Lines with the byte offset of their first character
    fn lines(&self) -> Vec<(usize, &'a str)> {
        let src = self.src;
        let mut offset = 0usize;
        src.split('\n')
            .map(|line| {
                let start = offset;
                offset += line.len() + 1;
                (start, line.strip_suffix('\r').unwrap_or(line))
            })
            .collect()
    }

    fn run(&mut self) {
        let lines = self.lines();
        let mut idx = 0usize;
        let mut after_blank = true;

        while idx < lines.len() {
            let (offset, line) = lines[idx];
            let trimmed = line.trim();
            idx += 1;

            if trimmed.is_empty() {
                self.flush_paragraph();
                after_blank = true;
                continue;
            }

            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                self.close_list();
                idx = self.read_fence(&lines, idx, offset, &trimmed[..3]);
                after_blank = false;
                continue;
            }

            if trimmed.starts_with("$$") {
                self.close_list();
                idx = self.read_display_math(&lines, idx - 1);
                after_blank = false;
                continue;
            }

            if let Some(caps) = HEADING.captures(line) {
                self.close_list();
                let level = caps[1].len().min(4) as u8;
                let body = caps.get(2).map_or("", |m| m.as_str());
                let body_offset = offset + caps.get(2).map_or(0, |m| m.start());
                self.push_heading(level, body, body_offset);
                after_blank = false;
                continue;
            }

            if RULE.is_match(line) {
                self.close_list();
                after_blank = true;
                continue;
            }

            if let Some((ordered, caps)) = BULLET
                .captures(line)
                .map(|c| (false, c))
                .or_else(|| NUMBERED.captures(line).map(|c| (true, c)))
            {
                let item = caps.get(1).map_or("", |m| m.as_str());
                let item_offset = offset + caps.get(1).map_or(0, |m| m.start());
                self.push_item(ordered, item, item_offset);
                after_blank = false;
                continue;
            }

            // Indented continuation of the last list item
            let indented = line.starts_with(' ') || line.starts_with('\t');
            if self.list.is_some() && indented && !after_blank {
                let indent = line.len() - line.trim_start().len();
                let runs = self.format_inline(trimmed, offset + indent);
                if let Some(item) = self.list.as_mut().and_then(|list| list.items.last_mut()) {
                    item.runs.push(Inline::plain(" "));
                    item.runs.extend(runs);
                    item.runs = normalize_runs(std::mem::take(&mut item.runs));
                }
                continue;
            }

            self.close_list();
            let (text, text_offset) = match QUOTE.find(line) {
                Some(m) => (&line[m.end()..], offset + m.end()),
                None => (line, offset),
            };
            if !self.paragraph.is_empty() {
                self.paragraph.push(Inline::plain(" "));
            }
            let runs = self.format_inline(text, text_offset);
            self.paragraph.extend(runs);
            after_blank = false;
        }
    }

    fn finish(mut self) -> ConversionOutput {
        self.close_list();
        let src = self.src;
        let mut warnings = self.warnings;
        for warning in &mut warnings {
            warning.resolve_line(src);
        }
        warnings.sort_by_key(|w| w.offset.unwrap_or(usize::MAX));
        log::info!(
            "converted Markdown: {} blocks, {} warnings",
            self.blocks.len(),
            warnings.len()
        );
        ConversionOutput {
            document: Document::new(self.blocks),
            labels: Default::default(),
            warnings,
            title: self.title,
        }
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    fn flush_paragraph(&mut self) {
        let runs = normalize_runs(std::mem::take(&mut self.paragraph));
        if !runs.is_empty() {
            self.blocks.push(Block::Paragraph(runs));
        }
    }

    fn close_list(&mut self) {
        self.flush_paragraph();
        if let Some(list) = self.list.take() {
            if !list.items.is_empty() {
                self.blocks.push(Block::List {
                    ordered: list.ordered,
                    items: list.items,
                });
            }
        }
    }

    fn push_block(&mut self, block: Block) {
        self.flush_paragraph();
        self.blocks.push(block);
    }

    fn push_heading(&mut self, level: u8, body: &str, offset: usize) {
        self.math_as_text = true;
        let text = plain_text(&normalize_runs(self.format_inline(body, offset)));
        self.math_as_text = false;
        log::debug!("heading level {}: {}", level, text);
        if level == 1 && self.title.is_none() {
            self.title = Some(text.clone());
        }
        self.push_block(Block::heading(level, text));
    }

    fn push_item(&mut self, ordered: bool, text: &str, offset: usize) {
        self.flush_paragraph();
        if self.list.as_ref().is_some_and(|list| list.ordered != ordered) {
            self.close_list();
        }
        let runs = normalize_runs(self.format_inline(text, offset));
        self.list
            .get_or_insert_with(|| OpenList {
                ordered,
                items: Vec::new(),
            })
            .items
            .push(ListItem::new(runs));
    }

    /// Read a fenced code block; returns the index of the next line.
    fn read_fence(
        &mut self,
        lines: &[(usize, &str)],
        mut idx: usize,
        offset: usize,
        fence: &str,
    ) -> usize {
        let mut runs = Vec::new();
        let mut closed = false;
        while idx < lines.len() {
            let (_, line) = lines[idx];
            idx += 1;
            if line.trim_start().starts_with(fence) {
                closed = true;
                break;
            }
            if !runs.is_empty() {
                runs.push(Inline::LineBreak);
            }
            if !line.is_empty() {
                runs.push(Inline::styled(line, RunStyle::monospace()));
            }
        }
        if !closed {
            self.warn(ConversionWarning::parse_error("Code fence is never closed").at(offset));
        }
        if !runs.is_empty() {
            self.push_block(Block::Paragraph(runs));
        }
        idx
    }

    /// Read a `$$ ... $$` equation starting on line `idx`; it may span lines.
    fn read_display_math(&mut self, lines: &[(usize, &str)], idx: usize) -> usize {
        let (offset, first) = lines[idx];
        let lead = first.len() - first.trim_start().len();
        let src = self.src;
        let start = (offset + lead + 2).min(src.len());
        let rest = &src[start..];

        let (body, consumed, closed) = match rest.find("$$") {
            Some(end) => (&rest[..end], end + 2, true),
            None => (rest, rest.len(), false),
        };
        if !closed {
            self.warn(ConversionWarning::unterminated_math("$$").at(offset + lead));
        }
        let end = start + consumed;

        let source = body.trim().to_string();
        if source.is_empty() {
            self.warn(
                ConversionWarning::parse_error("Empty display equation skipped").at(offset + lead),
            );
        } else {
            let content = match self.math.convert(&source, true, offset + lead) {
                Ok(run) => run,
                Err(fallback) => {
                    self.warnings.push(fallback.warning);
                    fallback.run
                }
            };
            self.push_block(Block::Equation(EquationBlock {
                content,
                source,
                env: None,
                label: None,
            }));
        }

        // Resume on the line after the closer; trailing text on that line
        // starts a new paragraph.
        let mut next = idx;
        while next < lines.len() && lines[next].0 + lines[next].1.len() < end {
            next += 1;
        }
        if next < lines.len() {
            let (line_start, line) = lines[next];
            let tail_from = end.saturating_sub(line_start).min(line.len());
            let tail = line[tail_from..].trim();
            if !tail.is_empty() {
                let runs = self.format_inline(tail, line_start + tail_from);
                self.paragraph.extend(runs);
            }
        }
        next + 1
    }

    fn warn(&mut self, warning: ConversionWarning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    // =========================================================================
    // Inline formatting
    // =========================================================================

    fn format_inline(&mut self, text: &str, offset: usize) -> Vec<Inline> {
        let mut out = Vec::new();
        self.format_span(text, offset, RunStyle::PLAIN, &mut out);
        out
    }

    fn format_span(&mut self, text: &str, offset: usize, style: RunStyle, out: &mut Vec<Inline>) {
        let mut plain = String::new();
        let mut pos = 0usize;

        while pos < text.len() {
            let rest = &text[pos..];

            if let Some(escaped) = rest.strip_prefix('\\').and_then(|r| r.chars().next()) {
                if "$*_`\\#".contains(escaped) {
                    plain.push(escaped);
                    pos += 1 + escaped.len_utf8();
                    continue;
                }
            }

            if let Some((marker, inner_style)) = emphasis_marker(rest) {
                if let Some(close) = closing_marker(&rest[marker.len()..], marker) {
                    let inner = &rest[marker.len()..marker.len() + close];
                    if !inner.trim().is_empty() && !inner.starts_with(' ') {
                        flush_plain(&mut plain, style, out);
                        let inner_offset = offset + pos + marker.len();
                        self.format_span(inner, inner_offset, style.merge(inner_style), out);
                        pos += marker.len() * 2 + close;
                        continue;
                    }
                }
            }

            if rest.starts_with('`') {
                if let Some(close) = rest[1..].find('`') {
                    flush_plain(&mut plain, style, out);
                    out.push(Inline::styled(
                        &rest[1..1 + close],
                        style.merge(RunStyle::monospace()),
                    ));
                    pos += close + 2;
                    continue;
                }
            }

            if rest.starts_with('$') {
                let delim = if rest.starts_with("$$") { "$$" } else { "$" };
                if let Some(close) = rest[delim.len()..].find(delim) {
                    let body = &rest[delim.len()..delim.len() + close];
                    if !body.trim().is_empty() {
                        flush_plain(&mut plain, style, out);
                        self.format_math(body, offset + pos, style, out);
                        pos += delim.len() * 2 + close;
                        continue;
                    }
                }
            }

            let Some(c) = rest.chars().next() else {
                break;
            };
            plain.push(c);
            pos += c.len_utf8();
        }
        flush_plain(&mut plain, style, out);
    }

    fn format_math(&mut self, body: &str, offset: usize, style: RunStyle, out: &mut Vec<Inline>) {
        let source = body.trim();
        if self.math_as_text {
            out.push(Inline::styled(source, style));
            return;
        }
        match self.math.convert(source, false, offset) {
            Ok(run) => out.push(run),
            Err(fallback) => {
                self.warnings.push(fallback.warning);
                out.push(Inline::styled(source, style));
            }
        }
    }
}

/// Emphasis opener at the start of `rest`, longest first.
fn emphasis_marker(rest: &str) -> Option<(&'static str, RunStyle)> {
    if rest.starts_with("**") {
        Some(("**", RunStyle::bold()))
    } else if rest.starts_with("__") {
        Some(("__", RunStyle::bold()))
    } else if rest.starts_with('*') {
        Some(("*", RunStyle::italic()))
    } else {
        None
    }
}

/// Offset of the marker closing an emphasis span. A single `*` skips `**`
/// pairs; a double marker absorbs a trailing single closer (`***`).
fn closing_marker(s: &str, marker: &str) -> Option<usize> {
    if marker.len() == 1 {
        let bytes = s.as_bytes();
        let mut i = 0usize;
        while i < bytes.len() {
            if bytes[i] == b'*' {
                let run = bytes[i..].iter().take_while(|&&b| b == b'*').count();
                if run == 1 {
                    return Some(i);
                }
                i += run;
            } else {
                i += 1;
            }
        }
        return None;
    }
    let mut close = s.find(marker)?;
    while s[close + marker.len()..].starts_with(&marker[..1]) {
        close += 1;
    }
    Some(close)
}

fn flush_plain(plain: &mut String, style: RunStyle, out: &mut Vec<Inline>) {
    if !plain.is_empty() {
        out.push(Inline::styled(std::mem::take(plain), style));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::latex::math::MathError;
    use crate::utils::error::WarningKind;
    use pretty_assertions::assert_eq;

    fn adapter() -> MathAdapter {
        MathAdapter::new(|latex: &str, _display: bool| -> Result<String, MathError> {
            Ok(format!("<m:oMath><m:r><m:t>{}</m:t></m:r></m:oMath>", latex))
        })
    }

    fn convert(src: &str) -> ConversionOutput {
        convert_markdown(src, &adapter())
    }

    #[test]
    fn test_headings_and_paragraphs() {
        let out = convert("# Title\n\nFirst line\nsecond line.\n\n## Part\n#### Deep ##\nText");
        assert_eq!(
            out.document.blocks,
            vec![
                Block::heading(1, "Title"),
                Block::Paragraph(vec![Inline::plain("First line second line.")]),
                Block::heading(2, "Part"),
                Block::heading(4, "Deep"),
                Block::Paragraph(vec![Inline::plain("Text")]),
            ]
        );
        assert_eq!(out.title.as_deref(), Some("Title"));
    }

    #[test]
    fn test_lists_group_by_kind() {
        let out = convert("- a\n* b\n  continued\n1. one\n2. two\n\nafter");
        match &out.document.blocks[..] {
            [Block::List {
                ordered: false,
                items: bullets,
            }, Block::List {
                ordered: true,
                items: numbered,
            }, Block::Paragraph(_)] => {
                assert_eq!(bullets.len(), 2);
                assert_eq!(bullets[1].runs, vec![Inline::plain("b continued")]);
                assert_eq!(numbered[1].runs, vec![Inline::plain("two")]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_inline_styles() {
        let out = convert("Some **bold *both*** and `x_1` plus *it*");
        let bold_italic = RunStyle::bold().merge(RunStyle::italic());
        assert_eq!(
            out.document.blocks[0],
            Block::Paragraph(vec![
                Inline::plain("Some "),
                Inline::styled("bold ", RunStyle::bold()),
                Inline::styled("both", bold_italic),
                Inline::plain(" and "),
                Inline::styled("x_1", RunStyle::monospace()),
                Inline::plain(" plus "),
                Inline::styled("it", RunStyle::italic()),
            ])
        );
    }

    #[test]
    fn test_inline_math_and_escaped_dollar() {
        let out = convert("Costs \\$5 when $x^2$ holds");
        match &out.document.blocks[0] {
            Block::Paragraph(runs) => {
                assert_eq!(runs[0], Inline::plain("Costs $5 when "));
                assert!(matches!(runs[1], Inline::Math(_)));
                assert_eq!(runs[2], Inline::plain(" holds"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_multiline_display_math() {
        let out = convert("Before\n$$\na = b\n+ c\n$$\nAfter");
        assert_eq!(out.document.blocks.len(), 3);
        match &out.document.blocks[1] {
            Block::Equation(eq) => {
                assert_eq!(eq.source, "a = b\n+ c");
                assert!(eq.is_converted());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            out.document.blocks[2],
            Block::Paragraph(vec![Inline::plain("After")])
        );
    }

    #[test]
    fn test_single_line_display_math_with_tail() {
        let out = convert("$$E=mc^2$$ tail");
        assert!(matches!(out.document.blocks[0], Block::Equation(_)));
        assert_eq!(
            out.document.blocks[1],
            Block::Paragraph(vec![Inline::plain("tail")])
        );
    }

    #[test]
    fn test_unterminated_display_math() {
        let out = convert("$$ x = 1\nstill math");
        assert_eq!(out.warnings[0].kind, WarningKind::UnterminatedMath);
        match &out.document.blocks[0] {
            Block::Equation(eq) => assert_eq!(eq.source, "x = 1\nstill math"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_code_fence() {
        let out = convert("```rust\nlet x = 1;\n  y\n```\ntext");
        assert_eq!(
            out.document.blocks[0],
            Block::Paragraph(vec![
                Inline::styled("let x = 1;", RunStyle::monospace()),
                Inline::LineBreak,
                Inline::styled("  y", RunStyle::monospace()),
            ])
        );
    }

    #[test]
    fn test_math_failure_keeps_source() {
        let out = convert_markdown("Value $\\frac{a}{b}$.", &MathAdapter::disabled());
        assert_eq!(
            out.document.blocks[0],
            Block::Paragraph(vec![Inline::plain("Value \\frac{a}{b}.")])
        );
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].line, Some(1));
    }

    #[test]
    fn test_heading_keeps_math_source() {
        let out = convert("# On $\\alpha$ decay");
        assert_eq!(out.document.blocks[0], Block::heading(1, "On \\alpha decay"));
    }
}
