//! LaTeX segmenter
//!
//! Splits LaTeX source into classified [`Fragment`]s:
//! - Comments, escapes and control symbols
//! - Commands with their optional and brace arguments (arity from [`super::spec`])
//! - Environment boundaries
//! - Inline and display math spans, including equation-family environments
//! - Verbatim spans
//!
//! Every byte of the input belongs to exactly one fragment, so concatenating the
//! `raw` fields reproduces the input. Unterminated constructs swallow the rest of
//! the input and are reported as warnings.

use lazy_static::lazy_static;
use regex::Regex;

use super::fragment::{normalize_text, Argument, Command, Fragment, FragmentKind};
use super::spec::{
    command_spec, environment_spec, is_math_environment, is_verbatim_environment, CommandSpec,
};
use crate::utils::error::ConversionWarning;
use crate::utils::unicode::{accent, is_accent_letter, is_accent_symbol, TEXT_SYMBOLS};

lazy_static! {
    /// Length argument of `\\[2pt]`.
    static ref LENGTH_ARG: Regex = Regex::new(r"^\[\s*-?[0-9.]+\s*[a-z]{2}\s*\]").unwrap();
}

/// Result of segmenting a source string.
#[derive(Debug, Clone, Default)]
pub struct Lexed {
    pub fragments: Vec<Fragment>,
    pub warnings: Vec<ConversionWarning>,
}

impl Lexed {
    /// Concatenated raw text of all fragments.
    pub fn raw(&self) -> String {
        self.fragments.iter().map(|f| f.raw.as_str()).collect()
    }
}

/// Segment `src`; offsets are relative to `src`.
pub fn tokenize(src: &str) -> Lexed {
    Lexer::new(src).run()
}

/// Segment `src`, which starts at byte `base` of some larger source.
pub fn tokenize_at(src: &str, base: usize) -> Lexed {
    Lexer::with_offset(src, base).run()
}

/// Segment the body of a full document: the preamble is skipped and input ends
/// at `\end{document}`. Offsets stay relative to the full source.
pub fn tokenize_document(src: &str) -> Lexed {
    let start = skip_preamble(src);
    let end = document_end(src, start);
    tokenize_at(&src[start..end], start)
}

/// Byte offset where the document body starts.
///
/// Right after the first `\begin{document}`; without one, at the earliest
/// top-level sectioning command; otherwise at the start of the input.
pub fn skip_preamble(src: &str) -> usize {
    const BEGIN: &str = "\\begin{document}";
    if let Some(idx) = find_outside_comments(src, BEGIN, 0) {
        return idx + BEGIN.len();
    }
    ["\\section{", "\\chapter{", "\\part{", "\\subsection{"]
        .iter()
        .filter_map(|pat| find_outside_comments(src, pat, 0))
        .min()
        .unwrap_or(0)
}

/// Byte offset of `\end{document}` at or after `from`, or the input length.
pub fn document_end(src: &str, from: usize) -> usize {
    find_outside_comments(src, "\\end{document}", from).unwrap_or(src.len())
}

/// Find `pat` in `src` starting at `from`, ignoring text after an unescaped `%`.
fn find_outside_comments(src: &str, pat: &str, from: usize) -> Option<usize> {
    let mut line_start = from;
    for line in src[from..].split_inclusive('\n') {
        let code = &line[..comment_start(line)];
        if let Some(idx) = code.find(pat) {
            return Some(line_start + idx);
        }
        line_start += line.len();
    }
    None
}

/// Index of the first unescaped `%` in a line, or the line length.
fn comment_start(line: &str) -> usize {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'%' => return i,
            _ => i += 1,
        }
    }
    line.len()
}

/// Drop `%` comments from a math body, keeping line structure.
pub fn strip_comments(body: &str) -> String {
    if !body.contains('%') {
        return body.to_string();
    }
    body.split_inclusive('\n')
        .map(|line| {
            let cut = comment_start(line);
            if cut < line.len() && line.ends_with('\n') {
                format!("{}\n", &line[..cut])
            } else {
                line[..cut].to_string()
            }
        })
        .collect()
}

/// Brace group located by [`Lexer::read_group`].
struct Group {
    /// Content between the braces.
    start: usize,
    end: usize,
    /// Position after the closing brace (input end if unterminated).
    next: usize,
    terminated: bool,
}

/// The segmenter.
pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    base: usize,
    /// Start of the pending plain-text span.
    text_start: Option<usize>,
    /// Positions of `{` in running text that are still open.
    open_braces: Vec<usize>,
    fragments: Vec<Fragment>,
    warnings: Vec<ConversionWarning>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input
    pub fn new(src: &'a str) -> Self {
        Self::with_offset(src, 0)
    }

    pub fn with_offset(src: &'a str, base: usize) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            base,
            text_start: None,
            open_braces: Vec::new(),
            fragments: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn run(mut self) -> Lexed {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'%' => self.lex_comment(),
                b'\\' => self.lex_backslash(),
                b'$' => self.lex_dollar(),
                b'{' => {
                    self.open_braces.push(self.pos);
                    self.advance_text();
                }
                b'}' => {
                    self.open_braces.pop();
                    self.advance_text();
                }
                _ => self.advance_text(),
            }
        }
        self.flush_text();
        if let Some(&at) = self.open_braces.first() {
            self.warn(ConversionWarning::unclosed_brace(), at);
        }
        Lexed {
            fragments: self.fragments,
            warnings: self.warnings,
        }
    }

    /// Peek at the byte `ahead` positions past the cursor
    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    /// Next character at `at`, UTF-8 aware
    fn char_at(&self, at: usize) -> Option<char> {
        self.src.get(at..).and_then(|rest| rest.chars().next())
    }

    fn advance_text(&mut self) {
        if self.text_start.is_none() {
            self.text_start = Some(self.pos);
        }
        let len = self.char_at(self.pos).map_or(1, char::len_utf8);
        self.pos += len;
    }

    fn flush_text(&mut self) {
        if let Some(start) = self.text_start.take() {
            let raw = &self.src[start..self.pos];
            self.fragments
                .push(Fragment::text(normalize_text(raw), raw, self.base + start));
        }
    }

    /// Emit a fragment spanning `start..self.pos`.
    fn emit(&mut self, kind: FragmentKind, start: usize) {
        let raw = &self.src[start..self.pos];
        self.fragments
            .push(Fragment::new(kind, raw, self.base + start));
    }

    fn warn(&mut self, warning: ConversionWarning, at: usize) {
        log::debug!("lexer: {}", warning);
        self.warnings.push(warning.at(self.base + at));
    }

    /// Read a comment (everything until end of line, newline excluded)
    fn lex_comment(&mut self) {
        self.flush_text();
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
            self.pos += 1;
        }
        self.emit(FragmentKind::Comment, start);
    }

    fn lex_dollar(&mut self) {
        self.flush_text();
        let start = self.pos;
        let display = self.peek(1) == Some(b'$');
        let delim = if display { "$$" } else { "$" };
        let body_start = start + delim.len();
        let (body_end, next) = match self.find_closer(body_start, delim) {
            Some(idx) => (idx, idx + delim.len()),
            None => {
                self.warn(ConversionWarning::unterminated_math(delim), start);
                (self.bytes.len(), self.bytes.len())
            }
        };
        self.pos = next;
        if body_end == self.bytes.len() && self.src[body_start..].trim().is_empty() {
            // Nothing to typeset: keep the dangling delimiter as text
            let raw = &self.src[start..self.pos];
            self.fragments.push(Fragment::text(raw.to_string(), raw, self.base + start));
            return;
        }
        let body = strip_comments(&self.src[body_start..body_end]);
        let kind = if display {
            FragmentKind::DisplayMath { body, env: None }
        } else {
            FragmentKind::InlineMath(body)
        };
        self.emit(kind, start);
    }

    /// Find an unescaped `closer` at or after `from`, skipping comments.
    fn find_closer(&self, from: usize, closer: &str) -> Option<usize> {
        let pat = closer.as_bytes();
        let mut i = from;
        while i < self.bytes.len() {
            if self.bytes[i..].starts_with(pat) {
                return Some(i);
            }
            match self.bytes[i] {
                b'\\' => i += 2,
                b'%' => {
                    while i < self.bytes.len() && self.bytes[i] != b'\n' {
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        }
        None
    }

    fn lex_backslash(&mut self) {
        let start = self.pos;
        let Some(next) = self.char_at(start + 1) else {
            // Lone backslash at end of input
            self.advance_text();
            return;
        };
        if next.is_ascii_alphabetic() {
            self.flush_text();
            self.lex_control_word(start);
            return;
        }
        self.flush_text();
        self.pos = start + 1 + next.len_utf8();
        match next {
            '\\' => {
                // `\\*` and `\\[2pt]` are still just a line break
                if self.peek(0) == Some(b'*') {
                    self.pos += 1;
                }
                if let Some(m) = LENGTH_ARG.find(&self.src[self.pos..]) {
                    self.pos += m.end();
                }
                self.emit(FragmentKind::LineBreak, start);
            }
            '%' | '&' | '$' | '#' | '_' | '{' | '}' => {
                self.emit(FragmentKind::Escape(next), start);
            }
            ',' | ';' | ':' | '>' | ' ' | '\t' | '\n' => {
                self.emit(FragmentKind::Text(" ".into()), start);
            }
            '-' | '/' | '!' | '@' => {
                self.emit(FragmentKind::Text(String::new()), start);
            }
            '(' => self.lex_delimited_math(start, "\\)", false),
            '[' => self.lex_delimited_math(start, "\\]", true),
            c if is_accent_symbol(c) => {
                let base = self.read_accent_base();
                self.emit(FragmentKind::Text(accent(c, &base)), start);
            }
            c => self.emit(FragmentKind::Text(c.to_string()), start),
        }
    }

    /// Body of `\(...\)` or `\[...\]`; the cursor sits after the opener.
    fn lex_delimited_math(&mut self, start: usize, closer: &str, display: bool) {
        let body_start = self.pos;
        let (body_end, next) = match self.find_closer(body_start, closer) {
            Some(idx) => (idx, idx + closer.len()),
            None => {
                let opener = if display { "\\[" } else { "\\(" };
                self.warn(ConversionWarning::unterminated_math(opener), start);
                (self.bytes.len(), self.bytes.len())
            }
        };
        let body = strip_comments(&self.src[body_start..body_end]);
        self.pos = next;
        let kind = if display {
            FragmentKind::DisplayMath { body, env: None }
        } else {
            FragmentKind::InlineMath(body)
        };
        self.emit(kind, start);
    }

    /// Base of a symbol accent: `{x}`, `\i`, or the next character.
    fn read_accent_base(&mut self) -> String {
        match self.peek(0) {
            Some(b'{') => {
                let group = self.read_group(self.pos, "accent");
                self.pos = group.next;
                self.src[group.start..group.end].trim().to_string()
            }
            Some(b'\\') if matches!(self.peek(1), Some(b'i' | b'j')) => {
                let base = self.src[self.pos..self.pos + 2].to_string();
                self.pos += 2;
                base
            }
            Some(_) => match self.char_at(self.pos) {
                Some(c) if !c.is_whitespace() => {
                    self.pos += c.len_utf8();
                    c.to_string()
                }
                _ => String::new(),
            },
            None => String::new(),
        }
    }

    /// Read a control word (`\name` or `\name*`) and whatever belongs to it.
    fn lex_control_word(&mut self, start: usize) {
        let mut end = start + 1;
        while end < self.bytes.len() && self.bytes[end].is_ascii_alphabetic() {
            end += 1;
        }
        let letters = &self.src[start + 1..end];
        let starred = self.bytes.get(end) == Some(&b'*') && letters != "verb";
        self.pos = if starred { end + 1 } else { end };
        let name = if starred {
            format!("{}*", letters)
        } else {
            letters.to_string()
        };

        match name.as_str() {
            "begin" => self.lex_begin(start),
            "end" => self.lex_end(start),
            "verb" => self.lex_verb(start),
            "newline" => self.emit(FragmentKind::LineBreak, start),
            _ if is_accent_letter(&name) && self.accent_base_follows() => {
                let base = self.read_letter_accent_base();
                let mark = name.chars().next().unwrap_or('c');
                self.emit(FragmentKind::Text(accent(mark, &base)), start);
            }
            _ => {
                if let Some(symbol) = TEXT_SYMBOLS.get(name.as_str()) {
                    // `\ldots{}` style terminator
                    if self.src[self.pos..].starts_with("{}") {
                        self.pos += 2;
                    }
                    self.emit(FragmentKind::Text((*symbol).to_string()), start);
                    return;
                }
                let command = match command_spec(name.trim_end_matches('*')) {
                    Some(spec) => self.read_known_args(Command::new(name), spec),
                    None => self.read_adjacent_groups(Command::new(name)),
                };
                self.emit(FragmentKind::Command(command), start);
            }
        }
    }

    fn accent_base_follows(&self) -> bool {
        match self.peek(0) {
            Some(b'{') => true,
            Some(b' ') => self.peek(1).is_some_and(|b| b.is_ascii_alphabetic()),
            _ => false,
        }
    }

    /// Base of a letter accent: `\c{c}` or `\c c`.
    fn read_letter_accent_base(&mut self) -> String {
        if self.peek(0) == Some(b' ') {
            self.pos += 1;
        }
        self.read_accent_base()
    }

    /// Optional `[...]` then exactly `spec.args` brace groups.
    fn read_known_args(&mut self, mut command: Command, spec: CommandSpec) -> Command {
        if spec.optional {
            let lookahead = if command.base_name() == "item" {
                self.skip_inline_space(self.pos)
            } else {
                self.pos
            };
            if let Some((arg, next)) = self.read_optional(lookahead) {
                command.optional = Some(arg);
                self.pos = next;
            }
        }
        for _ in 0..spec.args {
            let at = self.skip_arg_space(self.pos);
            if self.bytes.get(at) != Some(&b'{') {
                break;
            }
            let group = self.read_group(at, &command.name);
            command
                .args
                .push(Argument::new(&self.src[group.start..group.end], self.base + group.start));
            self.pos = group.next;
            if !group.terminated {
                break;
            }
        }
        command
    }

    /// Unknown commands take every brace group that follows on the same line.
    fn read_adjacent_groups(&mut self, mut command: Command) -> Command {
        loop {
            let at = self.skip_inline_space(self.pos);
            if self.bytes.get(at) != Some(&b'{') {
                break;
            }
            let group = self.read_group(at, &command.name);
            command
                .args
                .push(Argument::new(&self.src[group.start..group.end], self.base + group.start));
            self.pos = group.next;
            if !group.terminated {
                break;
            }
        }
        command
    }

    fn lex_begin(&mut self, start: usize) {
        let at = self.skip_inline_space(self.pos);
        if self.bytes.get(at) != Some(&b'{') {
            self.emit(FragmentKind::Command(Command::new("begin")), start);
            return;
        }
        let group = self.read_group(at, "begin");
        let name = self.src[group.start..group.end].trim().to_string();
        self.pos = group.next;
        if !group.terminated {
            self.emit(FragmentKind::BeginEnv(Command::new(name)), start);
            return;
        }

        if is_math_environment(&name) {
            let (body, _) = self.read_environment_body(start, &name);
            let body = strip_comments(&body);
            self.emit(
                FragmentKind::DisplayMath {
                    body,
                    env: Some(name),
                },
                start,
            );
            return;
        }
        if name == "comment" {
            self.read_environment_body(start, &name);
            self.emit(FragmentKind::Comment, start);
            return;
        }

        let command = self.read_known_args(Command::new(name.clone()), environment_spec(&name));
        if is_verbatim_environment(&name) {
            let (body, _) = self.read_environment_body(start, &name);
            let body = body.strip_prefix('\n').unwrap_or(&body).to_string();
            self.emit(FragmentKind::Verbatim(body), start);
            return;
        }
        self.emit(FragmentKind::BeginEnv(command), start);
    }

    /// Consume up to and including `\end{name}`; returns the body.
    fn read_environment_body(&mut self, start: usize, name: &str) -> (String, bool) {
        let closer = format!("\\end{{{}}}", name);
        let body_start = self.pos;
        match self.src[body_start..].find(&closer) {
            Some(rel) => {
                let body_end = body_start + rel;
                self.pos = body_end + closer.len();
                (self.src[body_start..body_end].to_string(), true)
            }
            None => {
                self.warn(
                    ConversionWarning::unmatched_environment(
                        name,
                        format!("\\begin{{{}}} is never closed", name),
                    ),
                    start,
                );
                self.pos = self.bytes.len();
                (self.src[body_start..].to_string(), false)
            }
        }
    }

    fn lex_end(&mut self, start: usize) {
        let at = self.skip_inline_space(self.pos);
        if self.bytes.get(at) != Some(&b'{') {
            self.emit(FragmentKind::Command(Command::new("end")), start);
            return;
        }
        let group = self.read_group(at, "end");
        let name = self.src[group.start..group.end].trim().to_string();
        self.pos = group.next;
        self.emit(FragmentKind::EndEnv(name), start);
    }

    /// `\verb|text|` with any delimiter on the same line.
    fn lex_verb(&mut self, start: usize) {
        if self.peek(0) == Some(b'*') {
            self.pos += 1;
        }
        let Some(delim) = self.char_at(self.pos).filter(|c| !c.is_whitespace()) else {
            self.emit(FragmentKind::Text("\\verb".into()), start);
            return;
        };
        let body_start = self.pos + delim.len_utf8();
        let line_end = self.src[body_start..]
            .find('\n')
            .map_or(self.bytes.len(), |i| body_start + i);
        match self.src[body_start..line_end].find(delim) {
            Some(rel) => {
                let body = self.src[body_start..body_start + rel].to_string();
                self.pos = body_start + rel + delim.len_utf8();
                self.emit(FragmentKind::Verbatim(body), start);
            }
            None => {
                let raw = self.src[start..self.pos].to_string();
                self.emit(FragmentKind::Text(raw), start);
            }
        }
    }

    /// Skip spaces and tabs.
    fn skip_inline_space(&self, mut at: usize) -> usize {
        while matches!(self.bytes.get(at), Some(b' ' | b'\t')) {
            at += 1;
        }
        at
    }

    /// Whitespace allowed between arguments: no blank line.
    fn skip_arg_space(&self, at: usize) -> usize {
        let mut at = self.skip_inline_space(at);
        if self.bytes.get(at) == Some(&b'\n') {
            at = self.skip_inline_space(at + 1);
        }
        at
    }

    /// `[...]` at `at`, brace aware. `None` when absent or unclosed.
    fn read_optional(&self, at: usize) -> Option<(Argument, usize)> {
        if self.bytes.get(at) != Some(&b'[') {
            return None;
        }
        let mut depth = 0usize;
        let mut i = at + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => {
                    i += 2;
                    continue;
                }
                b'{' => depth += 1,
                b'}' => depth = depth.saturating_sub(1),
                b']' if depth == 0 => {
                    let arg = Argument::new(&self.src[at + 1..i], self.base + at + 1);
                    return Some((arg, i + 1));
                }
                _ => {}
            }
            i += 1;
        }
        None
    }

    /// Match the brace group opening at `open`, to arbitrary depth.
    ///
    /// Escaped braces and braces inside comments do not count. An unterminated
    /// group runs to end of input and records a warning.
    fn read_group(&mut self, open: usize, context: &str) -> Group {
        let mut depth = 0usize;
        let mut i = open;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => {
                    i += 2;
                    continue;
                }
                b'%' => {
                    while i < self.bytes.len() && self.bytes[i] != b'\n' {
                        i += 1;
                    }
                    continue;
                }
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Group {
                            start: open + 1,
                            end: i,
                            next: i + 1,
                            terminated: true,
                        };
                    }
                }
                _ => {}
            }
            i += 1;
        }
        let context = format!("\\{}", context);
        self.warn(ConversionWarning::unterminated_group(&context), open);
        Group {
            start: (open + 1).min(self.bytes.len()),
            end: self.bytes.len(),
            next: self.bytes.len(),
            terminated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::WarningKind;
    use pretty_assertions::assert_eq;

    fn kinds(src: &str) -> Vec<FragmentKind> {
        tokenize(src).fragments.into_iter().map(|f| f.kind).collect()
    }

    #[test]
    fn test_raw_spans_cover_input() {
        let inputs = [
            "Hello world",
            "\\section{Intro} text % comment\nmore\n\n$x^2$ and $$y$$",
            "\\begin{itemize}\\item A \\item[b] B\\end{itemize}",
            "\\textbf{bold {nested}} \\unknown{a}{b} \\% 50\\\\[2pt] next",
            "\\begin{align*}a &= b \\label{eq:1}\\end{align*}",
            "\\verb|x_y| \\'e \\c{c} caf\\\"e ~ ünïcödé",
            "{unterminated \\textbf{x",
            "$unterminated",
            "\\",
        ];
        for input in inputs {
            assert_eq!(tokenize(input).raw(), input, "{input}");
        }
    }

    #[test]
    fn test_offsets_are_contiguous() {
        let src = "A \\emph{b} $c$ % d\n\\\\ e";
        let lexed = tokenize_at(src, 10);
        let mut expected = 10;
        for frag in &lexed.fragments {
            assert_eq!(frag.offset, expected);
            expected += frag.raw.len();
        }
        assert_eq!(expected, 10 + src.len());
    }

    #[test]
    fn test_escapes_and_comments() {
        assert_eq!(
            kinds("50\\% done % hidden"),
            vec![
                FragmentKind::Text("50".into()),
                FragmentKind::Escape('%'),
                FragmentKind::Text(" done ".into()),
                FragmentKind::Comment,
            ]
        );
    }

    #[test]
    fn test_tilde_and_braces_normalized() {
        assert_eq!(
            kinds("Fig.~{1}"),
            vec![FragmentKind::Text("Fig. 1".into())]
        );
    }

    #[test]
    fn test_known_command_arguments() {
        let lexed = tokenize("\\section*[short]{Long title} rest");
        let cmd = lexed.fragments[0].as_command().unwrap();
        assert_eq!(cmd.name, "section*");
        assert_eq!(cmd.optional.as_ref().unwrap().as_str(), "short");
        assert_eq!(cmd.args[0].as_str(), "Long title");
        assert_eq!(cmd.args[0].offset, 17);
        assert_eq!(lexed.fragments[1].raw, " rest");
    }

    #[test]
    fn test_known_command_takes_exactly_its_arity() {
        let lexed = tokenize("\\textbf{a}{b}");
        let cmd = lexed.fragments[0].as_command().unwrap();
        assert_eq!(cmd.args.len(), 1);
        assert_eq!(lexed.fragments[1].kind, FragmentKind::Text("b".into()));
    }

    #[test]
    fn test_missing_argument_leaves_command_incomplete() {
        let lexed = tokenize("\\href{only-url} text");
        let cmd = lexed.fragments[0].as_command().unwrap();
        assert!(!cmd.is_complete());
    }

    #[test]
    fn test_unknown_command_collects_adjacent_groups() {
        let lexed = tokenize("\\foo{a}{b} {c}\n{d}");
        let cmd = lexed.fragments[0].as_command().unwrap();
        assert_eq!(cmd.args.len(), 3);
        assert_eq!(cmd.args[2].as_str(), "c");
        assert!(!cmd.is_known());
        assert_eq!(lexed.fragments[1].raw, "\n{d}");
    }

    #[test]
    fn test_unknown_command_keeps_spaced_group() {
        let lexed = tokenize("a \\foo {x} b");
        assert_eq!(lexed.fragments[1].raw, "\\foo {x}");
        assert_eq!(lexed.fragments[2].kind, FragmentKind::Text(" b".into()));
    }

    #[test]
    fn test_math_spans() {
        assert_eq!(
            kinds("$a$ \\(b\\) $$c$$ \\[d\\]"),
            vec![
                FragmentKind::InlineMath("a".into()),
                FragmentKind::Text(" ".into()),
                FragmentKind::InlineMath("b".into()),
                FragmentKind::Text(" ".into()),
                FragmentKind::DisplayMath {
                    body: "c".into(),
                    env: None
                },
                FragmentKind::Text(" ".into()),
                FragmentKind::DisplayMath {
                    body: "d".into(),
                    env: None
                },
            ]
        );
    }

    #[test]
    fn test_escaped_dollar_does_not_close_math() {
        assert_eq!(
            kinds("$a \\$ b$"),
            vec![FragmentKind::InlineMath("a \\$ b".into())]
        );
    }

    #[test]
    fn test_math_environment_becomes_display_math() {
        assert_eq!(
            kinds("\\begin{equation*}x = 1 % note\n\\end{equation*}"),
            vec![FragmentKind::DisplayMath {
                body: "x = 1 \n".into(),
                env: Some("equation*".into())
            }]
        );
    }

    #[test]
    fn test_environment_boundaries() {
        let lexed = tokenize("\\begin{figure}[htbp]x\\end{figure}");
        match &lexed.fragments[0].kind {
            FragmentKind::BeginEnv(cmd) => {
                assert_eq!(cmd.name, "figure");
                assert_eq!(cmd.optional.as_ref().unwrap().as_str(), "htbp");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            lexed.fragments[2].kind,
            FragmentKind::EndEnv("figure".into())
        );
    }

    #[test]
    fn test_unterminated_group_warns() {
        let lexed = tokenize("before \\textbf{never closed");
        assert_eq!(lexed.warnings.len(), 1);
        assert_eq!(lexed.warnings[0].kind, WarningKind::UnterminatedGroup);
        assert_eq!(lexed.warnings[0].offset, Some(14));
        let cmd = lexed.fragments[1].as_command().unwrap();
        assert_eq!(cmd.args[0].as_str(), "never closed");
    }

    #[test]
    fn test_unclosed_bare_brace_warns() {
        let lexed = tokenize("Text {never closed here");
        assert_eq!(lexed.warnings.len(), 1);
        assert_eq!(lexed.warnings[0].kind, WarningKind::UnterminatedGroup);
        assert_eq!(lexed.warnings[0].offset, Some(5));

        // Outermost open brace is reported
        let nested = tokenize_at("{a {b} {c", 3);
        assert_eq!(nested.warnings.len(), 1);
        assert_eq!(nested.warnings[0].offset, Some(3));

        assert!(tokenize("{a} b} {\\{}").warnings.is_empty());
    }

    #[test]
    fn test_dangling_dollar_stays_text() {
        let lexed = tokenize("costs 5$");
        assert_eq!(lexed.warnings[0].kind, WarningKind::UnterminatedMath);
        assert_eq!(
            kinds("costs 5$"),
            vec![
                FragmentKind::Text("costs 5".into()),
                FragmentKind::Text("$".into()),
            ]
        );
    }

    #[test]
    fn test_unterminated_math_warns() {
        let lexed = tokenize("cost $5 and more");
        assert_eq!(lexed.warnings[0].kind, WarningKind::UnterminatedMath);
        assert_eq!(lexed.warnings[0].offset, Some(5));
        assert_eq!(
            lexed.fragments[1].kind,
            FragmentKind::InlineMath("5 and more".into())
        );
    }

    #[test]
    fn test_accents_and_symbols() {
        assert_eq!(
            kinds("\\'e\\\"{o}\\c{c}\\ss{}"),
            vec![
                FragmentKind::Text("é".into()),
                FragmentKind::Text("ö".into()),
                FragmentKind::Text("ç".into()),
                FragmentKind::Text("ß".into()),
            ]
        );
    }

    #[test]
    fn test_line_breaks() {
        assert_eq!(
            kinds("a\\\\[3pt]b\\newline"),
            vec![
                FragmentKind::Text("a".into()),
                FragmentKind::LineBreak,
                FragmentKind::Text("b".into()),
                FragmentKind::LineBreak,
            ]
        );
    }

    #[test]
    fn test_verbatim() {
        assert_eq!(
            kinds("\\verb|a_b|\\begin{verbatim}\n$x$\n\\end{verbatim}"),
            vec![
                FragmentKind::Verbatim("a_b".into()),
                FragmentKind::Verbatim("$x$\n".into()),
            ]
        );
    }

    #[test]
    fn test_skip_preamble() {
        let src = "\\documentclass{article}\n% \\begin{document} in a comment\n\\begin{document}\nBody\n\\end{document}\ntrailer";
        let lexed = tokenize_document(src);
        assert_eq!(lexed.raw(), "\nBody\n");
        assert_eq!(lexed.fragments[0].offset, src.find("\nBody").unwrap());
    }

    #[test]
    fn test_skip_preamble_without_document_env() {
        let src = "\\usepackage{x}\n\\subsection{B}\n\\section{A}";
        assert_eq!(skip_preamble(src), src.find("\\subsection").unwrap());
        assert_eq!(skip_preamble("plain"), 0);
    }

    #[test]
    fn test_strip_comments_keeps_escaped_percent() {
        assert_eq!(strip_comments("50\\% % x\ny"), "50\\% \ny");
    }
}
