//! Inline formatting for LaTeX conversion
//!
//! Turns fragments that are not structural (text, escapes, inline math,
//! formatting and reference commands) into styled runs. Arguments are
//! re-segmented and formatted recursively, so nested formatting composes.

use texdocx_ir::{normalize_runs, plain_text, Inline, RunStyle};

use super::context::LatexConverter;
use super::engine::spec::{
    is_silent, StyleKind, REFERENCE_PREFIXES, SECTION_LEVELS, STYLE_COMMANDS,
};
use super::engine::{tokenize_at, Argument, Command, Fragment, FragmentKind};
use super::utils::split_keys;
use crate::utils::error::ConversionWarning;

/// Nested arguments formatted before the rest is kept as source text.
pub const MAX_ARGUMENT_DEPTH: usize = 128;

/// Run style applied by a formatting command
pub fn style_for(kind: StyleKind) -> RunStyle {
    match kind {
        StyleKind::Plain => RunStyle::PLAIN,
        StyleKind::Bold => RunStyle::bold(),
        StyleKind::Italic => RunStyle::italic(),
        StyleKind::Monospace => RunStyle::monospace(),
        StyleKind::Subscript => RunStyle::subscript(),
        StyleKind::Superscript => RunStyle::superscript(),
    }
}

/// Apply `outer` to every text run.
pub fn restyle(runs: Vec<Inline>, outer: RunStyle) -> Vec<Inline> {
    if outer.is_plain() {
        return runs;
    }
    runs.into_iter()
        .map(|run| match run {
            Inline::Text { text, style } => Inline::Text {
                text,
                style: outer.merge(style),
            },
            other => other,
        })
        .collect()
}

/// `[k1,k2]` with an optional prefix (`Fig. `, `Eq. `).
pub fn reference_text(prefix: &str, keys: &str) -> String {
    format!("{}[{}]", prefix, split_keys(keys).join(","))
}

impl LatexConverter {
    /// Format a sequence of fragments under `style`.
    pub(crate) fn format_fragments(
        &mut self,
        fragments: &[Fragment],
        style: RunStyle,
        out: &mut Vec<Inline>,
    ) {
        for frag in fragments {
            self.format_fragment(frag, style, out);
        }
    }

    /// Format a brace argument: re-segment it at its source offset, then format.
    pub(crate) fn format_argument(&mut self, arg: &Argument, style: RunStyle) -> Vec<Inline> {
        if self.state.argument_depth >= MAX_ARGUMENT_DEPTH {
            self.warn(ConversionWarning::nesting_too_deep(MAX_ARGUMENT_DEPTH).at(arg.offset));
            return vec![Inline::styled(arg.text.clone(), style)];
        }
        let lexed = tokenize_at(&arg.text, arg.offset);
        self.state.warnings.extend(lexed.warnings);
        let mut runs = Vec::new();
        self.state.argument_depth += 1;
        self.format_fragments(&lexed.fragments, style, &mut runs);
        self.state.argument_depth -= 1;
        runs
    }

    /// Argument as plain text; math is kept as its source.
    pub(crate) fn plain_argument(&mut self, arg: &Argument) -> String {
        let previous = self.state.math_as_text;
        self.state.math_as_text = true;
        let runs = self.format_argument(arg, RunStyle::PLAIN);
        self.state.math_as_text = previous;
        plain_text(&normalize_runs(runs))
    }

    pub(crate) fn format_fragment(
        &mut self,
        frag: &Fragment,
        style: RunStyle,
        out: &mut Vec<Inline>,
    ) {
        match &frag.kind {
            FragmentKind::Text(text) => {
                if !text.is_empty() {
                    out.push(Inline::styled(text.clone(), style));
                }
            }
            FragmentKind::Escape(c) => out.push(Inline::styled(c.to_string(), style)),
            FragmentKind::LineBreak => out.push(Inline::LineBreak),
            FragmentKind::InlineMath(body) => self.format_math(body, frag.offset, style, out),
            FragmentKind::DisplayMath { body, .. } => {
                let (source, _) = super::utils::prepare_equation_body(body);
                self.format_math(&source, frag.offset, style, out)
            }
            FragmentKind::Verbatim(text) => {
                out.push(Inline::styled(text.clone(), style.merge(RunStyle::monospace())))
            }
            FragmentKind::Command(cmd) => self.format_command(cmd, frag, style, out),
            // Environment boundaries inside an argument only group content.
            FragmentKind::BeginEnv(_) | FragmentKind::EndEnv(_) | FragmentKind::Comment => {}
        }
    }

    /// Inline math through the adapter, or its source when math is rendered as text.
    fn format_math(&mut self, body: &str, offset: usize, style: RunStyle, out: &mut Vec<Inline>) {
        let source = body.trim();
        if source.is_empty() {
            return;
        }
        if self.state.math_as_text {
            out.push(Inline::styled(source, style));
            return;
        }
        match self.math.convert(source, false, offset) {
            Ok(run) => out.push(run),
            Err(fallback) => {
                self.state.warnings.push(fallback.warning);
                out.extend(restyle(vec![fallback.run], style));
            }
        }
    }

    /// Keep a command exactly as written.
    fn literal(
        &mut self,
        frag: &Fragment,
        style: RunStyle,
        out: &mut Vec<Inline>,
        warning: ConversionWarning,
    ) {
        self.warn(warning.at(frag.offset));
        out.push(Inline::styled(frag.raw.clone(), style));
    }

    pub(crate) fn format_command(
        &mut self,
        cmd: &Command,
        frag: &Fragment,
        style: RunStyle,
        out: &mut Vec<Inline>,
    ) {
        let name = cmd.base_name();

        if is_silent(name) {
            return;
        }
        if !cmd.is_known() {
            self.literal(frag, style, out, ConversionWarning::unknown_command(&cmd.name));
            return;
        }
        if !cmd.is_complete() {
            let expected = cmd.arity().unwrap_or(0);
            let warning = ConversionWarning::missing_argument(&cmd.name, expected, cmd.args.len());
            self.literal(frag, style, out, warning);
            return;
        }

        if let Some(kind) = STYLE_COMMANDS.get(name) {
            let runs = self.format_argument(&cmd.args[0], style.merge(style_for(*kind)));
            out.extend(runs);
            return;
        }
        if let Some(prefix) = REFERENCE_PREFIXES.get(name) {
            out.push(Inline::styled(reference_text(prefix, cmd.args[0].as_str()), style));
            return;
        }
        if SECTION_LEVELS.contains_key(name) {
            // Sectioning inside an argument keeps only its title text.
            let runs = self.format_argument(&cmd.args[0], style);
            out.extend(runs);
            return;
        }

        match name {
            "url" => out.push(Inline::styled(
                cmd.args[0].trimmed(),
                style.merge(RunStyle::monospace()),
            )),
            "href" => {
                let runs = self.format_argument(&cmd.args[1], style);
                out.extend(runs);
            }
            "footnote" => {
                let runs = self.format_argument(&cmd.args[0], style);
                out.push(Inline::styled(" (", style));
                out.extend(runs);
                out.push(Inline::styled(")", style));
            }
            "texorpdfstring" => {
                let runs = self.format_argument(&cmd.args[1], style);
                out.extend(runs);
            }
            "resizebox" | "scalebox" => {
                if let Some(last) = cmd.args.last() {
                    let runs = self.format_argument(last, style);
                    out.extend(runs);
                }
            }
            "ensuremath" => {
                let source = cmd.args[0].text.clone();
                self.format_math(&source, cmd.args[0].offset, style, out);
            }
            "label" => self.attach_label(cmd.args[0].trimmed(), frag.offset),
            "caption" => {
                let runs = self.format_argument(&cmd.args[0], style);
                out.extend(runs);
            }
            "bibitem" => out.push(Inline::styled(
                format!("[{}] ", cmd.args[0].trimmed()),
                style.merge(RunStyle::bold()),
            )),
            "par" => out.push(Inline::styled(" ", style)),
            "item" => {
                self.warn(
                    ConversionWarning::misplaced("\\item", "\\item inside an argument ignored")
                        .at(frag.offset),
                );
            }
            _ => {
                for arg in &cmd.args {
                    let runs = self.format_argument(arg, style);
                    out.extend(runs);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::latex::context::ConvertOptions;
    use crate::core::latex::engine::tokenize;
    use crate::utils::error::WarningKind;
    use pretty_assertions::assert_eq;

    fn format(src: &str) -> (Vec<Inline>, LatexConverter) {
        let mut conv = LatexConverter::with_options(ConvertOptions::without_math());
        let lexed = tokenize(src);
        let mut runs = Vec::new();
        conv.format_fragments(&lexed.fragments, RunStyle::PLAIN, &mut runs);
        (normalize_runs(runs), conv)
    }

    #[test]
    fn test_subscript_chemistry() {
        let (runs, _) = format("\\textbf{H}\\textsubscript{2}O");
        assert_eq!(
            runs,
            vec![
                Inline::styled("H", RunStyle::bold()),
                Inline::styled("2", RunStyle::subscript()),
                Inline::plain("O"),
            ]
        );
    }

    #[test]
    fn test_nested_styles_compose() {
        let (runs, _) = format("\\textbf{a \\emph{b}}");
        let bold_italic = RunStyle::bold().merge(RunStyle::italic());
        assert_eq!(
            runs,
            vec![
                Inline::styled("a ", RunStyle::bold()),
                Inline::styled("b", bold_italic),
            ]
        );
    }

    #[test]
    fn test_references() {
        let (runs, _) = format("see \\ref{sec:a}, \\cite{x, y}, \\reffig{f1} and \\refeqn{e}");
        assert_eq!(
            runs,
            vec![Inline::plain("see [sec:a], [x,y], Fig. [f1] and Eq. [e]")]
        );
    }

    #[test]
    fn test_unknown_command_kept_verbatim() {
        let (runs, conv) = format("a \\frobnicate{x}{y} b");
        assert_eq!(runs, vec![Inline::plain("a \\frobnicate{x}{y} b")]);
        assert_eq!(conv.state.warnings[0].kind, WarningKind::UnknownCommand);
        assert_eq!(conv.state.warnings[0].offset, Some(2));
    }

    #[test]
    fn test_unknown_command_with_spaced_argument() {
        let (runs, conv) = format("a \\foo {x} b");
        assert_eq!(runs, vec![Inline::plain("a \\foo {x} b")]);
        assert_eq!(conv.state.warnings[0].kind, WarningKind::UnknownCommand);
    }

    #[test]
    fn test_deep_nesting_falls_back_to_source() {
        let depth = 1000;
        let src = format!("{}x{}", "\\textbf{".repeat(depth), "}".repeat(depth));
        let (runs, conv) = format(&src);
        assert_eq!(runs.len(), 1);
        match &runs[0] {
            Inline::Text { text, style } => {
                let rest = depth - MAX_ARGUMENT_DEPTH - 1;
                assert!(style.bold);
                assert_eq!(
                    *text,
                    format!("{}x{}", "\\textbf{".repeat(rest), "}".repeat(rest))
                );
            }
            other => panic!("unexpected {other:?}"),
        }
        let deep: Vec<_> = conv
            .state
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::ParseError)
            .collect();
        assert_eq!(deep.len(), 1);
        assert_eq!(conv.state.argument_depth, 0);
    }

    #[test]
    fn test_missing_argument_kept_verbatim() {
        let (runs, conv) = format("\\href{http://x}");
        assert_eq!(runs, vec![Inline::plain("\\href{http://x}")]);
        assert_eq!(conv.state.warnings[0].kind, WarningKind::MissingArgument);
    }

    #[test]
    fn test_silent_commands() {
        let (runs, conv) = format("\\noindent\\vspace{2mm}Text\\includegraphics[width=3cm]{a.png}");
        assert_eq!(runs, vec![Inline::plain("Text")]);
        assert!(conv.state.warnings.is_empty());
    }

    #[test]
    fn test_links_and_footnotes() {
        let (runs, _) = format("\\href{http://a}{site} \\url{http://b_c} x\\footnote{note}");
        assert_eq!(
            runs,
            vec![
                Inline::plain("site "),
                Inline::styled("http://b_c", RunStyle::monospace()),
                Inline::plain(" x (note)"),
            ]
        );
    }

    #[test]
    fn test_math_fallback_when_disabled() {
        let (runs, conv) = format("value $x^2$ here");
        assert_eq!(runs, vec![Inline::plain("value x^2 here")]);
        assert_eq!(conv.state.warnings[0].kind, WarningKind::MathConversion);
    }

    #[test]
    fn test_texorpdfstring_uses_second_argument() {
        let (runs, _) = format("\\texorpdfstring{$\\alpha$}{alpha} decay");
        assert_eq!(runs, vec![Inline::plain("alpha decay")]);
    }

    #[test]
    fn test_plain_argument_keeps_math_source() {
        let mut conv = LatexConverter::with_options(ConvertOptions::without_math());
        let text = conv.plain_argument(&Argument::new("Energy $E$ \\textbf{now}", 0));
        assert_eq!(text, "Energy E now");
        assert!(conv.state.warnings.is_empty());
    }
}
