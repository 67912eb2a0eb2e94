//! Structural parsing for LaTeX conversion
//!
//! Walks the fragment stream once, keeping a stack of open environments and a
//! paragraph buffer, and builds the block tree bottom-up: list items and
//! figures are completed in their frame and attached to the parent when the
//! frame closes.

use std::mem;

use texdocx_ir::{
    normalize_runs, Block, EquationBlock, FigureBlock, FigureKind, Inline, ListItem, RunStyle,
};

use super::context::{FigureFrame, Frame, LabelKind, LatexConverter, ListFrame, Recent};
use super::engine::spec::SECTION_LEVELS;
use super::engine::{Command, Fragment, FragmentKind};
use super::markup::restyle;
use super::utils::{prepare_equation_body, PARAGRAPH_BREAK};
use crate::utils::error::ConversionWarning;

/// How an environment is treated by the parser
enum EnvKind {
    List { ordered: bool, description: bool },
    Figure(FigureKind),
    Bibliography,
    Transparent,
}

fn classify_environment(name: &str) -> EnvKind {
    match name.trim_end_matches('*') {
        "itemize" => EnvKind::List {
            ordered: false,
            description: false,
        },
        "enumerate" => EnvKind::List {
            ordered: true,
            description: false,
        },
        "description" => EnvKind::List {
            ordered: false,
            description: true,
        },
        "figure" | "wrapfigure" | "SCfigure" => EnvKind::Figure(FigureKind::Figure),
        "table" | "wraptable" => EnvKind::Figure(FigureKind::Table),
        "thebibliography" => EnvKind::Bibliography,
        _ => EnvKind::Transparent,
    }
}

impl LatexConverter {
    /// Build the block tree from a fragment stream. `end` is the source
    /// offset used for warnings about environments left open.
    pub(crate) fn parse_fragments(&mut self, fragments: &[Fragment], end: usize) {
        for frag in fragments {
            if !frag.is_blank() && !frag.is_command("label") {
                self.state.recent = Recent::Nothing;
            }
            match &frag.kind {
                FragmentKind::Comment => {}
                FragmentKind::Text(text) => self.handle_text(text),
                FragmentKind::DisplayMath { body, env } => {
                    self.handle_display_math(body, env.as_deref(), frag.offset)
                }
                FragmentKind::BeginEnv(cmd) if cmd.name == "document" => {}
                FragmentKind::BeginEnv(cmd) => self.begin_environment(cmd, frag.offset),
                FragmentKind::EndEnv(name) => {
                    if name == "document" {
                        break;
                    }
                    self.end_environment(name, frag.offset);
                }
                FragmentKind::Command(cmd) => self.handle_command(cmd, frag),
                FragmentKind::Verbatim(text) if frag.raw.starts_with("\\begin") => {
                    self.handle_code_block(text)
                }
                _ => self.format_into_paragraph(frag),
            }
        }
        self.finish(end);
    }

    /// Flush the paragraph and close everything still open.
    fn finish(&mut self, end: usize) {
        while let Some(frame) = self.state.current_env() {
            let name = frame.name().to_string();
            let offset = frame.offset();
            self.warn(
                ConversionWarning::unmatched_environment(
                    &name,
                    format!("\\begin{{{}}} is never closed; closed at end of input", name),
                )
                .at(offset),
            );
            self.close_top_frame();
        }
        self.flush_paragraph();
        log::trace!("parse finished at offset {}", end);
    }

    fn format_into_paragraph(&mut self, frag: &Fragment) {
        if self.state.in_figure() {
            return;
        }
        let mut runs = Vec::new();
        self.format_fragment(frag, RunStyle::PLAIN, &mut runs);
        self.state.paragraph.extend(runs);
    }

    fn handle_text(&mut self, text: &str) {
        if self.state.in_figure() {
            return;
        }
        let mut pieces = PARAGRAPH_BREAK.split(text).peekable();
        while let Some(piece) = pieces.next() {
            if !piece.is_empty() {
                self.state.paragraph.push(Inline::plain(piece));
            }
            if pieces.peek().is_some() {
                self.flush_paragraph();
            }
        }
    }

    fn handle_command(&mut self, cmd: &Command, frag: &Fragment) {
        let name = cmd.base_name();

        if let Some(level) = SECTION_LEVELS.get(name) {
            if cmd.is_complete() {
                self.handle_heading(*level, cmd);
                return;
            }
        }

        match name {
            "item" => self.handle_item(cmd, frag.offset),
            "label" if cmd.is_complete() => {
                let key = cmd.args[0].trimmed().to_string();
                self.attach_label(&key, frag.offset);
            }
            "caption" if cmd.is_complete() => self.handle_caption(cmd, frag.offset),
            "par" => self.flush_paragraph(),
            "maketitle" => {
                if let Some(title) = self.state.title.clone() {
                    self.push_block(Block::heading(0, title));
                }
            }
            "bibitem" if cmd.is_complete() => {
                self.flush_paragraph();
                self.state.paragraph.push(Inline::styled(
                    format!("[{}] ", cmd.args[0].trimmed()),
                    RunStyle::bold(),
                ));
            }
            _ => self.format_into_paragraph(frag),
        }
    }

    fn handle_heading(&mut self, level: u8, cmd: &Command) {
        let text = self.plain_argument(&cmd.args[0]);
        self.state.next_counter(LabelKind::Section);
        log::debug!("heading level {}: {}", level, text);
        self.push_block(Block::heading(level, text));
        self.state.recent = Recent::Heading;
    }

    fn handle_item(&mut self, cmd: &Command, offset: usize) {
        self.flush_paragraph();
        let term = cmd
            .optional
            .as_ref()
            .map(|arg| self.format_argument(arg, RunStyle::PLAIN));

        let description = match self.innermost_list_mut() {
            Some(list) => {
                list.items.push(ListItem::default());
                list.description
            }
            None => {
                if !self.state.in_figure() {
                    self.warn(
                        ConversionWarning::misplaced("\\item", "\\item outside of a list")
                            .at(offset),
                    );
                }
                false
            }
        };

        if let Some(term) = term {
            let term = if description {
                restyle(term, RunStyle::bold())
            } else {
                term
            };
            self.state.paragraph.extend(term);
            self.state.paragraph.push(Inline::plain(" "));
        }
    }

    fn handle_caption(&mut self, cmd: &Command, offset: usize) {
        // Labels inside the caption attach to the figure while it is formatted.
        let runs = normalize_runs(self.format_argument(&cmd.args[0], RunStyle::PLAIN));
        match self.innermost_figure_mut() {
            Some(figure) => {
                if figure.caption.is_none() {
                    figure.caption = Some(runs);
                }
            }
            None => {
                self.warn(
                    ConversionWarning::misplaced("\\caption", "\\caption outside of a float")
                        .at(offset),
                );
                self.flush_paragraph();
                self.push_block(Block::Paragraph(runs));
            }
        }
    }

    fn handle_display_math(&mut self, body: &str, env: Option<&str>, offset: usize) {
        if self.state.in_figure() {
            return;
        }
        let (source, labels) = prepare_equation_body(body);
        if source.is_empty() {
            self.warn(ConversionWarning::parse_error("Empty display equation skipped").at(offset));
            return;
        }

        let content = match self.math.convert(&source, true, offset) {
            Ok(run) => run,
            Err(fallback) => {
                self.state.warnings.push(fallback.warning);
                fallback.run
            }
        };
        self.state.next_counter(LabelKind::Equation);

        let label = labels.first().cloned();
        log::debug!("equation ({:?}) label={:?}", env, label);
        self.push_block(Block::Equation(EquationBlock {
            content,
            source,
            env: env.map(str::to_string),
            label: label.clone(),
        }));
        for key in &labels {
            self.register_label(key, LabelKind::Equation, offset);
        }
        self.state.recent = if label.is_some() {
            Recent::Nothing
        } else {
            Recent::Equation
        };
    }

    /// `verbatim`/`lstlisting` bodies become a monospace paragraph.
    fn handle_code_block(&mut self, text: &str) {
        if self.state.in_figure() {
            return;
        }
        self.flush_paragraph();
        let mut runs = Vec::new();
        for (idx, line) in text.trim_end_matches('\n').split('\n').enumerate() {
            if idx > 0 {
                runs.push(Inline::LineBreak);
            }
            runs.push(Inline::styled(line, RunStyle::monospace()));
        }
        // Code keeps its spacing, so it bypasses run normalization.
        runs.retain(|run| !matches!(run, Inline::Text { text, .. } if text.is_empty()));
        if !runs.is_empty() {
            self.push_block(Block::Paragraph(runs));
        }
    }

    fn begin_environment(&mut self, cmd: &Command, offset: usize) {
        self.flush_paragraph();
        let name = cmd.name.clone();
        let frame = match classify_environment(&name) {
            EnvKind::List {
                ordered,
                description,
            } => Frame::List(ListFrame {
                name,
                ordered,
                description,
                items: Vec::new(),
                offset,
            }),
            EnvKind::Figure(kind) => {
                self.state.next_counter(LabelKind::from(kind));
                Frame::Figure(FigureFrame {
                    name,
                    kind,
                    caption: None,
                    label: None,
                    offset,
                })
            }
            EnvKind::Bibliography => Frame::Bibliography { offset },
            EnvKind::Transparent => Frame::Transparent { name, offset },
        };
        log::trace!("begin {}", frame.name());
        self.state.push_env(frame);
    }

    /// Close the environment `name`. Frames opened after it are closed first,
    /// with a warning each; an `\end` with no open counterpart is ignored.
    fn end_environment(&mut self, name: &str, offset: usize) {
        let Some(depth) = self
            .state
            .env_stack
            .iter()
            .rposition(|frame| frame.name() == name)
        else {
            self.warn(
                ConversionWarning::unmatched_environment(
                    name,
                    format!("\\end{{{}}} without matching \\begin; ignored", name),
                )
                .at(offset),
            );
            return;
        };

        while self.state.env_stack.len() > depth + 1 {
            if let Some(frame) = self.state.current_env() {
                let inner = frame.name().to_string();
                let inner_offset = frame.offset();
                self.warn(
                    ConversionWarning::unmatched_environment(
                        &inner,
                        format!("\\begin{{{}}} closed implicitly by \\end{{{}}}", inner, name),
                    )
                    .at(inner_offset),
                );
            }
            self.close_top_frame();
        }
        self.close_top_frame();
    }

    /// Pop the innermost frame and attach what it built to its parent.
    fn close_top_frame(&mut self) {
        self.flush_paragraph();
        let Some(frame) = self.state.pop_env() else {
            return;
        };
        log::trace!("end {}", frame.name());
        match frame {
            Frame::List(list) => {
                if !list.items.is_empty() {
                    self.push_block(Block::List {
                        ordered: list.ordered,
                        items: list.items,
                    });
                }
            }
            Frame::Figure(figure) => {
                self.push_block(Block::Figure(FigureBlock {
                    kind: figure.kind,
                    caption: figure.caption,
                    label: figure.label,
                }));
            }
            Frame::Bibliography { .. } | Frame::Transparent { .. } => {}
        }
    }

    /// Attach a `\label` to the figure, equation or heading it belongs to.
    pub(crate) fn attach_label(&mut self, key: &str, offset: usize) {
        let key = key.trim();
        if key.is_empty() {
            return;
        }

        if let Some(figure) = self.innermost_figure_mut() {
            let kind = LabelKind::from(figure.kind);
            if figure.label.is_none() {
                figure.label = Some(key.to_string());
            }
            self.register_label(key, kind, offset);
            return;
        }

        let kind = match self.state.recent {
            Recent::Equation => {
                if let Some(Block::Equation(eq)) =
                    self.target_blocks().and_then(|blocks| blocks.last_mut())
                {
                    if eq.label.is_none() {
                        eq.label = Some(key.to_string());
                    }
                }
                self.state.recent = Recent::Nothing;
                LabelKind::Equation
            }
            Recent::Heading => LabelKind::Section,
            Recent::Nothing => {
                if self.innermost_list_mut().is_some() {
                    LabelKind::Item
                } else {
                    LabelKind::Other
                }
            }
        };
        self.register_label(key, kind, offset);
    }

    /// Append a finished block to the innermost open list item, or to the
    /// document. Blocks inside a float are dropped.
    pub(crate) fn push_block(&mut self, block: Block) {
        self.flush_paragraph();
        match self.target_blocks() {
            Some(blocks) => blocks.push(block),
            None => log::debug!("dropping block inside float"),
        }
    }

    /// Emit the paragraph buffer as a block (or as list-item text).
    pub(crate) fn flush_paragraph(&mut self) {
        if self.state.paragraph.is_empty() {
            return;
        }
        let runs = normalize_runs(mem::take(&mut self.state.paragraph));
        if runs.is_empty() {
            return;
        }

        for frame in self.state.env_stack.iter_mut().rev() {
            match frame {
                Frame::Figure(_) => return,
                Frame::List(list) => {
                    match list.items.last_mut() {
                        Some(item) if item.is_empty() => item.runs = runs,
                        Some(item) => item.blocks.push(Block::Paragraph(runs)),
                        None => {
                            let offset = list.offset;
                            list.items.push(ListItem::new(runs));
                            self.state.warnings.push(
                                ConversionWarning::misplaced(
                                    "\\item",
                                    "text before the first \\item of a list",
                                )
                                .at(offset),
                            );
                        }
                    }
                    return;
                }
                Frame::Bibliography { .. } | Frame::Transparent { .. } => {}
            }
        }
        self.state.blocks.push(Block::Paragraph(runs));
    }

    /// Where finished blocks go; `None` inside a float.
    fn target_blocks(&mut self) -> Option<&mut Vec<Block>> {
        for frame in self.state.env_stack.iter_mut().rev() {
            match frame {
                Frame::Figure(_) => return None,
                Frame::List(list) => {
                    if let Some(item) = list.items.last_mut() {
                        return Some(&mut item.blocks);
                    }
                }
                Frame::Bibliography { .. } | Frame::Transparent { .. } => {}
            }
        }
        Some(&mut self.state.blocks)
    }

    fn innermost_list_mut(&mut self) -> Option<&mut ListFrame> {
        for frame in self.state.env_stack.iter_mut().rev() {
            match frame {
                Frame::Figure(_) => return None,
                Frame::List(list) => return Some(list),
                _ => {}
            }
        }
        None
    }

    fn innermost_figure_mut(&mut self) -> Option<&mut FigureFrame> {
        self.state
            .env_stack
            .iter_mut()
            .rev()
            .find_map(|frame| match frame {
                Frame::Figure(figure) => Some(figure),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::latex::context::ConvertOptions;
    use crate::core::latex::math::MathError;
    use crate::core::ConversionOutput;
    use crate::utils::error::WarningKind;
    use pretty_assertions::assert_eq;

    fn omml(latex: &str, display: bool) -> Result<String, MathError> {
        let inner = format!("<m:oMath><m:r><m:t>{}</m:t></m:r></m:oMath>", latex);
        Ok(if display {
            format!("<m:oMathPara>{}</m:oMathPara>", inner)
        } else {
            inner
        })
    }

    fn convert(src: &str) -> ConversionOutput {
        LatexConverter::with_options(ConvertOptions::whole_input())
            .with_math_converter(omml)
            .convert(src)
    }

    fn text_of(block: &Block) -> String {
        match block {
            Block::Paragraph(runs) => texdocx_ir::plain_text(runs),
            Block::Heading { text, .. } => text.clone(),
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[test]
    fn test_paragraphs_split_on_blank_lines() {
        let out = convert("First  line\ncontinues.\n\n  Second paragraph.\\par Third.");
        let texts: Vec<String> = out.document.blocks.iter().map(text_of).collect();
        assert_eq!(
            texts,
            vec!["First line continues.", "Second paragraph.", "Third."]
        );
    }

    #[test]
    fn test_heading_levels() {
        let out =
            convert("\\chapter{C}\\section*{S}\\subsection{Sub}\\subsubsection{SS}\\paragraph{P}");
        let levels: Vec<u8> = out
            .document
            .blocks
            .iter()
            .map(|b| match b {
                Block::Heading { level, .. } => *level,
                _ => 99,
            })
            .collect();
        assert_eq!(levels, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_section_label_registered() {
        let out = convert("\\section{Intro}\\label{sec:intro} Text");
        let entry = &out.labels["sec:intro"];
        assert_eq!(entry.kind, LabelKind::Section);
        assert_eq!(entry.ordinal, 1);
    }

    #[test]
    fn test_nested_lists() {
        let out = convert(
            "\\begin{enumerate}\\item One\\begin{itemize}\\item A\\item B\\end{itemize}\\item Two\\end{enumerate}",
        );
        match &out.document.blocks[0] {
            Block::List { ordered, items } => {
                assert!(*ordered);
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].runs, vec![Inline::plain("One")]);
                match &items[0].blocks[0] {
                    Block::List { ordered, items } => {
                        assert!(!*ordered);
                        assert_eq!(items.len(), 2);
                    }
                    other => panic!("unexpected {other:?}"),
                }
                assert_eq!(items[1].runs, vec![Inline::plain("Two")]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_description_terms_are_bold() {
        let out = convert("\\begin{description}\\item[Term] meaning\\end{description}");
        match &out.document.blocks[0] {
            Block::List { items, .. } => assert_eq!(
                items[0].runs,
                vec![
                    Inline::styled("Term", RunStyle::bold()),
                    Inline::plain(" meaning")
                ]
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_figure_caption_and_label() {
        let out = convert(
            "\\begin{figure}[h]\\centering\\includegraphics{a.png}\\caption{A plot of $x$}\\label{fig:plot}\\end{figure}",
        );
        match &out.document.blocks[0] {
            Block::Figure(figure) => {
                assert_eq!(figure.kind, FigureKind::Figure);
                assert_eq!(figure.label.as_deref(), Some("fig:plot"));
                let caption = figure.caption.as_ref().unwrap();
                assert_eq!(caption[0], Inline::plain("A plot of "));
                assert!(matches!(caption[1], Inline::Math(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(out.labels["fig:plot"].kind, LabelKind::Figure);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_label_inside_caption_and_table() {
        let out = convert(
            "\\begin{table}\\caption{Data\\label{tab:d}}\\begin{tabular}{cc}a & b\\end{tabular}\\end{table}",
        );
        match &out.document.blocks[0] {
            Block::Figure(figure) => {
                assert_eq!(figure.kind, FigureKind::Table);
                assert_eq!(figure.label.as_deref(), Some("tab:d"));
                assert_eq!(figure.caption, Some(vec![Inline::plain("Data")]));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(out.document.blocks.len(), 1);
    }

    #[test]
    fn test_equation_labels() {
        let out = convert(
            "\\begin{equation}a=b\\label{eq:in}\\end{equation}\n$$c=d$$\n\\label{eq:after}",
        );
        let labels: Vec<Option<&str>> = out
            .document
            .blocks
            .iter()
            .map(|b| b.label())
            .collect();
        assert_eq!(labels, vec![Some("eq:in"), Some("eq:after")]);
        assert_eq!(out.labels["eq:after"].ordinal, 2);
        match &out.document.blocks[0] {
            Block::Equation(eq) => {
                assert_eq!(eq.source, "a=b");
                assert_eq!(eq.env.as_deref(), Some("equation"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_label_after_text_does_not_attach() {
        let out = convert("$$x$$ some text \\label{l}");
        assert_eq!(out.document.blocks[0].label(), None);
        assert_eq!(out.labels["l"].kind, LabelKind::Other);
    }

    #[test]
    fn test_display_math_inside_item() {
        let out = convert("\\begin{itemize}\\item Before $$y$$ after\\end{itemize}");
        match &out.document.blocks[0] {
            Block::List { items, .. } => {
                assert_eq!(items[0].runs, vec![Inline::plain("Before")]);
                assert!(matches!(items[0].blocks[0], Block::Equation(_)));
                assert_eq!(
                    items[0].blocks[1],
                    Block::Paragraph(vec![Inline::plain("after")])
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_end_closes_inner_frames() {
        let out = convert("\\begin{itemize}\\item a\\begin{center}b\\end{itemize} tail");
        assert!(matches!(out.document.blocks[0], Block::List { .. }));
        assert_eq!(text_of(&out.document.blocks[1]), "tail");
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].kind, WarningKind::UnmatchedEnvironment);
        assert_eq!(out.warnings[0].location.as_deref(), Some("center"));
    }

    #[test]
    fn test_stray_end_is_ignored() {
        let out = convert("a \\end{itemize} b");
        assert_eq!(text_of(&out.document.blocks[0]), "a b");
        assert_eq!(out.warnings[0].kind, WarningKind::UnmatchedEnvironment);
    }

    #[test]
    fn test_item_outside_list() {
        let out = convert("\\item loose");
        assert_eq!(text_of(&out.document.blocks[0]), "loose");
        assert_eq!(out.warnings[0].kind, WarningKind::Misplaced);
    }

    #[test]
    fn test_end_document_stops_parsing() {
        let out = convert("\\begin{document}Body\\end{document}Ignored");
        assert_eq!(out.document.blocks.len(), 1);
        assert_eq!(text_of(&out.document.blocks[0]), "Body");
    }

    #[test]
    fn test_bibliography_items() {
        let out = convert(
            "\\begin{thebibliography}{9}\\bibitem{knuth} D. Knuth.\\bibitem{lamport} L. Lamport.\\end{thebibliography}",
        );
        assert_eq!(out.document.blocks.len(), 2);
        match &out.document.blocks[0] {
            Block::Paragraph(runs) => {
                assert_eq!(runs[0], Inline::styled("[knuth] ", RunStyle::bold()));
                assert_eq!(runs[1], Inline::plain("D. Knuth."));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_verbatim_block() {
        let out = convert("\\begin{verbatim}\nfn main() {}\n  x\n\\end{verbatim}");
        assert_eq!(
            out.document.blocks[0],
            Block::Paragraph(vec![
                Inline::styled("fn main() {}", RunStyle::monospace()),
                Inline::LineBreak,
                Inline::styled("  x", RunStyle::monospace()),
            ])
        );
    }

    #[test]
    fn test_maketitle_uses_preamble_title() {
        let out = LatexConverter::with_options(ConvertOptions::without_math()).convert(
            "\\documentclass{article}\\title{On $\\alpha$ Things}\\begin{document}\\maketitle\nHi\\end{document}",
        );
        assert_eq!(out.title.as_deref(), Some("On \\alpha Things"));
        assert_eq!(out.document.blocks[0], Block::heading(0, "On \\alpha Things"));
    }
}
