//! Static command and environment tables.
//!
//! The lexer only needs arities; the parser and the inline formatter use the
//! classification tables to decide what a command means.

use phf::{phf_map, phf_set};

/// Argument shape of a known command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    /// Number of mandatory `{}` arguments.
    pub args: u8,
    /// Whether a leading `[...]` argument is accepted.
    pub optional: bool,
}

const fn spec(args: u8, optional: bool) -> CommandSpec {
    CommandSpec { args, optional }
}

static COMMAND_SPEC: phf::Map<&'static str, CommandSpec> = phf_map! {
    // Sectioning
    "part" => spec(1, true),
    "chapter" => spec(1, true),
    "section" => spec(1, true),
    "subsection" => spec(1, true),
    "subsubsection" => spec(1, true),
    "paragraph" => spec(1, true),
    "subparagraph" => spec(1, true),
    // Text styles
    "textbf" => spec(1, false),
    "textit" => spec(1, false),
    "texttt" => spec(1, false),
    "emph" => spec(1, false),
    "textsubscript" => spec(1, false),
    "textsuperscript" => spec(1, false),
    "textrm" => spec(1, false),
    "textsf" => spec(1, false),
    "textsc" => spec(1, false),
    "textsl" => spec(1, false),
    "textup" => spec(1, false),
    "textmd" => spec(1, false),
    "textnormal" => spec(1, false),
    "underline" => spec(1, false),
    "text" => spec(1, false),
    "mbox" => spec(1, false),
    "mathrm" => spec(1, false),
    "mathbf" => spec(1, false),
    "mathcal" => spec(1, false),
    "mathbb" => spec(1, false),
    "mathit" => spec(1, false),
    "mathsf" => spec(1, false),
    "mathtt" => spec(1, false),
    "boldsymbol" => spec(1, false),
    "ensuremath" => spec(1, false),
    // Labels and references
    "label" => spec(1, false),
    "ref" => spec(1, false),
    "eqref" => spec(1, false),
    "autoref" => spec(1, false),
    "cref" => spec(1, false),
    "Cref" => spec(1, false),
    "pageref" => spec(1, false),
    "reffig" => spec(1, false),
    "refeqn" => spec(1, false),
    "cite" => spec(1, true),
    "citep" => spec(1, true),
    "citet" => spec(1, true),
    "citealp" => spec(1, true),
    "nocite" => spec(1, false),
    // Structure inside environments
    "item" => spec(0, true),
    "caption" => spec(1, true),
    "bibitem" => spec(1, true),
    "par" => spec(0, false),
    // Links, notes, wrappers
    "url" => spec(1, false),
    "href" => spec(2, false),
    "footnote" => spec(1, true),
    "texorpdfstring" => spec(2, false),
    "resizebox" => spec(3, false),
    "scalebox" => spec(2, true),
    // Silent
    "includegraphics" => spec(1, true),
    "vspace" => spec(1, false),
    "hspace" => spec(1, false),
    "maketitle" => spec(0, false),
    "tableofcontents" => spec(0, false),
    "listoffigures" => spec(0, false),
    "listoftables" => spec(0, false),
    "centering" => spec(0, false),
    "raggedright" => spec(0, false),
    "raggedleft" => spec(0, false),
    "noindent" => spec(0, false),
    "indent" => spec(0, false),
    "newpage" => spec(0, false),
    "clearpage" => spec(0, false),
    "cleardoublepage" => spec(0, false),
    "pagebreak" => spec(0, true),
    "linebreak" => spec(0, true),
    "newline" => spec(0, false),
    "hline" => spec(0, false),
    "toprule" => spec(0, false),
    "midrule" => spec(0, false),
    "bottomrule" => spec(0, false),
    "smallskip" => spec(0, false),
    "medskip" => spec(0, false),
    "bigskip" => spec(0, false),
    "hfill" => spec(0, false),
    "vfill" => spec(0, false),
    "tiny" => spec(0, false),
    "scriptsize" => spec(0, false),
    "footnotesize" => spec(0, false),
    "small" => spec(0, false),
    "normalsize" => spec(0, false),
    "large" => spec(0, false),
    "Large" => spec(0, false),
    "LARGE" => spec(0, false),
    "huge" => spec(0, false),
    "Huge" => spec(0, false),
    "appendix" => spec(0, false),
    "frontmatter" => spec(0, false),
    "mainmatter" => spec(0, false),
    "backmatter" => spec(0, false),
    "title" => spec(1, true),
    "author" => spec(1, true),
    "date" => spec(1, false),
    "thanks" => spec(1, false),
    "keywords" => spec(1, false),
    "usepackage" => spec(1, true),
    "documentclass" => spec(1, true),
    "bibliographystyle" => spec(1, false),
    "bibliography" => spec(1, false),
    "graphicspath" => spec(1, false),
    "setlength" => spec(2, false),
    "addtolength" => spec(2, false),
    "setcounter" => spec(2, false),
    "addtocounter" => spec(2, false),
    "newcommand" => spec(2, true),
    "renewcommand" => spec(2, true),
    "providecommand" => spec(2, true),
    "newenvironment" => spec(3, true),
    "renewenvironment" => spec(3, true),
    "pagestyle" => spec(1, false),
    "thispagestyle" => spec(1, false),
    "addcontentsline" => spec(3, false),
    "phantom" => spec(1, false),
    "hphantom" => spec(1, false),
    "vphantom" => spec(1, false),
};

/// Commands that produce no output at all.
pub static SILENT_COMMANDS: phf::Set<&'static str> = phf_set! {
    "includegraphics", "vspace", "hspace", "maketitle", "tableofcontents",
    "listoffigures", "listoftables", "centering", "raggedright", "raggedleft",
    "noindent", "indent", "newpage", "clearpage", "cleardoublepage", "pagebreak",
    "linebreak", "hline", "toprule", "midrule", "bottomrule", "smallskip",
    "medskip", "bigskip", "hfill", "vfill", "tiny", "scriptsize", "footnotesize",
    "small", "normalsize", "large", "Large", "LARGE", "huge", "Huge", "appendix",
    "frontmatter", "mainmatter", "backmatter", "title", "author", "date", "thanks",
    "keywords", "usepackage", "documentclass", "bibliographystyle", "bibliography",
    "graphicspath", "setlength", "addtolength", "setcounter", "addtocounter",
    "newcommand", "renewcommand", "providecommand", "newenvironment",
    "renewenvironment", "pagestyle", "thispagestyle", "addcontentsline", "phantom",
    "hphantom", "vphantom", "nocite", "nonumber", "notag", "protect", "relax",
    "selectfont", "normalfont", "bf", "it", "em", "rm", "tt", "sf", "sc",
};

/// Heading level for each sectioning command.
pub static SECTION_LEVELS: phf::Map<&'static str, u8> = phf_map! {
    "part" => 0,
    "chapter" => 0,
    "section" => 1,
    "subsection" => 2,
    "subsubsection" => 3,
    "paragraph" => 4,
    "subparagraph" => 4,
};

/// Inline style a formatting command applies to its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleKind {
    Plain,
    Bold,
    Italic,
    Monospace,
    Subscript,
    Superscript,
}

pub static STYLE_COMMANDS: phf::Map<&'static str, StyleKind> = phf_map! {
    "textbf" => StyleKind::Bold,
    "textit" => StyleKind::Italic,
    "textsl" => StyleKind::Italic,
    "emph" => StyleKind::Italic,
    "texttt" => StyleKind::Monospace,
    "textsubscript" => StyleKind::Subscript,
    "textsuperscript" => StyleKind::Superscript,
    "textrm" => StyleKind::Plain,
    "textsf" => StyleKind::Plain,
    "textsc" => StyleKind::Plain,
    "textup" => StyleKind::Plain,
    "textmd" => StyleKind::Plain,
    "textnormal" => StyleKind::Plain,
    "underline" => StyleKind::Plain,
    "text" => StyleKind::Plain,
    "mbox" => StyleKind::Plain,
    "mathrm" => StyleKind::Plain,
    "mathbf" => StyleKind::Bold,
    "mathcal" => StyleKind::Italic,
    "mathbb" => StyleKind::Bold,
    "mathit" => StyleKind::Italic,
    "mathsf" => StyleKind::Plain,
    "mathtt" => StyleKind::Monospace,
    "boldsymbol" => StyleKind::Bold,
};

/// Reference commands and the text placed before the bracketed key.
pub static REFERENCE_PREFIXES: phf::Map<&'static str, &'static str> = phf_map! {
    "ref" => "",
    "eqref" => "",
    "autoref" => "",
    "cref" => "",
    "Cref" => "",
    "pageref" => "",
    "cite" => "",
    "citep" => "",
    "citet" => "",
    "citealp" => "",
    "reffig" => "Fig. ",
    "refeqn" => "Eq. ",
};

/// Environments whose body is display math.
static MATH_ENVIRONMENTS: phf::Set<&'static str> = phf_set! {
    "equation", "align", "gather", "multline", "eqnarray", "displaymath",
    "flalign", "dmath",
};

/// Environments whose body is kept literally.
static VERBATIM_ENVIRONMENTS: phf::Set<&'static str> = phf_set! {
    "verbatim", "Verbatim", "lstlisting", "minted",
};

/// Argument shape of environments that take arguments after `{name}`.
static ENVIRONMENT_SPEC: phf::Map<&'static str, CommandSpec> = phf_map! {
    "figure" => spec(0, true),
    "table" => spec(0, true),
    "itemize" => spec(0, true),
    "enumerate" => spec(0, true),
    "description" => spec(0, true),
    "tabular" => spec(1, true),
    "tabularx" => spec(2, false),
    "minipage" => spec(1, true),
    "multicols" => spec(1, false),
    "thebibliography" => spec(1, false),
    "wrapfigure" => spec(2, true),
    "subfigure" => spec(1, true),
    "minted" => spec(1, true),
};

pub fn command_spec(name: &str) -> Option<CommandSpec> {
    COMMAND_SPEC.get(name).copied()
}

pub fn environment_spec(name: &str) -> CommandSpec {
    ENVIRONMENT_SPEC
        .get(name.trim_end_matches('*'))
        .copied()
        .unwrap_or(spec(0, false))
}

pub fn is_math_environment(name: &str) -> bool {
    MATH_ENVIRONMENTS.contains(name.trim_end_matches('*'))
}

pub fn is_verbatim_environment(name: &str) -> bool {
    VERBATIM_ENVIRONMENTS.contains(name.trim_end_matches('*'))
}

pub fn is_silent(name: &str) -> bool {
    SILENT_COMMANDS.contains(name.trim_end_matches('*'))
}
