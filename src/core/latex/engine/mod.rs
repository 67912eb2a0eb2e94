//! LaTeX segmentation engine
//!
//! Turns raw LaTeX into a flat stream of [`Fragment`]s for the structural
//! parser:
//! - `fragment`: fragment, command and argument types
//! - `lexer`: the segmenter itself, preamble skipping
//! - `spec`: command arities and classification tables

pub mod fragment;
pub mod lexer;
pub mod spec;

pub use fragment::{normalize_text, Argument, Command, Fragment, FragmentKind};
pub use lexer::{
    document_end, skip_preamble, strip_comments, tokenize, tokenize_at, tokenize_document, Lexed,
    Lexer,
};
pub use spec::{command_spec, CommandSpec, StyleKind};
