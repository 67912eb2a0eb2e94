//! End-to-end tests: source file in, `.docx` package out.

use std::fs;
use std::io::Read;
use std::path::Path;

use tempfile::tempdir;
use texdocx::{convert_file, ConversionReport, ConvertOptions, InputFormat};

fn document_xml(path: &Path) -> String {
    let file = fs::File::open(path).expect("docx exists");
    let mut archive = zip::ZipArchive::new(file).expect("valid zip");
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .expect("document part")
        .read_to_string(&mut xml)
        .expect("utf-8 xml");
    xml
}

#[test]
fn test_latex_file_to_docx() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("paper.tex");
    let output = dir.path().join("paper.docx");
    fs::write(
        &input,
        "\\documentclass{article}\n\\begin{document}\n\\section{Intro}\nCosts 5\\% \\& more: $x<y$.\n\\end{document}\n",
    )
    .unwrap();

    let result = convert_file(&input, &output, None, &ConvertOptions::without_math()).unwrap();
    assert_eq!(result.warnings.len(), 1);

    let xml = document_xml(&output);
    assert!(xml.contains("Intro"));
    assert!(xml.contains("Costs 5% &amp; more: "));
    assert!(xml.contains("x&lt;y"));
}

#[test]
fn test_markdown_and_bibtex_files() {
    let dir = tempdir().unwrap();
    let md = dir.path().join("notes.md");
    let bib = dir.path().join("refs.bib");
    fs::write(&md, "# Notes\n\n- first\n- second\n").unwrap();
    fs::write(
        &bib,
        "@article{doe2020, author={J. Doe}, title={On Things}, journal={J}, year={2020}}",
    )
    .unwrap();

    let md_out = dir.path().join("notes.docx");
    let md_result = convert_file(&md, &md_out, None, &ConvertOptions::without_math()).unwrap();
    assert!(!md_result.has_warnings());
    assert!(document_xml(&md_out).contains("second"));

    let bib_out = dir.path().join("refs.docx");
    convert_file(&bib, &bib_out, None, &ConvertOptions::without_math()).unwrap();
    let xml = document_xml(&bib_out);
    assert!(xml.contains("[doe2020] "));
    assert!(xml.contains("J. Doe, &quot;On Things&quot;, J, 2020."));
}

#[test]
fn test_explicit_format_overrides_extension() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("draft.txt");
    let output = dir.path().join("draft.docx");
    fs::write(&input, "## Heading\nbody").unwrap();

    let result = convert_file(
        &input,
        &output,
        Some(InputFormat::Markdown),
        &ConvertOptions::without_math(),
    )
    .unwrap();
    assert_eq!(result.document.blocks.len(), 2);
}

#[test]
fn test_missing_input_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = convert_file(
        &dir.path().join("nope.tex"),
        &dir.path().join("nope.docx"),
        None,
        &ConvertOptions::without_math(),
    )
    .unwrap_err();
    assert!(err.to_string().starts_with("IO error"));
}

#[test]
fn test_report_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("a.tex");
    let output = dir.path().join("a.docx");
    let report_path = dir.path().join("a.json");
    fs::write(&input, "\\section{S}\\label{s}\n\\unknowncmd").unwrap();

    let options = ConvertOptions {
        skip_preamble: false,
        ..ConvertOptions::without_math()
    };
    let result = convert_file(&input, &output, None, &options).unwrap();
    ConversionReport::new("a.tex", "latex", &result)
        .save(&report_path)
        .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["warnings"][0]["kind"], "unknown-command");
    assert_eq!(json["warnings"][0]["line"], 2);
}
