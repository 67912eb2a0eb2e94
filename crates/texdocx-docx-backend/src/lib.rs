//! IR to WordprocessingML backend.
//!
//! The backend exposes an append-style [`DocumentSink`] and one implementation,
//! [`DocxWriter`], which accumulates `word/document.xml` and packs the result
//! into a `.docx` zip container. Equation runs carry OMML that is embedded as-is.

use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use texdocx_ir::{Block, Document, EquationBlock, FigureBlock, Inline, ListItem, RunStyle};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const OMML_NAMESPACE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/math";

const MONOSPACE_FONT: &str = "Consolas";
const MAX_LIST_DEPTH: usize = 8;
const BULLET_NUM_ID: usize = 1;

/// Append-only contract between a frontend and an output container.
pub trait DocumentSink {
    fn add_heading(&mut self, text: &str, level: u8);

    fn add_paragraph(&mut self, runs: &[Inline]);

    fn add_list(&mut self, ordered: bool, items: &[ListItem]);

    /// Display equation followed by its bracketed label, if any.
    fn add_equation(&mut self, equation: &EquationBlock) {
        self.add_paragraph(std::slice::from_ref(&equation.content));
        if let Some(label) = &equation.label {
            self.add_paragraph(&[Inline::plain(format!("[{}]", label))]);
        }
    }

    fn add_caption(&mut self, runs: &[Inline]) {
        self.add_paragraph(runs);
    }
}

/// Walk a document in order and feed every block to `sink`.
pub fn emit_document<S: DocumentSink + ?Sized>(doc: &Document, sink: &mut S) {
    for block in &doc.blocks {
        emit_block(block, sink);
    }
}

fn emit_block<S: DocumentSink + ?Sized>(block: &Block, sink: &mut S) {
    match block {
        Block::Heading { level, text } => sink.add_heading(text, *level),
        Block::Paragraph(runs) => {
            if !runs.is_empty() {
                sink.add_paragraph(runs);
            }
        }
        Block::List { ordered, items } => sink.add_list(*ordered, items),
        Block::Equation(eq) => sink.add_equation(eq),
        Block::Figure(figure) => emit_figure(figure, sink),
    }
}

fn emit_figure<S: DocumentSink + ?Sized>(figure: &FigureBlock, sink: &mut S) {
    let name = figure.kind.display_name();
    if let Some(label) = &figure.label {
        sink.add_caption(&[Inline::plain(format!("[{}: {}]", name, label))]);
    }
    match &figure.caption {
        Some(caption) if !caption.is_empty() => {
            let mut runs = Vec::with_capacity(caption.len() + 2);
            runs.push(Inline::plain("["));
            runs.extend(caption.iter().cloned());
            runs.push(Inline::plain("]"));
            sink.add_caption(&runs);
        }
        _ => {
            if figure.label.is_none() {
                sink.add_caption(&[Inline::plain(format!(
                    "[{} omitted - not supported in conversion]",
                    name
                ))]);
            }
        }
    }
}

/// Builds a `.docx` package in memory.
#[derive(Debug, Clone)]
pub struct DocxWriter {
    body: String,
    title: Option<String>,
    /// `numId`s allocated for ordered lists; each restarts at 1.
    ordered_lists: Vec<(usize, usize)>,
    paragraphs: usize,
}

impl Default for DocxWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocxWriter {
    pub fn new() -> Self {
        Self {
            body: String::new(),
            title: None,
            ordered_lists: Vec::new(),
            paragraphs: 0,
        }
    }

    /// Title recorded in `docProps/core.xml`.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn paragraph_count(&self) -> usize {
        self.paragraphs
    }

    /// Convenience: emit a whole document into a fresh writer.
    pub fn from_document(doc: &Document) -> Self {
        let mut writer = Self::new();
        emit_document(doc, &mut writer);
        writer
    }

    pub fn document_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:m="{math}" xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>{body}
    <w:sectPr>
      <w:pgSz w:w="12240" w:h="15840"/>
      <w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/>
    </w:sectPr>
  </w:body>
</w:document>"#,
            math = OMML_NAMESPACE,
            body = self.body
        )
    }

    pub fn numbering_xml(&self) -> String {
        let mut out = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
        );
        out.push_str(&abstract_numbering(0, false));
        out.push_str(&abstract_numbering(1, true));
        out.push_str(&format!(
            r#"<w:num w:numId="{}"><w:abstractNumId w:val="0"/></w:num>"#,
            BULLET_NUM_ID
        ));
        for (num_id, level) in &self.ordered_lists {
            out.push_str(&format!(
                r#"<w:num w:numId="{}"><w:abstractNumId w:val="1"/><w:lvlOverride w:ilvl="{}"><w:startOverride w:val="1"/></w:lvlOverride></w:num>"#,
                num_id, level
            ));
        }
        out.push_str("</w:numbering>");
        out
    }

    fn core_xml(&self) -> String {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let title = self
            .title
            .as_deref()
            .map(|t| format!("<dc:title>{}</dc:title>", escape_xml(t)))
            .unwrap_or_default();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">{title}<dc:creator>texdocx</dc:creator><dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created><dcterms:modified xsi:type="dcterms:W3CDTF">{now}</dcterms:modified></cp:coreProperties>"#
        )
    }

    /// Write the zip container to any seekable writer.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> io::Result<W> {
        let mut zip = ZipWriter::new(writer);
        let opt = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let parts: [(&str, String); 8] = [
            ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
            ("_rels/.rels", RELS_XML.to_string()),
            ("docProps/core.xml", self.core_xml()),
            ("word/document.xml", self.document_xml()),
            ("word/styles.xml", STYLES_XML.to_string()),
            ("word/numbering.xml", self.numbering_xml()),
            ("word/settings.xml", SETTINGS_XML.to_string()),
            ("word/_rels/document.xml.rels", WORD_RELS_XML.to_string()),
        ];
        for (name, content) in parts {
            zip.start_file(name, opt).map_err(zip_error)?;
            zip.write_all(content.as_bytes())?;
        }
        zip.finish().map_err(zip_error)
    }

    /// Serialize the container to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        let mut file = self.write_to(file)?;
        file.flush()?;
        log::debug!("wrote {} paragraphs to {}", self.paragraphs, path.display());
        Ok(())
    }

    fn push_paragraph(&mut self, properties: &str, runs: &[Inline]) {
        self.body.push_str("\n    <w:p>");
        if !properties.is_empty() {
            self.body.push_str("<w:pPr>");
            self.body.push_str(properties);
            self.body.push_str("</w:pPr>");
        }
        for run in runs {
            push_run(&mut self.body, run);
        }
        self.body.push_str("</w:p>");
        self.paragraphs += 1;
    }

    fn push_list(&mut self, ordered: bool, items: &[ListItem], depth: usize) {
        let level = depth.min(MAX_LIST_DEPTH);
        let num_id = if ordered {
            let id = BULLET_NUM_ID + 1 + self.ordered_lists.len();
            self.ordered_lists.push((id, level));
            id
        } else {
            BULLET_NUM_ID
        };
        let properties = format!(
            r#"<w:pStyle w:val="ListParagraph"/><w:numPr><w:ilvl w:val="{}"/><w:numId w:val="{}"/></w:numPr>"#,
            level, num_id
        );
        for item in items {
            self.push_paragraph(&properties, &item.runs);
            for nested in &item.blocks {
                match nested {
                    Block::List { ordered, items } => self.push_list(*ordered, items, depth + 1),
                    Block::Equation(eq) => self.add_equation(eq),
                    other => emit_block(other, self),
                }
            }
        }
    }
}

impl DocumentSink for DocxWriter {
    fn add_heading(&mut self, text: &str, level: u8) {
        let style = match level {
            0 => "Title".to_string(),
            1..=4 => format!("Heading{}", level),
            _ => "Heading4".to_string(),
        };
        self.push_paragraph(
            &format!(r#"<w:pStyle w:val="{}"/>"#, style),
            &[Inline::plain(text)],
        );
    }

    fn add_paragraph(&mut self, runs: &[Inline]) {
        self.push_paragraph("", runs);
    }

    fn add_list(&mut self, ordered: bool, items: &[ListItem]) {
        self.push_list(ordered, items, 0);
    }

    fn add_equation(&mut self, equation: &EquationBlock) {
        let properties = r#"<w:jc w:val="center"/>"#;
        self.push_paragraph(properties, std::slice::from_ref(&equation.content));
        if let Some(label) = &equation.label {
            self.push_paragraph(properties, &[Inline::plain(format!("[{}]", label))]);
        }
    }

    fn add_caption(&mut self, runs: &[Inline]) {
        self.push_paragraph(r#"<w:pStyle w:val="Caption"/>"#, runs);
    }
}

fn push_run(out: &mut String, run: &Inline) {
    match run {
        Inline::Text { text, style } => {
            if text.is_empty() {
                return;
            }
            out.push_str("<w:r>");
            push_run_properties(out, style);
            out.push_str(r#"<w:t xml:space="preserve">"#);
            out.push_str(&escape_xml(text));
            out.push_str("</w:t></w:r>");
        }
        Inline::Math(markup) => out.push_str(markup),
        Inline::LineBreak => out.push_str("<w:r><w:br/></w:r>"),
    }
}

fn push_run_properties(out: &mut String, style: &RunStyle) {
    if style.is_plain() {
        return;
    }
    out.push_str("<w:rPr>");
    if style.monospace {
        out.push_str(&format!(
            r#"<w:rFonts w:ascii="{0}" w:hAnsi="{0}" w:cs="{0}"/>"#,
            MONOSPACE_FONT
        ));
    }
    if style.bold {
        out.push_str("<w:b/>");
    }
    if style.italic {
        out.push_str("<w:i/>");
    }
    if style.subscript {
        out.push_str(r#"<w:vertAlign w:val="subscript"/>"#);
    } else if style.superscript {
        out.push_str(r#"<w:vertAlign w:val="superscript"/>"#);
    }
    out.push_str("</w:rPr>");
}

fn abstract_numbering(id: usize, ordered: bool) -> String {
    const BULLETS: [&str; 3] = ["\u{2022}", "\u{25E6}", "\u{25AA}"];
    let mut out = format!(
        r#"<w:abstractNum w:abstractNumId="{}"><w:multiLevelType w:val="hybridMultilevel"/>"#,
        id
    );
    for level in 0..=MAX_LIST_DEPTH {
        let (fmt, text) = if ordered {
            ("decimal", format!("%{}.", level + 1))
        } else {
            ("bullet", BULLETS[level % BULLETS.len()].to_string())
        };
        out.push_str(&format!(
            r#"<w:lvl w:ilvl="{level}"><w:start w:val="1"/><w:numFmt w:val="{fmt}"/><w:lvlText w:val="{text}"/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="{left}" w:hanging="360"/></w:pPr></w:lvl>"#,
            left = 720 * (level + 1)
        ));
    }
    out.push_str("</w:abstractNum>");
    out
}

fn zip_error(err: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

/// Escape text for inclusion in XML character data or attribute values.
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
  <Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
  <Override PartName="/word/numbering.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"/>
  <Override PartName="/word/settings.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml"/>
  <Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
</Types>"#;

const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
</Relationships>"#;

const WORD_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering" Target="numbering.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/settings" Target="settings.xml"/>
</Relationships>"#;

const SETTINGS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:settings xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math">
  <m:mathPr><m:mathFont m:val="Cambria Math"/><m:dispDef/></m:mathPr>
</w:settings>"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:docDefaults>
    <w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:cs="Calibri"/><w:sz w:val="22"/></w:rPr></w:rPrDefault>
    <w:pPrDefault><w:pPr><w:spacing w:after="120" w:line="264" w:lineRule="auto"/></w:pPr></w:pPrDefault>
  </w:docDefaults>
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style>
  <w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:spacing w:after="240"/></w:pPr><w:rPr><w:sz w:val="56"/></w:rPr></w:style>
  <w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="360" w:after="120"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:sz w:val="32"/></w:rPr></w:style>
  <w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="80"/><w:outlineLvl w:val="1"/></w:pPr><w:rPr><w:b/><w:sz w:val="28"/></w:rPr></w:style>
  <w:style w:type="paragraph" w:styleId="Heading3"><w:name w:val="heading 3"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="200" w:after="60"/><w:outlineLvl w:val="2"/></w:pPr><w:rPr><w:b/><w:sz w:val="24"/></w:rPr></w:style>
  <w:style w:type="paragraph" w:styleId="Heading4"><w:name w:val="heading 4"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:outlineLvl w:val="3"/></w:pPr><w:rPr><w:b/><w:i/></w:rPr></w:style>
  <w:style w:type="paragraph" w:styleId="ListParagraph"><w:name w:val="List Paragraph"/><w:basedOn w:val="Normal"/><w:qFormat/><w:pPr><w:contextualSpacing/></w:pPr></w:style>
  <w:style w:type="paragraph" w:styleId="Caption"><w:name w:val="caption"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:rPr><w:i/><w:sz w:val="20"/></w:rPr></w:style>
</w:styles>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_text_runs() {
        let mut writer = DocxWriter::new();
        writer.add_paragraph(&[Inline::plain("a < b & c")]);
        assert!(writer.document_xml().contains("a &lt; b &amp; c"));
    }

    #[test]
    fn run_properties_follow_schema_order() {
        let mut out = String::new();
        let style = RunStyle {
            bold: true,
            italic: true,
            monospace: true,
            subscript: true,
            superscript: false,
        };
        push_run_properties(&mut out, &style);
        let fonts = out.find("w:rFonts").unwrap();
        let bold = out.find("<w:b/>").unwrap();
        let italic = out.find("<w:i/>").unwrap();
        let vert = out.find("w:vertAlign").unwrap();
        assert!(fonts < bold && bold < italic && italic < vert);
    }

    #[test]
    fn each_ordered_list_restarts_numbering() {
        let mut writer = DocxWriter::new();
        let items = vec![ListItem::new(vec![Inline::plain("one")])];
        writer.add_list(true, &items);
        writer.add_list(true, &items);
        writer.add_list(false, &items);
        let numbering = writer.numbering_xml();
        assert!(numbering.contains(r#"w:numId="2""#));
        assert!(numbering.contains(r#"w:numId="3""#));
        assert_eq!(numbering.matches("startOverride").count(), 2);
    }

    #[test]
    fn heading_levels_map_to_styles() {
        let mut writer = DocxWriter::new();
        writer.add_heading("Book", 0);
        writer.add_heading("Deep", 7);
        let xml = writer.document_xml();
        assert!(xml.contains(r#"w:val="Title""#));
        assert!(xml.contains(r#"w:val="Heading4""#));
    }
}
