//! tex2docx CLI - LaTeX, Markdown and BibTeX to Word converter

use clap::{Parser, ValueEnum};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use texdocx::{
    convert_source, detect_file_format, output_path_for, write_docx, ConversionReport,
    ConvertOptions, InputFormat, MathOptions,
};

#[derive(Parser)]
#[command(name = "tex2docx")]
#[command(version)]
#[command(about = "Convert LaTeX, Markdown or BibTeX to Word (.docx) with native equations", long_about = None)]
struct Cli {
    /// Input file (.tex, .md or .bib)
    input_file: PathBuf,

    /// Output file path (default: <stem>.docx in the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Input format
    #[arg(short, long, value_enum, default_value_t = Format::Auto)]
    format: Format,

    /// Path to the texmath executable
    #[arg(long)]
    texmath: Option<PathBuf>,

    /// Keep equations as LaTeX text instead of converting them
    #[arg(long)]
    no_math: bool,

    /// Convert the whole LaTeX input, preamble included
    #[arg(long)]
    no_preamble_skip: bool,

    /// Write a JSON report of warnings and labels to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Detect and print the input format without converting
    #[arg(long)]
    detect: bool,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Auto,
    Latex,
    Markdown,
    Bibtex,
}

impl Format {
    fn resolve(self) -> Option<InputFormat> {
        match self {
            Format::Auto => None,
            Format::Latex => Some(InputFormat::Latex),
            Format::Markdown => Some(InputFormat::Markdown),
            Format::Bibtex => Some(InputFormat::Bibtex),
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .parse_default_env()
        .init();
}

/// Find the input: as given, then relative to the parent directory and the
/// home directory.
fn resolve_input(path: &Path) -> Option<PathBuf> {
    if path.exists() {
        return Some(path.to_path_buf());
    }
    if path.is_absolute() {
        return None;
    }
    let mut candidates = Vec::new();
    if let Some(parent) = env::current_dir()
        .ok()
        .and_then(|cwd| cwd.parent().map(Path::to_path_buf))
    {
        candidates.push(parent.join(path));
    }
    if let Some(home) = env::var_os("HOME") {
        candidates.push(PathBuf::from(home).join(path));
    }
    candidates.into_iter().find(|candidate| candidate.exists())
}

fn build_options(cli: &Cli) -> ConvertOptions {
    let mut math = MathOptions::from_env();
    if let Some(path) = &cli.texmath {
        math.texmath = Some(path.clone());
    }
    if cli.no_math {
        math.enabled = false;
    }
    ConvertOptions {
        skip_preamble: !cli.no_preamble_skip,
        math,
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let input = resolve_input(&cli.input_file).ok_or_else(|| {
        let cwd = env::current_dir().unwrap_or_default();
        format!(
            "File '{}' not found (checked {})",
            cli.input_file.display(),
            cwd.join(&cli.input_file).display()
        )
    })?;
    let content = fs::read_to_string(&input)
        .map_err(|e| format!("Cannot read '{}': {}", input.display(), e))?;

    let format = cli
        .format
        .resolve()
        .unwrap_or_else(|| detect_file_format(&input, &content));
    if cli.detect {
        println!("{}", format);
        return Ok(());
    }

    let options = build_options(cli);
    log::info!("converting {} as {}", input.display(), format);
    let output = convert_source(&content, format, &options).map_err(|e| e.to_string())?;

    let out_path = cli
        .output
        .clone()
        .unwrap_or_else(|| output_path_for(&input));
    write_docx(&output, &out_path).map_err(|e| e.to_string())?;

    if let Some(report_path) = &cli.report {
        ConversionReport::new(input.display().to_string(), format.name(), &output)
            .with_output(out_path.display().to_string())
            .save(report_path)
            .map_err(|e| e.to_string())?;
        eprintln!("✓ Report written to: {}", report_path.display());
    }

    if output.has_warnings() {
        eprintln!("⚠ {} warning(s)", output.warnings.len());
        if cli.verbose > 0 {
            for warning in output.warnings.iter().filter(|w| w.line.is_some()) {
                eprintln!("  {}", warning);
            }
        }
    }
    eprintln!("✓ Output written to: {}", out_path.display());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(message) = run(&cli) {
        eprintln!("✗ Error: {}", message);
        process::exit(1);
    }
}
