//! DOCX Proceedings CLI tool
//!
//! A command-line tool for merging DOCX papers into one proceedings document.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use glob::glob;
use std::path::{Path, PathBuf};
use std::process;

use docx_proceedings::compose::{
    compose, resolve_titles, BoundaryDiscipline, ComposeOptions, FooterOptions, TocOptions,
    TocStrategy, TotalPages,
};
use docx_proceedings::date::{default_output_name, parse_date};
use docx_proceedings::input::{read_archive, read_files, sort_naturally, InputDocument};

/// DOCX Proceedings - Merge papers with a table of contents and page numbers
#[derive(Parser)]
#[command(name = "docx-proceedings")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Merge every paper in an archive, in archive order
    docx-proceedings merge abstracts.zip

    # Merge numbered papers in natural order
    docx-proceedings merge -o proceedings.docx \"[0-9]*.docx\"

    # Custom footer with a fixed date
    docx-proceedings merge --footer-left \"Annual Meeting\" --footer-right \"[date]\" --date 2024-11-20 *.docx

    # Show the table of contents without merging
    docx-proceedings titles abstracts.zip")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge documents into one proceedings document
    Merge {
        #[command(flatten)]
        inputs: InputArgs,

        /// Output DOCX file path (default: Proceedings_<timestamp>.docx)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// How TOC entries point at documents
        #[arg(long, value_enum, default_value = "tag")]
        toc_strategy: StrategyArg,

        /// Letter scoping TC entries to the generated TOC
        #[arg(long, default_value = "P")]
        toc_tag: String,

        /// What separates consecutive documents
        #[arg(long, value_enum, default_value = "page")]
        boundary: BoundaryArg,

        /// Heading shown above the table of contents
        #[arg(long, default_value = "Table of Contents")]
        toc_heading: String,

        /// Proceedings title shown above the table of contents
        #[arg(long)]
        title: Option<String>,

        /// Footer left section (use | or [br] for line breaks)
        #[arg(long)]
        footer_left: Option<String>,

        /// Footer center section (use | or [br] for line breaks)
        #[arg(long, default_value = "Page [page] of [pages]")]
        footer_center: String,

        /// Footer right section (use | or [br] for line breaks)
        #[arg(long)]
        footer_right: Option<String>,

        /// What [pages] counts
        #[arg(long, value_enum, default_value = "document")]
        total: TotalArg,

        /// Footer font size in points (default: the document's body size)
        #[arg(long)]
        footer_font_size: Option<u32>,

        /// Fixed date for [date] (e.g., "today", "tuesday+1", "2026-01-14");
        /// without it [date] updates when the document is opened
        #[arg(long)]
        date: Option<String>,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Print the TOC titles in merge order
    Titles {
        #[command(flatten)]
        inputs: InputArgs,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// Input .zip archives or .docx files. Supports glob patterns like "*.docx"
    #[arg(required = true)]
    inputs: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Hidden TC fields collected by a TOC field
    Tag,
    /// Literal rows with PAGEREF fields
    Bookmarks,
}

#[derive(Clone, Copy, ValueEnum)]
enum BoundaryArg {
    /// Page break between documents
    Page,
    /// Section break between documents, keeping each page layout
    Section,
}

#[derive(Clone, Copy, ValueEnum)]
enum TotalArg {
    /// All pages, TOC included
    Document,
    /// Content pages only
    Content,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docx_proceedings=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Merge {
            inputs, output, toc_strategy, toc_tag, boundary, toc_heading, title,
            footer_left, footer_center, footer_right, total, footer_font_size, date, open,
        } => {
            let options = ComposeOptions {
                toc: TocOptions {
                    strategy: match toc_strategy {
                        StrategyArg::Tag => TocStrategy::TagScoped,
                        StrategyArg::Bookmarks => TocStrategy::Bookmarks,
                    },
                    tag: toc_tag,
                    heading: toc_heading,
                    title,
                },
                boundary: match boundary {
                    BoundaryArg::Page => BoundaryDiscipline::PageBreak,
                    BoundaryArg::Section => BoundaryDiscipline::SectionBreak,
                },
                footer: FooterOptions {
                    left: footer_left,
                    center: Some(footer_center).filter(|c| !c.is_empty()),
                    right: footer_right,
                    date: None,
                    total: match total {
                        TotalArg::Document => TotalPages::Document,
                        TotalArg::Content => TotalPages::Content,
                    },
                    font_size: footer_font_size.map(|pt| pt * 2),
                },
            };
            cmd_merge(inputs.inputs, output, options, date, open)
        }
        Commands::Titles { inputs } => cmd_titles(inputs.inputs),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Expand glob patterns in input paths
///
/// Matches of one pattern are sorted naturally; patterns keep their order.
fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        // Check if pattern contains glob characters
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = Vec::new();
            for entry in glob(pattern).with_context(|| format!("Bad glob pattern: {}", pattern))? {
                match entry {
                    Ok(path) => matched.push(path),
                    Err(e) => eprintln!("Warning: glob error for {}: {}", pattern, e),
                }
            }
            if matched.is_empty() {
                bail!("No files matched pattern: {}", pattern);
            }
            sort_naturally(&mut matched);
            paths.extend(matched);
        } else {
            // No glob characters, treat as literal path
            paths.push(PathBuf::from(pattern));
        }
    }

    Ok(paths)
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Read every input in command-line order; archives contribute their entries
fn collect_inputs(patterns: &[String]) -> Result<Vec<InputDocument>> {
    let paths = expand_globs(patterns)?;

    let mut documents = Vec::new();
    for path in &paths {
        if !path.exists() {
            bail!("Input file not found: {}", path.display());
        }
        if is_archive(path) {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let entries = read_archive(&bytes)
                .with_context(|| format!("Failed to read archive {}", path.display()))?;
            eprintln!("{}: {} documents", path.display(), entries.len());
            documents.extend(entries);
        } else {
            documents.extend(read_files(std::slice::from_ref(path))?);
        }
    }

    Ok(InputDocument::ordered(documents))
}

/// Open a file with the system default application
fn open_file(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }
    Ok(())
}

/// Merge documents into one proceedings document
fn cmd_merge(
    inputs: Vec<String>,
    output: Option<PathBuf>,
    mut options: ComposeOptions,
    date: Option<String>,
    open: bool,
) -> Result<()> {
    if let Some(expr) = date.as_deref() {
        options.footer.date = Some(parse_date(expr)?);
    }

    let documents = collect_inputs(&inputs)?;
    let output = output.unwrap_or_else(|| PathBuf::from(default_output_name(&chrono::Local::now())));

    eprintln!("Merging {} documents...", documents.len());

    let composite = compose(&documents, &options)?;
    for entry in &composite.entries {
        eprintln!("  {:>3}. {}", entry.ordinal + 1, entry.title);
    }

    std::fs::write(&output, &composite.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    eprintln!("Merged to: {}", output.display());
    eprintln!("Page numbers and the table of contents fill in when fields are updated (Word asks on open).");

    if open {
        open_file(&output)?;
    }

    Ok(())
}

/// Print the resolved TOC titles
fn cmd_titles(inputs: Vec<String>) -> Result<()> {
    let documents = collect_inputs(&inputs)?;
    if documents.is_empty() {
        bail!(docx_proceedings::Error::EmptyInput);
    }

    for entry in resolve_titles(&documents) {
        println!("{}. {}", entry.ordinal + 1, entry.title);
    }

    Ok(())
}
