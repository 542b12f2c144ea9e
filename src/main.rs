use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dtext_parse::{DTextOptions, ParseResult};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

mod config;

#[derive(Parser)]
#[command(name = "dtext", version, about = "Render DText markup to HTML")]
struct Cli {
    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log parser activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    options: config::OptionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum RenderMode {
    /// Paragraphs, blocks and links
    Full,
    /// A single line, no block markup
    Inline,
    /// Emphasis only
    Basic,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Html,
    /// `{html, wiki_pages, posts, mentions}`
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a DText file (or stdin)
    Render {
        /// Path to the .dtext file; reads stdin when omitted
        file: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "full")]
        mode: RenderMode,

        /// Output format
        #[arg(long, value_enum, default_value = "html")]
        format: OutputFormat,
    },

    /// Parse every .dtext file under the given paths
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the effective options as JSON
    Options,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let options = config::resolve_options(&cli.options)?;

    match cli.command {
        Commands::Render { file, mode, format } => {
            handle_render(file.as_deref(), mode, format, &options)?;
        }
        Commands::Check { paths } => {
            handle_check(&paths, &options, cli.quiet)?;
        }
        Commands::Options => {
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
    }

    Ok(())
}

fn handle_render(
    file: Option<&Path>,
    mode: RenderMode,
    format: OutputFormat,
    options: &DTextOptions,
) -> Result<()> {
    let (name, content) = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?;
            (path.display().to_string(), content)
        }
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read stdin")?;
            ("<stdin>".to_string(), content)
        }
    };

    let result = render(&content, mode, options)
        .with_context(|| format!("Failed to render '{name}'"))?;

    match format {
        OutputFormat::Html => println!("{}", result.html),
        OutputFormat::Json => println!("{}", serde_json::to_string(&result)?),
    }
    Ok(())
}

fn render(content: &str, mode: RenderMode, options: &DTextOptions) -> Result<ParseResult> {
    let result = match mode {
        RenderMode::Full => dtext_parse::parse_dtext(content, options)?,
        RenderMode::Inline => ParseResult {
            html: dtext_parse::parse_inline(content, options)?,
            ..ParseResult::default()
        },
        RenderMode::Basic => ParseResult {
            html: dtext_parse::parse_basic_inline(content, options)?,
            ..ParseResult::default()
        },
    };
    Ok(result)
}

/// Files to check under `path`: the path itself if it is a file, otherwise
/// every `*.dtext` below it.
fn dtext_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "dtext"))
        .map(|e| e.into_path())
        .collect()
}

fn handle_check(paths: &[PathBuf], options: &DTextOptions, quiet: bool) -> Result<()> {
    let mut has_errors = false;
    let mut checked = 0usize;

    for root in paths {
        if !root.exists() {
            anyhow::bail!("'{}' does not exist", root.display());
        }

        for file in dtext_files(root) {
            checked += 1;
            let outcome = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read '{}'", file.display()))
                .and_then(|content| {
                    dtext_parse::parse_dtext(&content, options).map_err(anyhow::Error::from)
                });

            match outcome {
                Ok(_) => {
                    if !quiet {
                        println!("{}: {}", file.display(), "OK".green());
                    }
                }
                Err(e) => {
                    has_errors = true;
                    println!("{}: {}: {e:#}", file.display(), "error".red().bold());
                }
            }
        }
    }

    if !quiet {
        println!("{checked} file(s) checked");
    }

    if has_errors {
        std::process::exit(1);
    }

    Ok(())
}
