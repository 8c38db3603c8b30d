//! ferry - copy, move, rename and trash files across local and network storage.
//!
//! Usage:
//!   ferry copy SOURCES... --to DEST      Copy items into a directory
//!   ferry move SOURCES... --to DEST      Move items into a directory
//!   ferry rename FILE NEW_NAME           Rename one item in place
//!   ferry delete FILES... [--soft]       Delete, or move to trash with --soft
//!   ferry sweep ROOTS...                 Purge expired trash directories
//!   ferry --help                         Show help

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use ferry_core::{Locator, Operation, OperationResult, ProgressEvent, TransferConfig};
use ferry_ops::TransferEngine;

#[derive(Parser)]
#[command(
    name = "ferry",
    version,
    about = "Copy, move, rename and trash files across local and network storage",
    long_about = "ferry routes each operation to the storage backend it touches.\n\n\
                  Local paths are handled directly; network locators (smb://, \
                  sftp://, ftp://, cloud://) need a registered transport."
)]
struct Cli {
    /// JSON file with engine settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print the result as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct TransferArgs {
    /// Items to transfer
    #[arg(required = true)]
    sources: Vec<String>,

    /// Destination directory
    #[arg(short, long)]
    to: String,

    /// Replace items that already exist at the destination
    #[arg(long)]
    overwrite: bool,

    /// Stored credentials to use for the sources
    #[arg(long)]
    credentials: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Copy items into a directory
    Copy(TransferArgs),

    /// Move items into a directory
    Move(TransferArgs),

    /// Rename one item in place
    Rename {
        /// Item to rename
        file: String,

        /// New name (not a path)
        new_name: String,
    },

    /// Delete items
    Delete {
        /// Items to delete
        #[arg(required = true)]
        files: Vec<String>,

        /// Move into a trash directory next to each item instead
        #[arg(short, long)]
        soft: bool,
    },

    /// Remove trash directories older than the retention period
    Sweep {
        /// Directories to scan for trash
        #[arg(default_value = ".")]
        roots: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let engine = TransferEngine::local(config);

    let operation = match cli.command {
        Command::Copy(args) => transfer(args, |s, d, o| Operation::copy(s, d, o)),
        Command::Move(args) => transfer(args, |s, d, o| Operation::move_to(s, d, o)),
        Command::Rename { file, new_name } => Operation::rename(file, new_name),
        Command::Delete { files, soft } => Operation::delete(locators(files), soft),
        Command::Sweep { roots } => return run_sweep(&engine, &roots, cli.json).await,
    };

    let result = run_operation(&engine, operation, !cli.json).await;
    print_result(&result, cli.json)?;

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ferry=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<TransferConfig> {
    let Some(path) = path else {
        return Ok(TransferConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

fn locators(raw: Vec<String>) -> Vec<Locator> {
    raw.into_iter().map(Locator::new).collect()
}

fn transfer(args: TransferArgs, build: fn(Vec<Locator>, Locator, bool) -> Operation) -> Operation {
    let operation = build(locators(args.sources), Locator::new(args.to), args.overwrite);
    match args.credentials {
        Some(id) => operation.with_credentials(id),
        None => operation,
    }
}

/// Run an operation, drawing a progress line on stderr.
async fn run_operation(
    engine: &TransferEngine,
    operation: Operation,
    show_progress: bool,
) -> OperationResult {
    let fallback = operation.clone();
    let mut events = engine.execute_with_progress(operation);
    let mut result = None;

    while let Some(event) = events.next().await {
        match event {
            ProgressEvent::Processing {
                current_item,
                index,
                total,
                bytes_transferred,
                total_bytes,
                speed_bytes_per_second,
            } if show_progress => {
                eprint!(
                    "\r\x1b[2K [{}/{}] {} {} / {} ({}/s)",
                    index + 1,
                    total,
                    truncate(&current_item, 40),
                    format_size(bytes_transferred),
                    format_size(total_bytes),
                    format_size(speed_bytes_per_second)
                );
                let _ = std::io::stderr().flush();
            }
            ProgressEvent::Completed { result: done } => result = Some(done),
            _ => {}
        }
    }
    if show_progress {
        eprintln!();
    }

    result.unwrap_or_else(|| {
        OperationResult::rejected(
            &fallback,
            &ferry_core::TransferError::other("operation ended without a result"),
        )
    })
}

fn print_result(result: &OperationResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("{}", result.summary());
    for path in result.produced_paths() {
        println!("  + {}", path);
    }
    for error in result.errors() {
        println!("  ! {}", error);
    }
    Ok(())
}

async fn run_sweep(engine: &TransferEngine, roots: &[PathBuf], json: bool) -> Result<()> {
    let roots = roots
        .iter()
        .map(|root| {
            root.canonicalize()
                .with_context(|| format!("Invalid path {}", root.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let report = engine.trash().sweep(&roots).await;

    if json {
        let value = serde_json::json!({
            "removed": report.removed,
            "errors": report.errors,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!(
            "Removed {} trash directories older than {} days",
            report.removed.len(),
            engine.config().trash_retention_days
        );
        for dir in &report.removed {
            println!("  - {}", dir.display());
        }
        for error in &report.errors {
            println!("  ! {}", error);
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
