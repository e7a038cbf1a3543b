use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use ledger_tools::append::AppendOutcome;
use ledger_tools::config::{self, LedgerConfig};
use ledger_tools::model::{CANONICAL_HEADERS, CanonicalTable, OutputCell};
use ledger_tools::sync::{self, IngestStatus};
use ledger_tools::{Result, ToolError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let mut config = config::load_config(cli.config.as_deref())?;
    init_tracing(&config.log_level)?;

    match cli.command {
        Command::Ingest(args) => execute_ingest(args, &config),
        Command::Preview(args) => {
            if let Some(rows) = args.rows {
                config.preview_rows = rows;
            }
            execute_preview(args, &config)
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|error| ToolError::Logging(error.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn require_input(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ToolError::MissingInput(path.to_path_buf()))
    }
}

fn execute_ingest(args: IngestArgs, config: &LedgerConfig) -> Result<bool> {
    require_input(&args.input)?;
    let report = sync::ingest(&args.input, &args.store, config)?;

    if report.status == IngestStatus::NoValidData {
        println!("No valid data found after filtering. Check the export's format.");
        return Ok(true);
    }

    println!("Store: {}", args.store.display());
    for ledger in &report.ledgers {
        match &ledger.outcome {
            AppendOutcome::Written { range, rows } => println!(
                "  {}: {rows} new rows added at {range} | total rows now: {}",
                ledger.kind, ledger.total_rows
            ),
            AppendOutcome::Skipped => println!(
                "  {}: no new rows | total rows now: {}",
                ledger.kind, ledger.total_rows
            ),
            AppendOutcome::Failed { error } => {
                println!("  {}: upload failed: {error}", ledger.kind)
            }
        }
    }

    Ok(report.status == IngestStatus::Completed)
}

fn execute_preview(args: PreviewArgs, config: &LedgerConfig) -> Result<bool> {
    require_input(&args.input)?;
    let ledgers = sync::preview(&args.input, config)?;

    if args.json {
        let document: serde_json::Map<String, serde_json::Value> = ledgers
            .iter()
            .map(|ledger| -> Result<(String, serde_json::Value)> {
                let head = CanonicalTable::new(
                    ledger.table.iter().take(config.preview_rows).cloned().collect(),
                );
                Ok((ledger.kind.to_string(), serde_json::to_value(head)?))
            })
            .collect::<Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        for ledger in &ledgers {
            println!(
                "{} ({} rows, sheet '{}')",
                ledger.kind,
                ledger.table.len(),
                ledger.sheet
            );
            println!("{}", render_table(&ledger.table, config.preview_rows));
        }
    }

    if ledgers.iter().all(|ledger| ledger.table.is_empty()) {
        eprintln!("warning: no valid data found after filtering");
    }
    Ok(true)
}

fn render_table(table: &CanonicalTable, limit: usize) -> String {
    let rows: Vec<Vec<String>> = table
        .iter()
        .take(limit)
        .map(|record| record.to_cells().iter().map(OutputCell::to_string).collect())
        .collect();

    let mut widths: Vec<usize> = CANONICAL_HEADERS.iter().map(|header| header.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut lines = vec![format_line(CANONICAL_HEADERS.iter().copied(), &widths)];
    lines.extend(
        rows.iter()
            .map(|row| format_line(row.iter().map(String::as_str), &widths)),
    );
    lines.join("\n")
}

fn format_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths.iter().copied())
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ")
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Normalise Sales and Purchases exports and append them to a ledger workbook."
)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile an export and append both ledgers to the store.
    Ingest(IngestArgs),
    /// Reconcile an export and print the first rows of each ledger.
    Preview(PreviewArgs),
}

#[derive(clap::Args)]
struct IngestArgs {
    /// Export workbook containing the ledger sheets.
    #[arg(long)]
    input: PathBuf,

    /// Ledger workbook to append to; created when missing.
    #[arg(long)]
    store: PathBuf,
}

#[derive(clap::Args)]
struct PreviewArgs {
    /// Export workbook containing the ledger sheets.
    #[arg(long)]
    input: PathBuf,

    /// Number of rows to show per ledger.
    #[arg(long)]
    rows: Option<usize>,

    /// Print the preview as JSON.
    #[arg(long)]
    json: bool,
}
