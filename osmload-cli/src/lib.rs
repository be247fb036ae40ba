//! Command-line interface for loading OSM XML into SQLite.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use log::{LevelFilter, warn};
use osmload_core::CancellationToken;
use structured_logger::{Builder, json::new_writer};

mod error;
mod ingest;

pub use error::CliError;

use ingest::{IngestArgs, IngestOutcome, execute_ingest, resolve_ingest_config};

const ARG_INPUT: &str = "input";
const ARG_DATABASE: &str = "database";
const ARG_TABLE_NAME: &str = "table-name";
const ARG_ENCODING: &str = "encoding";
const ARG_BATCH_SIZE: &str = "batch-size";
const ARG_DROP_EXISTING: &str = "drop-existing";
const ARG_LOG_LEVEL: &str = "log-level";
const ENV_INPUT: &str = "OSMLOAD_CMDS_INGEST_INPUT";
const ENV_DATABASE: &str = "OSMLOAD_CMDS_INGEST_DATABASE";

/// Run the osmload CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Ingest(args) => {
            let config = resolve_ingest_config(args)?;
            init_logging(config.log_level)?;
            let token = CancellationToken::new();
            install_interrupt_handler(token.clone())?;
            let outcome = execute_ingest(config, token)?;
            print_summary(&outcome);
        }
    }
    Ok(())
}

fn init_logging(level: LevelFilter) -> Result<(), CliError> {
    Builder::with_level(level.as_str())
        .with_target_writer("*", new_writer(std::io::stderr()))
        .try_init()
        .map_err(CliError::Logging)
}

fn install_interrupt_handler(token: CancellationToken) -> Result<(), CliError> {
    ctrlc::set_handler(move || {
        warn!("interrupt received, stopping before the next element");
        token.cancel();
    })
    .map_err(CliError::InterruptHandler)
}

fn print_summary(outcome: &IngestOutcome) {
    let report = &outcome.report;
    println!(
        "loaded {} nodes, {} ways and {} relations into {}",
        report.counts.nodes, report.counts.ways, report.counts.relations, outcome.database
    );
    for sink in &report.sinks {
        println!("  {:<32} {:>10} rows", sink.table, sink.rows_written);
    }
    if report.duplicate_tags > 0 {
        println!("  skipped {} duplicate tags", report.duplicate_tags);
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "osmload",
    about = "Load OpenStreetMap XML extracts into relational tables",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load an OSM XML file into ten SQLite tables.
    Ingest(IngestArgs),
}

#[cfg(test)]
mod tests;
