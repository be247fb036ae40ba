//! Ingest command implementation for the osmload CLI.

use std::num::NonZeroUsize;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::{LevelFilter, info};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmload_core::{CancellationToken, LoggingProgress};
use osmload_data::{IngestOptions, IngestReport, TableNames, ingest_osm_file};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    ARG_BATCH_SIZE, ARG_DATABASE, ARG_DROP_EXISTING, ARG_ENCODING, ARG_INPUT, ARG_LOG_LEVEL,
    ARG_TABLE_NAME, CliError, ENV_DATABASE, ENV_INPUT,
};

const DEFAULT_LOG_LEVEL: &str = "info";
const OSM_SUFFIXES: [&str; 3] = [".osm.gz", ".osm.bz2", ".osm"];

/// CLI arguments for the `ingest` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Load an OpenStreetMap XML file (.osm, .osm.gz or .osm.bz2) \
                 into ten SQLite tables named after --table-name. Values can \
                 come from CLI flags, configuration files, or environment \
                 variables. Ctrl-C stops the load before the next element; \
                 batches already committed stay in the database.",
    about = "Load an OSM XML file into SQLite tables"
)]
#[ortho_config(prefix = "OSMLOAD")]
pub(crate) struct IngestArgs {
    /// Path to the OSM XML file.
    #[arg(long = ARG_INPUT, value_name = "path")]
    #[serde(default)]
    pub(crate) input: Option<Utf8PathBuf>,
    /// Path to the SQLite database receiving the tables.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Base name of the ten tables; defaults to the input file stem.
    #[arg(long = ARG_TABLE_NAME, value_name = "name")]
    #[serde(default)]
    pub(crate) table_name: Option<String>,
    /// Character encoding overriding the one declared by the file.
    #[arg(long = ARG_ENCODING, value_name = "label")]
    #[serde(default)]
    pub(crate) encoding: Option<String>,
    /// Rows buffered per table before a batch is written.
    #[arg(long = ARG_BATCH_SIZE, value_name = "rows")]
    #[serde(default)]
    pub(crate) batch_size: Option<usize>,
    /// Drop existing tables with the same names before loading.
    #[arg(
        long = ARG_DROP_EXISTING,
        value_name = "bool",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    #[serde(default)]
    pub(crate) drop_existing: Option<bool>,
    /// Log level (error, warn, info, debug or trace).
    #[arg(long = ARG_LOG_LEVEL, value_name = "level")]
    #[serde(default)]
    pub(crate) log_level: Option<String>,
}

impl IngestArgs {
    pub(crate) fn into_config(self) -> Result<IngestConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        IngestConfig::try_from(merged)
    }
}

/// Resolved `ingest` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IngestConfig {
    /// OSM XML input.
    pub(crate) input: Utf8PathBuf,
    /// SQLite database path.
    pub(crate) database: Utf8PathBuf,
    /// Validated table base name.
    pub(crate) table_name: String,
    /// Options forwarded to the ingestion driver.
    pub(crate) options: IngestOptions,
    /// Level passed to the logger.
    pub(crate) log_level: LevelFilter,
}

impl IngestConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        match osmload_fs::file_is_file(&self.input) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CliError::SourcePathNotFile {
                field: ARG_INPUT,
                path: self.input.clone(),
            }),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(CliError::MissingSourceFile {
                    field: ARG_INPUT,
                    path: self.input.clone(),
                })
            }
            Err(source) => Err(CliError::InspectSourcePath {
                field: ARG_INPUT,
                path: self.input.clone(),
                source,
            }),
        }
    }
}

impl TryFrom<IngestArgs> for IngestConfig {
    type Error = CliError;

    fn try_from(args: IngestArgs) -> Result<Self, Self::Error> {
        let input = args.input.ok_or(CliError::MissingArgument {
            field: ARG_INPUT,
            env: ENV_INPUT,
        })?;
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_DATABASE,
        })?;

        let table_name = args
            .table_name
            .unwrap_or_else(|| default_table_name(&input));
        if TableNames::new(&table_name).is_err() {
            return Err(CliError::InvalidArgument {
                field: ARG_TABLE_NAME,
                value: table_name,
                reason: "use ASCII letters, digits and underscores, not starting with a digit",
            });
        }

        let mut options =
            IngestOptions::default().with_drop_existing(args.drop_existing.unwrap_or(false));
        if let Some(rows) = args.batch_size {
            let batch_size = NonZeroUsize::new(rows).ok_or_else(|| CliError::InvalidArgument {
                field: ARG_BATCH_SIZE,
                value: rows.to_string(),
                reason: "the batch size must be at least 1",
            })?;
            options = options.with_batch_size(batch_size);
        }
        if let Some(label) = args.encoding {
            options = options.with_encoding(label);
        }

        let level = args
            .log_level
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned());
        let log_level = LevelFilter::from_str(&level).map_err(|_| CliError::InvalidArgument {
            field: ARG_LOG_LEVEL,
            value: level.clone(),
            reason: "expected off, error, warn, info, debug or trace",
        })?;

        Ok(Self {
            input,
            database,
            table_name,
            options,
            log_level,
        })
    }
}

/// Derive a table base name from the input file name.
///
/// The OSM suffix is removed, characters outside `[A-Za-z0-9_]` become
/// underscores and a leading digit is prefixed with an underscore.
pub(crate) fn default_table_name(input: &Utf8Path) -> String {
    let file_name = input.file_name().unwrap_or("osm");
    let lowered = file_name.to_ascii_lowercase();
    let stem_len = OSM_SUFFIXES
        .iter()
        .find(|suffix| lowered.ends_with(*suffix))
        .map_or(file_name.len(), |suffix| file_name.len() - suffix.len());
    let stem: String = file_name
        .get(..stem_len)
        .unwrap_or(file_name)
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    match stem.chars().next() {
        None => "osm".to_owned(),
        Some(first) if first.is_ascii_digit() => format!("_{stem}"),
        Some(_) => stem,
    }
}

/// Outcome of a completed ingest run.
#[derive(Debug, Clone)]
pub(crate) struct IngestOutcome {
    /// Database the tables were written to.
    pub(crate) database: Utf8PathBuf,
    /// Report returned by the ingestion driver.
    pub(crate) report: IngestReport,
}

/// Merge configuration layers and validate the input.
pub(crate) fn resolve_ingest_config(args: IngestArgs) -> Result<IngestConfig, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    Ok(config)
}

/// Load the configured file into the configured database.
///
/// The load stops with [`osmload_data::IngestError::Cancelled`] once `token`
/// is cancelled.
pub(crate) fn execute_ingest(
    config: IngestConfig,
    token: CancellationToken,
) -> Result<IngestOutcome, CliError> {
    osmload_fs::ensure_parent_dir(&config.database).map_err(|source| {
        CliError::PrepareDatabaseDir {
            path: config.database.clone(),
            source,
        }
    })?;
    let connection =
        Connection::open(config.database.as_std_path()).map_err(|source| CliError::OpenDatabase {
            path: config.database.clone(),
            source,
        })?;

    info!(
        "loading {} into {} as {}_*",
        config.input, config.database, config.table_name
    );
    let mut progress = LoggingProgress::new(token);
    let report = ingest_osm_file(
        &config.input,
        &connection,
        &config.table_name,
        &mut progress,
        &config.options,
    )
    .map_err(|source| CliError::Ingest {
        path: config.input.clone(),
        source,
    })?;

    Ok(IngestOutcome {
        database: config.database,
        report,
    })
}
