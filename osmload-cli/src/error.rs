//! Error types emitted by the osmload CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use osmload_data::IngestError;
use thiserror::Error;

/// Errors emitted by the osmload CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// An option was supplied with an unusable value.
    #[error("invalid --{field} value {value:?}: {reason}")]
    InvalidArgument {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The directory holding the database could not be created.
    #[error("failed to create the directory for database {path:?}: {source}")]
    PrepareDatabaseDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open database {path:?}: {source}")]
    OpenDatabase {
        path: Utf8PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    /// OSM ingestion failed.
    #[error("failed to ingest {path:?}: {source}")]
    Ingest {
        path: Utf8PathBuf,
        #[source]
        source: IngestError,
    },
    /// The Ctrl-C handler could not be registered.
    #[error("failed to install the interrupt handler: {0}")]
    InterruptHandler(#[source] ctrlc::Error),
    /// A global logger was already installed.
    #[error("failed to install the logger: {0}")]
    Logging(#[source] log::SetLoggerError),
}
