//! Error types for ingestion and destination access.

use std::io;

use camino::Utf8PathBuf;
use osmload_core::MalformedInputError;
use thiserror::Error;

/// Errors raised by a [`crate::Destination`].
#[derive(Debug, Error)]
pub enum DestinationError {
    /// A SQLite call failed.
    #[error("SQLite failed to {operation}")]
    Sqlite {
        /// What the destination was doing.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A table name cannot be used as an identifier.
    #[error("invalid table name {name:?}: {reason}")]
    InvalidTableName {
        /// Offending name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// The destination refused the request.
    #[error("destination rejected the request: {reason}")]
    Rejected {
        /// Human-readable explanation.
        reason: String,
    },
}

/// Coarse classification of an [`IngestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The input does not describe a well-formed OSM document.
    MalformedInput,
    /// A batch could not be written to one of the tables.
    SinkFailure,
    /// The progress visitor asked the ingestion to stop.
    Cancelled,
    /// Opening, reading or releasing a resource failed.
    ResourceFailure,
}

/// Errors returned by the ingestion entry points.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The markup was well-formed XML but not a well-formed OSM document.
    #[error("malformed OSM input")]
    MalformedInput(#[from] MalformedInputError),
    /// The XML itself could not be parsed.
    #[error("failed to parse XML near byte {position}")]
    Markup {
        /// Decoded byte offset reported by the parser.
        position: u64,
        /// Source error produced by `quick-xml`.
        #[source]
        source: quick_xml::Error,
    },
    /// Writing a batch into a table failed.
    #[error("failed to write batch into table {table}")]
    SinkFailure {
        /// Destination table.
        table: String,
        /// Underlying destination error.
        #[source]
        source: DestinationError,
    },
    /// The progress visitor requested cancellation.
    #[error("ingestion cancelled")]
    Cancelled,
    /// One of the target tables already exists.
    #[error("table {table} already exists")]
    TableExists {
        /// Name of the first existing table found.
        table: String,
    },
    /// A destination lifecycle call failed.
    #[error("failed to {operation}")]
    Destination {
        /// Lifecycle step that failed.
        operation: &'static str,
        /// Underlying destination error.
        #[source]
        source: DestinationError,
    },
    /// The input file could not be opened.
    #[error("failed to open OSM file at {path}")]
    Open {
        /// Input path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file extension does not name a supported container.
    #[error("unsupported OSM file {path}: expected .osm, .osm.gz or .osm.bz2")]
    UnsupportedFormat {
        /// Input path.
        path: Utf8PathBuf,
    },
    /// The requested encoding label is not recognised.
    #[error("unknown character encoding {label:?}")]
    UnknownEncoding {
        /// Label as supplied.
        label: String,
    },
    /// Reading or decoding the input stream failed.
    #[error("failed to read OSM input near byte {position}")]
    Read {
        /// Decoded byte offset reached before the failure.
        position: u64,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Releasing destination resources failed after an otherwise clean run.
    #[error("failed to release destination resources")]
    Release {
        /// Underlying destination error.
        #[source]
        source: DestinationError,
    },
}

impl IngestError {
    /// Map the error onto the four-way failure taxonomy.
    ///
    /// # Examples
    /// ```
    /// use osmload_data::{FailureKind, IngestError};
    ///
    /// assert_eq!(IngestError::Cancelled.kind(), FailureKind::Cancelled);
    /// ```
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::MalformedInput(_) | Self::Markup { .. } => FailureKind::MalformedInput,
            Self::SinkFailure { .. } => FailureKind::SinkFailure,
            Self::Cancelled => FailureKind::Cancelled,
            Self::TableExists { .. }
            | Self::Destination { .. }
            | Self::Open { .. }
            | Self::UnsupportedFormat { .. }
            | Self::UnknownEncoding { .. }
            | Self::Read { .. }
            | Self::Release { .. } => FailureKind::ResourceFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmload_core::FeatureKind;
    use rstest::rstest;
    use std::error::Error as _;

    #[rstest]
    fn malformed_input_keeps_its_source() {
        let err = IngestError::from(MalformedInputError::Unterminated {
            kind: FeatureKind::Way,
            id: 4,
        });
        assert_eq!(err.kind(), FailureKind::MalformedInput);
        let source = err.source().map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("stream ended before way 4 was closed")
        );
    }

    #[rstest]
    fn sink_failure_names_the_table() {
        let err = IngestError::SinkFailure {
            table: "map_node".to_owned(),
            source: DestinationError::Rejected {
                reason: "disk full".to_owned(),
            },
        };
        assert_eq!(err.kind(), FailureKind::SinkFailure);
        assert_eq!(err.to_string(), "failed to write batch into table map_node");
    }

    #[rstest]
    #[case(IngestError::TableExists { table: "t_node".to_owned() })]
    #[case(IngestError::UnknownEncoding { label: "klingon".to_owned() })]
    #[case(IngestError::UnsupportedFormat { path: Utf8PathBuf::from("map.pbf") })]
    fn resource_problems_share_a_kind(#[case] err: IngestError) {
        assert_eq!(err.kind(), FailureKind::ResourceFailure);
    }
}
