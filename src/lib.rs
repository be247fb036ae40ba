//! Facade crate for the osmload OSM XML loader.
//!
//! This crate re-exports the streaming domain types and exposes the SQLite
//! ingestion pipeline behind the `store-sqlite` feature flag.

#![forbid(unsafe_code)]

pub use osmload_core::{
    CancellationToken, ElementCounts, FeatureKind, LoggingProgress, MalformedInputError,
    MemberKind, Metadata, NoProgress, PathFeature, PointFeature, ProgressVisitor,
    RelationFeature, Row, RowSink, SinkKind, TagRouter, Tags,
};

#[cfg(feature = "store-sqlite")]
pub use osmload_data::{
    Destination, FailureKind, IngestError, IngestOptions, IngestReport, SqliteDestination,
    TableNames, ingest, ingest_osm_file,
};
