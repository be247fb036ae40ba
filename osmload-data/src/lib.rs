//! Ingestion driver and destinations for OSM XML.
//!
//! Responsibilities:
//! - Open `.osm`, `.osm.gz` and `.osm.bz2` inputs and transcode them to UTF-8.
//! - Translate XML into the markup events routed by `osmload-core`.
//! - Batch rows per table and write them through a [`Destination`].
//!
//! Boundaries:
//! - Routing and row construction live in `osmload-core`.
//! - One stream per destination at a time; the driver is synchronous.
//!
//! Invariants:
//! - A flush never observes a half-written feature.
//! - Batches committed before a failure or cancellation are kept.

#![forbid(unsafe_code)]

pub mod error;
pub mod ingest;
pub mod sink;

pub use error::{DestinationError, FailureKind, IngestError};
pub use ingest::{
    ByteCounter, Container, CountingReader, DEFAULT_BATCH_SIZE, IngestOptions, IngestReport,
    XmlEvents, encoding_for_label, ingest, ingest_osm_file, sniff_encoding,
};
pub use sink::{
    BatchOutcome, BatchWriter, Destination, SinkStats, SqliteDestination, TableNames, ewkt_point,
};

#[cfg(any(test, feature = "test-support"))]
pub use sink::test_support;
