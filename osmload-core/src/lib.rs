//! Core domain types for OSM XML ingestion.
//!
//! This crate owns everything that does not touch I/O: the node, way and
//! relation builders, a parser-independent markup event vocabulary, the
//! [`TagRouter`] state machine that turns events into rows, and the progress
//! and cancellation primitives used by the ingestion driver.

#![forbid(unsafe_code)]

pub mod element;
pub mod error;
pub mod event;
pub mod progress;
pub mod router;
pub mod row;

pub use element::{
    ELEVATION_TAG, FeatureKind, MemberKind, Metadata, NAME_TAG, PathFeature, PointFeature,
    RelationFeature, TagInsert, Tags, WGS84_SRID,
};
pub use error::{FeatureContext, MalformedInputError};
pub use event::{Attributes, ElementKind, MarkupEvent};
pub use progress::{
    CancellationToken, DEFAULT_AVERAGE_ELEMENT_SIZE, LoggingProgress, NoProgress,
    ProgressMonitor, ProgressVisitor,
};
pub use router::{Dispatch, ElementCounts, MEMBER_SEQUENCE_BASE, RouterState, TagRouter};
pub use row::{
    EditInfo, MemberRow, NodeRow, RelationRow, Row, RowSink, SinkKind, TagRow, WayNodeRow, WayRow,
};
