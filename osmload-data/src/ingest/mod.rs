//! Streaming OSM XML ingestion into the ten destination tables.
//!
//! The driver walks `Unopened → Parsing → Draining → Closed`. Every exit path
//! passes through `Closed`, which commits or rolls back and then releases the
//! destination.

mod options;
mod source;
mod xml;

pub use options::{DEFAULT_BATCH_SIZE, IngestOptions};
pub use source::{ByteCounter, Container, CountingReader, encoding_for_label, sniff_encoding};
pub use xml::XmlEvents;

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};

use camino::Utf8Path;
use log::{debug, info, warn};
use osmload_core::{Dispatch, ElementCounts, ProgressMonitor, ProgressVisitor, TagRouter};

use crate::error::{DestinationError, IngestError};
use crate::sink::{BatchWriter, Destination, SinkStats, SqliteDestination, TableNames};

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// The ten table names in canonical order.
    pub tables: Vec<String>,
    /// Elements routed from the stream.
    pub counts: ElementCounts,
    /// Per-table batching statistics in canonical order.
    pub sinks: Vec<SinkStats>,
    /// Repeated tag keys dropped by the router or skipped by the destination.
    pub duplicate_tags: u64,
}

impl IngestReport {
    /// Rows stored across every table.
    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.sinks.iter().map(|sink| sink.rows_written).sum()
    }

    /// Statistics of the table called `table`.
    #[must_use]
    pub fn sink(&self, table: &str) -> Option<&SinkStats> {
        self.sinks.iter().find(|sink| sink.table == table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unopened,
    Parsing,
    Draining,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unopened => "unopened",
            Self::Parsing => "parsing",
            Self::Draining => "draining",
            Self::Closed => "closed",
        })
    }
}

struct Driver<'a, D: ?Sized, V: ?Sized> {
    destination: &'a mut D,
    progress: &'a mut V,
    tables: TableNames,
    router: TagRouter,
    writer: BatchWriter,
    monitor: ProgressMonitor,
    phase: Phase,
}

impl<'a, D, V> Driver<'a, D, V>
where
    D: Destination + ?Sized,
    V: ProgressVisitor + ?Sized,
{
    fn new(
        destination: &'a mut D,
        progress: &'a mut V,
        tables: TableNames,
        total_bytes: u64,
        options: &IngestOptions,
    ) -> Self {
        Self {
            writer: BatchWriter::new(&tables, options.batch_size),
            monitor: ProgressMonitor::new(total_bytes, options.average_element_size),
            router: TagRouter::new(),
            destination,
            progress,
            tables,
            phase: Phase::Unopened,
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!("ingestion {} -> {phase}", self.phase);
        self.phase = phase;
    }

    fn open(&mut self, drop_existing: bool) -> Result<(), IngestError> {
        if drop_existing {
            for (_, table) in self.tables.iter() {
                self.destination
                    .drop_table(table)
                    .map_err(lifecycle("drop existing table"))?;
            }
        }
        for (_, table) in self.tables.iter() {
            if self
                .destination
                .table_exists(table)
                .map_err(lifecycle("look up existing tables"))?
            {
                return Err(IngestError::TableExists {
                    table: table.to_owned(),
                });
            }
        }
        for (kind, table) in self.tables.iter() {
            self.destination
                .create_table(kind, table)
                .map_err(lifecycle("create table"))?;
        }
        self.destination
            .begin()
            .map_err(lifecycle("begin transaction"))
    }

    fn parse<B, P>(
        &mut self,
        events: &mut XmlEvents<B>,
        position: &mut P,
    ) -> Result<ElementCounts, IngestError>
    where
        B: BufRead,
        P: FnMut() -> io::Result<u64>,
    {
        self.enter(Phase::Parsing);
        while let Some(event) = events.next_event()? {
            if event.opens_feature() && self.progress.is_canceled() {
                let discarded = self.writer.discard();
                info!("ingestion cancelled, {discarded} buffered rows discarded");
                return Err(IngestError::Cancelled);
            }
            if let Dispatch::Closed(_) = self.router.dispatch(event, &mut self.writer)? {
                self.writer.poll(&mut *self.destination)?;
                self.monitor
                    .element_closed(&mut *position, &mut *self.progress);
            }
        }
        let counts = self.router.finish()?;

        self.enter(Phase::Draining);
        self.writer.flush_all(&mut *self.destination)?;
        self.monitor.finish(&mut *self.progress);
        Ok(counts)
    }

    fn close(
        mut self,
        outcome: Result<ElementCounts, IngestError>,
    ) -> Result<IngestReport, IngestError> {
        self.enter(Phase::Closed);
        let outcome = match outcome {
            Ok(counts) => match self.destination.commit() {
                Ok(()) => Ok(counts),
                Err(source) => {
                    self.quiet_rollback();
                    Err(IngestError::Destination {
                        operation: "commit transaction",
                        source,
                    })
                }
            },
            Err(err) => {
                self.quiet_rollback();
                Err(err)
            }
        };

        match (outcome, self.destination.release()) {
            (Ok(counts), Ok(())) => Ok(self.report(counts)),
            (Ok(_), Err(source)) => Err(IngestError::Release { source }),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(source)) => {
                warn!("failed to release destination after an aborted ingestion: {source}");
                Err(err)
            }
        }
    }

    fn quiet_rollback(&mut self) {
        if let Err(err) = self.destination.rollback() {
            warn!("rollback failed: {err}");
        }
    }

    fn report(self, counts: ElementCounts) -> IngestReport {
        let sinks = self.writer.all_stats();
        let skipped: u64 = sinks.iter().map(|sink| sink.duplicate_tags).sum();
        IngestReport {
            tables: self.tables.to_vec(),
            counts,
            sinks,
            duplicate_tags: counts.duplicate_tags + skipped,
        }
    }
}

fn lifecycle(operation: &'static str) -> impl Fn(DestinationError) -> IngestError {
    move |source| IngestError::Destination { operation, source }
}

/// Ingest an OSM XML stream into the ten tables named after `base`.
///
/// `total_bytes` is the size of the raw input (zero disables intermediate
/// progress) and `position` reports how many of those bytes have been read.
///
/// # Errors
/// Returns [`IngestError::TableExists`] when a target table is already
/// present, [`IngestError::Cancelled`] when `progress` asks to stop, and the
/// remaining [`IngestError`] variants for malformed input or destination
/// failures. Batches committed before a failure are kept.
///
/// # Examples
/// ```
/// use osmload_core::NoProgress;
/// use osmload_data::{IngestOptions, SqliteDestination, ingest};
///
/// let connection = rusqlite::Connection::open_in_memory()?;
/// let mut destination = SqliteDestination::new(&connection);
/// let xml = r#"<osm><node id="1" lat="48.85" lon="2.35"/></osm>"#;
/// let report = ingest(
///     xml.as_bytes(),
///     0,
///     || Ok(0),
///     &mut destination,
///     "paris",
///     &mut NoProgress,
///     &IngestOptions::default(),
/// )?;
/// assert_eq!(report.counts.nodes, 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn ingest<R, P, D, V>(
    reader: R,
    total_bytes: u64,
    mut position: P,
    destination: &mut D,
    base: &str,
    progress: &mut V,
    options: &IngestOptions,
) -> Result<IngestReport, IngestError>
where
    R: Read,
    P: FnMut() -> io::Result<u64>,
    D: Destination + ?Sized,
    V: ProgressVisitor + ?Sized,
{
    let tables = TableNames::new(base).map_err(lifecycle("validate table names"))?;
    let mut events = XmlEvents::new(source::utf8_reader(reader, options.encoding.as_deref())?);
    info!("ingesting OSM XML into tables {}_*", tables.base());

    let mut driver = Driver::new(destination, progress, tables, total_bytes, options);
    let outcome = driver
        .open(options.drop_existing)
        .and_then(|()| driver.parse(&mut events, &mut position));
    let report = driver.close(outcome)?;

    info!(
        "ingested {} nodes, {} ways and {} relations ({} rows, {} duplicate tags)",
        report.counts.nodes,
        report.counts.ways,
        report.counts.relations,
        report.rows_written(),
        report.duplicate_tags
    );
    Ok(report)
}

/// Ingest an `.osm`, `.osm.gz` or `.osm.bz2` file into SQLite.
///
/// Progress is measured on the raw file bytes, before decompression.
///
/// # Errors
/// Returns [`IngestError::UnsupportedFormat`] for other extensions,
/// [`IngestError::Open`] when the file cannot be opened, and any error
/// [`ingest`] reports.
///
/// # Examples
/// ```no_run
/// use camino::Utf8Path;
/// use osmload_core::NoProgress;
/// use osmload_data::{IngestOptions, ingest_osm_file};
///
/// let connection = rusqlite::Connection::open("paris.sqlite")?;
/// let report = ingest_osm_file(
///     Utf8Path::new("paris.osm.bz2"),
///     &connection,
///     "paris",
///     &mut NoProgress,
///     &IngestOptions::default(),
/// )?;
/// println!("loaded {} nodes", report.counts.nodes);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn ingest_osm_file<V: ProgressVisitor + ?Sized>(
    path: &Utf8Path,
    connection: &rusqlite::Connection,
    base: &str,
    progress: &mut V,
    options: &IngestOptions,
) -> Result<IngestReport, IngestError> {
    let container =
        Container::from_path(path).ok_or_else(|| IngestError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
    let input = osmload_fs::open_input(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("opened {path} ({} bytes, {container:?})", input.len);

    let (counting, counter) = CountingReader::new(input.file);
    let decoded = container.decode(BufReader::new(counting));
    let mut destination = SqliteDestination::new(connection);
    ingest(
        decoded,
        input.len,
        move || Ok(counter.get()),
        &mut destination,
        base,
        progress,
        options,
    )
}
