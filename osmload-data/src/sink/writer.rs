//! Per-table row buffers with threshold-triggered flushing.

use std::mem;
use std::num::NonZeroUsize;

use log::debug;
use osmload_core::{Row, RowSink, SinkKind};

use super::{BatchOutcome, Destination, TableNames};
use crate::error::{DestinationError, IngestError};

/// Counters kept for one destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkStats {
    /// Sink the counters belong to.
    pub kind: SinkKind,
    /// Destination table.
    pub table: String,
    /// Batches executed and committed.
    pub flushes: u64,
    /// Rows stored across all batches.
    pub rows_written: u64,
    /// Tag rows skipped by the destination as duplicates.
    pub duplicate_tags: u64,
}

#[derive(Debug)]
struct Sink {
    pending: Vec<Row>,
    stats: SinkStats,
}

impl Sink {
    fn new(kind: SinkKind, table: &str) -> Self {
        Self {
            pending: Vec::new(),
            stats: SinkStats {
                kind,
                table: table.to_owned(),
                flushes: 0,
                rows_written: 0,
                duplicate_tags: 0,
            },
        }
    }

    fn flush<D: Destination + ?Sized>(&mut self, destination: &mut D) -> Result<(), IngestError> {
        let table = self.stats.table.as_str();
        let failure = |source: DestinationError| IngestError::SinkFailure {
            table: table.to_owned(),
            source,
        };
        let outcome: BatchOutcome = destination
            .execute_batch(self.stats.kind, table, &self.pending)
            .map_err(failure)?;
        destination.commit().map_err(failure)?;
        destination.begin().map_err(failure)?;

        debug!(
            "flushed {} rows into {table} ({} duplicate tags skipped)",
            self.pending.len(),
            outcome.duplicate_tags
        );
        self.pending.clear();
        self.stats.flushes += 1;
        self.stats.rows_written += outcome.written;
        self.stats.duplicate_tags += outcome.duplicate_tags;
        Ok(())
    }
}

/// Buffers rows for the ten tables and flushes each one independently.
///
/// A sink is flushed as soon as its buffer holds `batch_size` rows, so at most
/// `10 × batch_size` rows are held between polls.
#[derive(Debug)]
pub struct BatchWriter {
    sinks: [Sink; 10],
    batch_size: NonZeroUsize,
}

impl BatchWriter {
    /// Create empty buffers for `tables`.
    #[must_use]
    pub fn new(tables: &TableNames, batch_size: NonZeroUsize) -> Self {
        Self {
            sinks: SinkKind::ALL.map(|kind| Sink::new(kind, tables.get(kind))),
            batch_size,
        }
    }

    fn sink(&self, kind: SinkKind) -> Option<&Sink> {
        self.sinks.get(kind.index())
    }

    fn sink_mut(&mut self, kind: SinkKind) -> Option<&mut Sink> {
        self.sinks.get_mut(kind.index())
    }

    /// Rows waiting in the buffer of `kind`.
    #[must_use]
    pub fn pending(&self, kind: SinkKind) -> usize {
        self.sink(kind).map_or(0, |sink| sink.pending.len())
    }

    /// Counters for `kind`.
    #[must_use]
    pub fn stats(&self, kind: SinkKind) -> Option<&SinkStats> {
        self.sink(kind).map(|sink| &sink.stats)
    }

    /// Counters for every sink in canonical order.
    #[must_use]
    pub fn all_stats(&self) -> Vec<SinkStats> {
        self.sinks.iter().map(|sink| sink.stats.clone()).collect()
    }

    /// Flush the buffer of `kind` when it has reached the batch size.
    ///
    /// # Errors
    /// Returns [`IngestError::SinkFailure`] naming the table when the batch,
    /// its commit or the next transaction cannot be executed.
    pub fn maybe_flush<D: Destination + ?Sized>(
        &mut self,
        kind: SinkKind,
        destination: &mut D,
    ) -> Result<bool, IngestError> {
        let batch_size = self.batch_size.get();
        let Some(sink) = self.sink_mut(kind) else {
            return Ok(false);
        };
        if sink.pending.len() < batch_size {
            return Ok(false);
        }
        sink.flush(destination)?;
        Ok(true)
    }

    /// Apply [`BatchWriter::maybe_flush`] to every sink in canonical order.
    ///
    /// # Errors
    /// Propagates the first sink failure.
    pub fn poll<D: Destination + ?Sized>(&mut self, destination: &mut D) -> Result<(), IngestError> {
        for kind in SinkKind::ALL {
            self.maybe_flush(kind, destination)?;
        }
        Ok(())
    }

    /// Flush every non-empty buffer regardless of the threshold.
    ///
    /// # Errors
    /// Propagates the first sink failure.
    pub fn flush_all<D: Destination + ?Sized>(
        &mut self,
        destination: &mut D,
    ) -> Result<(), IngestError> {
        for sink in &mut self.sinks {
            if !sink.pending.is_empty() {
                sink.flush(destination)?;
            }
        }
        Ok(())
    }

    /// Drop every pending row without writing it, returning how many were lost.
    pub fn discard(&mut self) -> usize {
        self.sinks
            .iter_mut()
            .map(|sink| mem::take(&mut sink.pending).len())
            .sum()
    }
}

impl RowSink for BatchWriter {
    fn enqueue(&mut self, kind: SinkKind, row: Row) {
        if let Some(sink) = self.sink_mut(kind) {
            sink.pending.push(row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_support::{RecordingDestination, tag_row};
    use rstest::{fixture, rstest};

    #[fixture]
    fn tables() -> TableNames {
        TableNames::new("t").expect("valid base")
    }

    fn destination(tables: &TableNames, base: RecordingDestination) -> RecordingDestination {
        let mut destination = base;
        for (kind, table) in tables.iter() {
            destination
                .create_table(kind, table)
                .expect("create table");
        }
        destination
    }

    fn writer(tables: &TableNames, batch_size: usize) -> BatchWriter {
        BatchWriter::new(
            tables,
            NonZeroUsize::new(batch_size).expect("non-zero batch size"),
        )
    }

    #[rstest]
    fn flushes_only_the_full_sink(tables: TableNames) {
        let mut writer = writer(&tables, 2);
        let mut destination = destination(&tables, RecordingDestination::default());
        writer.enqueue(SinkKind::NodeTag, tag_row(1, "a"));
        writer.enqueue(SinkKind::NodeTag, tag_row(1, "b"));
        writer.enqueue(SinkKind::WayTag, tag_row(2, "a"));

        writer.poll(&mut destination).expect("poll succeeds");

        assert_eq!(writer.pending(SinkKind::NodeTag), 0);
        assert_eq!(writer.pending(SinkKind::WayTag), 1);
        assert_eq!(destination.rows("t_node_tag").len(), 2);
        assert!(destination.rows("t_way_tag").is_empty());
        assert_eq!(
            writer.stats(SinkKind::NodeTag).map(|stats| stats.flushes),
            Some(1)
        );
        assert_eq!(destination.commits(), 1);
    }

    #[rstest]
    fn flush_all_skips_empty_sinks(tables: TableNames) {
        let mut writer = writer(&tables, 100);
        let mut destination = destination(&tables, RecordingDestination::default());
        writer.enqueue(SinkKind::RelationTag, tag_row(3, "type"));

        writer.flush_all(&mut destination).expect("drain succeeds");

        let flushed: Vec<SinkKind> = writer
            .all_stats()
            .into_iter()
            .filter(|stats| stats.flushes > 0)
            .map(|stats| stats.kind)
            .collect();
        assert_eq!(flushed, vec![SinkKind::RelationTag]);
        assert_eq!(destination.batches(), 1);
    }

    #[rstest]
    fn destination_failure_names_the_table(tables: TableNames) {
        let mut writer = writer(&tables, 1);
        let mut destination =
            destination(&tables, RecordingDestination::default().failing_on("t_way_tag"));
        writer.enqueue(SinkKind::WayTag, tag_row(9, "highway"));

        let err = writer
            .poll(&mut destination)
            .expect_err("rejected batch must fail");
        match err {
            IngestError::SinkFailure { table, .. } => assert_eq!(table, "t_way_tag"),
            other => panic!("expected a sink failure, got {other:?}"),
        }
        assert_eq!(writer.pending(SinkKind::WayTag), 1);
    }

    #[rstest]
    fn duplicate_tags_are_counted_not_failed(tables: TableNames) {
        let mut writer = writer(&tables, 10);
        let mut destination = destination(&tables, RecordingDestination::default());
        writer.enqueue(SinkKind::NodeTag, tag_row(1, "name"));
        writer.enqueue(SinkKind::NodeTag, tag_row(1, "name"));

        writer.flush_all(&mut destination).expect("duplicates are tolerated");

        let stats = writer.stats(SinkKind::NodeTag).expect("node tag sink");
        assert_eq!(stats.rows_written, 1);
        assert_eq!(stats.duplicate_tags, 1);
    }

    #[rstest]
    fn discard_drops_pending_rows(tables: TableNames) {
        let mut writer = writer(&tables, 10);
        writer.enqueue(SinkKind::NodeTag, tag_row(1, "a"));
        writer.enqueue(SinkKind::WayTag, tag_row(2, "b"));
        assert_eq!(writer.discard(), 2);
        assert_eq!(writer.pending(SinkKind::NodeTag), 0);
    }

    #[rstest]
    fn every_kind_has_its_own_sink(tables: TableNames) {
        let mut writer = writer(&tables, 10);
        for kind in SinkKind::ALL {
            writer.enqueue(kind, tag_row(1, "k"));
        }
        for kind in SinkKind::ALL {
            assert_eq!(writer.pending(kind), 1);
            let stats = writer.stats(kind).expect("sink for every kind");
            assert_eq!(stats.kind, kind);
            assert_eq!(stats.table, tables.get(kind));
        }
    }
}
