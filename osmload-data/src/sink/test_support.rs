//! In-memory destination used by tests to observe batching and transactions.

use std::collections::BTreeMap;

use osmload_core::{Row, SinkKind, TagRow};

use super::{BatchOutcome, Destination};
use crate::error::DestinationError;

/// Destination that keeps every table in memory and counts lifecycle calls.
///
/// Rows become visible through [`RecordingDestination::rows`] only once the
/// transaction that wrote them is committed.
#[derive(Debug, Default)]
pub struct RecordingDestination {
    tables: BTreeMap<String, Vec<Row>>,
    staged: Vec<(String, Row)>,
    batch_sizes: BTreeMap<String, Vec<usize>>,
    in_transaction: bool,
    commits: usize,
    rollbacks: usize,
    batches: usize,
    releases: usize,
    fail_on: Option<String>,
    fail_release: bool,
}

impl RecordingDestination {
    /// Pretend `table` already exists.
    #[must_use]
    pub fn with_existing_table(mut self, table: &str) -> Self {
        self.tables.insert(table.to_owned(), Vec::new());
        self
    }

    /// Reject every batch written to `table`.
    #[must_use]
    pub fn failing_on(mut self, table: &str) -> Self {
        self.fail_on = Some(table.to_owned());
        self
    }

    /// Fail when resources are released.
    #[must_use]
    pub const fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    /// Committed rows of `table`.
    #[must_use]
    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    /// Names of every table that exists.
    #[must_use]
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Size of each batch executed against `table`, in order.
    #[must_use]
    pub fn batch_sizes(&self, table: &str) -> &[usize] {
        self.batch_sizes.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of commits.
    #[must_use]
    pub const fn commits(&self) -> usize {
        self.commits
    }

    /// Number of rollbacks.
    #[must_use]
    pub const fn rollbacks(&self) -> usize {
        self.rollbacks
    }

    /// Number of batches executed.
    #[must_use]
    pub const fn batches(&self) -> usize {
        self.batches
    }

    /// Number of successful releases.
    #[must_use]
    pub const fn releases(&self) -> usize {
        self.releases
    }

    /// Whether a transaction is currently open.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn tag_exists(&self, table: &str, tag: &TagRow) -> bool {
        let same_key = |row: &Row| {
            matches!(row, Row::Tag(existing)
                if existing.owner_id == tag.owner_id && existing.key == tag.key)
        };
        self.rows(table).iter().any(same_key)
            || self
                .staged
                .iter()
                .any(|(staged_table, row)| staged_table == table && same_key(row))
    }
}

impl Destination for RecordingDestination {
    fn table_exists(&mut self, table: &str) -> Result<bool, DestinationError> {
        Ok(self.tables.contains_key(table))
    }

    fn drop_table(&mut self, table: &str) -> Result<(), DestinationError> {
        self.tables.remove(table);
        Ok(())
    }

    fn create_table(&mut self, _kind: SinkKind, table: &str) -> Result<(), DestinationError> {
        if self.tables.contains_key(table) {
            return Err(DestinationError::Rejected {
                reason: format!("table {table} already exists"),
            });
        }
        self.tables.insert(table.to_owned(), Vec::new());
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DestinationError> {
        self.in_transaction = true;
        Ok(())
    }

    fn execute_batch(
        &mut self,
        kind: SinkKind,
        table: &str,
        rows: &[Row],
    ) -> Result<BatchOutcome, DestinationError> {
        if self.fail_on.as_deref() == Some(table) {
            return Err(DestinationError::Rejected {
                reason: format!("writes to {table} are disabled"),
            });
        }
        if !self.tables.contains_key(table) {
            return Err(DestinationError::Rejected {
                reason: format!("table {table} does not exist"),
            });
        }
        self.batches += 1;
        self.batch_sizes
            .entry(table.to_owned())
            .or_default()
            .push(rows.len());

        let mut outcome = BatchOutcome::default();
        for row in rows {
            if let (true, Row::Tag(tag)) = (kind.is_tag_table(), row) {
                if self.tag_exists(table, tag) {
                    outcome.duplicate_tags += 1;
                    continue;
                }
            }
            self.staged.push((table.to_owned(), row.clone()));
            outcome.written += 1;
        }
        Ok(outcome)
    }

    fn commit(&mut self) -> Result<(), DestinationError> {
        for (table, row) in self.staged.drain(..) {
            self.tables.entry(table).or_default().push(row);
        }
        self.in_transaction = false;
        self.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DestinationError> {
        self.rollbacks += 1;
        self.staged.clear();
        self.in_transaction = false;
        Ok(())
    }

    fn release(&mut self) -> Result<(), DestinationError> {
        if self.fail_release {
            return Err(DestinationError::Rejected {
                reason: "release refused".to_owned(),
            });
        }
        self.releases += 1;
        Ok(())
    }
}

/// A tag row owned by `owner_id` with a fixed value.
#[must_use]
pub fn tag_row(owner_id: i64, key: &str) -> Row {
    Row::Tag(TagRow {
        owner_id,
        key: key.to_owned(),
        value: "v".to_owned(),
    })
}
