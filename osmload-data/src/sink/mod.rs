//! Destination tables and the batching layer that feeds them.

mod sqlite;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
mod writer;

pub use sqlite::{SqliteDestination, ewkt_point};
pub use writer::{BatchWriter, SinkStats};

use osmload_core::{Row, SinkKind};

use crate::error::DestinationError;

/// Result of executing one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[must_use]
pub struct BatchOutcome {
    /// Rows stored.
    pub written: u64,
    /// Tag rows skipped because the `(owner, key)` pair already existed.
    pub duplicate_tags: u64,
}

/// A store able to hold the ten OSM tables.
///
/// The ingestion driver calls the lifecycle methods in this order:
/// `table_exists`/`drop_table`, `create_table`, `begin`, then any number of
/// `execute_batch` + `commit` + `begin` cycles, and finally `commit` or
/// `rollback` followed by `release`.
pub trait Destination {
    /// Whether a table with this name exists.
    ///
    /// # Errors
    /// Returns [`DestinationError`] when the catalogue cannot be queried.
    fn table_exists(&mut self, table: &str) -> Result<bool, DestinationError>;

    /// Drop the table if it exists.
    ///
    /// # Errors
    /// Returns [`DestinationError`] when the table cannot be dropped.
    fn drop_table(&mut self, table: &str) -> Result<(), DestinationError>;

    /// Create the table that stores rows of `kind`.
    ///
    /// # Errors
    /// Returns [`DestinationError`] when the schema cannot be created.
    fn create_table(&mut self, kind: SinkKind, table: &str) -> Result<(), DestinationError>;

    /// Open a transaction.
    ///
    /// # Errors
    /// Returns [`DestinationError`] when the transaction cannot be started.
    fn begin(&mut self) -> Result<(), DestinationError>;

    /// Store `rows` into `table` inside the open transaction.
    ///
    /// Tag tables must tolerate repeated `(owner, key)` pairs and report them
    /// through [`BatchOutcome::duplicate_tags`].
    ///
    /// # Errors
    /// Returns [`DestinationError`] when any row cannot be stored.
    fn execute_batch(
        &mut self,
        kind: SinkKind,
        table: &str,
        rows: &[Row],
    ) -> Result<BatchOutcome, DestinationError>;

    /// Commit the open transaction.
    ///
    /// # Errors
    /// Returns [`DestinationError`] when the commit fails.
    fn commit(&mut self) -> Result<(), DestinationError>;

    /// Roll back the open transaction, if any.
    ///
    /// # Errors
    /// Returns [`DestinationError`] when the rollback fails.
    fn rollback(&mut self) -> Result<(), DestinationError>;

    /// Release prepared statements and other per-run resources.
    ///
    /// # Errors
    /// Returns [`DestinationError`] when resources cannot be released.
    fn release(&mut self) -> Result<(), DestinationError>;
}

impl<D: Destination + ?Sized> Destination for &mut D {
    fn table_exists(&mut self, table: &str) -> Result<bool, DestinationError> {
        (**self).table_exists(table)
    }

    fn drop_table(&mut self, table: &str) -> Result<(), DestinationError> {
        (**self).drop_table(table)
    }

    fn create_table(&mut self, kind: SinkKind, table: &str) -> Result<(), DestinationError> {
        (**self).create_table(kind, table)
    }

    fn begin(&mut self) -> Result<(), DestinationError> {
        (**self).begin()
    }

    fn execute_batch(
        &mut self,
        kind: SinkKind,
        table: &str,
        rows: &[Row],
    ) -> Result<BatchOutcome, DestinationError> {
        (**self).execute_batch(kind, table, rows)
    }

    fn commit(&mut self) -> Result<(), DestinationError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), DestinationError> {
        (**self).rollback()
    }

    fn release(&mut self) -> Result<(), DestinationError> {
        (**self).release()
    }
}

/// The ten table names derived from a base name, in canonical order.
///
/// # Examples
/// ```
/// use osmload_core::SinkKind;
/// use osmload_data::TableNames;
///
/// let names = TableNames::new("paris")?;
/// assert_eq!(names.get(SinkKind::WayNode), "paris_way_node");
/// assert_eq!(names.iter().count(), 10);
/// # Ok::<(), osmload_data::DestinationError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    base: String,
    names: [String; 10],
}

impl TableNames {
    /// Validate `base` and derive the table names.
    ///
    /// Base names must start with an ASCII letter or underscore and contain
    /// only ASCII letters, digits and underscores.
    ///
    /// # Errors
    /// Returns [`DestinationError::InvalidTableName`] for unusable names.
    pub fn new(base: &str) -> Result<Self, DestinationError> {
        let invalid = |reason| DestinationError::InvalidTableName {
            name: base.to_owned(),
            reason,
        };
        let mut chars = base.chars();
        let Some(first) = chars.next() else {
            return Err(invalid("name is empty"));
        };
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(invalid("name must start with a letter or underscore"));
        }
        if !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(invalid(
                "name may only contain ASCII letters, digits and underscores",
            ));
        }
        Ok(Self {
            base: base.to_owned(),
            names: SinkKind::ALL.map(|kind| format!("{base}{}", kind.table_suffix())),
        })
    }

    /// The validated base name.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Table receiving rows of `kind`.
    #[must_use]
    pub fn get(&self, kind: SinkKind) -> &str {
        self.names
            .get(kind.index())
            .map_or("", String::as_str)
    }

    /// Pairs of sink kind and table name in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (SinkKind, &str)> {
        SinkKind::ALL
            .into_iter()
            .zip(self.names.iter().map(String::as_str))
    }

    /// Owned copy of the names in canonical order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.names.to_vec()
    }
}
