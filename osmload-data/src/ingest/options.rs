use std::num::{NonZeroU64, NonZeroUsize};

use osmload_core::DEFAULT_AVERAGE_ELEMENT_SIZE;

/// Rows buffered per table before a batch is executed.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(7_999);

/// Tuning knobs for one ingestion run.
///
/// # Examples
/// ```
/// use std::num::NonZeroUsize;
/// use osmload_data::IngestOptions;
///
/// let options = IngestOptions::default()
///     .with_batch_size(NonZeroUsize::new(500).expect("non-zero"))
///     .with_encoding("ISO-8859-1")
///     .with_drop_existing(true);
/// assert_eq!(options.batch_size.get(), 500);
/// assert_eq!(options.encoding.as_deref(), Some("ISO-8859-1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Rows buffered per table before a flush.
    pub batch_size: NonZeroUsize,
    /// Expected bytes per top-level element, used to space progress samples.
    pub average_element_size: NonZeroU64,
    /// WHATWG label overriding the encoding declared by the document.
    pub encoding: Option<String>,
    /// Drop the target tables before creating them.
    pub drop_existing: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            average_element_size: DEFAULT_AVERAGE_ELEMENT_SIZE,
            encoding: None,
            drop_existing: false,
        }
    }
}

impl IngestOptions {
    /// Set the per-table batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the average element size used for progress sampling.
    #[must_use]
    pub const fn with_average_element_size(mut self, size: NonZeroU64) -> Self {
        self.average_element_size = size;
        self
    }

    /// Force the input encoding.
    #[must_use]
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = Some(label.into());
        self
    }

    /// Drop existing tables instead of failing on a name collision.
    #[must_use]
    pub const fn with_drop_existing(mut self, drop_existing: bool) -> Self {
        self.drop_existing = drop_existing;
        self
    }
}
