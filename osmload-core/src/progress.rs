//! Progress reporting and cooperative cancellation.
//!
//! Progress is sampled once every `interval` top-level elements, where the
//! interval is sized so that roughly one hundred samples are taken over a file
//! of typical density. The sampled value is the raw byte offset of the
//! underlying file, which stays meaningful for compressed inputs because the
//! offset is read below the decoder.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

/// Default estimate of the encoded size of one top-level element.
pub const DEFAULT_AVERAGE_ELEMENT_SIZE: NonZeroU64 = NonZeroU64::MIN.saturating_add(499);

/// Callback surface for progress and cancellation.
pub trait ProgressVisitor {
    /// Report completion as a percentage in `0..=100`.
    fn set_step(&mut self, percent: u8);

    /// Whether the caller has asked the ingestion to stop.
    fn is_canceled(&self) -> bool;
}

impl<V: ProgressVisitor + ?Sized> ProgressVisitor for &mut V {
    fn set_step(&mut self, percent: u8) {
        (**self).set_step(percent);
    }

    fn is_canceled(&self) -> bool {
        (**self).is_canceled()
    }
}

/// Visitor that ignores progress and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressVisitor for NoProgress {
    fn set_step(&mut self, _percent: u8) {}

    fn is_canceled(&self) -> bool {
        false
    }
}

/// Thread-safe cancellation flag shared between a caller and a visitor.
///
/// # Examples
/// ```
/// use osmload_core::CancellationToken;
///
/// let token = CancellationToken::new();
/// let remote = token.clone();
/// remote.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether [`CancellationToken::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Visitor that logs each new percentage and honours a cancellation token.
#[derive(Debug, Clone, Default)]
pub struct LoggingProgress {
    token: CancellationToken,
    last: Option<u8>,
}

impl LoggingProgress {
    /// Create a visitor observing `token`.
    #[must_use]
    pub const fn new(token: CancellationToken) -> Self {
        Self { token, last: None }
    }

    /// Most recent percentage reported.
    #[must_use]
    pub const fn last_step(&self) -> Option<u8> {
        self.last
    }
}

impl ProgressVisitor for LoggingProgress {
    fn set_step(&mut self, percent: u8) {
        if self.last == Some(percent) {
            return;
        }
        self.last = Some(percent);
        info!("ingestion {percent}% complete");
    }

    fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Samples the byte position every `interval` closed top-level elements.
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    total_bytes: u64,
    interval: u64,
    closed: u64,
}

impl ProgressMonitor {
    /// Size the sampling interval for a stream of `total_bytes`.
    ///
    /// A `total_bytes` of zero disables intermediate reporting.
    ///
    /// # Examples
    /// ```
    /// use std::num::NonZeroU64;
    /// use osmload_core::ProgressMonitor;
    ///
    /// let average = NonZeroU64::new(500).expect("non-zero");
    /// assert_eq!(ProgressMonitor::new(5_000_000, average).interval(), 100);
    /// assert_eq!(ProgressMonitor::new(1_000, average).interval(), 1);
    /// ```
    #[must_use]
    pub fn new(total_bytes: u64, average_element_size: NonZeroU64) -> Self {
        let interval = ((total_bytes / average_element_size.get()) / 100).max(1);
        Self {
            total_bytes,
            interval,
            closed: 0,
        }
    }

    /// Number of closed elements between samples.
    #[must_use]
    pub const fn interval(&self) -> u64 {
        self.interval
    }

    /// Number of top-level elements closed so far.
    #[must_use]
    pub const fn closed(&self) -> u64 {
        self.closed
    }

    /// Percentage of `total_bytes` covered by `offset`, capped at 100.
    #[must_use]
    pub fn percent(&self, offset: u64) -> Option<u8> {
        if self.total_bytes == 0 {
            return None;
        }
        let ratio = u128::from(offset) * 100 / u128::from(self.total_bytes);
        Some(u8::try_from(ratio.min(100)).unwrap_or(100))
    }

    /// Record one closed top-level element and report progress when due.
    ///
    /// `position` is read lazily; a failure to read it skips the sample.
    pub fn element_closed<P, E, V>(&mut self, position: P, visitor: &mut V) -> Option<u8>
    where
        P: FnOnce() -> Result<u64, E>,
        E: fmt::Display,
        V: ProgressVisitor + ?Sized,
    {
        self.closed += 1;
        if self.total_bytes == 0 || self.closed % self.interval != 0 {
            return None;
        }
        let offset = match position() {
            Ok(offset) => offset,
            Err(err) => {
                debug!("skipping progress sample: {err}");
                return None;
            }
        };
        let percent = self.percent(offset)?;
        visitor.set_step(percent);
        Some(percent)
    }

    /// Report completion, unless reporting is disabled by a zero length.
    pub fn finish<V: ProgressVisitor + ?Sized>(&self, visitor: &mut V) {
        if self.total_bytes == 0 {
            return;
        }
        visitor.set_step(100);
    }
}
