//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for monitoring extraction
//! progress, [`CancellationToken`] for cooperative cancellation, and
//! [`ProgressInfo`] for detailed progress snapshots. Progress snapshots carry
//! the active [`ExtractionMethod`] so callers can observe an internal
//! fast→fallback transition without it being reported as an error.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framesift::{
//!     ExtractionController, ExtractionSettings, FramesiftError,
//!     ProgressCallback, ProgressInfo,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("[{}] {:.1}% ({}/{})", info.method, info.percentage, info.current, info.total);
//!     }
//! }
//!
//! let mut controller = ExtractionController::new();
//! controller.analyze("input.mp4")?;
//! let images = controller.extract(
//!     &ExtractionSettings::new(2.0),
//!     Arc::new(PrintProgress),
//! )?;
//! # Ok::<(), FramesiftError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// Which extraction path is producing the current run's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Demux-and-decode pipeline (MP4 family only).
    Fast,
    /// Sequential seek-and-capture loop (any container).
    Fallback,
}

impl Display for ExtractionMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ExtractionMethod::Fast => write!(f, "fast"),
            ExtractionMethod::Fallback => write!(f, "fallback"),
        }
    }
}

/// A snapshot of extraction progress.
///
/// Delivered to [`ProgressCallback::on_progress`] at a cadence controlled by
/// the tracker's batch size.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Which extraction path is currently running. Changes mid-run when the
    /// fast path fails and the fallback restarts the extraction.
    pub method: ExtractionMethod,
    /// How many output frames have been committed so far.
    pub current: u64,
    /// Total output frames expected for this run.
    pub total: u64,
    /// Completion percentage (0.0 – 100.0).
    pub percentage: f32,
    /// Wall-clock time elapsed since the run started. Unaffected by an
    /// internal fast→fallback restart.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Presentation timestamp of the frame most recently committed.
    pub current_timestamp: Option<Duration>,
}

/// Trait for receiving progress updates during extraction.
///
/// Implementations must be [`Send`] and [`Sync`] because callbacks may be
/// invoked while encoder workers are running.
///
/// Progress callbacks are **infallible** — they observe but cannot halt the
/// operation. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during an extraction run.
    fn on_progress(&self, info: &ProgressInfo);
}

/// A no-op implementation that discards all progress notifications.
///
/// This is the default when no callback is configured.
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from any thread to request
/// cancellation of the associated run. Both extraction paths check
/// [`is_cancelled`](CancellationToken::is_cancelled) at every loop iteration
/// and every decoded-frame callback. Cancelling is idempotent: repeated calls,
/// or calls after the run has finished, have no effect beyond the first.
///
/// # Example
///
/// ```
/// use framesift::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// token.cancel(); // idempotent
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token will observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks progress timing across one extraction run and emits callbacks.
///
/// Owned by the controller and passed down into whichever extractor is
/// running. When the fast path fails and the fallback restarts from index 0,
/// the controller calls [`restart`](ProgressTracker::restart): the counter
/// resets and the method label changes, but the elapsed clock keeps running —
/// the caller observes one continuous run.
pub struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    method: ExtractionMethod,
    total: u64,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
}

impl ProgressTracker {
    /// Create a new tracker reporting every `batch_size` items.
    pub fn new(
        callback: Arc<dyn ProgressCallback>,
        method: ExtractionMethod,
        total: u64,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            method,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
        }
    }

    /// The method label currently being reported.
    pub fn method(&self) -> ExtractionMethod {
        self.method
    }

    /// Reset the counter for a restart under a different method.
    ///
    /// The elapsed clock is deliberately not reset.
    pub fn restart(&mut self, method: ExtractionMethod) {
        self.method = method;
        self.current = 0;
        self.items_since_last_report = 0;
    }

    /// Record one committed output frame and fire the callback if the batch
    /// threshold is reached.
    pub fn advance(&mut self, timestamp: Option<Duration>) {
        self.current += 1;
        self.items_since_last_report += 1;

        if self.items_since_last_report >= self.batch_size {
            self.report(timestamp);
            self.items_since_last_report = 0;
        }
    }

    /// Unconditionally emit a final progress report.
    pub fn finish(&mut self) {
        self.report(None);
    }

    fn report(&self, timestamp: Option<Duration>) {
        let elapsed = self.start_time.elapsed();

        let percentage = if self.total > 0 {
            (self.current as f32 / self.total as f32) * 100.0
        } else {
            0.0
        };

        let estimated_remaining = if self.current > 0 && self.total >= self.current {
            let per_item = elapsed / self.current as u32;
            Some(per_item * (self.total - self.current) as u32)
        } else {
            None
        };

        let info = ProgressInfo {
            method: self.method,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_timestamp: timestamp,
        };

        self.callback.on_progress(&info);
    }
}
