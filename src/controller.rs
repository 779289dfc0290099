//! The extraction controller — the top-level state machine.
//!
//! [`ExtractionController`] owns one session: it analyzes an input file,
//! picks the extraction strategy, runs it with progress and cancellation
//! wired through, and silently restarts on the fallback path when the fast
//! path fails. The caller sees an error only when *both* paths have failed
//! (or the fallback itself did); cancellation is always surfaced as the
//! distinguished [`FramesiftError::Cancelled`] and never retried.
//!
//! The encoder worker pool lives on the controller, so workers persist
//! across extraction runs within one session and are torn down when the
//! controller is dropped.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framesift::{
//!     ExtractionController, ExtractionSettings, FramesiftError, ImageFormat, NoOpProgress,
//! };
//!
//! let mut controller = ExtractionController::new();
//! let info = controller.analyze("input.mp4")?;
//! println!("{}x{}, {:.1}s", info.width, info.height, info.duration);
//!
//! let settings = ExtractionSettings::new(2.0).with_format(ImageFormat::Jpeg);
//! let images = controller.extract(&settings, Arc::new(NoOpProgress))?;
//! for image in &images {
//!     std::fs::write(image.file_name(), &image.bytes)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::encoder::{EncoderPool, OutputImage};
use crate::error::FramesiftError;
use crate::extract::{Extractor, choose_method};
use crate::fallback::FallbackExtractor;
use crate::fast::FastExtractor;
use crate::metadata::VideoInfo;
use crate::progress::{CancellationToken, ExtractionMethod, ProgressCallback, ProgressTracker};
use crate::settings::{ExtractionSettings, Tuning};

/// Lifecycle states of one extraction session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    /// No file has been analyzed.
    Idle,
    /// Analysis is in progress.
    Analyzing,
    /// Metadata is available; an extraction can start.
    ReadyToExtract,
    /// An extraction run is in progress on the labelled path.
    Extracting(ExtractionMethod),
    /// The last run produced output.
    Completed,
    /// The last run was cancelled by the caller.
    Cancelled,
    /// The last run failed on every available path.
    Failed,
}

/// Orchestrates analysis, strategy selection, extraction, fallback retry,
/// progress, and cancellation for one session.
pub struct ExtractionController {
    state: ExtractionState,
    tuning: Tuning,
    path: Option<PathBuf>,
    info: Option<VideoInfo>,
    pool: Arc<Mutex<EncoderPool>>,
    cancel: CancellationToken,
}

impl ExtractionController {
    /// Create a controller with default [`Tuning`].
    pub fn new() -> Self {
        Self::with_tuning(Tuning::default())
    }

    /// Create a controller with explicit tuning.
    pub fn with_tuning(tuning: Tuning) -> Self {
        let pool = Arc::new(Mutex::new(EncoderPool::new(tuning.max_encoder_workers)));
        Self {
            state: ExtractionState::Idle,
            tuning,
            path: None,
            info: None,
            pool,
            cancel: CancellationToken::new(),
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ExtractionState {
        self.state
    }

    /// Metadata from the last successful [`analyze`](Self::analyze).
    pub fn video_info(&self) -> Option<&VideoInfo> {
        self.info.as_ref()
    }

    /// Analyze an input file, caching its metadata for later extraction.
    ///
    /// # Errors
    ///
    /// Returns [`FramesiftError::FileOpen`] when the file cannot be analyzed;
    /// the controller moves to `Failed`.
    pub fn analyze<P: AsRef<Path>>(&mut self, path: P) -> Result<VideoInfo, FramesiftError> {
        self.state = ExtractionState::Analyzing;

        match VideoInfo::analyze(&path) {
            Ok(info) => {
                log::debug!(
                    "analyzed {}: {}x{} @ {:.2} fps, {:.2}s, codec {:?}",
                    path.as_ref().display(),
                    info.width,
                    info.height,
                    info.frame_rate,
                    info.duration,
                    info.codec
                );
                self.path = Some(path.as_ref().to_path_buf());
                self.info = Some(info.clone());
                self.state = ExtractionState::ReadyToExtract;
                Ok(info)
            }
            Err(error) => {
                self.state = ExtractionState::Failed;
                Err(error)
            }
        }
    }

    /// Adopt metadata obtained elsewhere and move straight to
    /// `ReadyToExtract`.
    ///
    /// Useful when the caller already analyzed the input — e.g. through the
    /// container parser — and wants to drive
    /// [`extract_with`](Self::extract_with) with its own extractors.
    pub fn prepare(&mut self, info: VideoInfo) {
        self.info = Some(info);
        self.state = ExtractionState::ReadyToExtract;
    }

    /// Request cancellation of the run in progress.
    ///
    /// Best-effort and idempotent: repeated calls, or calls when nothing is
    /// running, do nothing. A running extraction observes the signal at its
    /// next suspension point and finishes with
    /// [`FramesiftError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run an extraction with the strategy picked by
    /// [`choose_method`](crate::choose_method), falling back automatically.
    ///
    /// # Errors
    ///
    /// Returns the terminal error only after every available path has
    /// failed, or [`FramesiftError::Cancelled`] on cancellation.
    pub fn extract(
        &mut self,
        settings: &ExtractionSettings,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<Vec<OutputImage>, FramesiftError> {
        let path = self.path.clone().ok_or_else(|| {
            FramesiftError::InvalidState("extract called before analyze".to_string())
        })?;
        let info = self.info.clone().ok_or_else(|| {
            FramesiftError::InvalidState("extract called before analyze".to_string())
        })?;

        let method = choose_method(&path, info.codec.as_deref());

        let (primary, fallback): (Box<dyn Extractor>, Option<Box<dyn Extractor>>) = match method
        {
            ExtractionMethod::Fast => {
                let fast = Box::new(FastExtractor::new(
                    &path,
                    self.tuning.clone(),
                    Arc::clone(&self.pool),
                ));
                // If the fallback cannot even open the file there is nothing
                // to retry on; the fast attempt still proceeds alone.
                let fallback = match FallbackExtractor::open(&path) {
                    Ok(extractor) => Some(Box::new(extractor) as Box<dyn Extractor>),
                    Err(error) => {
                        log::debug!("fallback extractor unavailable: {error}");
                        None
                    }
                };
                (fast, fallback)
            }
            ExtractionMethod::Fallback => {
                (Box::new(FallbackExtractor::open(&path)?), None)
            }
        };

        self.extract_with(primary, fallback, settings, progress)
    }

    /// Run an extraction with explicit extractors.
    ///
    /// This is the full orchestration path — state transitions, one silent
    /// retry through `fallback`, continuous progress across the transition —
    /// with strategy selection left to the caller. Custom pipelines and
    /// tests inject their own [`Extractor`] implementations here.
    ///
    /// # Errors
    ///
    /// As for [`extract`](Self::extract).
    pub fn extract_with(
        &mut self,
        mut primary: Box<dyn Extractor>,
        fallback: Option<Box<dyn Extractor>>,
        settings: &ExtractionSettings,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<Vec<OutputImage>, FramesiftError> {
        settings.validate()?;
        let info = self.info.clone().ok_or_else(|| {
            FramesiftError::InvalidState("extract called before analyze".to_string())
        })?;
        if matches!(
            self.state,
            ExtractionState::Idle | ExtractionState::Analyzing | ExtractionState::Extracting(_)
        ) {
            return Err(FramesiftError::InvalidState(format!(
                "cannot start an extraction from state {:?}",
                self.state
            )));
        }

        // Fresh token per run: a cancellation aimed at the previous run must
        // not kill this one.
        self.cancel = CancellationToken::new();
        let token = self.cancel.clone();

        let total = info.target_output_count(settings.fps);
        let mut tracker = ProgressTracker::new(progress, primary.method(), total, 1);

        self.state = ExtractionState::Extracting(primary.method());
        log::debug!("extracting on the {} path ({total} frames)", primary.method());

        match primary.produce(&info, settings, &mut tracker, &token) {
            Ok(images) => {
                tracker.finish();
                self.state = ExtractionState::Completed;
                Ok(images)
            }
            Err(FramesiftError::Cancelled) => {
                self.state = ExtractionState::Cancelled;
                Err(FramesiftError::Cancelled)
            }
            Err(error) => {
                let Some(mut fallback) = fallback else {
                    self.state = ExtractionState::Failed;
                    return Err(error);
                };

                log::warn!(
                    "{} extraction failed ({error}); restarting from index 0 on the {} path",
                    primary.method(),
                    fallback.method()
                );
                self.state = ExtractionState::Extracting(fallback.method());
                tracker.restart(fallback.method());

                match fallback.produce(&info, settings, &mut tracker, &token) {
                    Ok(images) => {
                        tracker.finish();
                        self.state = ExtractionState::Completed;
                        Ok(images)
                    }
                    Err(FramesiftError::Cancelled) => {
                        self.state = ExtractionState::Cancelled;
                        Err(FramesiftError::Cancelled)
                    }
                    Err(fallback_error) => {
                        self.state = ExtractionState::Failed;
                        Err(fallback_error)
                    }
                }
            }
        }
    }
}

impl Default for ExtractionController {
    fn default() -> Self {
        Self::new()
    }
}
