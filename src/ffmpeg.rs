//! FFmpeg library lifecycle and log-level configuration.
//!
//! FFmpeg must be initialised once per process before any demuxing or
//! decoding. [`ensure_initialized`] wraps that one-time load behind an
//! explicit readiness gate: the first caller performs the initialisation,
//! every later caller observes the recorded outcome. Components never touch
//! `ffmpeg_next::init` directly.
//!
//! FFmpeg also has its own internal logging system, separate from the Rust
//! [`log`](https://crates.io/crates/log) crate. By default it prints warnings
//! and errors to stderr, which can be noisy in library usage.
//! [`set_ffmpeg_log_level`] tunes that output without requiring users to
//! import `ffmpeg-next` directly.
//!
//! # Example
//!
//! ```no_run
//! use framesift::FfmpegLogLevel;
//!
//! // Silence all FFmpeg output except fatal errors.
//! framesift::set_ffmpeg_log_level(FfmpegLogLevel::Fatal);
//! ```

use std::sync::OnceLock;

use ffmpeg_next::util::log::Level;

use crate::error::FramesiftError;

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialise the FFmpeg libraries, exactly once per process.
///
/// Safe to call from any component at any time; only the first call does
/// work. Returns [`FramesiftError::UnsupportedPlatform`] if the libraries
/// could not be loaded — the orchestrator routes that straight to the
/// fallback-selection logic.
pub fn ensure_initialized() -> Result<(), FramesiftError> {
    let outcome = INIT.get_or_init(|| ffmpeg_next::init().map_err(|error| error.to_string()));

    outcome
        .as_ref()
        .map(|_| ())
        .map_err(|reason| FramesiftError::UnsupportedPlatform(reason.clone()))
}

/// FFmpeg internal log verbosity level.
///
/// Maps directly to FFmpeg's `AV_LOG_*` constants. Setting a level causes
/// FFmpeg to suppress all messages below that severity.
///
/// # Ordering (most verbose → most quiet)
///
/// `Trace` > `Debug` > `Verbose` > `Info` > `Warning` > `Error` > `Fatal` > `Panic` > `Quiet`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only log when the process is about to abort.
    Panic,
    /// Only log unrecoverable errors.
    Fatal,
    /// Log recoverable errors.
    Error,
    /// Log warnings (default FFmpeg level).
    Warning,
    /// Log informational messages.
    Info,
    /// Log verbose informational messages.
    Verbose,
    /// Log debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }

    fn from_ffmpeg_level(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic => FfmpegLogLevel::Panic,
            Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info => FfmpegLogLevel::Info,
            Level::Verbose => FfmpegLogLevel::Verbose,
            Level::Debug => FfmpegLogLevel::Debug,
            Level::Trace => FfmpegLogLevel::Trace,
        }
    }
}

/// Set the FFmpeg internal log verbosity level.
///
/// This controls what FFmpeg prints to stderr. It does **not** affect
/// Rust-side `log` crate output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Get the current FFmpeg internal log verbosity level.
///
/// Returns `None` if the current level does not map to a known variant
/// (should not happen in practice).
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from_ffmpeg_level)
}
