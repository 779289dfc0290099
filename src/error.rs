//! Error types for the `framesift` crate.
//!
//! This module defines [`FramesiftError`], the unified error type returned by
//! all fallible operations in the crate. Variants follow the failure taxonomy
//! of the extraction pipeline: which stage failed, and whether the failure is
//! fatal to the current attempt, fatal to the run, or merely to one output
//! image.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `framesift` operations.
///
/// Every public method that can fail returns `Result<T, FramesiftError>`.
/// The orchestrator treats `Configuration`, `Decode`, and `Parse` as fatal to
/// the fast attempt only (they trigger a fallback restart); `Cancelled` is a
/// distinguished outcome, never retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FramesiftError {
    /// The media file could not be opened.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed in.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The required decoding primitives are unavailable on this platform.
    #[error("Platform does not support fast-path decoding: {0}")]
    UnsupportedPlatform(String),

    /// The decoder could not be configured for this codec, or mandatory
    /// out-of-band configuration data is missing or unparseable.
    #[error("Decoder configuration error: {0}")]
    Configuration(String),

    /// A compressed sample failed to decode. Always fatal to the attempt —
    /// skipping a sample would corrupt every later inter-predicted frame.
    #[error("Failed to decode video sample: {0}")]
    Decode(String),

    /// The container bytes are not a valid structure of the expected family.
    #[error("Container parse error: {0}")]
    Parse(String),

    /// A single frame failed to rasterize or compress. Never surfaced as a
    /// run failure; the affected sequence index is absent from the output.
    #[error("Failed to encode output image {index}: {reason}")]
    EncodeUnit {
        /// 1-based sequence index of the failed unit.
        index: usize,
        /// Underlying reason the encode failed.
        reason: String,
    },

    /// Encoder workers are crashing repeatedly. Fatal to the run.
    #[error("Encoder worker failure: {0}")]
    WorkerCrash(String),

    /// The extraction settings are out of range.
    #[error("Invalid extraction settings: {0}")]
    InvalidSettings(String),

    /// The operation was cancelled via a
    /// [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// The controller was asked to do something its current state forbids.
    #[error("Invalid controller state: {0}")]
    InvalidState(String),

    /// An I/O error occurred while reading the input file.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate during rasterization or compression.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

impl From<FfmpegError> for FramesiftError {
    fn from(error: FfmpegError) -> Self {
        FramesiftError::Decode(error.to_string())
    }
}
