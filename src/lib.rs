//! # framesift
//!
//! Sift still frames out of video files: decode a video, keep frames at a
//! user-chosen rate, and compress each kept frame to a still image at a
//! requested resolution and format.
//!
//! Two extraction paths share one output contract:
//!
//! - The **fast path** demuxes MP4-family containers itself
//!   ([`Mp4Parser`]), feeds compressed samples into a hardware-preferring
//!   decoder ([`FfmpegDecoder`]) under backpressure ([`SampleFeed`]),
//!   filters decoded frames at the target rate ([`FixedRateSampler`]), and
//!   compresses kept frames on a worker pool ([`EncoderPool`]).
//! - The **fallback path** ([`FallbackExtractor`]) seeks a playback surface
//!   to each target timestamp sequentially and captures what is visible.
//!   It works for any container FFmpeg can open and is the safety net the
//!   fast path lands on when anything goes wrong.
//!
//! [`ExtractionController`] is the entry point: it analyzes the input,
//! picks a path, reports progress, honours cancellation, and retries the
//! fallback silently so callers only ever see an error when both paths
//! failed.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framesift::{
//!     ExtractionController, ExtractionSettings, ImageFormat, NoOpProgress,
//! };
//!
//! let mut controller = ExtractionController::new();
//! controller.analyze("input.mp4").unwrap();
//!
//! // One frame per second, half resolution, JPEG at quality 0.8.
//! let settings = ExtractionSettings::new(1.0)
//!     .with_resolution_percent(50)
//!     .with_format(ImageFormat::Jpeg)
//!     .with_quality(0.8);
//!
//! let images = controller.extract(&settings, Arc::new(NoOpProgress)).unwrap();
//! for image in &images {
//!     std::fs::write(image.file_name(), &image.bytes).unwrap();
//! }
//! ```
//!
//! ## Cancellation and progress
//!
//! Extraction runs cooperatively observe an [`ExtractionController::cancel`]
//! call at every loop iteration and decoded-frame callback, unwinding with
//! the distinguished [`FramesiftError::Cancelled`]. Progress arrives through
//! a [`ProgressCallback`] as [`ProgressInfo`] snapshots carrying the active
//! method label, counts, percentage, and timing.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on the system; see the
//! `ffmpeg-next` crate's documentation for platform specifics.

pub mod codec;
pub mod controller;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod fast;
pub mod feed;
pub mod ffmpeg;
pub mod metadata;
pub mod mp4;
pub mod progress;
pub mod sampler;
pub mod settings;

pub use codec::{
    AvcConfigRecord, CodecFamily, extract_decoder_configuration, normalize_description,
    parse_avc_config,
};
pub use controller::{ExtractionController, ExtractionState};
pub use decoder::{
    DecodedFrame, DecoderConfiguration, FfmpegDecoder, FrameDecoder, FrameLedger, FrameSink,
    HardwareAcceleration, HardwareDevice, available_hardware_devices,
};
pub use encoder::{EncodeJob, EncoderPool, OutputImage, encode_pixels};
pub use error::FramesiftError;
pub use extract::{Extractor, choose_method, is_mp4_family};
pub use fallback::{FallbackExtractor, FfmpegPlayback, PlaybackSurface};
pub use fast::{DecoderFactory, FastExtractor};
pub use feed::SampleFeed;
pub use ffmpeg::{FfmpegLogLevel, ensure_initialized, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use metadata::VideoInfo;
pub use mp4::{CodecConfigBox, CompressedSample, ContainerInfo, Mp4Parser, TrackInfo, TrackKind};
pub use progress::{
    CancellationToken, ExtractionMethod, NoOpProgress, ProgressCallback, ProgressInfo,
    ProgressTracker,
};
pub use sampler::FixedRateSampler;
pub use settings::{ExtractionSettings, ImageFormat, Tuning};
