//! Per-file video metadata.
//!
//! [`VideoInfo`] is derived once per input file and stays immutable for the
//! session. The fast path derives it from the container parser's track
//! metadata; any other container goes through FFmpeg's demuxer via
//! [`VideoInfo::analyze`].

use std::path::Path;

use ffmpeg_next::{codec::context::Context as CodecContext, media::Type};

use crate::error::FramesiftError;
use crate::ffmpeg::ensure_initialized;
use crate::mp4::TrackInfo;

/// Metadata for the video stream of one input file.
///
/// # Example
///
/// ```no_run
/// use framesift::VideoInfo;
///
/// let info = VideoInfo::analyze("input.mp4").unwrap();
/// println!("{}x{} @ {:.2} fps, {:.1}s", info.width, info.height, info.frame_rate, info.duration);
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct VideoInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Duration in seconds.
    pub duration: f64,
    /// Total number of compressed samples (frames) in the stream.
    pub sample_count: u64,
    /// Source frame rate in samples per second.
    pub frame_rate: f64,
    /// Codec identifier, when known (e.g. `"h264"`, `"avc1.64001f"`).
    pub codec: Option<String>,
}

impl VideoInfo {
    /// Analyze a media file with FFmpeg's demuxer.
    ///
    /// Works for any container FFmpeg recognises — this is the analysis path
    /// shared by both extraction methods.
    ///
    /// # Errors
    ///
    /// Returns [`FramesiftError::FileOpen`] if the file cannot be opened or
    /// carries no video stream.
    pub fn analyze<P: AsRef<Path>>(path: P) -> Result<Self, FramesiftError> {
        let path = path.as_ref();
        ensure_initialized()?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| FramesiftError::FileOpen {
                path: path.to_path_buf(),
                reason: error.to_string(),
            })?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or_else(|| FramesiftError::FileOpen {
                path: path.to_path_buf(),
                reason: "no video stream found".to_string(),
            })?;

        let codec_parameters = stream.parameters();
        let decoder_context =
            CodecContext::from_parameters(codec_parameters).map_err(|error| {
                FramesiftError::FileOpen {
                    path: path.to_path_buf(),
                    reason: format!("failed to read video codec parameters: {error}"),
                }
            })?;
        let video_decoder =
            decoder_context
                .decoder()
                .video()
                .map_err(|error| FramesiftError::FileOpen {
                    path: path.to_path_buf(),
                    reason: format!("failed to create probing decoder: {error}"),
                })?;

        let duration_microseconds = input_context.duration();
        let duration = if duration_microseconds > 0 {
            duration_microseconds as f64 / 1_000_000.0
        } else {
            0.0
        };

        // Average frame rate, falling back to the nominal rate field.
        let frame_rate = {
            let average = stream.avg_frame_rate();
            if average.denominator() != 0 && average.numerator() != 0 {
                average.numerator() as f64 / average.denominator() as f64
            } else {
                let rate = stream.rate();
                if rate.denominator() != 0 {
                    rate.numerator() as f64 / rate.denominator() as f64
                } else {
                    0.0
                }
            }
        };

        let sample_count = if stream.frames() > 0 {
            stream.frames() as u64
        } else {
            (duration * frame_rate) as u64
        };

        let codec = video_decoder
            .codec()
            .map(|codec| codec.name().to_string());

        Ok(Self {
            width: video_decoder.width(),
            height: video_decoder.height(),
            duration,
            sample_count,
            frame_rate,
            codec,
        })
    }

    /// Build metadata from a parsed container track.
    ///
    /// The frame rate is derived from the track's own bookkeeping:
    /// `sample_count / (duration / timescale)`.
    pub fn from_track(track: &TrackInfo) -> Self {
        let duration = if track.timescale > 0 {
            track.duration as f64 / track.timescale as f64
        } else {
            0.0
        };
        let frame_rate = if duration > 0.0 {
            track.sample_count as f64 / duration
        } else {
            0.0
        };

        Self {
            width: track.width,
            height: track.height,
            duration,
            sample_count: track.sample_count as u64,
            frame_rate,
            codec: track.codec.clone(),
        }
    }

    /// The target output count for a requested sample rate:
    /// `floor(duration * fps)`.
    ///
    /// Actual output may fall short (decoder starvation, failed encode
    /// units) but never exceeds this by more than rounding tolerance.
    pub fn target_output_count(&self, fps: f64) -> u64 {
        (self.duration * fps).floor() as u64
    }
}
