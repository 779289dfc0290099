//! The slow-but-universal extraction path.
//!
//! [`FallbackExtractor`] drives a [`PlaybackSurface`] the way a user would
//! scrub a player: seek to each target timestamp in turn, wait for the seek
//! to land, read the visible frame, compress it. It works for any container
//! FFmpeg can open and depends on nothing else — no container parser, no
//! worker pool — which is why it sits at the bottom of the failure ladder.
//! It is also strictly sequential, and one to two orders of magnitude slower
//! than the fast path on long or high-rate extractions.

use std::path::Path;
use std::time::Duration;

use ffmpeg_next::{
    Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};

use crate::decoder::packed_rgb_buffer;
use crate::encoder::{EncodeJob, OutputImage, encode_pixels};
use crate::error::FramesiftError;
use crate::extract::Extractor;
use crate::ffmpeg::ensure_initialized;
use crate::metadata::VideoInfo;
use crate::progress::{CancellationToken, ExtractionMethod, ProgressTracker};
use crate::settings::ExtractionSettings;

/// A seekable playback element, at its interface boundary.
///
/// `seek_to` must return only once the seek has completed — the frame read
/// by the next [`capture`](PlaybackSurface::capture) call is guaranteed to
/// match the target time. Timer-based approximations are not acceptable.
pub trait PlaybackSurface {
    /// Media duration in seconds.
    fn duration(&self) -> f64;

    /// Move the playback position to `seconds`. Returns when the seek has
    /// completed.
    fn seek_to(&mut self, seconds: f64) -> Result<(), FramesiftError>;

    /// Read the currently visible frame as packed RGB24 at the given output
    /// size.
    fn capture(&mut self, width: u32, height: u32) -> Result<Vec<u8>, FramesiftError>;
}

/// FFmpeg-backed [`PlaybackSurface`].
///
/// Seeks land on the nearest preceding keyframe, then decode forward until
/// the first frame at or past the target timestamp. The scaler is reused
/// across captures and rebuilt lazily only when the output dimensions
/// change.
pub struct FfmpegPlayback {
    input: Input,
    decoder: VideoDecoder,
    stream_index: usize,
    time_base: Rational,
    duration: f64,
    current: Option<VideoFrame>,
    scaler: Option<ScalingContext>,
    scaler_key: (Pixel, u32, u32, u32, u32),
}

impl FfmpegPlayback {
    /// Open a media file for seek-based extraction.
    ///
    /// # Errors
    ///
    /// Returns [`FramesiftError::FileOpen`] if the file cannot be opened or
    /// has no decodable video stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FramesiftError> {
        let path = path.as_ref();
        ensure_initialized()?;

        let input = ffmpeg_next::format::input(&path).map_err(|error| {
            FramesiftError::FileOpen {
                path: path.to_path_buf(),
                reason: error.to_string(),
            }
        })?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| FramesiftError::FileOpen {
                path: path.to_path_buf(),
                reason: "no video stream found".to_string(),
            })?;
        let stream_index = stream.index();
        let time_base = stream.time_base();

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| FramesiftError::FileOpen {
                path: path.to_path_buf(),
                reason: format!("failed to create video decoder: {error}"),
            })?;

        let duration_microseconds = input.duration();
        let duration = if duration_microseconds > 0 {
            duration_microseconds as f64 / 1_000_000.0
        } else {
            0.0
        };

        Ok(Self {
            input,
            decoder,
            stream_index,
            time_base,
            duration,
            current: None,
            scaler: None,
            scaler_key: (Pixel::None, 0, 0, 0, 0),
        })
    }
}

impl PlaybackSurface for FfmpegPlayback {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn seek_to(&mut self, seconds: f64) -> Result<(), FramesiftError> {
        let target = seconds_to_stream_timestamp(seconds, self.time_base);

        self.input.seek(target, ..target).map_err(|error| {
            FramesiftError::Decode(format!("seek to {seconds:.3}s failed: {error}"))
        })?;
        self.decoder.flush();
        self.current = None;

        // Decode forward from the keyframe the seek landed on until the
        // first frame at or past the target.
        let input = &mut self.input;
        let decoder = &mut self.decoder;
        let mut frame = VideoFrame::empty();

        for (stream, packet) in input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            decoder.send_packet(&packet).map_err(|error| {
                FramesiftError::Decode(format!("decode during seek failed: {error}"))
            })?;

            while decoder.receive_frame(&mut frame).is_ok() {
                if frame.pts().unwrap_or(0) >= target {
                    self.current = Some(std::mem::replace(&mut frame, VideoFrame::empty()));
                    return Ok(());
                }
            }
        }

        // End of stream: drain whatever the decoder still holds and keep the
        // last frame — the closest the file has to the target.
        decoder.send_eof().ok();
        while decoder.receive_frame(&mut frame).is_ok() {
            self.current = Some(std::mem::replace(&mut frame, VideoFrame::empty()));
            if self.current.as_ref().and_then(|f| f.pts()).unwrap_or(0) >= target {
                return Ok(());
            }
        }

        if self.current.is_some() {
            Ok(())
        } else {
            Err(FramesiftError::Decode(format!(
                "no frame could be presented at {seconds:.3}s"
            )))
        }
    }

    fn capture(&mut self, width: u32, height: u32) -> Result<Vec<u8>, FramesiftError> {
        let frame = self.current.as_ref().ok_or_else(|| {
            FramesiftError::Decode("capture called before a completed seek".to_string())
        })?;

        let key = (frame.format(), frame.width(), frame.height(), width, height);
        if self.scaler.is_none() || self.scaler_key != key {
            self.scaler = Some(
                ScalingContext::get(
                    frame.format(),
                    frame.width(),
                    frame.height(),
                    Pixel::RGB24,
                    width,
                    height,
                    ScalingFlags::BILINEAR,
                )
                .map_err(|error| {
                    FramesiftError::Decode(format!("failed to create scaler: {error}"))
                })?,
            );
            self.scaler_key = key;
        }

        let mut rgb_frame = VideoFrame::empty();
        self.scaler
            .as_mut()
            .unwrap()
            .run(frame, &mut rgb_frame)
            .map_err(|error| FramesiftError::Decode(format!("rasterization failed: {error}")))?;

        Ok(packed_rgb_buffer(&rgb_frame, width, height))
    }
}

/// Convert a position in seconds to a timestamp in the stream's time base.
fn seconds_to_stream_timestamp(seconds: f64, time_base: Rational) -> i64 {
    let numerator = time_base.numerator() as f64;
    let denominator = time_base.denominator() as f64;
    if numerator == 0.0 {
        return 0;
    }
    (seconds * denominator / numerator) as i64
}

/// Sequential seek-and-capture extractor. Universal, slow, dependable.
pub struct FallbackExtractor {
    surface: Box<dyn PlaybackSurface>,
}

impl FallbackExtractor {
    /// Build an extractor over any playback surface.
    pub fn new(surface: Box<dyn PlaybackSurface>) -> Self {
        Self { surface }
    }

    /// Build an extractor over an FFmpeg playback surface for `path`.
    ///
    /// # Errors
    ///
    /// Propagates [`FfmpegPlayback::open`] errors.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FramesiftError> {
        Ok(Self::new(Box::new(FfmpegPlayback::open(path)?)))
    }
}

impl Extractor for FallbackExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Fallback
    }

    fn produce(
        &mut self,
        info: &VideoInfo,
        settings: &ExtractionSettings,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<Vec<OutputImage>, FramesiftError> {
        settings.validate()?;

        let total = info.target_output_count(settings.fps);
        let (width, height) = settings.output_dimensions(info);
        let mut images = Vec::with_capacity(total as usize);

        log::debug!(
            "fallback extraction: {total} frames at {:.3} fps, {width}x{height}",
            settings.fps
        );

        for index in 0..total {
            if cancel.is_cancelled() {
                return Err(FramesiftError::Cancelled);
            }

            let seconds = index as f64 / settings.fps;
            self.surface.seek_to(seconds)?;

            // Rasterize + compress. A single failed unit is dropped, not
            // fatal; its sequence index is simply absent from the output.
            let sequence_index = (index + 1) as usize;
            let unit = self
                .surface
                .capture(width, height)
                .and_then(|pixels| {
                    encode_pixels(EncodeJob {
                        index: sequence_index,
                        pixels,
                        source_width: width,
                        source_height: height,
                        target_width: width,
                        target_height: height,
                        format: settings.format,
                        quality: settings.quality,
                    })
                });
            match unit {
                Ok(image) => images.push(image),
                Err(error) => {
                    log::warn!("frame {sequence_index} was dropped: {error}");
                }
            }

            tracker.advance(Some(Duration::from_secs_f64(seconds)));
        }

        Ok(images)
    }
}
