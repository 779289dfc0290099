//! Extraction settings and pipeline tuning.
//!
//! [`ExtractionSettings`] carries the user-chosen knobs for one extraction
//! run: sample rate, output resolution, image format, and quality.
//! [`Tuning`] carries the pipeline's operational constants — sampler
//! tolerance, backpressure watermarks, demux batch size — which are
//! deliberately configuration rather than hard-coded values.
//!
//! # Example
//!
//! ```
//! use framesift::{ExtractionSettings, ImageFormat};
//!
//! let settings = ExtractionSettings::new(2.0)
//!     .with_resolution_percent(50)
//!     .with_format(ImageFormat::Jpeg)
//!     .with_quality(0.85);
//! assert!(settings.validate().is_ok());
//! ```

use crate::error::FramesiftError;
use crate::metadata::VideoInfo;

/// Output image format for extracted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    /// Lossless PNG. Quality is ignored. This is the default.
    #[default]
    Png,
    /// Lossy JPEG. Quality 0.0–1.0 maps onto the encoder's 1–100 scale.
    Jpeg,
    /// WebP (encoded losslessly; quality is ignored).
    WebP,
}

impl ImageFormat {
    /// File extension for this format, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::WebP => "webp",
        }
    }

    /// Whether this format ignores the quality setting.
    pub fn is_lossless(&self) -> bool {
        !matches!(self, ImageFormat::Jpeg)
    }
}

/// User-chosen configuration for one extraction run.
///
/// Immutable for the duration of the run. Validate with
/// [`validate`](ExtractionSettings::validate) before starting.
#[derive(Debug, Clone)]
#[must_use]
pub struct ExtractionSettings {
    /// Target sampling rate in frames per second. Fractional rates are
    /// allowed (e.g. `0.5` keeps one frame every two seconds).
    pub fps: f64,
    /// Output resolution as a percentage of the source dimensions (1–100).
    pub resolution_percent: u32,
    /// Image quality, 0.0–1.0. Ignored for lossless formats.
    pub quality: f32,
    /// Output image format.
    pub format: ImageFormat,
}

impl ExtractionSettings {
    /// Create settings with the given sample rate and defaults for the rest:
    /// 100% resolution, PNG, quality 0.85.
    pub fn new(fps: f64) -> Self {
        Self {
            fps,
            resolution_percent: 100,
            quality: 0.85,
            format: ImageFormat::Png,
        }
    }

    /// Set the output resolution as a percentage of source dimensions.
    pub fn with_resolution_percent(mut self, percent: u32) -> Self {
        self.resolution_percent = percent;
        self
    }

    /// Set the image quality (0.0–1.0, lossy formats only).
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    /// Set the output image format.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    /// Check all fields are within range.
    ///
    /// # Errors
    ///
    /// Returns [`FramesiftError::InvalidSettings`] naming the offending
    /// field.
    pub fn validate(&self) -> Result<(), FramesiftError> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(FramesiftError::InvalidSettings(format!(
                "fps must be a positive finite number, got {}",
                self.fps
            )));
        }
        if self.resolution_percent == 0 || self.resolution_percent > 100 {
            return Err(FramesiftError::InvalidSettings(format!(
                "resolution_percent must be in 1..=100, got {}",
                self.resolution_percent
            )));
        }
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(FramesiftError::InvalidSettings(format!(
                "quality must be in 0.0..=1.0, got {}",
                self.quality
            )));
        }
        Ok(())
    }

    /// Resolve the output dimensions for a given source.
    ///
    /// Scales both source dimensions by `resolution_percent`, rounding to the
    /// nearest pixel and clamping to a 1×1 minimum.
    pub fn output_dimensions(&self, info: &VideoInfo) -> (u32, u32) {
        let scale = self.resolution_percent as f64 / 100.0;
        let width = ((info.width as f64 * scale).round() as u32).max(1);
        let height = ((info.height as f64 * scale).round() as u32).max(1);
        (width, height)
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Operational constants of the extraction pipeline.
///
/// Observed real-world encodes vary in how much tolerance and buffering they
/// want, so none of these are baked in. The defaults are the shipped
/// representative values; tests and embedders may override any of them.
#[derive(Debug, Clone)]
#[must_use]
pub struct Tuning {
    /// Sampler tolerance factor `k` (see
    /// [`FixedRateSampler`](crate::FixedRateSampler)). Sensible range
    /// 0.85–0.95.
    pub sampler_tolerance: f64,
    /// Backpressure low-water mark: submission resumes once the decoder's
    /// pending count has drained to this value.
    pub low_water: usize,
    /// Backpressure high-water mark: submission pauses when the decoder's
    /// pending count reaches this value.
    pub high_water: usize,
    /// How many demuxed samples to request from the parser per batch.
    pub demux_batch_size: usize,
    /// Upper bound on encoder pool workers. The pool uses
    /// `min(available_parallelism, max_encoder_workers)`; zero forces the
    /// synchronous in-process path.
    pub max_encoder_workers: usize,
    /// Size of the byte chunks the fast path appends to the parser.
    pub read_chunk_size: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            sampler_tolerance: 0.9,
            low_water: 10,
            high_water: 15,
            demux_batch_size: 150,
            max_encoder_workers: 4,
            read_chunk_size: 1 << 20,
        }
    }
}

impl Tuning {
    /// Set the sampler tolerance factor.
    pub fn with_sampler_tolerance(mut self, tolerance: f64) -> Self {
        self.sampler_tolerance = tolerance;
        self
    }

    /// Set both backpressure watermarks.
    pub fn with_watermarks(mut self, low: usize, high: usize) -> Self {
        self.low_water = low;
        self.high_water = high;
        self
    }

    /// Set the demux batch size.
    pub fn with_demux_batch_size(mut self, batch: usize) -> Self {
        self.demux_batch_size = batch;
        self
    }

    /// Set the encoder worker cap.
    pub fn with_max_encoder_workers(mut self, workers: usize) -> Self {
        self.max_encoder_workers = workers;
        self
    }

    /// Check the tuning values are coherent.
    ///
    /// # Errors
    ///
    /// Returns [`FramesiftError::InvalidSettings`] if the tolerance is out of
    /// (0, 1] or the watermarks are inverted.
    pub fn validate(&self) -> Result<(), FramesiftError> {
        if !self.sampler_tolerance.is_finite()
            || self.sampler_tolerance <= 0.0
            || self.sampler_tolerance > 1.0
        {
            return Err(FramesiftError::InvalidSettings(format!(
                "sampler_tolerance must be in (0.0, 1.0], got {}",
                self.sampler_tolerance
            )));
        }
        if self.low_water >= self.high_water {
            return Err(FramesiftError::InvalidSettings(format!(
                "low_water ({}) must be below high_water ({})",
                self.low_water, self.high_water
            )));
        }
        if self.demux_batch_size == 0 {
            return Err(FramesiftError::InvalidSettings(
                "demux_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
