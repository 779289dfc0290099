//! The shared contract of both extraction paths, and the policy that picks
//! between them.
//!
//! The fast and fallback paths differ in everything but their output: an
//! ordered collection of compressed still images for a given file, settings,
//! progress feed, and cancellation signal. [`Extractor`] captures that
//! contract so the controller treats the two symmetrically, and
//! [`choose_method`] is the single strategy function deciding which one to
//! attempt first.

use std::path::Path;

use crate::codec::CodecFamily;
use crate::decoder::FfmpegDecoder;
use crate::encoder::OutputImage;
use crate::error::FramesiftError;
use crate::metadata::VideoInfo;
use crate::progress::{CancellationToken, ExtractionMethod, ProgressTracker};
use crate::settings::ExtractionSettings;

/// File extensions treated as the ISO base-media family.
///
/// An extension match is a routing heuristic, not a compatibility guarantee;
/// a file that lies about its extension fails the fast attempt and lands on
/// the fallback anyway.
const MP4_FAMILY_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "qt"];

/// One extraction strategy: produce ordered output images for a run.
pub trait Extractor {
    /// The method label this extractor reports through progress snapshots.
    fn method(&self) -> ExtractionMethod;

    /// Run the extraction to completion, cancellation, or failure.
    ///
    /// Implementations must check `cancel` at every loop iteration or frame
    /// callback and return [`FramesiftError::Cancelled`] — never a partial
    /// result — when it fires.
    fn produce(
        &mut self,
        info: &VideoInfo,
        settings: &ExtractionSettings,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<Vec<OutputImage>, FramesiftError>;
}

/// Decide which extraction method to attempt first for a file.
///
/// The fast path is chosen only when the container looks like the ISO
/// base-media family *and* the platform can decode the codec; everything
/// else goes straight to the fallback.
pub fn choose_method<P: AsRef<Path>>(path: P, codec: Option<&str>) -> ExtractionMethod {
    if !is_mp4_family(&path) {
        log::debug!("container is not MP4-family; using the fallback extractor");
        return ExtractionMethod::Fallback;
    }

    let family = match codec {
        Some(identifier) => CodecFamily::classify(identifier),
        None => CodecFamily::Unsupported,
    };
    if family == CodecFamily::Unsupported {
        log::debug!("codec {codec:?} is not fast-path decodable; using the fallback extractor");
        return ExtractionMethod::Fallback;
    }

    if !FfmpegDecoder::supports(family) {
        log::debug!("no decoder available for {family:?}; using the fallback extractor");
        return ExtractionMethod::Fallback;
    }

    ExtractionMethod::Fast
}

/// Whether the file extension marks an ISO base-media container.
pub fn is_mp4_family<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| {
            let extension = extension.to_ascii_lowercase();
            MP4_FAMILY_EXTENSIONS.contains(&extension.as_str())
        })
        .unwrap_or(false)
}
