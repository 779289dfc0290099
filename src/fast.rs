//! The fast extraction path.
//!
//! Wires the whole pipeline together: file bytes are appended to the
//! [`Mp4Parser`] in chunks, demuxed samples flow through the backpressured
//! [`SampleFeed`] into a fresh [`FrameDecoder`], decoded frames are filtered
//! by the [`FixedRateSampler`], and kept frames are dispatched to the
//! [`EncoderPool`]. Output images are reassembled by sequence index once the
//! decoder has been flushed.
//!
//! Any error out of this path — configuration, parse, decode — is fatal to
//! the attempt; the controller restarts from index 0 on the fallback path.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::codec::extract_decoder_configuration;
use crate::decoder::{DecodedFrame, FfmpegDecoder, FrameDecoder, FrameSink};
use crate::encoder::{EncodeJob, EncoderPool, OutputImage};
use crate::error::FramesiftError;
use crate::extract::Extractor;
use crate::feed::SampleFeed;
use crate::metadata::VideoInfo;
use crate::mp4::Mp4Parser;
use crate::progress::{CancellationToken, ExtractionMethod, ProgressTracker};
use crate::sampler::FixedRateSampler;
use crate::settings::{ExtractionSettings, Tuning};

/// Builds a fresh decoder for each extraction attempt.
///
/// Decoders are never reused across attempts, even retried ones — state
/// after an error is not reliably resumable.
pub type DecoderFactory = Box<dyn Fn() -> Box<dyn FrameDecoder>>;

/// Demux-decode-sample-encode extractor for MP4-family containers.
pub struct FastExtractor {
    path: PathBuf,
    tuning: Tuning,
    pool: Arc<Mutex<EncoderPool>>,
    decoder_factory: DecoderFactory,
}

impl FastExtractor {
    /// Create an extractor decoding through [`FfmpegDecoder`].
    pub fn new<P: AsRef<Path>>(path: P, tuning: Tuning, pool: Arc<Mutex<EncoderPool>>) -> Self {
        Self::with_decoder_factory(
            path,
            tuning,
            pool,
            Box::new(|| Box::new(FfmpegDecoder::new())),
        )
    }

    /// Create an extractor with a custom decoder factory.
    pub fn with_decoder_factory<P: AsRef<Path>>(
        path: P,
        tuning: Tuning,
        pool: Arc<Mutex<EncoderPool>>,
        decoder_factory: DecoderFactory,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            tuning,
            pool,
            decoder_factory,
        }
    }

    fn run(
        &mut self,
        decoder: &mut dyn FrameDecoder,
        info: &VideoInfo,
        settings: &ExtractionSettings,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<Vec<OutputImage>, FramesiftError> {
        let mut file = File::open(&self.path).map_err(|error| FramesiftError::FileOpen {
            path: self.path.clone(),
            reason: error.to_string(),
        })?;
        let mut parser = Mp4Parser::new();
        let mut offset = 0u64;
        let mut chunk = vec![0u8; self.tuning.read_chunk_size.max(4096)];

        // Append chunks until track metadata is available.
        while parser.info().is_none() {
            if cancel.is_cancelled() {
                return Err(FramesiftError::Cancelled);
            }
            let read = file.read(&mut chunk)?;
            if read == 0 {
                return Err(FramesiftError::Parse(
                    "end of file before container metadata".to_string(),
                ));
            }
            parser.append(&chunk[..read], offset)?;
            offset += read as u64;
        }

        let track = parser
            .info()
            .and_then(|info| info.video_track())
            .ok_or_else(|| {
                FramesiftError::Parse("container carries no video track".to_string())
            })?
            .clone();

        // Configuration must succeed before a single sample is demuxed; a
        // missing parameter set fails here, not ten frames into the stream.
        let configuration = extract_decoder_configuration(&track)?;
        log::debug!(
            "fast extraction: codec {}, {}x{}, {} samples",
            configuration.codec,
            track.width,
            track.height,
            track.sample_count
        );
        decoder.configure(&configuration)?;

        parser.start_extraction(track.id, self.tuning.demux_batch_size)?;

        let (target_width, target_height) = settings.output_dimensions(info);
        let mut sink = PipelineSink {
            sampler: FixedRateSampler::new(settings.fps, self.tuning.sampler_tolerance),
            pool: &self.pool,
            cancel,
            tracker,
            target_width,
            target_height,
            settings: settings.clone(),
            next_index: 1,
            target_count: info.target_output_count(settings.fps),
        };
        let mut feed = SampleFeed::new(&self.tuning);

        loop {
            if cancel.is_cancelled() {
                return Err(FramesiftError::Cancelled);
            }

            match parser.next_batch()? {
                None => break,
                Some(batch) if batch.is_empty() => {
                    // The next sample's payload has not been appended yet.
                    let read = file.read(&mut chunk)?;
                    if read == 0 {
                        return Err(FramesiftError::Parse(
                            "file ended before all samples were available".to_string(),
                        ));
                    }
                    parser.append(&chunk[..read], offset)?;
                    offset += read as u64;
                }
                Some(batch) => {
                    feed.extend(batch);
                    feed.pump(decoder, &mut sink)?;
                }
            }
        }

        // Results are final only after the decoder has drained completely.
        decoder.flush(&mut sink)?;
        parser.stop();

        let images = self.pool.lock().unwrap().drain()?;

        let ledger = decoder.ledger();
        if !ledger.balanced() {
            log::warn!(
                "decoded-frame release imbalance: {} obtained, {} released",
                ledger.obtained(),
                ledger.released()
            );
        }

        Ok(images)
    }
}

impl Extractor for FastExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Fast
    }

    fn produce(
        &mut self,
        info: &VideoInfo,
        settings: &ExtractionSettings,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<Vec<OutputImage>, FramesiftError> {
        settings.validate()?;
        self.tuning.validate()?;

        let mut decoder = (self.decoder_factory)();
        let outcome = self.run(decoder.as_mut(), info, settings, tracker, cancel);
        decoder.close();

        if outcome.is_err() {
            // Let in-flight encode units finish, then discard them — a
            // failed attempt contributes no output, and the pool must be
            // clean for whoever runs next.
            if let Ok(mut pool) = self.pool.lock() {
                let _ = pool.drain();
            }
        }

        outcome
    }
}

/// Receives decoded frames, samples them, and dispatches kept frames to the
/// encoder pool.
struct PipelineSink<'a> {
    sampler: FixedRateSampler,
    pool: &'a Mutex<EncoderPool>,
    cancel: &'a CancellationToken,
    tracker: &'a mut ProgressTracker,
    target_width: u32,
    target_height: u32,
    settings: ExtractionSettings,
    next_index: usize,
    target_count: u64,
}

impl FrameSink for PipelineSink<'_> {
    fn on_frame(&mut self, frame: DecodedFrame) -> Result<(), FramesiftError> {
        if self.cancel.is_cancelled() {
            frame.release();
            return Err(FramesiftError::Cancelled);
        }

        // Count bound: never emit more than the target number of images.
        if self.next_index as u64 > self.target_count {
            frame.release();
            return Ok(());
        }

        let pts = frame.pts_micros();
        if !self.sampler.offer(pts) {
            frame.release();
            return Ok(());
        }

        let source_width = frame.width();
        let source_height = frame.height();
        let pixels = frame.take_pixels();

        self.pool.lock().unwrap().submit(EncodeJob {
            index: self.next_index,
            pixels,
            source_width,
            source_height,
            target_width: self.target_width,
            target_height: self.target_height,
            format: self.settings.format,
            quality: self.settings.quality,
        });

        self.next_index += 1;
        self.tracker
            .advance(Some(Duration::from_micros(pts.max(0) as u64)));
        Ok(())
    }
}
