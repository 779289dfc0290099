//! Compressed-sample queue and backpressure.
//!
//! Demuxed samples arrive in bursts (one batch per parser request) while the
//! decoder consumes at its own rate. [`SampleFeed`] decouples the two: a FIFO
//! holds pending samples, and [`pump`](SampleFeed::pump) submits them to the
//! decoder only while its pending-decode count sits below the high-water
//! mark. At the ceiling, submission pauses and the decoder's output is
//! drained until the count falls back to the low-water mark — bounding the
//! decoder's internal buffers on fast-demux/slow-decode mismatches.
//!
//! Samples always reach the decoder in the exact order the parser produced
//! them. A decode failure aborts the pump immediately: compressed video uses
//! inter-frame prediction, so silently skipping a sample would corrupt every
//! frame that follows.

use std::collections::VecDeque;

use crate::decoder::{FrameDecoder, FrameSink};
use crate::error::FramesiftError;
use crate::mp4::CompressedSample;
use crate::settings::Tuning;

/// FIFO of compressed samples with watermark-based decoder backpressure.
pub struct SampleFeed {
    queue: VecDeque<CompressedSample>,
    low_water: usize,
    high_water: usize,
}

impl SampleFeed {
    /// Create a feed with the tuning's watermarks.
    pub fn new(tuning: &Tuning) -> Self {
        Self::with_watermarks(tuning.low_water, tuning.high_water)
    }

    /// Create a feed with explicit watermarks.
    pub fn with_watermarks(low_water: usize, high_water: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            low_water,
            high_water: high_water.max(low_water + 1),
        }
    }

    /// Append one sample to the back of the queue.
    pub fn push(&mut self, sample: CompressedSample) {
        self.queue.push_back(sample);
    }

    /// Append a demuxed batch to the back of the queue.
    pub fn extend(&mut self, batch: Vec<CompressedSample>) {
        self.queue.extend(batch);
    }

    /// Number of samples waiting for submission.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Submit queued samples to the decoder, honouring the watermarks.
    ///
    /// Returns once the queue is empty; decoded frames flow to `sink` from
    /// inside the decoder calls. A decoder that reports zero drainable
    /// frames while at the ceiling is allowed to keep receiving input — it
    /// needs more data before it can emit anything.
    ///
    /// # Errors
    ///
    /// Propagates the first decode or sink error; remaining queued samples
    /// are dropped (the attempt is over).
    pub fn pump(
        &mut self,
        decoder: &mut dyn FrameDecoder,
        sink: &mut dyn FrameSink,
    ) -> Result<(), FramesiftError> {
        while let Some(sample) = self.queue.pop_front() {
            if decoder.pending() >= self.high_water {
                log::trace!(
                    "decoder pending {} at high water; draining to {}",
                    decoder.pending(),
                    self.low_water
                );
                while decoder.pending() > self.low_water {
                    if decoder.drain_ready(sink)? == 0 {
                        break;
                    }
                }
            }

            if let Err(error) = decoder.decode(sample, sink) {
                self.queue.clear();
                return Err(error);
            }
        }
        Ok(())
    }
}
