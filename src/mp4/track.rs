//! Track metadata and sample-table resolution.
//!
//! MP4 sample tables describe sample placement indirectly: sizes per sample,
//! offsets per chunk, a run-length mapping from samples to chunks, and
//! run-length timing deltas. [`SampleTable::flatten`] resolves the indirection
//! once into a flat per-sample vector the demuxer can index directly.

use crate::error::FramesiftError;

/// Classification of a container track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// A video track.
    Video,
    /// An audio track.
    Audio,
    /// Any other handler type (timed text, hint, ...).
    Other,
}

/// Raw codec-specific configuration extracted from the sample description.
///
/// The payload is the configuration box content without its 8-byte header —
/// for AVC this is the AVCDecoderConfigurationRecord.
#[derive(Debug, Clone)]
pub struct CodecConfigBox {
    /// Configuration box type (`"avcC"`, `"hvcC"`, `"vpcC"`, `"av1C"`).
    pub kind: String,
    /// Box payload bytes.
    pub payload: Vec<u8>,
}

/// Metadata for one container track, available once the parser is ready.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    /// Track identifier from the track header.
    pub id: u32,
    /// Handler classification.
    pub kind: TrackKind,
    /// Media timescale (units per second).
    pub timescale: u32,
    /// Media duration in timescale units.
    pub duration: u64,
    /// Number of samples in the track.
    pub sample_count: u32,
    /// Pixel width (video tracks).
    pub width: u32,
    /// Pixel height (video tracks).
    pub height: u32,
    /// Sample-entry codec identifier (e.g. `"avc1"`, `"vp09"`).
    pub codec: Option<String>,
    /// Out-of-band codec configuration, when the sample entry carries one.
    pub codec_config: Option<CodecConfigBox>,
    pub(crate) table: SampleTable,
}

/// Raw sample-table boxes for one track.
#[derive(Debug, Clone, Default)]
pub(crate) struct SampleTable {
    /// One size per sample (`stsz`, expanded).
    pub sizes: Vec<u32>,
    /// Absolute file offset of each chunk (`stco`/`co64`).
    pub chunk_offsets: Vec<u64>,
    /// `(first_chunk, samples_per_chunk)` runs (`stsc`), 1-based chunks.
    pub sample_to_chunk: Vec<(u32, u32)>,
    /// `(sample_count, sample_delta)` runs (`stts`).
    pub time_to_sample: Vec<(u32, u32)>,
    /// 1-based sample numbers that are sync samples (`stss`).
    pub sync_samples: Vec<u32>,
    /// Whether an `stss` box was present. Absent means every sample is sync.
    pub has_sync_table: bool,
    /// `(sample_count, composition_offset)` runs (`ctts`).
    pub composition_offsets: Vec<(u32, i32)>,
}

/// Fully-resolved placement and timing of one sample.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SampleMeta {
    /// Absolute file offset of the payload.
    pub offset: u64,
    /// Payload size in bytes.
    pub size: u32,
    /// Decode timestamp in timescale units.
    pub dts: u64,
    /// Presentation timestamp in timescale units.
    pub pts: i64,
    /// Sample duration in timescale units.
    pub duration: u32,
    /// Whether this is a random-access sample.
    pub is_sync: bool,
}

impl SampleTable {
    /// Resolve the table into one [`SampleMeta`] per sample, in decode order.
    ///
    /// # Errors
    ///
    /// Returns [`FramesiftError::Parse`] when the boxes disagree about the
    /// sample count or the chunk mapping runs out of chunks.
    pub(crate) fn flatten(&self) -> Result<Vec<SampleMeta>, FramesiftError> {
        let sample_count = self.sizes.len();
        let mut samples = Vec::with_capacity(sample_count);

        if sample_count == 0 {
            return Ok(samples);
        }
        if self.sample_to_chunk.is_empty() || self.chunk_offsets.is_empty() {
            return Err(FramesiftError::Parse(
                "sample table is missing chunk mapping boxes".to_string(),
            ));
        }

        // Offsets: walk chunks, expanding each stsc run across the chunks it
        // covers, accumulating per-sample offsets within each chunk.
        let mut assigned = 0usize;
        'runs: for (run_index, &(first_chunk, samples_per_chunk)) in
            self.sample_to_chunk.iter().enumerate()
        {
            if first_chunk == 0 {
                return Err(FramesiftError::Parse(
                    "sample-to-chunk run references chunk 0".to_string(),
                ));
            }
            let run_start = (first_chunk - 1) as usize;
            let run_end = self
                .sample_to_chunk
                .get(run_index + 1)
                .map(|&(next_first, _)| (next_first - 1) as usize)
                .unwrap_or(self.chunk_offsets.len());

            for chunk in run_start..run_end.min(self.chunk_offsets.len()) {
                let mut offset = self.chunk_offsets[chunk];
                for _ in 0..samples_per_chunk {
                    if assigned == sample_count {
                        break 'runs;
                    }
                    let size = self.sizes[assigned];
                    samples.push(SampleMeta {
                        offset,
                        size,
                        dts: 0,
                        pts: 0,
                        duration: 0,
                        is_sync: false,
                    });
                    offset += size as u64;
                    assigned += 1;
                }
            }
        }

        if assigned != sample_count {
            return Err(FramesiftError::Parse(format!(
                "chunk mapping places {assigned} samples but the size table has {sample_count}"
            )));
        }

        // Decode timestamps and durations from the stts runs.
        let mut index = 0usize;
        let mut dts = 0u64;
        for &(count, delta) in &self.time_to_sample {
            for _ in 0..count {
                if index == sample_count {
                    break;
                }
                samples[index].dts = dts;
                samples[index].duration = delta;
                dts += delta as u64;
                index += 1;
            }
        }
        if index != sample_count {
            return Err(FramesiftError::Parse(format!(
                "timing table covers {index} samples but the size table has {sample_count}"
            )));
        }

        // Presentation timestamps: dts plus the ctts composition offset.
        let mut index = 0usize;
        for &(count, offset) in &self.composition_offsets {
            for _ in 0..count {
                if index == sample_count {
                    break;
                }
                samples[index].pts = samples[index].dts as i64 + offset as i64;
                index += 1;
            }
        }
        for sample in samples.iter_mut().skip(index) {
            sample.pts = sample.dts as i64;
        }

        // Sync flags: every sample is sync unless an stss box says otherwise.
        if self.has_sync_table {
            for &number in &self.sync_samples {
                if number >= 1 {
                    if let Some(sample) = samples.get_mut((number - 1) as usize) {
                        sample.is_sync = true;
                    }
                }
            }
        } else {
            for sample in &mut samples {
                sample.is_sync = true;
            }
        }

        Ok(samples)
    }
}
