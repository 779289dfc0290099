//! Incremental ISO base-media (MP4/MOV/M4V) container parsing and demuxing.
//!
//! [`Mp4Parser`] consumes byte ranges appended in file order — it never seeks
//! and never needs the whole file in memory at once. Appended bytes are held
//! in a segment store; once track metadata is available
//! ([`Mp4Parser::info`] returns `Some`) and extraction has been requested for
//! a track, [`Mp4Parser::next_batch`] demuxes compressed samples in decode
//! order and releases store bytes as they are consumed.
//!
//! # Example
//!
//! ```no_run
//! use framesift::mp4::Mp4Parser;
//!
//! let bytes = std::fs::read("input.mp4").unwrap();
//! let mut parser = Mp4Parser::new();
//! parser.append(&bytes, 0).unwrap();
//!
//! let info = parser.info().expect("metadata not ready");
//! let track_id = info.video_track().unwrap().id;
//! parser.start_extraction(track_id, 150).unwrap();
//!
//! while let Some(batch) = parser.next_batch().unwrap() {
//!     for sample in &batch {
//!         println!("sample @ {}us, {} bytes", sample.pts_micros(), sample.data.len());
//!     }
//! }
//! ```

mod boxes;
mod track;

pub use track::{CodecConfigBox, TrackInfo, TrackKind};

use crate::error::FramesiftError;

use boxes::{BoxIter, Reader, fourcc_str, read_box_header};
use track::{SampleMeta, SampleTable};

/// One demuxed access unit.
///
/// Produced by the parser, consumed exactly once by a decoder; ownership of
/// the payload transfers into the decode call.
#[derive(Debug, Clone)]
pub struct CompressedSample {
    /// Track the sample belongs to.
    pub track_id: u32,
    /// Presentation timestamp in track timescale units.
    pub pts: i64,
    /// Decode timestamp in track timescale units.
    pub dts: i64,
    /// Sample duration in track timescale units.
    pub duration: u32,
    /// Track timescale (units per second).
    pub timescale: u32,
    /// Whether this is a random-access (key) sample.
    pub is_sync: bool,
    /// Compressed payload bytes.
    pub data: Vec<u8>,
}

impl CompressedSample {
    /// Presentation timestamp converted to microseconds.
    pub fn pts_micros(&self) -> i64 {
        if self.timescale == 0 {
            return 0;
        }
        (self.pts as i128 * 1_000_000 / self.timescale as i128) as i64
    }

    /// Decode timestamp converted to microseconds.
    pub fn dts_micros(&self) -> i64 {
        if self.timescale == 0 {
            return 0;
        }
        (self.dts as i128 * 1_000_000 / self.timescale as i128) as i64
    }
}

/// Container-level metadata, available once the movie box has been parsed.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Major brand from the file-type box, when one was seen.
    pub major_brand: Option<String>,
    /// Movie timescale.
    pub timescale: u32,
    /// Movie duration in movie timescale units.
    pub duration: u64,
    /// All tracks found in the movie box.
    pub tracks: Vec<TrackInfo>,
}

impl ContainerInfo {
    /// The first video track, if any.
    pub fn video_track(&self) -> Option<&TrackInfo> {
        self.tracks
            .iter()
            .find(|track| track.kind == TrackKind::Video)
    }
}

/// Appended byte ranges, contiguous from `base` onward.
///
/// Appends are required to be contiguous, so the store is a single growing
/// buffer; `release_before` drops the front once demux has consumed it.
struct SegmentStore {
    base: u64,
    data: Vec<u8>,
}

impl SegmentStore {
    fn new() -> Self {
        Self {
            base: 0,
            data: Vec::new(),
        }
    }

    fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }

    fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// All available bytes from `offset` to the end of the store.
    fn from_offset(&self, offset: u64) -> Option<&[u8]> {
        if offset < self.base || offset > self.end() {
            return None;
        }
        Some(&self.data[(offset - self.base) as usize..])
    }

    /// An exact range, or `None` if any part of it is unavailable.
    fn range(&self, offset: u64, len: u64) -> Option<&[u8]> {
        if offset < self.base || offset + len > self.end() {
            return None;
        }
        let start = (offset - self.base) as usize;
        Some(&self.data[start..start + len as usize])
    }

    fn release_before(&mut self, offset: u64) {
        if offset <= self.base {
            return;
        }
        let cut = (offset.min(self.end()) - self.base) as usize;
        self.data.drain(..cut);
        self.base += cut as u64;
    }

    fn clear(&mut self) {
        self.base = self.end();
        self.data = Vec::new();
    }
}

struct Extraction {
    track_id: u32,
    timescale: u32,
    batch_size: usize,
    samples: Vec<SampleMeta>,
    /// `suffix_min_offset[i]` = smallest payload offset among samples `i..`.
    /// Lets the demuxer release store bytes that no remaining sample needs.
    suffix_min_offset: Vec<u64>,
    cursor: usize,
}

/// Incremental, push-fed MP4 parser and single-track demuxer.
///
/// See the [module documentation](self) for the append/ready/extract flow.
pub struct Mp4Parser {
    store: SegmentStore,
    next_append: u64,
    scan_offset: u64,
    major_brand: Option<String>,
    info: Option<ContainerInfo>,
    extraction: Option<Extraction>,
    failed: bool,
    stopped: bool,
}

impl Mp4Parser {
    /// Create a parser expecting the first append at file offset 0.
    pub fn new() -> Self {
        Self {
            store: SegmentStore::new(),
            next_append: 0,
            scan_offset: 0,
            major_brand: None,
            info: None,
            extraction: None,
            failed: false,
            stopped: false,
        }
    }

    /// Append a chunk of file bytes starting at `offset`.
    ///
    /// Chunks must arrive in strictly increasing, contiguous file order.
    ///
    /// # Errors
    ///
    /// Returns [`FramesiftError::Parse`] for out-of-order appends or
    /// structurally invalid container bytes. After a parse error the parser
    /// is unusable and no partial metadata is exposed.
    pub fn append(&mut self, data: &[u8], offset: u64) -> Result<(), FramesiftError> {
        self.check_usable()?;
        if offset != self.next_append {
            return Err(self.fail(format!(
                "non-contiguous append: expected offset {}, got {offset}",
                self.next_append
            )));
        }

        self.store.append(data);
        self.next_append += data.len() as u64;
        self.scan()
    }

    /// Container metadata, once the movie box has been parsed.
    pub fn info(&self) -> Option<&ContainerInfo> {
        if self.failed { None } else { self.info.as_ref() }
    }

    /// Request sample extraction for one track.
    ///
    /// Must be called after the parser is ready and before [`next_batch`].
    /// `batch_size` bounds how many samples each batch delivers.
    ///
    /// # Errors
    ///
    /// [`FramesiftError::InvalidState`] before metadata is ready or for an
    /// unknown track id; [`FramesiftError::Parse`] for an inconsistent
    /// sample table.
    ///
    /// [`next_batch`]: Mp4Parser::next_batch
    pub fn start_extraction(
        &mut self,
        track_id: u32,
        batch_size: usize,
    ) -> Result<(), FramesiftError> {
        self.check_usable()?;
        let info = self.info.as_ref().ok_or_else(|| {
            FramesiftError::InvalidState(
                "extraction requested before container metadata is ready".to_string(),
            )
        })?;
        let track = info
            .tracks
            .iter()
            .find(|track| track.id == track_id)
            .ok_or_else(|| {
                FramesiftError::InvalidState(format!("no track with id {track_id}"))
            })?;

        let samples = track.table.flatten()?;

        let mut suffix_min_offset = vec![u64::MAX; samples.len()];
        let mut min = u64::MAX;
        for (index, sample) in samples.iter().enumerate().rev() {
            min = min.min(sample.offset);
            suffix_min_offset[index] = min;
        }

        self.extraction = Some(Extraction {
            track_id,
            timescale: track.timescale,
            batch_size: batch_size.max(1),
            samples,
            suffix_min_offset,
            cursor: 0,
        });
        Ok(())
    }

    /// Demux the next batch of compressed samples, in decode order.
    ///
    /// Returns `Ok(None)` once the track is exhausted. A batch may hold fewer
    /// samples than the batch size — including zero — when later payload
    /// bytes have not been appended yet; append more and call again.
    ///
    /// # Errors
    ///
    /// [`FramesiftError::InvalidState`] if extraction was never requested.
    pub fn next_batch(&mut self) -> Result<Option<Vec<CompressedSample>>, FramesiftError> {
        self.check_usable()?;
        let extraction = self.extraction.as_mut().ok_or_else(|| {
            FramesiftError::InvalidState("next_batch called before start_extraction".to_string())
        })?;

        if extraction.cursor >= extraction.samples.len() {
            self.store.clear();
            return Ok(None);
        }

        let mut batch = Vec::new();
        while batch.len() < extraction.batch_size
            && extraction.cursor < extraction.samples.len()
        {
            let meta = extraction.samples[extraction.cursor];
            let Some(payload) = self.store.range(meta.offset, meta.size as u64) else {
                break;
            };
            batch.push(CompressedSample {
                track_id: extraction.track_id,
                pts: meta.pts,
                dts: meta.dts as i64,
                duration: meta.duration,
                timescale: extraction.timescale,
                is_sync: meta.is_sync,
                data: payload.to_vec(),
            });
            extraction.cursor += 1;
        }

        // Drop store bytes no remaining sample can reference.
        if extraction.cursor < extraction.samples.len() {
            let keep_from = extraction.suffix_min_offset[extraction.cursor];
            self.store.release_before(keep_from);
        } else {
            self.store.clear();
        }

        Ok(Some(batch))
    }

    /// Stop parsing and release all buffered bytes.
    ///
    /// The parser is unusable afterwards; already-extracted metadata remains
    /// readable via [`info`](Mp4Parser::info).
    pub fn stop(&mut self) {
        self.stopped = true;
        self.extraction = None;
        self.store.clear();
    }

    fn check_usable(&self) -> Result<(), FramesiftError> {
        if self.failed {
            return Err(FramesiftError::Parse(
                "parser is in a failed state".to_string(),
            ));
        }
        if self.stopped {
            return Err(FramesiftError::InvalidState(
                "parser has been stopped".to_string(),
            ));
        }
        Ok(())
    }

    fn fail(&mut self, message: String) -> FramesiftError {
        self.failed = true;
        self.info = None;
        FramesiftError::Parse(message)
    }

    /// Walk top-level boxes as far as the buffered bytes allow.
    ///
    /// Stops once the movie box has been parsed — everything after that is
    /// sample payload addressed by absolute offset.
    fn scan(&mut self) -> Result<(), FramesiftError> {
        while self.info.is_none() {
            let Some(window) = self.store.from_offset(self.scan_offset) else {
                break;
            };
            let header = match read_box_header(window) {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(error) => return Err(self.fail(error.to_string())),
            };

            let Some(total) = header.size else {
                // A box that runs to the end of the file. If the movie box
                // has not been seen yet it can only still arrive inside this
                // box for malformed files; treat a non-mdat open-ended box
                // as unparseable.
                if &header.kind == b"mdat" {
                    break;
                }
                return Err(self.fail(format!(
                    "open-ended '{}' box before movie metadata",
                    fourcc_str(&header.kind)
                )));
            };

            match &header.kind {
                b"ftyp" => {
                    let Some(payload) =
                        self.store.range(self.scan_offset + header.header_len, header.payload_len().unwrap())
                    else {
                        break;
                    };
                    if payload.len() >= 4 {
                        self.major_brand = Some(fourcc_str(&[
                            payload[0], payload[1], payload[2], payload[3],
                        ]));
                    }
                }
                b"moov" => {
                    let Some(payload) =
                        self.store.range(self.scan_offset + header.header_len, header.payload_len().unwrap())
                    else {
                        break;
                    };
                    let info = match parse_moov(payload, self.major_brand.clone()) {
                        Ok(info) => info,
                        Err(error) => return Err(self.fail(error.to_string())),
                    };
                    self.info = Some(info);
                }
                // mdat payloads stay in the store for demuxing; everything
                // else (free, skip, wide, uuid, ...) is skipped outright.
                _ => {}
            }

            self.scan_offset += total;
        }
        Ok(())
    }
}

impl Default for Mp4Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_moov(
    payload: &[u8],
    major_brand: Option<String>,
) -> Result<ContainerInfo, FramesiftError> {
    let mut timescale = 0u32;
    let mut duration = 0u64;
    let mut tracks = Vec::new();

    for child in BoxIter::new(payload) {
        let (kind, body) = child?;
        match &kind {
            b"mvhd" => {
                let mut reader = Reader::new(body);
                let version = reader.version_flags()?;
                if version == 1 {
                    reader.skip(16)?; // creation + modification time
                    timescale = reader.u32()?;
                    duration = reader.u64()?;
                } else {
                    reader.skip(8)?;
                    timescale = reader.u32()?;
                    duration = reader.u32()? as u64;
                }
            }
            b"trak" => tracks.push(parse_trak(body)?),
            _ => {}
        }
    }

    if tracks.is_empty() {
        return Err(FramesiftError::Parse(
            "movie box contains no tracks".to_string(),
        ));
    }

    Ok(ContainerInfo {
        major_brand,
        timescale,
        duration,
        tracks,
    })
}

fn parse_trak(payload: &[u8]) -> Result<TrackInfo, FramesiftError> {
    let mut track = TrackInfo {
        id: 0,
        kind: TrackKind::Other,
        timescale: 0,
        duration: 0,
        sample_count: 0,
        width: 0,
        height: 0,
        codec: None,
        codec_config: None,
        table: SampleTable::default(),
    };

    for child in BoxIter::new(payload) {
        let (kind, body) = child?;
        match &kind {
            b"tkhd" => {
                let mut reader = Reader::new(body);
                let version = reader.version_flags()?;
                if version == 1 {
                    reader.skip(16)?;
                } else {
                    reader.skip(8)?;
                }
                track.id = reader.u32()?;
            }
            b"mdia" => parse_mdia(body, &mut track)?,
            _ => {}
        }
    }

    track.sample_count = track.table.sizes.len() as u32;
    Ok(track)
}

fn parse_mdia(payload: &[u8], track: &mut TrackInfo) -> Result<(), FramesiftError> {
    for child in BoxIter::new(payload) {
        let (kind, body) = child?;
        match &kind {
            b"mdhd" => {
                let mut reader = Reader::new(body);
                let version = reader.version_flags()?;
                if version == 1 {
                    reader.skip(16)?;
                    track.timescale = reader.u32()?;
                    track.duration = reader.u64()?;
                } else {
                    reader.skip(8)?;
                    track.timescale = reader.u32()?;
                    track.duration = reader.u32()? as u64;
                }
            }
            b"hdlr" => {
                let mut reader = Reader::new(body);
                reader.version_flags()?;
                reader.skip(4)?; // pre_defined
                let mut handler = [0u8; 4];
                handler.copy_from_slice(reader.take(4)?);
                track.kind = match &handler {
                    b"vide" => TrackKind::Video,
                    b"soun" => TrackKind::Audio,
                    _ => TrackKind::Other,
                };
            }
            b"minf" => parse_minf(body, track)?,
            _ => {}
        }
    }
    Ok(())
}

fn parse_minf(payload: &[u8], track: &mut TrackInfo) -> Result<(), FramesiftError> {
    for child in BoxIter::new(payload) {
        let (kind, body) = child?;
        if &kind == b"stbl" {
            parse_stbl(body, track)?;
        }
    }
    Ok(())
}

fn parse_stbl(payload: &[u8], track: &mut TrackInfo) -> Result<(), FramesiftError> {
    for child in BoxIter::new(payload) {
        let (kind, body) = child?;
        let mut reader = Reader::new(body);
        match &kind {
            b"stsd" => parse_stsd(body, track)?,
            b"stts" => {
                reader.version_flags()?;
                let entries = reader.u32()?;
                for _ in 0..entries {
                    let count = reader.u32()?;
                    let delta = reader.u32()?;
                    track.table.time_to_sample.push((count, delta));
                }
            }
            b"stsc" => {
                reader.version_flags()?;
                let entries = reader.u32()?;
                for _ in 0..entries {
                    let first_chunk = reader.u32()?;
                    let samples_per_chunk = reader.u32()?;
                    reader.skip(4)?; // sample description index
                    track
                        .table
                        .sample_to_chunk
                        .push((first_chunk, samples_per_chunk));
                }
            }
            b"stsz" => {
                reader.version_flags()?;
                let uniform_size = reader.u32()?;
                let count = reader.u32()?;
                if uniform_size == 0 {
                    for _ in 0..count {
                        track.table.sizes.push(reader.u32()?);
                    }
                } else {
                    track.table.sizes = vec![uniform_size; count as usize];
                }
            }
            b"stco" => {
                reader.version_flags()?;
                let entries = reader.u32()?;
                for _ in 0..entries {
                    track.table.chunk_offsets.push(reader.u32()? as u64);
                }
            }
            b"co64" => {
                reader.version_flags()?;
                let entries = reader.u32()?;
                for _ in 0..entries {
                    track.table.chunk_offsets.push(reader.u64()?);
                }
            }
            b"stss" => {
                reader.version_flags()?;
                let entries = reader.u32()?;
                track.table.has_sync_table = true;
                for _ in 0..entries {
                    track.table.sync_samples.push(reader.u32()?);
                }
            }
            b"ctts" => {
                reader.version_flags()?;
                let entries = reader.u32()?;
                for _ in 0..entries {
                    let count = reader.u32()?;
                    let offset = reader.u32()? as i32;
                    track.table.composition_offsets.push((count, offset));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_stsd(payload: &[u8], track: &mut TrackInfo) -> Result<(), FramesiftError> {
    let mut reader = Reader::new(payload);
    reader.version_flags()?;
    let entry_count = reader.u32()?;
    if entry_count == 0 {
        return Ok(());
    }

    // Only the first sample entry matters — multi-entry tracks are rare and
    // the demuxer feeds a single decoder configuration.
    let entries = reader.take(reader.remaining())?;
    let Some(entry) = BoxIter::new(entries).next() else {
        return Err(FramesiftError::Parse(
            "sample description declares entries but holds none".to_string(),
        ));
    };
    let (entry_kind, entry_body) = entry?;
    track.codec = Some(fourcc_str(&entry_kind));

    if track.kind != TrackKind::Video {
        return Ok(());
    }

    // Visual sample entry: 78 fixed bytes, then nested configuration boxes.
    let mut entry_reader = Reader::new(entry_body);
    entry_reader.skip(6)?; // reserved
    entry_reader.skip(2)?; // data reference index
    entry_reader.skip(16)?; // pre_defined / reserved
    track.width = entry_reader.u16()? as u32;
    track.height = entry_reader.u16()? as u32;
    entry_reader.skip(50)?; // resolution, frame count, compressor name, depth

    let nested = entry_reader.take(entry_reader.remaining())?;
    for child in BoxIter::new(nested) {
        let (kind, body) = child?;
        match &kind {
            b"avcC" | b"hvcC" | b"vpcC" | b"av1C" => {
                track.codec_config = Some(CodecConfigBox {
                    kind: fourcc_str(&kind),
                    payload: body.to_vec(),
                });
            }
            _ => {}
        }
    }

    Ok(())
}
