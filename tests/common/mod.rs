//! Shared test doubles and synthetic-container builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use framesift::{
    CancellationToken, CompressedSample, DecodedFrame, DecoderConfiguration, ExtractionMethod,
    ExtractionSettings, Extractor, FrameDecoder, FrameLedger, FrameSink, FramesiftError,
    ImageFormat, OutputImage, ProgressCallback, ProgressInfo, ProgressTracker, VideoInfo,
};

// ── Scripted decoder ───────────────────────────────────────────────

/// Observable state shared between a test and its [`ScriptedDecoder`].
#[derive(Default)]
pub struct DecoderProbe {
    pub configured: Mutex<Option<DecoderConfiguration>>,
    pub decode_calls: AtomicUsize,
    pub decoded_pts: Mutex<Vec<i64>>,
    pub max_pending: AtomicUsize,
    pub closed: AtomicBool,
    pub ledger: Mutex<Option<Arc<FrameLedger>>>,
}

impl DecoderProbe {
    pub fn decode_calls(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending.load(Ordering::SeqCst)
    }

    pub fn decoded_pts(&self) -> Vec<i64> {
        self.decoded_pts.lock().unwrap().clone()
    }

    pub fn ledger(&self) -> Arc<FrameLedger> {
        self.ledger.lock().unwrap().as_ref().unwrap().clone()
    }
}

/// A [`FrameDecoder`] double that buffers one frame per sample and emits
/// them only when drained or flushed, so the pending count genuinely grows —
/// exactly the shape the backpressure pump has to handle.
pub struct ScriptedDecoder {
    probe: Arc<DecoderProbe>,
    ledger: Arc<FrameLedger>,
    buffered: VecDeque<DecodedFrame>,
    /// Frame dimensions to emit.
    width: u32,
    height: u32,
    /// Fail the Nth decode call (1-based).
    fail_on_call: Option<usize>,
    /// How many frames one `drain_ready` call emits.
    drain_step: usize,
    configured: bool,
}

impl ScriptedDecoder {
    pub fn new(probe: Arc<DecoderProbe>, width: u32, height: u32) -> Self {
        let ledger = Arc::new(FrameLedger::default());
        *probe.ledger.lock().unwrap() = Some(ledger.clone());
        Self {
            probe,
            ledger,
            buffered: VecDeque::new(),
            width,
            height,
            fail_on_call: None,
            drain_step: 1,
            configured: false,
        }
    }

    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn drain_step(mut self, step: usize) -> Self {
        self.drain_step = step.max(1);
        self
    }

    fn emit(&mut self, sink: &mut dyn FrameSink) -> Result<bool, FramesiftError> {
        match self.buffered.pop_front() {
            Some(frame) => {
                sink.on_frame(frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn configure(&mut self, config: &DecoderConfiguration) -> Result<(), FramesiftError> {
        if self.configured {
            return Err(FramesiftError::Configuration(
                "already configured".to_string(),
            ));
        }
        self.configured = true;
        *self.probe.configured.lock().unwrap() = Some(config.clone());
        Ok(())
    }

    fn decode(
        &mut self,
        sample: CompressedSample,
        _sink: &mut dyn FrameSink,
    ) -> Result<(), FramesiftError> {
        let call = self.probe.decode_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(FramesiftError::Decode(format!(
                "scripted failure on sample {call}"
            )));
        }

        let pts = sample.pts_micros();
        self.probe.decoded_pts.lock().unwrap().push(pts);

        let pixels = vec![0u8; (self.width * self.height * 3) as usize];
        self.buffered.push_back(DecodedFrame::tracked(
            pts,
            self.width,
            self.height,
            pixels,
            self.ledger.clone(),
        ));
        self.probe
            .max_pending
            .fetch_max(self.buffered.len(), Ordering::SeqCst);
        Ok(())
    }

    fn drain_ready(&mut self, sink: &mut dyn FrameSink) -> Result<usize, FramesiftError> {
        let mut delivered = 0;
        while delivered < self.drain_step && self.emit(sink)? {
            delivered += 1;
        }
        Ok(delivered)
    }

    fn flush(&mut self, sink: &mut dyn FrameSink) -> Result<(), FramesiftError> {
        while self.emit(sink)? {}
        Ok(())
    }

    fn close(&mut self) {
        self.buffered.clear();
        self.probe.closed.store(true, Ordering::SeqCst);
    }

    fn pending(&self) -> usize {
        self.buffered.len()
    }

    fn ledger(&self) -> Arc<FrameLedger> {
        self.ledger.clone()
    }
}

// ── Simple frame sinks ─────────────────────────────────────────────

/// Records every delivered pts, releasing all frames.
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Vec<i64>,
}

impl FrameSink for RecordingSink {
    fn on_frame(&mut self, frame: DecodedFrame) -> Result<(), FramesiftError> {
        self.delivered.push(frame.pts_micros());
        frame.release();
        Ok(())
    }
}

// ── Scripted extractors ────────────────────────────────────────────

pub enum StubBehavior {
    /// Produce `n` images, one per tracker tick.
    Produce(usize),
    /// Produce images, then fail before reaching the target.
    FailAfter(usize),
    /// Produce images, then cancel through the run's token.
    CancelAfter(usize),
}

/// Scripted [`Extractor`] for orchestration tests.
pub struct StubExtractor {
    method: ExtractionMethod,
    behavior: StubBehavior,
    pub ran: Arc<AtomicBool>,
}

impl StubExtractor {
    pub fn new(method: ExtractionMethod, behavior: StubBehavior) -> Self {
        Self {
            method,
            behavior,
            ran: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn ran_flag(&self) -> Arc<AtomicBool> {
        self.ran.clone()
    }
}

impl Extractor for StubExtractor {
    fn method(&self) -> ExtractionMethod {
        self.method
    }

    fn produce(
        &mut self,
        info: &VideoInfo,
        settings: &ExtractionSettings,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<Vec<OutputImage>, FramesiftError> {
        self.ran.store(true, Ordering::SeqCst);
        let target = info.target_output_count(settings.fps) as usize;
        let mut images = Vec::new();

        for index in 0..target {
            if cancel.is_cancelled() {
                return Err(FramesiftError::Cancelled);
            }
            match self.behavior {
                StubBehavior::FailAfter(n) if index == n => {
                    return Err(FramesiftError::Decode(format!(
                        "scripted failure at sample {n}"
                    )));
                }
                StubBehavior::CancelAfter(n) if index == n => {
                    cancel.cancel();
                    continue;
                }
                _ => {}
            }
            images.push(OutputImage {
                index: index + 1,
                bytes: vec![0u8; 16],
                format: ImageFormat::Png,
            });
            tracker.advance(None);
        }

        Ok(images)
    }
}

// ── Progress recorder ──────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingProgress {
    pub infos: Mutex<Vec<ProgressInfo>>,
}

impl RecordingProgress {
    pub fn methods(&self) -> Vec<ExtractionMethod> {
        self.infos.lock().unwrap().iter().map(|i| i.method).collect()
    }
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.infos.lock().unwrap().push(info.clone());
    }
}

// ── Synthetic container builders ───────────────────────────────────

/// Wrap a payload in a box with the given type code.
pub fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 8);
    bytes.extend_from_slice(&((payload.len() as u32 + 8).to_be_bytes()));
    bytes.extend_from_slice(kind);
    bytes.extend_from_slice(payload);
    bytes
}

/// Wrap a payload in a full box (version + flags prefix).
pub fn mp4_full_box(kind: &[u8; 4], version: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![version, 0, 0, 0];
    body.extend_from_slice(payload);
    mp4_box(kind, &body)
}

/// A minimal valid AVC decoder configuration record (one SPS, one PPS).
pub fn sample_avcc_payload() -> Vec<u8> {
    vec![
        1, 0x64, 0x00, 0x1f, 0xff, // version, profile, compat, level, nalu length
        0xe1, 0x00, 0x02, 0x67, 0x42, // 1 SPS of 2 bytes
        0x01, 0x00, 0x01, 0x68, // 1 PPS of 1 byte
    ]
}

/// Knobs for [`build_mp4`].
pub struct Mp4Spec {
    pub timescale: u32,
    /// `(payload, duration_delta, is_sync)` per sample.
    pub samples: Vec<(Vec<u8>, u32)>,
    /// 1-based sync sample numbers; `None` omits the stss box entirely.
    pub sync_samples: Option<Vec<u32>>,
    pub width: u16,
    pub height: u16,
    /// Content of the avcC box; `None` omits it.
    pub avcc: Option<Vec<u8>>,
}

impl Default for Mp4Spec {
    fn default() -> Self {
        Self {
            timescale: 3000,
            samples: Vec::new(),
            sync_samples: None,
            width: 8,
            height: 8,
            avcc: Some(sample_avcc_payload()),
        }
    }
}

/// Build a complete single-track MP4 file in memory.
pub fn build_mp4(spec: &Mp4Spec) -> Vec<u8> {
    // Two passes: the chunk offset inside stco depends on the size of the
    // metadata that precedes mdat, which does not change between passes.
    let probe = assemble_header(spec, 0);
    let data_offset = probe.len() as u64 + 8;
    let mut bytes = assemble_header(spec, data_offset);

    let mut mdat = Vec::new();
    for (payload, _) in &spec.samples {
        mdat.extend_from_slice(payload);
    }
    bytes.extend_from_slice(&mp4_box(b"mdat", &mdat));
    bytes
}

fn assemble_header(spec: &Mp4Spec, chunk_offset: u64) -> Vec<u8> {
    let total_duration: u64 = spec.samples.iter().map(|(_, delta)| *delta as u64).sum();

    let ftyp = {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"isom");
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(b"isom");
        payload.extend_from_slice(b"avc1");
        mp4_box(b"ftyp", &payload)
    };

    let mvhd = {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[0u8; 8]); // creation + modification
        payload.extend_from_slice(&spec.timescale.to_be_bytes());
        payload.extend_from_slice(&(total_duration as u32).to_be_bytes());
        payload.extend_from_slice(&[0u8; 80]); // rate .. next track id
        mp4_full_box(b"mvhd", 0, &payload)
    };

    let tkhd = {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[0u8; 8]);
        payload.extend_from_slice(&1u32.to_be_bytes()); // track id
        payload.extend_from_slice(&[0u8; 4]);
        payload.extend_from_slice(&(total_duration as u32).to_be_bytes());
        payload.extend_from_slice(&[0u8; 60]);
        mp4_full_box(b"tkhd", 0, &payload)
    };

    let mdhd = {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[0u8; 8]);
        payload.extend_from_slice(&spec.timescale.to_be_bytes());
        payload.extend_from_slice(&(total_duration as u32).to_be_bytes());
        payload.extend_from_slice(&[0x55, 0xc4, 0, 0]); // language + predefined
        mp4_full_box(b"mdhd", 0, &payload)
    };

    let hdlr = {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[0u8; 4]); // pre_defined
        payload.extend_from_slice(b"vide");
        payload.extend_from_slice(&[0u8; 12]);
        payload.push(0); // empty name
        mp4_full_box(b"hdlr", 0, &payload)
    };

    let stsd = {
        let mut entry = Vec::new();
        entry.extend_from_slice(&[0u8; 6]); // reserved
        entry.extend_from_slice(&1u16.to_be_bytes()); // data reference index
        entry.extend_from_slice(&[0u8; 16]); // pre_defined / reserved
        entry.extend_from_slice(&spec.width.to_be_bytes());
        entry.extend_from_slice(&spec.height.to_be_bytes());
        entry.extend_from_slice(&[0u8; 50]); // resolution .. depth
        if let Some(avcc) = &spec.avcc {
            entry.extend_from_slice(&mp4_box(b"avcC", avcc));
        }
        let entry_box = mp4_box(b"avc1", &entry);

        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_be_bytes()); // entry count
        payload.extend_from_slice(&entry_box);
        mp4_full_box(b"stsd", 0, &payload)
    };

    let stts = {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(spec.samples.len() as u32).to_be_bytes());
        for (_, delta) in &spec.samples {
            payload.extend_from_slice(&1u32.to_be_bytes());
            payload.extend_from_slice(&delta.to_be_bytes());
        }
        mp4_full_box(b"stts", 0, &payload)
    };

    let stsc = {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&1u32.to_be_bytes()); // first chunk
        payload.extend_from_slice(&(spec.samples.len() as u32).to_be_bytes());
        payload.extend_from_slice(&1u32.to_be_bytes()); // description index
        mp4_full_box(b"stsc", 0, &payload)
    };

    let stsz = {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_be_bytes()); // per-sample sizes
        payload.extend_from_slice(&(spec.samples.len() as u32).to_be_bytes());
        for (data, _) in &spec.samples {
            payload.extend_from_slice(&(data.len() as u32).to_be_bytes());
        }
        mp4_full_box(b"stsz", 0, &payload)
    };

    let stco = {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&(chunk_offset as u32).to_be_bytes());
        mp4_full_box(b"stco", 0, &payload)
    };

    let stss = spec.sync_samples.as_ref().map(|numbers| {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(numbers.len() as u32).to_be_bytes());
        for number in numbers {
            payload.extend_from_slice(&number.to_be_bytes());
        }
        mp4_full_box(b"stss", 0, &payload)
    });

    let mut stbl_payload = Vec::new();
    stbl_payload.extend_from_slice(&stsd);
    stbl_payload.extend_from_slice(&stts);
    stbl_payload.extend_from_slice(&stsc);
    stbl_payload.extend_from_slice(&stsz);
    stbl_payload.extend_from_slice(&stco);
    if let Some(stss) = &stss {
        stbl_payload.extend_from_slice(stss);
    }
    let stbl = mp4_box(b"stbl", &stbl_payload);

    let minf = mp4_box(b"minf", &stbl);

    let mut mdia_payload = Vec::new();
    mdia_payload.extend_from_slice(&mdhd);
    mdia_payload.extend_from_slice(&hdlr);
    mdia_payload.extend_from_slice(&minf);
    let mdia = mp4_box(b"mdia", &mdia_payload);

    let mut trak_payload = Vec::new();
    trak_payload.extend_from_slice(&tkhd);
    trak_payload.extend_from_slice(&mdia);
    let trak = mp4_box(b"trak", &trak_payload);

    let mut moov_payload = Vec::new();
    moov_payload.extend_from_slice(&mvhd);
    moov_payload.extend_from_slice(&trak);
    let moov = mp4_box(b"moov", &moov_payload);

    let mut header = ftyp;
    header.extend_from_slice(&moov);
    header
}

/// An MP4 with `count` identically-sized samples of `delta` timescale units
/// each.
pub fn build_uniform_mp4(count: usize, timescale: u32, delta: u32) -> Vec<u8> {
    let samples = (0..count)
        .map(|index| (vec![index as u8; 16], delta))
        .collect();
    build_mp4(&Mp4Spec {
        timescale,
        samples,
        sync_samples: Some(vec![1]),
        ..Mp4Spec::default()
    })
}
