//! Still-image encoding: single units and the parallel worker pool.
//!
//! [`encode_pixels`] turns one kept frame into a compressed [`OutputImage`]
//! at the requested size, format, and quality. [`EncoderPool`] runs those
//! units across a small pool of worker threads pulling from a shared queue:
//! work is dispatched to whichever worker goes idle first, results come back
//! over a channel in completion order, and
//! [`drain`](EncoderPool::drain) reassembles them by sequence index — the
//! one place in the pipeline where completion order is explicitly not
//! trusted.

use std::collections::VecDeque;
use std::io::Cursor;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage, imageops};

use crate::error::FramesiftError;
use crate::settings::ImageFormat;

/// How many consecutive worker panics count as a crash loop.
const PANIC_LOOP_LIMIT: usize = 3;

/// One compressed still image, tagged with its position in the sequence.
#[derive(Debug, Clone)]
pub struct OutputImage {
    /// 1-based sequence index; output collections are sorted by it.
    pub index: usize,
    /// Compressed image bytes.
    pub bytes: Vec<u8>,
    /// The format the bytes are encoded in.
    pub format: ImageFormat,
}

impl OutputImage {
    /// Size of the compressed image in bytes.
    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }

    /// Zero-padded, lexicographically sortable file name for this image
    /// (e.g. `frame_000042.png`).
    pub fn file_name(&self) -> String {
        format!("frame_{:06}.{}", self.index, self.format.extension())
    }
}

/// One unit of encoding work.
///
/// The pixel buffer moves into the job; whichever side finishes the unit
/// owns and frees it — exactly once.
#[derive(Debug)]
pub struct EncodeJob {
    /// 1-based sequence index for reassembly.
    pub index: usize,
    /// Packed RGB24 source pixels.
    pub pixels: Vec<u8>,
    /// Source width in pixels.
    pub source_width: u32,
    /// Source height in pixels.
    pub source_height: u32,
    /// Output width in pixels.
    pub target_width: u32,
    /// Output height in pixels.
    pub target_height: u32,
    /// Output format.
    pub format: ImageFormat,
    /// Quality 0.0–1.0; ignored for lossless formats.
    pub quality: f32,
}

/// Rasterize and compress one unit of work.
///
/// # Errors
///
/// Returns [`FramesiftError::EncodeUnit`] carrying the job's sequence index;
/// the caller decides whether one missing frame matters (it does not).
pub fn encode_pixels(job: EncodeJob) -> Result<OutputImage, FramesiftError> {
    let unit_error = |reason: String| FramesiftError::EncodeUnit {
        index: job.index,
        reason,
    };

    let image = RgbImage::from_raw(job.source_width, job.source_height, job.pixels)
        .ok_or_else(|| {
            unit_error("pixel buffer does not match the declared dimensions".to_string())
        })?;

    let image = if (job.source_width, job.source_height) != (job.target_width, job.target_height)
    {
        imageops::resize(
            &image,
            job.target_width,
            job.target_height,
            imageops::FilterType::Triangle,
        )
    } else {
        image
    };

    let mut bytes = Vec::new();
    let result = match job.format {
        ImageFormat::Png => PngEncoder::new(Cursor::new(&mut bytes)).write_image(
            image.as_raw(),
            job.target_width,
            job.target_height,
            ExtendedColorType::Rgb8,
        ),
        ImageFormat::Jpeg => {
            let quality = (job.quality * 100.0).round().clamp(1.0, 100.0) as u8;
            JpegEncoder::new_with_quality(Cursor::new(&mut bytes), quality).write_image(
                image.as_raw(),
                job.target_width,
                job.target_height,
                ExtendedColorType::Rgb8,
            )
        }
        ImageFormat::WebP => WebPEncoder::new_lossless(Cursor::new(&mut bytes)).write_image(
            image.as_raw(),
            job.target_width,
            job.target_height,
            ExtendedColorType::Rgb8,
        ),
    };

    result.map_err(|error| unit_error(error.to_string()))?;

    Ok(OutputImage {
        index: job.index,
        bytes,
        format: job.format,
    })
}

struct UnitResult {
    index: usize,
    outcome: Result<OutputImage, String>,
    panicked: bool,
}

struct PoolState {
    queue: VecDeque<EncodeJob>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    available: Condvar,
}

/// A pool of encoding workers pulling from a shared job queue.
///
/// Workers persist for the lifetime of the pool — typically one controller
/// session spanning several extraction runs — and are joined on drop. With a
/// worker cap of zero (or if no thread can be spawned) the pool degrades to
/// encoding synchronously inside [`submit`](EncoderPool::submit).
pub struct EncoderPool {
    shared: Arc<Shared>,
    results: Receiver<UnitResult>,
    results_tx: Sender<UnitResult>,
    workers: Vec<JoinHandle<()>>,
    in_flight: usize,
}

impl EncoderPool {
    /// Create a pool with `min(available_parallelism, max_workers)` workers.
    pub fn new(max_workers: usize) -> Self {
        let (results_tx, results) = channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        });

        let worker_target = if max_workers == 0 {
            0
        } else {
            std::thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(1)
                .min(max_workers)
        };

        let mut workers = Vec::with_capacity(worker_target);
        for worker_index in 0..worker_target {
            let shared = Arc::clone(&shared);
            let sender = results_tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("framesift-encode-{worker_index}"))
                .spawn(move || worker_loop(shared, sender));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(error) => {
                    log::warn!("failed to spawn encoder worker: {error}");
                    break;
                }
            }
        }

        if workers.is_empty() && worker_target > 0 {
            log::warn!("no encoder workers available; encoding synchronously");
        }

        Self {
            shared,
            results,
            results_tx,
            workers,
            in_flight: 0,
        }
    }

    /// Number of live workers (zero means synchronous mode).
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Submit one unit of work.
    ///
    /// With workers, the job queues until one goes idle; without, it is
    /// encoded here and now.
    pub fn submit(&mut self, job: EncodeJob) {
        self.in_flight += 1;

        if self.workers.is_empty() {
            let index = job.index;
            let result = match encode_pixels(job) {
                Ok(image) => UnitResult {
                    index,
                    outcome: Ok(image),
                    panicked: false,
                },
                Err(error) => UnitResult {
                    index,
                    outcome: Err(error.to_string()),
                    panicked: false,
                },
            };
            let _ = self.results_tx.send(result);
            return;
        }

        let mut state = self.shared.state.lock().unwrap();
        state.queue.push_back(job);
        drop(state);
        self.shared.available.notify_one();
    }

    /// Wait for every in-flight unit and return the images sorted by
    /// sequence index.
    ///
    /// Failed units are logged with their index and absent from the result.
    ///
    /// # Errors
    ///
    /// Returns [`FramesiftError::WorkerCrash`] when workers panic repeatedly
    /// or all of them have died.
    pub fn drain(&mut self) -> Result<Vec<OutputImage>, FramesiftError> {
        let mut images = Vec::with_capacity(self.in_flight);
        let mut consecutive_panics = 0usize;

        while self.in_flight > 0 {
            let unit = match self.results.recv() {
                Ok(unit) => unit,
                Err(_) => {
                    self.abandon_run();
                    return Err(FramesiftError::WorkerCrash(
                        "encoder workers terminated unexpectedly".to_string(),
                    ));
                }
            };
            self.in_flight -= 1;

            if unit.panicked {
                consecutive_panics += 1;
                if consecutive_panics >= PANIC_LOOP_LIMIT {
                    self.abandon_run();
                    return Err(FramesiftError::WorkerCrash(format!(
                        "{consecutive_panics} consecutive encoder worker panics"
                    )));
                }
            } else {
                consecutive_panics = 0;
            }

            match unit.outcome {
                Ok(image) => images.push(image),
                Err(reason) => {
                    log::warn!("encode unit {} failed and was dropped: {reason}", unit.index);
                }
            }
        }

        images.sort_by_key(|image| image.index);
        Ok(images)
    }

    /// Discard queued and late-arriving work after a failed run so the pool
    /// can be reused.
    fn abandon_run(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.queue.clear();
        drop(state);

        while self.results.try_recv().is_ok() {}
        self.in_flight = 0;
    }
}

impl Drop for EncoderPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
        }
        self.shared.available.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, sender: Sender<UnitResult>) {
    loop {
        let job = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if let Some(job) = state.queue.pop_front() {
                    break Some(job);
                }
                if state.shutdown {
                    break None;
                }
                state = shared.available.wait(state).unwrap();
            }
        };

        let Some(job) = job else { break };
        let index = job.index;

        let result = match catch_unwind(AssertUnwindSafe(|| encode_pixels(job))) {
            Ok(Ok(image)) => UnitResult {
                index,
                outcome: Ok(image),
                panicked: false,
            },
            Ok(Err(error)) => UnitResult {
                index,
                outcome: Err(error.to_string()),
                panicked: false,
            },
            Err(_) => UnitResult {
                index,
                outcome: Err("encoder worker panicked".to_string()),
                panicked: true,
            },
        };

        if sender.send(result).is_err() {
            break;
        }
    }
}
