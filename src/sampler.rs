//! Fixed-rate frame sampling.
//!
//! Converts the decoder's output stream (at the source's native frame rate)
//! into a sparser stream at the requested rate. The decision is online and
//! single-pass: one timestamp of state, no lookahead, no revisiting.

/// Decides which decoded frames to keep for a target sample rate.
///
/// A frame at presentation timestamp `t` is kept when
/// `t - last_kept >= interval * tolerance`, where
/// `interval = 1_000_000 / fps` microseconds. The tolerance factor exists
/// because real-world encodes jitter: consecutive source frame intervals
/// often land slightly under nominal, and a hard `>= interval` comparison
/// would systematically under-sample. `last_kept` starts at `-interval` so
/// the first frame is always kept.
///
/// When the requested rate meets or exceeds the source rate, every frame
/// passes.
///
/// # Example
///
/// ```
/// use framesift::FixedRateSampler;
///
/// // 2 fps from a source delivering frames every 100ms.
/// let mut sampler = FixedRateSampler::new(2.0, 0.9);
/// let kept: Vec<i64> = (0..20)
///     .map(|i| i * 100_000)
///     .filter(|&pts| sampler.offer(pts))
///     .collect();
/// assert_eq!(kept, vec![0, 500_000, 1_000_000, 1_500_000]);
/// ```
#[derive(Debug, Clone)]
pub struct FixedRateSampler {
    interval: f64,
    tolerance: f64,
    last_kept: f64,
}

impl FixedRateSampler {
    /// Create a sampler for a target rate and tolerance factor.
    ///
    /// `fps` must be positive; `tolerance` is typically 0.85–0.95.
    pub fn new(fps: f64, tolerance: f64) -> Self {
        let interval = 1_000_000.0 / fps;
        Self {
            interval,
            tolerance,
            last_kept: -interval,
        }
    }

    /// The sampling interval in microseconds.
    pub fn interval_micros(&self) -> f64 {
        self.interval
    }

    /// Decide whether to keep the frame at `pts_micros`.
    ///
    /// Keeping a frame advances the internal timestamp; the decision is
    /// final either way.
    pub fn offer(&mut self, pts_micros: i64) -> bool {
        let pts = pts_micros as f64;
        if pts - self.last_kept >= self.interval * self.tolerance {
            self.last_kept = pts;
            true
        } else {
            false
        }
    }
}
