//! Fallback extractor tests with a scripted playback surface.

use std::sync::Arc;

use framesift::{
    CancellationToken, ExtractionMethod, ExtractionSettings, Extractor, FallbackExtractor,
    FramesiftError, NoOpProgress, PlaybackSurface, ProgressTracker, VideoInfo,
};

/// A playback surface that renders a solid frame at any timestamp and
/// records every seek.
struct ScriptedSurface {
    duration: f64,
    seeks: Vec<f64>,
    /// Capture fails for these 0-based seek indices.
    fail_capture_at: Vec<usize>,
    /// Seek fails at this 0-based index.
    fail_seek_at: Option<usize>,
}

impl ScriptedSurface {
    fn new(duration: f64) -> Self {
        Self {
            duration,
            seeks: Vec::new(),
            fail_capture_at: Vec::new(),
            fail_seek_at: None,
        }
    }
}

impl PlaybackSurface for ScriptedSurface {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn seek_to(&mut self, seconds: f64) -> Result<(), FramesiftError> {
        if self.fail_seek_at == Some(self.seeks.len()) {
            return Err(FramesiftError::Decode("scripted seek failure".to_string()));
        }
        self.seeks.push(seconds);
        Ok(())
    }

    fn capture(&mut self, width: u32, height: u32) -> Result<Vec<u8>, FramesiftError> {
        if self.fail_capture_at.contains(&(self.seeks.len() - 1)) {
            return Err(FramesiftError::Decode(
                "scripted capture failure".to_string(),
            ));
        }
        Ok(vec![128u8; (width * height * 3) as usize])
    }
}

fn info(duration: f64) -> VideoInfo {
    VideoInfo {
        width: 16,
        height: 16,
        duration,
        sample_count: (duration * 30.0) as u64,
        frame_rate: 30.0,
        codec: Some("h264".to_string()),
    }
}

fn tracker() -> ProgressTracker {
    ProgressTracker::new(Arc::new(NoOpProgress), ExtractionMethod::Fallback, 0, 1)
}

// ── Exact count on a fault-free run ────────────────────────────────

#[test]
fn fault_free_runs_produce_exactly_the_target_count() {
    for &(duration, fps, expected) in &[(10.0, 1.0, 10u64), (10.0, 2.5, 25), (7.3, 3.0, 21)] {
        let mut extractor = FallbackExtractor::new(Box::new(ScriptedSurface::new(duration)));
        let images = extractor
            .produce(
                &info(duration),
                &ExtractionSettings::new(fps),
                &mut tracker(),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(images.len() as u64, expected, "{duration}s at {fps} fps");
    }
}

// ── Exact-index seeking hits whole seconds ─────────────────────────

#[test]
fn one_fps_seeks_to_whole_seconds() {
    let surface = ScriptedSurface::new(10.0);
    let mut extractor = FallbackExtractor::new(Box::new(surface));
    let images = extractor
        .produce(
            &info(10.0),
            &ExtractionSettings::new(1.0),
            &mut tracker(),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(images.len(), 10);
    // Sequence indices are 1-based and dense.
    let indices: Vec<usize> = images.iter().map(|image| image.index).collect();
    assert_eq!(indices, (1..=10).collect::<Vec<_>>());
}

#[test]
fn seeks_are_sequential_and_evenly_spaced() {
    // Drive the surface through the extractor, then inspect the seek log.
    struct LoggingSurface {
        inner: ScriptedSurface,
        log: Arc<std::sync::Mutex<Vec<f64>>>,
    }
    impl PlaybackSurface for LoggingSurface {
        fn duration(&self) -> f64 {
            self.inner.duration()
        }
        fn seek_to(&mut self, seconds: f64) -> Result<(), FramesiftError> {
            self.log.lock().unwrap().push(seconds);
            self.inner.seek_to(seconds)
        }
        fn capture(&mut self, width: u32, height: u32) -> Result<Vec<u8>, FramesiftError> {
            self.inner.capture(width, height)
        }
    }

    let log = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut extractor = FallbackExtractor::new(Box::new(LoggingSurface {
        inner: ScriptedSurface::new(4.0),
        log: log.clone(),
    }));
    extractor
        .produce(
            &info(4.0),
            &ExtractionSettings::new(2.0),
            &mut tracker(),
            &CancellationToken::new(),
        )
        .unwrap();

    let seeks = log.lock().unwrap().clone();
    assert_eq!(seeks, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5]);
}

// ── Per-unit failures ──────────────────────────────────────────────

#[test]
fn a_failed_capture_drops_one_index_and_continues() {
    let mut surface = ScriptedSurface::new(5.0);
    surface.fail_capture_at = vec![2];

    let mut extractor = FallbackExtractor::new(Box::new(surface));
    let images = extractor
        .produce(
            &info(5.0),
            &ExtractionSettings::new(1.0),
            &mut tracker(),
            &CancellationToken::new(),
        )
        .unwrap();

    let indices: Vec<usize> = images.iter().map(|image| image.index).collect();
    assert_eq!(indices, vec![1, 2, 4, 5], "index 3 is absent, not fatal");
}

#[test]
fn a_failed_seek_is_fatal() {
    let mut surface = ScriptedSurface::new(5.0);
    surface.fail_seek_at = Some(2);

    let mut extractor = FallbackExtractor::new(Box::new(surface));
    let error = extractor
        .produce(
            &info(5.0),
            &ExtractionSettings::new(1.0),
            &mut tracker(),
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(error, FramesiftError::Decode(_)));
}

// ── Cancellation ───────────────────────────────────────────────────

#[test]
fn cancellation_is_observed_between_seeks() {
    let token = CancellationToken::new();
    token.cancel();

    let mut extractor = FallbackExtractor::new(Box::new(ScriptedSurface::new(10.0)));
    let error = extractor
        .produce(
            &info(10.0),
            &ExtractionSettings::new(1.0),
            &mut tracker(),
            &token,
        )
        .unwrap_err();
    assert!(matches!(error, FramesiftError::Cancelled));
}

// ── Resolution setting via the fallback ────────────────────────────

#[test]
fn output_dimensions_follow_the_resolution_setting() {
    let mut extractor = FallbackExtractor::new(Box::new(ScriptedSurface::new(2.0)));
    let images = extractor
        .produce(
            &VideoInfo {
                width: 1920,
                height: 1080,
                duration: 2.0,
                sample_count: 60,
                frame_rate: 30.0,
                codec: None,
            },
            &ExtractionSettings::new(1.0).with_resolution_percent(50),
            &mut tracker(),
            &CancellationToken::new(),
        )
        .unwrap();

    for image in &images {
        let decoded = image::load_from_memory(&image.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (960, 540));
    }
}
