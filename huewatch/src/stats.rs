//! # Input frame rate measurement

use std::time::{Duration, Instant};

/// Measures the rate at which frames arrive.
///
/// Every `window` frames, [`FrameRateMeter::tick`] reports the frame rate over that window.
#[derive(Clone, Debug)]
pub struct FrameRateMeter {
    window: usize,
    frames: usize,
    start: Option<Instant>,
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new(30)
    }
}

impl FrameRateMeter {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            frames: 0,
            start: None,
        }
    }

    /// Number of frames per report.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Start measuring from scratch at `now`.
    pub fn restart(&mut self, now: Instant) {
        self.frames = 0;
        self.start = Some(now);
    }

    /// Count a frame received at `now`.
    ///
    /// Returns `Some((elapsed, fps))` once per full window.
    pub fn tick(&mut self, now: Instant) -> Option<(Duration, f64)> {
        let start = *self.start.get_or_insert(now);

        self.frames += 1;

        if self.frames < self.window {
            return None;
        }

        let elapsed = now.saturating_duration_since(start);
        let fps = self.frames as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        self.restart(now);

        Some((elapsed, fps))
    }
}
