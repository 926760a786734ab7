//! Frame timing.

use std::time::{Duration, Instant};

/// Running FPS statistics over the lifetime of the application.
#[derive(Debug, Clone, Copy)]
pub struct FrameStats {
    /// Lowest instantaneous FPS seen.
    pub min_fps: f64,
    /// Highest instantaneous FPS seen.
    pub max_fps: f64,
    fps_sum: f64,
    samples: u64,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
            samples: 0,
        }
    }
}

impl FrameStats {
    /// Record one frame's delta time in seconds.
    ///
    /// Zero-length frames carry no FPS information and are ignored.
    pub fn record(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let fps = 1.0 / f64::from(dt);
        self.min_fps = self.min_fps.min(fps);
        self.max_fps = self.max_fps.max(fps);
        self.fps_sum += fps;
        self.samples += 1;
    }

    /// Average FPS over all recorded frames, or `None` if nothing was recorded.
    pub fn average_fps(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.fps_sum / self.samples as f64)
    }

    /// Number of frames recorded.
    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// Measures the time between consecutive frames.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    stats: FrameStats,
}

impl FrameTimer {
    /// Create a timer starting now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            stats: FrameStats::default(),
        }
    }

    /// Advance to the next frame and return the delta time in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;
        self.stats.record(dt);
        dt
    }

    /// Time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// FPS statistics gathered so far.
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
