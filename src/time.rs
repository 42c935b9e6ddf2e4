//! Frame timing.
//!
//! ```ignore
//! let mut timer = FrameTimer::new();
//!
//! timer.start();
//! engine.update(&input)?;
//! let spent = timer.stop();
//!
//! println!("Update: {:.2}ms, FPS: {:.1}", spent.as_secs_f64() * 1e3, timer.fps());
//! ```

use std::time::{Duration, Instant};

/// Measures how long each update takes and how many frames run per second.
#[derive(Debug)]
pub struct FrameTimer {
    /// Start of the update being measured, if any.
    started: Option<Instant>,
    /// Duration of the last completed update.
    last: Duration,
    /// Sum of all completed updates.
    total: Duration,
    /// Slowest completed update.
    worst: Duration,
    /// Completed updates since creation.
    frame_count: u64,
    /// Frames per second over the last completed window.
    fps: f32,
    /// `frame_count` when the current window opened.
    window_frames: u64,
    window_start: Instant,
    /// Window length.
    window: Duration,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self {
            started: None,
            last: Duration::ZERO,
            total: Duration::ZERO,
            worst: Duration::ZERO,
            frame_count: 0,
            fps: 0.0,
            window_frames: 0,
            window_start: Instant::now(),
            window: Duration::from_millis(500),
        }
    }

    /// Begin measuring an update.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Finish measuring and return the update's duration.
    ///
    /// Without a matching [`FrameTimer::start`] the frame still counts but
    /// takes zero time.
    pub fn stop(&mut self) -> Duration {
        let now = Instant::now();
        let spent = self.started.take().map(|s| now.duration_since(s)).unwrap_or_default();

        self.last = spent;
        self.total += spent;
        self.worst = self.worst.max(spent);
        self.frame_count += 1;

        let open_for = now.duration_since(self.window_start);
        if open_for >= self.window {
            let frames = self.frame_count - self.window_frames;
            self.fps = frames as f32 / open_for.as_secs_f32();
            self.window_frames = self.frame_count;
            self.window_start = now;
        }

        spent
    }

    /// Duration of the last completed update.
    #[inline]
    pub fn last(&self) -> Duration {
        self.last
    }

    #[inline]
    pub fn worst(&self) -> Duration {
        self.worst
    }

    /// Mean update duration so far.
    pub fn average(&self) -> Duration {
        if self.frame_count == 0 {
            Duration::ZERO
        } else {
            self.total.div_f64(self.frame_count as f64)
        }
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Set how often the FPS figure is refreshed.
    pub fn set_fps_interval(&mut self, interval: Duration) {
        self.window = interval;
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timer_new() {
        let timer = FrameTimer::new();
        assert_eq!(timer.frame(), 0);
        assert_eq!(timer.average(), Duration::ZERO);
    }

    #[test]
    fn test_timer_measures_update() {
        let mut timer = FrameTimer::new();
        timer.start();
        thread::sleep(Duration::from_millis(10));
        let spent = timer.stop();

        assert!(spent >= Duration::from_millis(10));
        assert_eq!(timer.last(), spent);
        assert_eq!(timer.worst(), spent);
        assert_eq!(timer.frame(), 1);
    }

    #[test]
    fn test_stop_without_start() {
        let mut timer = FrameTimer::new();
        assert_eq!(timer.stop(), Duration::ZERO);
        assert_eq!(timer.frame(), 1);
    }

    #[test]
    fn test_fps_refresh() {
        let mut timer = FrameTimer::new();
        timer.set_fps_interval(Duration::from_millis(5));
        thread::sleep(Duration::from_millis(10));
        timer.start();
        timer.stop();
        assert!(timer.fps() > 0.0);
    }
}
