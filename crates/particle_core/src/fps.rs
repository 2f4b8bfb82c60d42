//! A rolling estimate of frames per second. It's only for display, nothing in the physics
//! depends on it.

use std::collections::VecDeque;

/// How many recent frame intervals to average over.
const SAMPLES: usize = 30;

/// Tracks recent frame intervals.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct Fps {
    /// The most recent intervals, newest first, in seconds.
    durations: VecDeque<f64>,
    /// When the last frame was recorded.
    last_tick: Option<std::time::Instant>,
}

impl Fps {
    /// Record that a frame happened now.
    #[inline]
    pub fn tick(&mut self) {
        let now = std::time::Instant::now();
        if let Some(last_tick) = self.last_tick {
            self.record(now.duration_since(last_tick));
        }
        self.last_tick = Some(now);
    }

    /// Record the interval between two frames.
    #[inline]
    pub fn record(&mut self, interval: std::time::Duration) {
        self.durations.push_front(interval.as_secs_f64());
        if self.durations.len() > SAMPLES {
            self.durations.pop_back();
        }
    }

    /// The average frames per second over the recent intervals. 0 until there's been at least
    /// one interval.
    #[inline]
    #[must_use]
    pub fn current(&self) -> f64 {
        if self.durations.is_empty() {
            return 0.0;
        }

        #[expect(
            clippy::as_conversions,
            clippy::cast_precision_loss,
            reason = "There are never more than a handful of samples"
        )]
        let average = self.durations.iter().sum::<f64>() / self.durations.len() as f64;
        if average <= 0.0 {
            return 0.0;
        }
        1.0 / average
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_frames_no_fps() {
        let mut fps = Fps::default();
        assert!(fps.current().abs() < f64::EPSILON);
        fps.tick();
        assert!(fps.current().abs() < f64::EPSILON);
    }

    #[test]
    fn averages_recent_intervals() {
        let mut fps = Fps::default();
        fps.record(std::time::Duration::from_millis(10));
        fps.record(std::time::Duration::from_millis(30));
        assert!((fps.current() - 50.0).abs() < 0.001);
    }

    #[test]
    fn forgets_old_intervals() {
        let mut fps = Fps::default();
        fps.record(std::time::Duration::from_secs(10));
        for _ in 0..SAMPLES {
            fps.record(std::time::Duration::from_millis(20));
        }
        assert!((fps.current() - 50.0).abs() < 0.001);
    }
}
