use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One emulated vsync boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VsyncTick {
    /// When the most recent boundary fell, not when it was observed.
    pub timestamp: Instant,
    pub frames_elapsed: u32,
}

/// Software vsync for screens whose platform offers no frame callback.
///
/// The host ticks it from its event loop; a tick that crosses one or more
/// refresh boundaries yields the aligned boundary timestamp so frame
/// callbacks see evenly spaced times regardless of loop jitter.
#[derive(Debug)]
pub struct VsyncClock {
    rate: f64,
    frame_count: u64,
    paused: bool,
    last_tick: Instant,
    accumulator: Duration,
    frame_intervals: VecDeque<Duration>,
    max_intervals: usize,
}

impl VsyncClock {
    pub fn new(rate: f64) -> Self {
        Self::with_start(rate, Instant::now())
    }

    pub fn with_start(rate: f64, now: Instant) -> Self {
        Self {
            rate: rate.max(1.0),
            frame_count: 0,
            paused: false,
            last_tick: now,
            accumulator: Duration::ZERO,
            frame_intervals: VecDeque::new(),
            max_intervals: 90,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate.max(1.0);
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Paused clocks drop elapsed time instead of catching up later.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate)
    }

    pub fn next_deadline(&self) -> Instant {
        let remaining = self
            .frame_duration()
            .checked_sub(self.accumulator)
            .unwrap_or_default();
        self.last_tick + remaining
    }

    pub fn average_rate(&self) -> f64 {
        if self.frame_intervals.is_empty() {
            return 0.0;
        }

        let sum: Duration = self.frame_intervals.iter().copied().sum();
        let avg = sum / self.frame_intervals.len() as u32;

        if avg.is_zero() {
            return 0.0;
        }

        1.0 / avg.as_secs_f64()
    }

    pub fn tick(&mut self, now: Instant) -> Option<VsyncTick> {
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.accumulator += elapsed;

        if self.paused {
            self.accumulator = Duration::ZERO;
            return None;
        }

        let frame_duration = self.frame_duration();
        let mut elapsed_frames = 0u32;

        while self.accumulator >= frame_duration {
            self.accumulator -= frame_duration;
            self.frame_count += 1;
            elapsed_frames += 1;
        }

        if elapsed_frames == 0 {
            return None;
        }

        self.record_interval(elapsed);
        Some(VsyncTick {
            timestamp: now - self.accumulator,
            frames_elapsed: elapsed_frames,
        })
    }

    fn record_interval(&mut self, interval: Duration) {
        self.frame_intervals.push_back(interval);
        if self.frame_intervals.len() > self.max_intervals {
            self.frame_intervals.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_fires_on_full_interval() {
        let start = Instant::now();
        let mut clock = VsyncClock::with_start(50.0, start);

        let half = start + clock.frame_duration() / 2;
        assert_eq!(clock.tick(half), None);

        let full = half + clock.frame_duration() / 2;
        let tick = clock.tick(full).expect("vsync");
        assert_eq!(tick.frames_elapsed, 1);
        assert_eq!(clock.frame_count(), 1);
    }

    #[test]
    fn late_ticks_report_every_crossed_boundary() {
        let start = Instant::now();
        let mut clock = VsyncClock::with_start(50.0, start);
        let late = start + Duration::from_millis(65);

        let tick = clock.tick(late).expect("vsync");
        assert_eq!(tick.frames_elapsed, 3);
        assert_eq!(tick.timestamp, start + Duration::from_millis(60));
    }

    #[test]
    fn paused_clock_does_not_catch_up() {
        let start = Instant::now();
        let mut clock = VsyncClock::with_start(60.0, start);
        clock.set_paused(true);

        let now = start + Duration::from_secs(1);
        assert_eq!(clock.tick(now), None);

        clock.set_paused(false);
        assert_eq!(clock.tick(now + Duration::from_millis(1)), None);
        assert_eq!(clock.frame_count(), 0);
    }

    #[test]
    fn rate_changes_apply_to_the_next_interval() {
        let start = Instant::now();
        let mut clock = VsyncClock::with_start(60.0, start);

        let at_60hz = start + clock.frame_duration();
        assert!(clock.tick(at_60hz).is_some());

        clock.set_rate(30.0);
        let partial = at_60hz + clock.frame_duration() / 3;
        assert_eq!(clock.tick(partial), None);

        let full = at_60hz + clock.frame_duration();
        assert!(clock.tick(full).is_some());
        assert_eq!(clock.frame_count(), 2);
    }
}
