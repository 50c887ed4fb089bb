use std::time::{Duration, Instant};

/// Snapshot of the clock handed to every update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameTime {
    /// Time since the clock started.
    pub total: Duration,
    /// Time since the previous tick.
    pub elapsed: Duration,
}

impl GameTime {
    pub fn total_seconds(&self) -> f32 {
        self.total.as_secs_f32()
    }

    /// Instantaneous frame rate derived from the last frame's duration.
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            1.0 / secs
        } else {
            0.0
        }
    }
}

pub struct GameClock {
    start: Instant,
    last: Instant,
}

impl GameClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self { start, last: start }
    }

    pub fn tick(&mut self) -> GameTime {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> GameTime {
        let time = GameTime {
            total: now.saturating_duration_since(self.start),
            elapsed: now.saturating_duration_since(self.last),
        };
        self.last = self.last.max(now);
        time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_accumulate_total_and_measure_elapsed() {
        let start = Instant::now();
        let mut clock = GameClock::starting_at(start);

        let first = clock.tick_at(start + Duration::from_millis(20));
        assert_eq!(first.total, Duration::from_millis(20));
        assert_eq!(first.elapsed, Duration::from_millis(20));

        let second = clock.tick_at(start + Duration::from_millis(30));
        assert_eq!(second.total, Duration::from_millis(30));
        assert_eq!(second.elapsed, Duration::from_millis(10));
    }

    #[test]
    fn stale_instant_yields_zero_elapsed() {
        let start = Instant::now();
        let mut clock = GameClock::starting_at(start);
        clock.tick_at(start + Duration::from_millis(50));

        let time = clock.tick_at(start + Duration::from_millis(40));
        assert_eq!(time.elapsed, Duration::ZERO);
        assert_eq!(time.fps(), 0.0);
    }

    #[test]
    fn fps_is_reciprocal_of_frame_time() {
        let time = GameTime {
            total: Duration::from_secs(3),
            elapsed: Duration::from_millis(20),
        };
        assert!((time.fps() - 50.0).abs() < 1e-9);
    }
}
