use chrono::{DateTime, Utc};

/// Average frame rate over the frames counted between two samples.
pub struct FPScalculator {
    frames: u32,
    since: DateTime<Utc>,
}

impl FPScalculator {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(since: DateTime<Utc>) -> Self {
        Self { frames: 0, since }
    }

    pub fn count_one_frame(&mut self) {
        self.frames += 1;
    }

    pub fn fps(&mut self) -> f64 {
        self.sample_at(Utc::now())
    }

    /// Returns the average since the last sample and starts a new window.
    pub fn sample_at(&mut self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.since).num_milliseconds();
        let frames = self.frames;

        self.frames = 0;
        self.since = now;

        if millis <= 0 {
            return 0.0;
        }
        f64::from(frames) * 1000.0 / millis as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn averages_over_window() {
        let start = Utc::now();
        let mut calc = FPScalculator::starting_at(start);
        for _ in 0..120 {
            calc.count_one_frame();
        }
        assert!((calc.sample_at(start + Duration::seconds(2)) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn sampling_resets_the_window() {
        let start = Utc::now();
        let mut calc = FPScalculator::starting_at(start);
        calc.count_one_frame();
        calc.sample_at(start + Duration::seconds(1));

        assert_eq!(calc.sample_at(start + Duration::seconds(2)), 0.0);
    }

    #[test]
    fn empty_window_is_zero() {
        let start = Utc::now();
        let mut calc = FPScalculator::starting_at(start);
        calc.count_one_frame();
        assert_eq!(calc.sample_at(start), 0.0);
    }
}
