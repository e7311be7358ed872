use std::time::{Duration, Instant};

/// Measures the interval between consecutive frames.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last: Option<Instant>,
    last_dt: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame at `now` and return the instantaneous frame rate.
    /// The first frame reports 0.
    pub fn tick(&mut self, now: Instant) -> u32 {
        let dt = match self.last {
            Some(prev) => now.saturating_duration_since(prev),
            None => Duration::ZERO,
        };
        self.last = Some(now);
        self.last_dt = dt;
        fps_from_dt(dt)
    }

    /// Interval measured by the latest tick.
    pub fn last_dt(&self) -> Duration {
        self.last_dt
    }
}

/// `round(1 / dt)`, or 0 for a zero interval.
pub fn fps_from_dt(dt: Duration) -> u32 {
    let secs = dt.as_secs_f64();
    if secs <= 0.0 {
        return 0;
    }
    (1.0 / secs).round().min(u32::MAX as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_rounds() {
        assert_eq!(fps_from_dt(Duration::from_millis(16)), 63);
        assert_eq!(fps_from_dt(Duration::from_secs(1)), 1);
        assert_eq!(fps_from_dt(Duration::ZERO), 0);
    }

    #[test]
    fn first_tick_is_zero() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        assert_eq!(clock.tick(t0), 0);
        assert_eq!(clock.tick(t0 + Duration::from_millis(20)), 50);
        assert_eq!(clock.last_dt(), Duration::from_millis(20));
        assert_eq!(clock.tick(t0 + Duration::from_millis(20)), 0);
    }
}
