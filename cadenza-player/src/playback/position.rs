//! First-order low-pass (PT1) filter for playback position
//!
//! The raw position estimate jitters with buffer fill level and scheduling. The
//! filter turns it into a stable value:
//!
//! `smoothed += (raw * k - smoothed) / (t / dt + 1)`

use crate::config::SmoothingConfig;

#[derive(Debug, Clone)]
pub struct PositionFilter {
    gain: f64,
    time_constant: f64,
    value: f64,
}

impl PositionFilter {
    pub fn new(config: SmoothingConfig) -> Self {
        Self {
            gain: config.gain,
            time_constant: config.time_constant.max(0.0),
            value: 0.0,
        }
    }

    /// Current smoothed value
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Force the filter state, bypassing smoothing
    pub fn reset(&mut self, value: f64) {
        self.value = value;
    }

    /// Feed one raw sample taken `dt` seconds after the previous one
    pub fn update(&mut self, raw: f64, dt: f64) -> f64 {
        if dt <= 0.0 {
            return self.value;
        }
        let step = if self.time_constant > 0.0 {
            1.0 / (self.time_constant / dt + 1.0)
        } else {
            1.0
        };
        self.value += step * (raw * self.gain - self.value);
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> PositionFilter {
        PositionFilter::new(SmoothingConfig::default())
    }

    #[test]
    fn test_converges_to_constant_input() {
        let mut f = filter();
        for _ in 0..200 {
            f.update(3.0, 0.02);
        }
        assert!((f.value() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_step_is_partial() {
        let mut f = filter();
        // t == dt gives half the distance
        let v = f.update(1.0, 0.02);
        assert!((v - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_dt_holds_value() {
        let mut f = filter();
        f.reset(2.0);
        assert_eq!(f.update(9.0, 0.0), 2.0);
    }

    #[test]
    fn test_reset_bypasses_smoothing() {
        let mut f = filter();
        f.update(1.0, 0.02);
        f.reset(5.0);
        assert_eq!(f.value(), 5.0);
    }

    #[test]
    fn test_zero_time_constant_passes_through() {
        let mut f = PositionFilter::new(SmoothingConfig {
            gain: 1.0,
            time_constant: 0.0,
        });
        assert_eq!(f.update(4.5, 0.01), 4.5);
    }

    #[test]
    fn test_tracks_linear_ramp_with_bounded_lag() {
        let mut f = filter();
        let dt = 0.02;
        let mut raw = 0.0;
        let mut last = 0.0;
        for _ in 0..500 {
            raw += dt;
            let v = f.update(raw, dt);
            assert!(v >= last);
            last = v;
        }
        // Steady-state lag of a PT1 on a ramp is the time constant
        assert!((raw - last - 0.02).abs() < 1e-3);
    }
}
