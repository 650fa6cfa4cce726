//! Exponential moving average for rate smoothing.

/// EMA with a fixed smoothing factor. Starts at zero; the first update
/// blends the raw value against that zero, so a new tracker ramps up
/// rather than jumping.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: f64,
}

impl Ema {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: 0.0 }
    }

    /// Folds a raw sample in and returns the smoothed value.
    pub fn update(&mut self, raw: f64) -> f64 {
        self.value = self.alpha * raw + (1.0 - self.alpha) * self.value;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_blends_against_zero() {
        let mut ema = Ema::new(0.3);
        assert_eq!(ema.update(1000.0), 300.0);
    }

    #[test]
    fn zero_then_spike() {
        let mut ema = Ema::new(0.3);
        assert_eq!(ema.update(0.0), 0.0);
        assert_eq!(ema.update(200.0), 60.0);
    }

    #[test]
    fn converges_to_steady_input() {
        let mut ema = Ema::new(0.3);
        let mut last = 0.0;
        for _ in 0..60 {
            last = ema.update(100.0);
        }
        assert!((last - 100.0).abs() < 1e-6, "got {last}");
    }
}
