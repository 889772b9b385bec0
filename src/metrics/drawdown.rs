//! Drawdown tracking over a value series.

/// Incremental peak-to-trough drawdown tracker. Feed values in order; the
/// maximum drawdown is available at every point without a second pass.
#[derive(Debug, Clone)]
pub struct DrawdownTracker {
    peak: f64,
    max_drawdown: f64,
    current_drawdown: f64,
}

impl DrawdownTracker {
    pub fn new() -> Self {
        Self {
            peak: f64::NEG_INFINITY,
            max_drawdown: 0.0,
            current_drawdown: 0.0,
        }
    }

    /// Update with the next value in the series.
    pub fn update(&mut self, value: f64) {
        if value > self.peak {
            self.peak = value;
        }
        self.current_drawdown = if self.peak > 0.0 {
            (self.peak - value) / self.peak
        } else {
            0.0
        };
        if self.current_drawdown > self.max_drawdown {
            self.max_drawdown = self.current_drawdown;
        }
    }

    /// Largest drawdown seen so far, as a fraction of the peak.
    #[inline]
    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    /// Drawdown at the most recent value.
    #[inline]
    pub fn current_drawdown(&self) -> f64 {
        self.current_drawdown
    }
}

impl Default for DrawdownTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Maximum drawdown of a complete series.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut tracker = DrawdownTracker::new();
    for &value in values {
        tracker.update(value);
    }
    tracker.max_drawdown()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_drawdown_when_rising() {
        assert_eq!(max_drawdown(&[100.0, 110.0, 120.0]), 0.0);
    }

    #[test]
    fn test_simple_drawdown() {
        // Peak 120, trough 90: 25% drawdown.
        let dd = max_drawdown(&[100.0, 120.0, 90.0, 110.0]);
        assert!((dd - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_drawdown_keeps_worst() {
        let mut tracker = DrawdownTracker::new();
        for &v in &[100.0, 80.0, 130.0, 117.0] {
            tracker.update(v);
        }
        // 20% from the first peak beats 10% from the second.
        assert!((tracker.max_drawdown() - 0.20).abs() < 1e-12);
        assert!((tracker.current_drawdown() - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_empty_series() {
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn test_drop_to_zero() {
        let dd = max_drawdown(&[100.0, 0.0]);
        assert!((dd - 1.0).abs() < 1e-12);
    }
}
