//! Single-pass moment accumulation for return series.

/// Streaming mean/variance accumulator using Welford's algorithm. Numerically
/// stable for the long period-return series a path produces; no sample is
/// stored.
#[derive(Debug, Clone)]
pub struct StreamingMoments {
    count: usize,
    mean: f64,
    m2: f64,
}

impl StreamingMoments {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }

    /// Fold in the next observation.
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance; 0 with fewer than two observations.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Std of per-period observations scaled to annual terms.
    pub fn annualized_volatility(&self, periods_per_year: u32) -> f64 {
        self.std_dev() * (periods_per_year as f64).sqrt()
    }

    /// Annualized mean over annualized volatility, with a zero-rate
    /// baseline. Returns 0 when volatility is 0.
    pub fn sharpe_ratio(&self, periods_per_year: u32) -> f64 {
        let vol = self.annualized_volatility(periods_per_year);
        if self.count < 2 || vol == 0.0 {
            return 0.0;
        }
        self.mean * periods_per_year as f64 / vol
    }
}

impl Default for StreamingMoments {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let mut moments = StreamingMoments::new();
        for &v in &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            moments.update(v);
        }
        assert!((moments.mean() - 5.0).abs() < 1e-12);
        // Sample variance of the classic example is 32/7.
        assert!((moments.variance() - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_observations() {
        let mut moments = StreamingMoments::new();
        assert_eq!(moments.variance(), 0.0);
        moments.update(3.0);
        assert_eq!(moments.variance(), 0.0);
        assert_eq!(moments.sharpe_ratio(12), 0.0);
    }

    #[test]
    fn test_zero_volatility_sharpe() {
        let mut moments = StreamingMoments::new();
        moments.update(0.01);
        moments.update(0.01);
        moments.update(0.01);
        assert_eq!(moments.std_dev(), 0.0);
        assert_eq!(moments.sharpe_ratio(12), 0.0);
    }

    #[test]
    fn test_annualization() {
        let mut moments = StreamingMoments::new();
        for i in 0..240 {
            moments.update(if i % 2 == 0 { 0.02 } else { -0.01 });
        }
        let expected = moments.std_dev() * 12f64.sqrt();
        assert!((moments.annualized_volatility(12) - expected).abs() < 1e-15);
    }

    #[test]
    fn test_large_offset_stability() {
        // Welford keeps precision when values share a large offset.
        let mut moments = StreamingMoments::new();
        for &v in &[1e9 + 4.0, 1e9 + 7.0, 1e9 + 13.0, 1e9 + 16.0] {
            moments.update(v);
        }
        assert!((moments.mean() - (1e9 + 10.0)).abs() < 1e-3);
        assert!((moments.variance() - 30.0).abs() < 1e-3);
    }
}
