//! Distribution statistics over a set of simulated paths.
//!
//! Aggregation is strictly sequential and in path order, so a run's summary
//! is reproducible bit for bit whatever the worker count was.

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SimError};
use crate::core::types::SimulationPath;
use crate::metrics::StreamingMoments;

/// z-score for the 95% two-sided interval on the mean.
const CI_Z: f64 = 1.96;

/// Summary of the final-value distribution and per-path risk metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Paths aggregated.
    pub n_paths: usize,
    /// Mean final value.
    pub mean_final_value: f64,
    /// Median final value.
    pub median_final_value: f64,
    /// Sample standard deviation of final values.
    pub std_final_value: f64,
    /// Requested percentiles of final value, as (percentile, value) in
    /// request order.
    pub percentiles: Vec<(f64, f64)>,
    /// Confidence level the VaR figures use.
    pub var_level: f64,
    /// Final value at the lower (1 - level) percentile.
    pub value_at_risk: f64,
    /// Mean final value over the tail at or below the VaR.
    pub conditional_var: f64,
    /// Lower bound of the 95% confidence interval on the mean.
    pub mean_ci_low: f64,
    /// Upper bound of the 95% confidence interval on the mean.
    pub mean_ci_high: f64,
    /// Average of per-path maximum drawdowns.
    pub avg_max_drawdown: f64,
    /// Average of per-path annualized volatilities.
    pub avg_annualized_volatility: f64,
    /// Average of per-path Sharpe ratios.
    pub avg_sharpe_ratio: f64,
    /// Fraction of paths finishing below the initial value.
    pub probability_of_loss: f64,
    /// For each requested percentile, the index of the path whose final
    /// value lands closest to it.
    pub representative_paths: Vec<(f64, usize)>,
}

/// Interpolated percentile of an ascending-sorted slice. `pct` is in
/// percent. Returns NaN for an empty slice.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let clamped = pct.clamp(0.0, 100.0);
    let rank = clamped / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Aggregate paths into summary statistics. A single path degenerates
/// cleanly: zero spread, interval collapsed onto the mean.
pub fn analyze(
    paths: &[SimulationPath],
    percentiles: &[f64],
    confidence_level: f64,
    initial_value: f64,
) -> Result<SummaryStatistics> {
    if paths.is_empty() {
        return Err(SimError::invalid_config("no paths to analyze"));
    }
    let n = paths.len();

    let finals: Vec<f64> = paths.iter().map(|p| p.final_value).collect();
    let mut sorted = finals.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut moments = StreamingMoments::new();
    for &value in &finals {
        moments.update(value);
    }
    let mean = moments.mean();
    let std = moments.std_dev();

    let levels: Vec<(f64, f64)> = percentiles
        .iter()
        .map(|&p| (p, percentile(&sorted, p)))
        .collect();

    let value_at_risk = percentile(&sorted, (1.0 - confidence_level) * 100.0);
    let tail: &[f64] = {
        let cut = sorted.partition_point(|&v| v <= value_at_risk);
        &sorted[..cut]
    };
    let conditional_var = if tail.is_empty() {
        value_at_risk
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    };

    let half_width = CI_Z * std / (n as f64).sqrt();

    let mut avg_max_drawdown = 0.0;
    let mut avg_annualized_volatility = 0.0;
    let mut avg_sharpe_ratio = 0.0;
    let mut losses = 0usize;
    for path in paths {
        avg_max_drawdown += path.max_drawdown;
        avg_annualized_volatility += path.annualized_volatility;
        avg_sharpe_ratio += path.sharpe_ratio;
        if path.final_value < initial_value {
            losses += 1;
        }
    }
    avg_max_drawdown /= n as f64;
    avg_annualized_volatility /= n as f64;
    avg_sharpe_ratio /= n as f64;

    let representative_paths = levels
        .iter()
        .map(|&(p, value)| (p, nearest_path(&finals, value)))
        .collect();

    Ok(SummaryStatistics {
        n_paths: n,
        mean_final_value: mean,
        median_final_value: percentile(&sorted, 50.0),
        std_final_value: std,
        percentiles: levels,
        var_level: confidence_level,
        value_at_risk,
        conditional_var,
        mean_ci_low: mean - half_width,
        mean_ci_high: mean + half_width,
        avg_max_drawdown,
        avg_annualized_volatility,
        avg_sharpe_ratio,
        probability_of_loss: losses as f64 / n as f64,
        representative_paths,
    })
}

/// Index of the path whose final value is closest to `value`; first wins on
/// ties so the choice is order-stable.
fn nearest_path(finals: &[f64], value: f64) -> usize {
    let mut best = 0;
    let mut best_gap = f64::INFINITY;
    for (i, &f) in finals.iter().enumerate() {
        let gap = (f - value).abs();
        if gap < best_gap {
            best_gap = gap;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn flat_path(final_value: f64) -> SimulationPath {
        SimulationPath {
            values: vec![100.0, final_value],
            returns: vec![final_value / 100.0 - 1.0],
            regimes: Vec::new(),
            asset_values: None,
            final_value,
            annualized_volatility: 0.0,
            max_drawdown: 0.0,
            sharpe_ratio: 0.0,
        }
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(percentile(&sorted, 0.0), 1.0);
        assert_relative_eq!(percentile(&sorted, 50.0), 3.0);
        assert_relative_eq!(percentile(&sorted, 100.0), 5.0);
        // Rank 0.4 between the first two entries.
        assert_relative_eq!(percentile(&sorted, 10.0), 1.4);
        assert_relative_eq!(percentile(&sorted, 25.0), 2.0);
    }

    #[test]
    fn test_single_path_degenerates() {
        let paths = vec![flat_path(120.0)];
        let summary = analyze(&paths, &[10.0, 90.0], 0.95, 100.0).unwrap();
        assert_eq!(summary.n_paths, 1);
        assert_eq!(summary.mean_final_value, 120.0);
        assert_eq!(summary.median_final_value, 120.0);
        assert_eq!(summary.std_final_value, 0.0);
        assert_eq!(summary.mean_ci_low, 120.0);
        assert_eq!(summary.mean_ci_high, 120.0);
        assert_eq!(summary.value_at_risk, 120.0);
        assert_eq!(summary.conditional_var, 120.0);
    }

    #[test]
    fn test_tail_ordering() {
        let paths: Vec<SimulationPath> =
            (1..=100).map(|i| flat_path(i as f64 * 10.0)).collect();
        let summary = analyze(&paths, &[50.0], 0.95, 500.0).unwrap();
        assert!(summary.conditional_var <= summary.value_at_risk);
        assert!(summary.value_at_risk <= summary.median_final_value);
    }

    #[test]
    fn test_probability_of_loss() {
        let paths = vec![flat_path(80.0), flat_path(90.0), flat_path(110.0), flat_path(130.0)];
        let summary = analyze(&paths, &[50.0], 0.95, 100.0).unwrap();
        assert_relative_eq!(summary.probability_of_loss, 0.5);
    }

    #[test]
    fn test_representative_paths_are_nearest() {
        let paths = vec![flat_path(50.0), flat_path(100.0), flat_path(150.0)];
        let summary = analyze(&paths, &[0.0, 100.0], 0.95, 100.0).unwrap();
        assert_eq!(summary.representative_paths[0], (0.0, 0));
        assert_eq!(summary.representative_paths[1], (100.0, 2));
    }

    #[test]
    fn test_confidence_interval_brackets_mean() {
        let paths: Vec<SimulationPath> =
            (0..50).map(|i| flat_path(100.0 + i as f64)).collect();
        let summary = analyze(&paths, &[50.0], 0.95, 100.0).unwrap();
        assert!(summary.mean_ci_low < summary.mean_final_value);
        assert!(summary.mean_final_value < summary.mean_ci_high);
        let half = CI_Z * summary.std_final_value / (50.0f64).sqrt();
        assert_relative_eq!(
            summary.mean_ci_high - summary.mean_final_value,
            half,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_empty_paths_rejected() {
        assert!(analyze(&[], &[50.0], 0.95, 100.0).is_err());
    }

    proptest! {
        #[test]
        fn prop_percentiles_monotone(
            values in proptest::collection::vec(0.0f64..1e9, 1..200),
            a in 0.0f64..=100.0,
            b in 0.0f64..=100.0,
        ) {
            let mut sorted = values;
            sorted.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(percentile(&sorted, lo) <= percentile(&sorted, hi));
        }
    }
}
