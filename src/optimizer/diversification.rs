//! Maximum-diversification weights.
//!
//! The unconstrained maximizer of the diversification ratio is proportional
//! to `Σ⁻¹ σ`. Long-only weights come from an active-set pass: solve on the
//! current support, drop assets that come out negative, and re-solve until
//! the support is stable.

use nalgebra::{DMatrix, DVector};
use tracing::warn;

use crate::core::covariance::CovarianceMatrix;
use crate::core::error::Result;
use crate::optimizer::risk_parity::{equal_weight_fallback, finalize, RiskParityWeights};

/// Long-only maximum-diversification weights. Singular covariances fall back
/// to equal weights, flagged degenerate.
pub fn optimize_max_diversification(
    cov: &CovarianceMatrix,
    assets: Vec<String>,
) -> Result<RiskParityWeights> {
    let n = cov.n_assets();
    let budgets = vec![1.0 / n as f64; n];

    if cov.is_near_singular() {
        warn!("Covariance matrix is singular or near-singular; falling back to equal weights");
        return Ok(equal_weight_fallback(assets, &budgets, cov));
    }

    let sigma = cov.as_matrix();
    let vols = cov.volatilities();

    let mut active: Vec<usize> = (0..n).collect();
    let mut solution = DVector::zeros(n);
    let mut rounds = 0;
    loop {
        rounds += 1;
        let k = active.len();
        let sub = DMatrix::from_fn(k, k, |r, c| sigma[(active[r], active[c])]);
        let rhs = DVector::from_fn(k, |r, _| vols[active[r]]);
        let chol = match sub.cholesky() {
            Some(chol) => chol,
            None => {
                warn!("Max-diversification sub-solve failed; falling back to equal weights");
                return Ok(equal_weight_fallback(assets, &budgets, cov));
            }
        };
        let x = chol.solve(&rhs);

        solution.fill(0.0);
        for (slot, &i) in active.iter().enumerate() {
            solution[i] = x[slot];
        }

        let survivors: Vec<usize> = active
            .iter()
            .copied()
            .filter(|&i| solution[i] > 0.0)
            .collect();
        if survivors.len() == active.len() || rounds >= n {
            break;
        }
        if survivors.is_empty() {
            warn!("Max-diversification support collapsed; falling back to equal weights");
            return Ok(equal_weight_fallback(assets, &budgets, cov));
        }
        active = survivors;
    }

    let total: f64 = solution.iter().filter(|&&x| x > 0.0).sum();
    if total <= 0.0 {
        warn!("Max-diversification support collapsed; falling back to equal weights");
        return Ok(equal_weight_fallback(assets, &budgets, cov));
    }
    let weights: Vec<f64> = solution.iter().map(|&x| x.max(0.0) / total).collect();

    Ok(finalize(assets, weights, &budgets, cov, rounds, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("asset{}", i)).collect()
    }

    #[test]
    fn test_uncorrelated_assets_get_inverse_vol_weights() {
        // With a diagonal covariance Σ⁻¹σ reduces to 1/σ.
        let cov = CovarianceMatrix::from_volatilities(
            &[0.2, 0.1],
            &[vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap();
        let result = optimize_max_diversification(&cov, names(2)).unwrap();
        assert!(!result.degenerate);
        assert_relative_eq!(result.weights[0], 1.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(result.weights[1], 2.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_weights_sum_to_one_and_stay_long() {
        let cov = CovarianceMatrix::from_volatilities(
            &[0.18, 0.07, 0.12, 0.25],
            &[
                vec![1.0, 0.2, 0.4, 0.6],
                vec![0.2, 1.0, 0.1, 0.0],
                vec![0.4, 0.1, 1.0, 0.3],
                vec![0.6, 0.0, 0.3, 1.0],
            ],
        )
        .unwrap();
        let result = optimize_max_diversification(&cov, names(4)).unwrap();
        let total: f64 = result.weights.iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        assert!(result.weights.iter().all(|&w| w >= 0.0));
        assert!(result.diversification_ratio >= 1.0);
    }

    #[test]
    fn test_redundant_asset_dropped() {
        // Asset 0's correlation exposure is spanned by the other two, so the
        // unconstrained solve turns it negative and the active-set pass
        // removes it.
        let cov = CovarianceMatrix::from_volatilities(
            &[0.15, 0.05, 0.2],
            &[
                vec![1.0, 0.9, 0.5],
                vec![0.9, 1.0, 0.1],
                vec![0.5, 0.1, 1.0],
            ],
        )
        .unwrap();
        let result = optimize_max_diversification(&cov, names(3)).unwrap();
        assert!(result.weights[0] < 1e-9);
        assert!(result.weights[1] > 0.0);
        assert!(result.weights[2] > 0.0);
    }

    #[test]
    fn test_singular_covariance_falls_back() {
        let cov = CovarianceMatrix::from_volatilities(
            &[0.1, 0.1],
            &[vec![1.0, 1.0], vec![1.0, 1.0]],
        )
        .unwrap();
        let result = optimize_max_diversification(&cov, names(2)).unwrap();
        assert!(result.degenerate);
        assert_relative_eq!(result.weights[0], 0.5, epsilon = 1e-12);
    }
}
