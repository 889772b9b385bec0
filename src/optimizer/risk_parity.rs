//! Equal-risk-contribution solver.
//!
//! Minimizes `0.5 w'Σw - Σ b_i ln(w_i)` with a damped Newton iteration. The
//! stationary point satisfies `w_i (Σw)_i = b_i`, so after normalization each
//! asset's share of portfolio risk matches its budget. The log barrier keeps
//! iterates strictly positive without explicit bound handling.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::covariance::CovarianceMatrix;
use crate::core::error::{Result, SimError};

/// Armijo sufficient-decrease constant for the line search.
const ARMIJO_C: f64 = 1e-4;

/// Newton iteration controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewtonSettings {
    /// Iteration cap before the solve is declared non-convergent.
    pub max_iterations: usize,
    /// Convergence threshold on the gradient infinity norm.
    pub tolerance: f64,
    /// Step-halving cap per line search.
    pub max_backtracks: usize,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-9,
            max_backtracks: 40,
        }
    }
}

/// Optimizer output: weights plus the realized risk decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParityWeights {
    /// Asset names in weight order.
    pub assets: Vec<String>,
    /// Portfolio weights; non-negative, summing to the total weight bound
    /// (1 unless leverage was allowed).
    pub weights: Vec<f64>,
    /// Realized share of portfolio risk per asset, summing to 1.
    pub risk_contributions: Vec<f64>,
    /// Largest absolute gap between a realized risk share and its budget.
    pub max_deviation: f64,
    /// Weighted-average volatility over portfolio volatility.
    pub diversification_ratio: f64,
    /// Solver iterations consumed.
    pub iterations: usize,
    /// Set when the solver fell back to equal weights or stopped short of
    /// convergence. Degenerate weights are still usable.
    pub degenerate: bool,
}

impl RiskParityWeights {
    /// Weight of a named asset, if present.
    pub fn weight_of(&self, asset: &str) -> Option<f64> {
        self.assets
            .iter()
            .position(|a| a == asset)
            .map(|i| self.weights[i])
    }

    /// Effective number of independent bets, `1 / Σ w_i²`.
    pub fn effective_assets(&self) -> f64 {
        let sum_sq: f64 = self.weights.iter().map(|w| w * w).sum();
        if sum_sq > 0.0 {
            1.0 / sum_sq
        } else {
            0.0
        }
    }

    /// Error out when the solve was degenerate, for callers that refuse
    /// fallback weights.
    pub fn ensure_converged(&self) -> Result<&Self> {
        if self.degenerate {
            Err(SimError::degenerate(
                "risk parity weights come from a degenerate solve",
            ))
        } else {
            Ok(self)
        }
    }
}

/// Each asset's share of portfolio risk: `w_i (Σw)_i / (w'Σw)`. All zeros
/// when portfolio variance is zero.
pub fn risk_contribution_shares(cov: &CovarianceMatrix, weights: &[f64]) -> Vec<f64> {
    let w = DVector::from_column_slice(weights);
    let sigma_w = cov.as_matrix() * &w;
    let total = w.dot(&sigma_w);
    if total <= 0.0 {
        return vec![0.0; weights.len()];
    }
    (0..weights.len()).map(|i| w[i] * sigma_w[i] / total).collect()
}

/// Weighted-average asset volatility over portfolio volatility. Equals 1 for
/// a single asset and grows with diversification; 1 when portfolio variance
/// is zero.
pub fn diversification_ratio(cov: &CovarianceMatrix, weights: &[f64]) -> f64 {
    let w = DVector::from_column_slice(weights);
    let portfolio_vol = cov.portfolio_variance(&w).sqrt();
    if portfolio_vol <= 0.0 {
        return 1.0;
    }
    let weighted_vol: f64 = weights
        .iter()
        .enumerate()
        .map(|(i, &wi)| wi * cov.variance(i).sqrt())
        .sum();
    weighted_vol / portfolio_vol
}

/// Assemble the output struct from solved weights.
pub(crate) fn finalize(
    assets: Vec<String>,
    weights: Vec<f64>,
    budgets: &[f64],
    cov: &CovarianceMatrix,
    iterations: usize,
    degenerate: bool,
) -> RiskParityWeights {
    let shares = risk_contribution_shares(cov, &weights);
    let max_deviation = shares
        .iter()
        .zip(budgets)
        .map(|(s, b)| (s - b).abs())
        .fold(0.0, f64::max);
    let ratio = diversification_ratio(cov, &weights);
    RiskParityWeights {
        assets,
        weights,
        risk_contributions: shares,
        max_deviation,
        diversification_ratio: ratio,
        iterations,
        degenerate,
    }
}

/// Equal weights, used when the covariance gives the solver nothing to work
/// with.
pub(crate) fn equal_weight_fallback(
    assets: Vec<String>,
    budgets: &[f64],
    cov: &CovarianceMatrix,
) -> RiskParityWeights {
    let n = assets.len();
    finalize(assets, vec![1.0 / n as f64; n], budgets, cov, 0, true)
}

/// Normalize budgets to sum 1, rejecting non-positive entries.
pub(crate) fn normalize_budgets(budgets: Option<&[f64]>, n: usize) -> Result<Vec<f64>> {
    match budgets {
        None => Ok(vec![1.0 / n as f64; n]),
        Some(budgets) => {
            if budgets.len() != n {
                return Err(SimError::invalid_config(format!(
                    "{} risk budgets supplied for {} assets",
                    budgets.len(),
                    n
                )));
            }
            let mut sum = 0.0;
            for (i, &b) in budgets.iter().enumerate() {
                if !b.is_finite() || b <= 0.0 {
                    return Err(SimError::invalid_config(format!(
                        "risk budget {} must be positive, got {}",
                        i, b
                    )));
                }
                sum += b;
            }
            Ok(budgets.iter().map(|b| b / sum).collect())
        }
    }
}

fn objective(sigma: &DMatrix<f64>, budgets: &[f64], w: &DVector<f64>) -> f64 {
    let quad = 0.5 * (sigma * w).dot(w);
    let barrier: f64 = budgets
        .iter()
        .zip(w.iter())
        .map(|(b, wi)| b * wi.ln())
        .sum();
    quad - barrier
}

/// Newton iteration on the barrier objective. Returns the normalized weights,
/// iterations used, and whether the gradient criterion was met. `None` when a
/// Hessian factorization fails.
pub(crate) fn solve_erc(
    cov: &CovarianceMatrix,
    budgets: &[f64],
    settings: &NewtonSettings,
) -> Option<(Vec<f64>, usize, bool)> {
    let n = budgets.len();
    let sigma = cov.as_matrix();
    let mut w = DVector::from_column_slice(budgets);

    for iter in 0..settings.max_iterations {
        let sigma_w = sigma * &w;
        let grad = DVector::from_fn(n, |i, _| sigma_w[i] - budgets[i] / w[i]);
        if grad.amax() <= settings.tolerance {
            return Some((normalized(&w), iter, true));
        }

        let mut hess = sigma.clone();
        for i in 0..n {
            hess[(i, i)] += budgets[i] / (w[i] * w[i]);
        }
        let chol = hess.cholesky()?;
        let step = chol.solve(&grad);

        // Halve the step until the iterate stays positive and the objective
        // decreases enough.
        let f0 = objective(sigma, budgets, &w);
        let slope = grad.dot(&step);
        let mut t = 1.0;
        let mut accepted = false;
        for _ in 0..settings.max_backtracks {
            let candidate = &w - &step * t;
            if candidate.iter().all(|&x| x > 0.0)
                && objective(sigma, budgets, &candidate) <= f0 - ARMIJO_C * t * slope
            {
                w = candidate;
                accepted = true;
                break;
            }
            t *= 0.5;
        }
        if !accepted {
            return Some((normalized(&w), iter, false));
        }
    }

    Some((normalized(&w), settings.max_iterations, false))
}

fn normalized(w: &DVector<f64>) -> Vec<f64> {
    let sum = w.sum();
    w.iter().map(|x| x / sum).collect()
}

/// Risk-parity weights for the unconstrained case: budgets only, full
/// investment. Singular covariances fall back to equal weights.
pub fn optimize_erc(
    cov: &CovarianceMatrix,
    assets: Vec<String>,
    budgets: Option<&[f64]>,
    settings: &NewtonSettings,
) -> Result<RiskParityWeights> {
    let n = cov.n_assets();
    let budgets = normalize_budgets(budgets, n)?;

    if cov.is_near_singular() {
        warn!("Covariance matrix is singular or near-singular; falling back to equal weights");
        return Ok(equal_weight_fallback(assets, &budgets, cov));
    }

    match solve_erc(cov, &budgets, settings) {
        Some((weights, iterations, converged)) => {
            if !converged {
                warn!(
                    "Risk parity solve stopped after {} iterations without meeting tolerance",
                    iterations
                );
            }
            Ok(finalize(assets, weights, &budgets, cov, iterations, !converged))
        }
        None => {
            warn!("Risk parity Hessian factorization failed; falling back to equal weights");
            Ok(equal_weight_fallback(assets, &budgets, cov))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("asset{}", i)).collect()
    }

    #[test]
    fn test_two_assets_inverse_volatility() {
        // With two assets ERC weights are inverse to volatility regardless
        // of correlation.
        for rho in [-0.5, 0.0, 0.1, 0.6] {
            let cov = CovarianceMatrix::from_volatilities(
                &[0.15, 0.05],
                &[vec![1.0, rho], vec![rho, 1.0]],
            )
            .unwrap();
            let result =
                optimize_erc(&cov, names(2), None, &NewtonSettings::default()).unwrap();
            assert!(!result.degenerate);
            assert_relative_eq!(result.weights[0], 0.25, epsilon = 1e-6);
            assert_relative_eq!(result.weights[1], 0.75, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_equal_variance_gives_equal_weights() {
        let cov = CovarianceMatrix::from_rows(&[
            vec![0.04, 0.0, 0.0, 0.0],
            vec![0.0, 0.04, 0.0, 0.0],
            vec![0.0, 0.0, 0.04, 0.0],
            vec![0.0, 0.0, 0.0, 0.04],
        ])
        .unwrap();
        let result = optimize_erc(&cov, names(4), None, &NewtonSettings::default()).unwrap();
        for &w in &result.weights {
            assert_relative_eq!(w, 0.25, epsilon = 1e-6);
        }
        for &share in &result.risk_contributions {
            assert_relative_eq!(share, 0.25, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_risk_shares_match_budgets() {
        let cov = CovarianceMatrix::from_volatilities(
            &[0.18, 0.07, 0.12],
            &[
                vec![1.0, 0.2, 0.4],
                vec![0.2, 1.0, 0.1],
                vec![0.4, 0.1, 1.0],
            ],
        )
        .unwrap();
        let budgets = [0.5, 0.3, 0.2];
        let result = optimize_erc(
            &cov,
            names(3),
            Some(&budgets),
            &NewtonSettings::default(),
        )
        .unwrap();
        assert!(!result.degenerate);
        for (share, budget) in result.risk_contributions.iter().zip(&budgets) {
            assert_relative_eq!(share, budget, epsilon = 1e-6);
        }
        assert!(result.max_deviation < 1e-6);
        let total: f64 = result.weights.iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_covariance_falls_back() {
        // Two perfectly correlated assets make the matrix rank deficient.
        let cov = CovarianceMatrix::from_volatilities(
            &[0.1, 0.1],
            &[vec![1.0, 1.0], vec![1.0, 1.0]],
        )
        .unwrap();
        let result = optimize_erc(&cov, names(2), None, &NewtonSettings::default()).unwrap();
        assert!(result.degenerate);
        assert_relative_eq!(result.weights[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(result.weights[1], 0.5, epsilon = 1e-12);
        assert!(result.ensure_converged().is_err());
    }

    #[test]
    fn test_non_positive_budget_rejected() {
        let cov = CovarianceMatrix::from_rows(&[vec![0.04, 0.0], vec![0.0, 0.01]]).unwrap();
        let err = optimize_erc(
            &cov,
            names(2),
            Some(&[1.0, 0.0]),
            &NewtonSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SimError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_effective_assets() {
        let cov = CovarianceMatrix::from_rows(&[vec![0.04, 0.0], vec![0.0, 0.04]]).unwrap();
        let result = optimize_erc(&cov, names(2), None, &NewtonSettings::default()).unwrap();
        assert_relative_eq!(result.effective_assets(), 2.0, epsilon = 1e-6);
        assert_eq!(result.weight_of("asset0"), Some(result.weights[0]));
        assert_eq!(result.weight_of("missing"), None);
    }

    #[test]
    fn test_diversification_ratio_above_one() {
        let cov = CovarianceMatrix::from_volatilities(
            &[0.15, 0.05],
            &[vec![1.0, 0.1], vec![0.1, 1.0]],
        )
        .unwrap();
        let result = optimize_erc(&cov, names(2), None, &NewtonSettings::default()).unwrap();
        assert!(result.diversification_ratio > 1.0);
    }
}
