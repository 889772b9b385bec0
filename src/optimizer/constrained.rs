//! Constrained risk-budgeting solver.
//!
//! Handles the cases the Newton fast path cannot: per-asset bounds on risk
//! shares, sector weight bounds, and a total-weight cap. Risk-share bounds
//! enter the objective as quadratic penalties with an escalating penalty
//! coefficient; weight-space constraints are enforced by a cyclic projection
//! after every gradient step.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::covariance::CovarianceMatrix;
use crate::core::error::Result;
use crate::optimizer::risk_parity::{
    equal_weight_fallback, finalize, risk_contribution_shares, solve_erc, NewtonSettings,
    RiskParityWeights,
};

/// Projected-gradient controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientSettings {
    /// Gradient steps per penalty round.
    pub max_iterations: usize,
    /// Step length tried first on each iteration.
    pub initial_step: f64,
    /// Step-halving cap per iteration.
    pub max_backtracks: usize,
    /// Penalty escalations; each round multiplies the coefficient by 10.
    pub penalty_rounds: usize,
    /// Penalty coefficient for the first round.
    pub initial_penalty: f64,
    /// Cycles through the constraint projections per projection call.
    pub projection_rounds: usize,
}

impl Default for GradientSettings {
    fn default() -> Self {
        Self {
            max_iterations: 400,
            initial_step: 0.05,
            max_backtracks: 30,
            penalty_rounds: 3,
            initial_penalty: 100.0,
            projection_rounds: 8,
        }
    }
}

/// Resolved constraint set in asset-index space.
#[derive(Debug, Clone)]
pub(crate) struct ConstraintSpec {
    /// Normalized target risk shares.
    pub budgets: Vec<f64>,
    /// Per-asset bounds on the realized risk share.
    pub share_bounds: Vec<(f64, f64)>,
    /// Sector member indices with their weight bounds.
    pub sector_bounds: Vec<(Vec<usize>, f64, f64)>,
    /// Upper bound on the weight sum.
    pub max_total_weight: f64,
    /// When false the weight sum is pinned to exactly 1.
    pub allow_leverage: bool,
}

const FD_STEP: f64 = 1e-6;

fn objective(cov: &CovarianceMatrix, spec: &ConstraintSpec, penalty: f64, w: &[f64]) -> f64 {
    let shares = risk_contribution_shares(cov, w);
    let mut value = 0.0;
    for i in 0..w.len() {
        let gap = shares[i] - spec.budgets[i];
        value += gap * gap;
        let (lo, hi) = spec.share_bounds[i];
        let below = (lo - shares[i]).max(0.0);
        let above = (shares[i] - hi).max(0.0);
        value += penalty * (below * below + above * above);
    }
    value
}

fn fd_gradient(
    cov: &CovarianceMatrix,
    spec: &ConstraintSpec,
    penalty: f64,
    w: &[f64],
) -> Vec<f64> {
    let mut grad = vec![0.0; w.len()];
    let mut probe = w.to_vec();
    for i in 0..w.len() {
        probe[i] = w[i] + FD_STEP;
        let up = objective(cov, spec, penalty, &probe);
        probe[i] = w[i] - FD_STEP;
        let down = objective(cov, spec, penalty, &probe);
        probe[i] = w[i];
        grad[i] = (up - down) / (2.0 * FD_STEP);
    }
    grad
}

/// Cycle the weight vector through the constraint projections: clamp to
/// non-negative, pull sector sums inside their bounds, then fix the total.
/// The cycle runs a fixed number of rounds; with consistent constraints it
/// settles well before the cap.
pub(crate) fn project(weights: &mut [f64], spec: &ConstraintSpec, rounds: usize) {
    let n = weights.len();
    for _ in 0..rounds {
        for w in weights.iter_mut() {
            if !w.is_finite() || *w < 0.0 {
                *w = 0.0;
            }
        }
        for (members, lo, hi) in &spec.sector_bounds {
            let sum: f64 = members.iter().map(|&i| weights[i]).sum();
            if sum > *hi && sum > 0.0 {
                let scale = hi / sum;
                for &i in members {
                    weights[i] *= scale;
                }
            } else if sum < *lo {
                if sum > 0.0 {
                    let scale = lo / sum;
                    for &i in members {
                        weights[i] *= scale;
                    }
                } else if !members.is_empty() {
                    let each = lo / members.len() as f64;
                    for &i in members {
                        weights[i] = each;
                    }
                }
            }
        }
        let total: f64 = weights.iter().sum();
        if spec.allow_leverage {
            if total > spec.max_total_weight && total > 0.0 {
                let scale = spec.max_total_weight / total;
                for w in weights.iter_mut() {
                    *w *= scale;
                }
            } else if total <= 0.0 {
                for w in weights.iter_mut() {
                    *w = 1.0 / n as f64;
                }
            }
        } else if total > 0.0 {
            for w in weights.iter_mut() {
                *w /= total;
            }
        } else {
            for w in weights.iter_mut() {
                *w = 1.0 / n as f64;
            }
        }
    }
}

/// Minimize risk-share deviation from the budgets subject to the constraint
/// spec. Warm-starts from the unconstrained Newton solution.
pub(crate) fn optimize_constrained(
    cov: &CovarianceMatrix,
    assets: Vec<String>,
    spec: &ConstraintSpec,
    newton: &NewtonSettings,
    gradient: &GradientSettings,
) -> Result<RiskParityWeights> {
    let n = cov.n_assets();

    if cov.is_near_singular() {
        warn!("Covariance matrix is singular or near-singular; falling back to equal weights");
        let mut result = equal_weight_fallback(assets, &spec.budgets, cov);
        project(&mut result.weights, spec, gradient.projection_rounds);
        result.risk_contributions = risk_contribution_shares(cov, &result.weights);
        return Ok(result);
    }

    let mut w = match solve_erc(cov, &spec.budgets, newton) {
        Some((weights, _, _)) => weights,
        None => vec![1.0 / n as f64; n],
    };
    project(&mut w, spec, gradient.projection_rounds);

    let mut total_iterations = 0;
    let mut penalty = gradient.initial_penalty;
    for _ in 0..gradient.penalty_rounds {
        for _ in 0..gradient.max_iterations {
            let grad = fd_gradient(cov, spec, penalty, &w);
            let f0 = objective(cov, spec, penalty, &w);
            let mut step = gradient.initial_step;
            let mut improved = false;
            for _ in 0..gradient.max_backtracks {
                let mut candidate: Vec<f64> =
                    w.iter().zip(&grad).map(|(wi, gi)| wi - step * gi).collect();
                project(&mut candidate, spec, gradient.projection_rounds);
                if objective(cov, spec, penalty, &candidate) < f0 - 1e-14 {
                    w = candidate;
                    improved = true;
                    break;
                }
                step *= 0.5;
            }
            total_iterations += 1;
            if !improved {
                break;
            }
        }
        penalty *= 10.0;
    }

    let degenerate = w.iter().any(|x| !x.is_finite());
    if degenerate {
        warn!("Constrained risk parity produced non-finite weights; falling back to equal weights");
        let mut result = equal_weight_fallback(assets, &spec.budgets, cov);
        project(&mut result.weights, spec, gradient.projection_rounds);
        result.risk_contributions = risk_contribution_shares(cov, &result.weights);
        return Ok(result);
    }

    Ok(finalize(assets, w, &spec.budgets, cov, total_iterations, false))
}
