//! Risk-based portfolio construction.
//!
//! The public entry point is [`optimize`], which inspects the configuration
//! and routes to the Newton fast path when only risk budgets are present, or
//! to the projected-gradient solver when bounds, sector limits, or leverage
//! make the problem a constrained one.

pub mod constrained;
pub mod diversification;
pub mod risk_parity;

pub use constrained::GradientSettings;
pub use diversification::optimize_max_diversification;
pub use risk_parity::{
    diversification_ratio, risk_contribution_shares, NewtonSettings, RiskParityWeights,
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::covariance::CovarianceMatrix;
use crate::core::error::{Result, SimError};
use crate::core::types::AssetModel;
use constrained::ConstraintSpec;

/// Feasibility tolerance on bound sums.
const BOUND_TOL: f64 = 1e-9;

/// Risk budget for one asset: its target share of portfolio risk and hard
/// bounds on the realized share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBudget {
    /// Asset name this budget applies to.
    pub asset: String,
    /// Target risk share; `None` leaves the asset at the equal-share
    /// default. Targets are normalized across assets before solving.
    pub target_share: Option<f64>,
    /// Lower bound on the realized risk share.
    pub min_share: f64,
    /// Upper bound on the realized risk share.
    pub max_share: f64,
}

impl RiskBudget {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            target_share: None,
            min_share: 0.0,
            max_share: 1.0,
        }
    }

    /// Set the target risk share.
    pub fn with_target(mut self, target_share: f64) -> Self {
        self.target_share = Some(target_share);
        self
    }

    /// Set hard bounds on the realized risk share.
    pub fn with_bounds(mut self, min_share: f64, max_share: f64) -> Self {
        self.min_share = min_share;
        self.max_share = max_share;
        self
    }
}

/// Weight bounds on the assets tagged with one sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorLimit {
    /// Sector tag the bounds apply to.
    pub sector: String,
    /// Lower bound on the summed sector weight.
    pub min_weight: f64,
    /// Upper bound on the summed sector weight.
    pub max_weight: f64,
}

impl SectorLimit {
    pub fn new(sector: impl Into<String>, min_weight: f64, max_weight: f64) -> Self {
        Self {
            sector: sector.into(),
            min_weight,
            max_weight,
        }
    }

    /// A cap with no floor.
    pub fn cap(sector: impl Into<String>, max_weight: f64) -> Self {
        Self::new(sector, 0.0, max_weight)
    }
}

/// Optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParityConfig {
    /// Asset names in covariance order; `None` generates positional names.
    pub assets: Option<Vec<String>>,
    /// Per-asset sector tags in covariance order; required when sector
    /// limits are present.
    pub sectors: Option<Vec<Option<String>>>,
    /// Per-asset risk budgets; assets without an entry keep the equal-share
    /// default and unbounded shares.
    pub risk_budgets: Vec<RiskBudget>,
    /// Sector weight bounds.
    pub sector_limits: Vec<SectorLimit>,
    /// Upper bound on the weight sum; must be at least 1 unless leverage is
    /// allowed.
    pub max_total_weight: f64,
    /// Allow the weight sum to float below or up to `max_total_weight`
    /// instead of pinning it to 1.
    pub allow_leverage: bool,
    /// Newton fast-path controls.
    pub newton: NewtonSettings,
    /// Projected-gradient controls for the constrained path.
    pub gradient: GradientSettings,
}

impl Default for RiskParityConfig {
    fn default() -> Self {
        Self {
            assets: None,
            sectors: None,
            risk_budgets: Vec::new(),
            sector_limits: Vec::new(),
            max_total_weight: 1.0,
            allow_leverage: false,
            newton: NewtonSettings::default(),
            gradient: GradientSettings::default(),
        }
    }
}

impl RiskParityConfig {
    /// Configuration pre-filled with an asset model's names and sectors.
    pub fn for_model(model: &AssetModel) -> Self {
        Self {
            assets: Some(model.names()),
            sectors: Some(model.sectors()),
            ..Self::default()
        }
    }
}

/// Resolve the configuration against the covariance dimension and dispatch
/// to the appropriate solver.
pub fn optimize(cov: &CovarianceMatrix, config: &RiskParityConfig) -> Result<RiskParityWeights> {
    let n = cov.n_assets();
    let names = match &config.assets {
        Some(names) => {
            if names.len() != n {
                return Err(SimError::invalid_config(format!(
                    "{} asset names supplied for a {}x{} covariance",
                    names.len(),
                    n,
                    n
                )));
            }
            names.clone()
        }
        None => (0..n).map(|i| format!("asset{}", i)).collect(),
    };

    let (budgets, share_bounds) = resolve_budgets(config, &names)?;
    let sector_bounds = resolve_sectors(config, n)?;

    if !config.max_total_weight.is_finite() || config.max_total_weight <= 0.0 {
        return Err(SimError::invalid_config(format!(
            "total weight cap must be positive, got {}",
            config.max_total_weight
        )));
    }
    if !config.allow_leverage && config.max_total_weight < 1.0 - BOUND_TOL {
        return Err(SimError::invalid_config(
            "total weight cap below 1 requires allow_leverage",
        ));
    }

    let bounded_shares = share_bounds
        .iter()
        .any(|&(lo, hi)| lo > 0.0 || hi < 1.0);
    let needs_constrained =
        config.allow_leverage || !sector_bounds.is_empty() || bounded_shares;

    if !needs_constrained {
        return risk_parity::optimize_erc(cov, names, Some(&budgets), &config.newton);
    }

    let spec = ConstraintSpec {
        budgets,
        share_bounds,
        sector_bounds,
        max_total_weight: config.max_total_weight,
        allow_leverage: config.allow_leverage,
    };
    constrained::optimize_constrained(cov, names, &spec, &config.newton, &config.gradient)
}

fn resolve_budgets(
    config: &RiskParityConfig,
    names: &[String],
) -> Result<(Vec<f64>, Vec<(f64, f64)>)> {
    let n = names.len();
    let mut budgets = vec![1.0 / n as f64; n];
    let mut bounds = vec![(0.0, 1.0); n];
    let mut seen = vec![false; n];

    for budget in &config.risk_budgets {
        let i = names
            .iter()
            .position(|name| *name == budget.asset)
            .ok_or_else(|| {
                SimError::invalid_config(format!(
                    "risk budget references unknown asset {}",
                    budget.asset
                ))
            })?;
        if seen[i] {
            return Err(SimError::invalid_config(format!(
                "duplicate risk budget for {}",
                budget.asset
            )));
        }
        seen[i] = true;

        if let Some(target) = budget.target_share {
            if !target.is_finite() || target <= 0.0 {
                return Err(SimError::invalid_config(format!(
                    "target risk share for {} must be positive, got {}",
                    budget.asset, target
                )));
            }
            budgets[i] = target;
        }
        if !budget.min_share.is_finite()
            || !budget.max_share.is_finite()
            || budget.min_share < 0.0
            || budget.max_share > 1.0
            || budget.min_share > budget.max_share
        {
            return Err(SimError::invalid_config(format!(
                "risk share bounds for {} must satisfy 0 <= min <= max <= 1",
                budget.asset
            )));
        }
        bounds[i] = (budget.min_share, budget.max_share);
    }

    let min_sum: f64 = bounds.iter().map(|(lo, _)| lo).sum();
    let max_sum: f64 = bounds.iter().map(|(_, hi)| hi).sum();
    if min_sum > 1.0 + BOUND_TOL || max_sum < 1.0 - BOUND_TOL {
        return Err(SimError::invalid_config(
            "risk share bounds leave no feasible allocation",
        ));
    }

    let total: f64 = budgets.iter().sum();
    for b in &mut budgets {
        *b /= total;
    }
    Ok((budgets, bounds))
}

fn resolve_sectors(
    config: &RiskParityConfig,
    n: usize,
) -> Result<Vec<(Vec<usize>, f64, f64)>> {
    if config.sector_limits.is_empty() {
        return Ok(Vec::new());
    }
    let tags = config.sectors.as_ref().ok_or_else(|| {
        SimError::invalid_config("sector limits require per-asset sector tags")
    })?;
    if tags.len() != n {
        return Err(SimError::invalid_config(format!(
            "{} sector tags supplied for {} assets",
            tags.len(),
            n
        )));
    }

    let mut resolved = Vec::with_capacity(config.sector_limits.len());
    for limit in &config.sector_limits {
        if !limit.min_weight.is_finite()
            || !limit.max_weight.is_finite()
            || limit.min_weight < 0.0
            || limit.min_weight > limit.max_weight
        {
            return Err(SimError::invalid_config(format!(
                "weight bounds for sector {} must satisfy 0 <= min <= max",
                limit.sector
            )));
        }
        let members: Vec<usize> = tags
            .iter()
            .enumerate()
            .filter(|(_, tag)| tag.as_deref() == Some(limit.sector.as_str()))
            .map(|(i, _)| i)
            .collect();
        if members.is_empty() {
            return Err(SimError::invalid_config(format!(
                "sector limit references sector {} with no assets",
                limit.sector
            )));
        }
        resolved.push((members, limit.min_weight, limit.max_weight));
    }
    Ok(resolved)
}

/// Baseline weighting schemes, including the risk-based ones above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeightScheme {
    /// 1/N across all assets.
    EqualWeight,
    /// Weights proportional to inverse volatility.
    InverseVolatility,
    /// Equal (or budgeted) risk contributions.
    #[default]
    RiskParity,
    /// Maximum diversification ratio.
    MaxDiversification,
}

/// Weights for an asset model under the chosen scheme. The config is only
/// consulted by the risk-parity scheme.
pub fn compute_weights(
    scheme: WeightScheme,
    model: &AssetModel,
    config: &RiskParityConfig,
) -> Result<RiskParityWeights> {
    let cov = model.covariance()?;
    let names = model.names();
    let n = names.len();
    let budgets = vec![1.0 / n as f64; n];

    match scheme {
        WeightScheme::EqualWeight => Ok(risk_parity::finalize(
            names,
            vec![1.0 / n as f64; n],
            &budgets,
            &cov,
            0,
            false,
        )),
        WeightScheme::InverseVolatility => {
            let vols = model.volatilities();
            if vols.iter().any(|&v| !v.is_finite() || v <= 0.0) {
                warn!("Inverse-volatility weights need positive volatilities; falling back to equal weights");
                return Ok(risk_parity::equal_weight_fallback(names, &budgets, &cov));
            }
            let inv_sum: f64 = vols.iter().map(|v| 1.0 / v).sum();
            let weights: Vec<f64> = vols.iter().map(|v| 1.0 / v / inv_sum).collect();
            Ok(risk_parity::finalize(names, weights, &budgets, &cov, 0, false))
        }
        WeightScheme::RiskParity => {
            let mut config = config.clone();
            if let Some(assets) = &config.assets {
                if *assets != names {
                    return Err(SimError::invalid_config(
                        "optimizer asset names do not match the asset model",
                    ));
                }
            } else {
                config.assets = Some(names);
            }
            if config.sectors.is_none() {
                config.sectors = Some(model.sectors());
            }
            optimize(&cov, &config)
        }
        WeightScheme::MaxDiversification => optimize_max_diversification(&cov, names),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AssetClass;
    use approx::assert_relative_eq;

    fn model() -> AssetModel {
        AssetModel::new(
            vec![
                AssetClass::new("stocks", 0.08, 0.15).with_sector("equity"),
                AssetClass::new("bonds", 0.03, 0.05).with_sector("fixed_income"),
                AssetClass::new("reits", 0.06, 0.12).with_sector("equity"),
            ],
            vec![
                vec![1.0, 0.1, 0.6],
                vec![0.1, 1.0, 0.2],
                vec![0.6, 0.2, 1.0],
            ],
        )
    }

    #[test]
    fn test_budgets_only_uses_fast_path() {
        let cov = model().covariance().unwrap();
        let config = RiskParityConfig::for_model(&model());
        let result = optimize(&cov, &config).unwrap();
        assert!(!result.degenerate);
        assert!(result.max_deviation < 1e-6);
    }

    #[test]
    fn test_unknown_budget_asset_rejected() {
        let cov = model().covariance().unwrap();
        let config = RiskParityConfig {
            risk_budgets: vec![RiskBudget::new("gold").with_target(0.5)],
            ..RiskParityConfig::for_model(&model())
        };
        assert!(matches!(
            optimize(&cov, &config),
            Err(SimError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_infeasible_share_bounds_rejected() {
        let cov = model().covariance().unwrap();
        let config = RiskParityConfig {
            risk_budgets: vec![
                RiskBudget::new("stocks").with_bounds(0.0, 0.2),
                RiskBudget::new("bonds").with_bounds(0.0, 0.2),
                RiskBudget::new("reits").with_bounds(0.0, 0.2),
            ],
            ..RiskParityConfig::for_model(&model())
        };
        assert!(optimize(&cov, &config).is_err());
    }

    #[test]
    fn test_sector_limit_without_tags_rejected() {
        let cov = model().covariance().unwrap();
        let config = RiskParityConfig {
            sector_limits: vec![SectorLimit::cap("equity", 0.5)],
            ..RiskParityConfig::default()
        };
        assert!(optimize(&cov, &config).is_err());
    }

    #[test]
    fn test_sector_cap_binds() {
        let cov = model().covariance().unwrap();
        let config = RiskParityConfig {
            sector_limits: vec![SectorLimit::cap("equity", 0.4)],
            ..RiskParityConfig::for_model(&model())
        };
        let result = optimize(&cov, &config).unwrap();
        let equity = result.weight_of("stocks").unwrap() + result.weight_of("reits").unwrap();
        assert!(equity <= 0.4 + 1e-6);
        let total: f64 = result.weights.iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_leverage_cap_without_flag_rejected() {
        let cov = model().covariance().unwrap();
        let config = RiskParityConfig {
            max_total_weight: 0.8,
            ..RiskParityConfig::for_model(&model())
        };
        assert!(optimize(&cov, &config).is_err());
    }

    #[test]
    fn test_equal_weight_scheme() {
        let result =
            compute_weights(WeightScheme::EqualWeight, &model(), &RiskParityConfig::default())
                .unwrap();
        assert!(!result.degenerate);
        for &w in &result.weights {
            assert_relative_eq!(w, 1.0 / 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_inverse_volatility_scheme() {
        let result = compute_weights(
            WeightScheme::InverseVolatility,
            &model(),
            &RiskParityConfig::default(),
        )
        .unwrap();
        // 1/0.15 : 1/0.05 : 1/0.12 normalized.
        let inv_sum = 1.0 / 0.15 + 1.0 / 0.05 + 1.0 / 0.12;
        assert_relative_eq!(result.weights[0], (1.0 / 0.15) / inv_sum, epsilon = 1e-12);
        assert_relative_eq!(result.weights[1], (1.0 / 0.05) / inv_sum, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_volatility_inverse_vol_falls_back() {
        let flat = AssetModel::new(
            vec![
                AssetClass::new("cash", 0.02, 0.0),
                AssetClass::new("bonds", 0.03, 0.05),
            ],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        );
        let result = compute_weights(
            WeightScheme::InverseVolatility,
            &flat,
            &RiskParityConfig::default(),
        )
        .unwrap();
        assert!(result.degenerate);
        assert_relative_eq!(result.weights[0], 0.5, epsilon = 1e-12);
    }
}
