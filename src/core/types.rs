//! Core types for the simulation engine.

use serde::{Deserialize, Serialize};

use crate::core::covariance::CovarianceMatrix;
use crate::core::error::{Result, SimError};
use crate::scenario::{Regime, RegimeModel};

/// Tolerance on weight vectors summing to 1.
pub const WEIGHT_SUM_TOL: f64 = 1e-6;

/// One asset class participating in a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetClass {
    /// Identifier, e.g. "stocks", "bonds", "cash".
    pub name: String,
    /// Expected annual return (e.g. 0.07 for 7%).
    pub expected_return: f64,
    /// Annual volatility (e.g. 0.15 for 15%).
    pub volatility: f64,
    /// Optional sector tag used by sector-level optimizer constraints.
    pub sector: Option<String>,
}

impl AssetClass {
    /// Create an asset class without a sector tag.
    pub fn new(name: impl Into<String>, expected_return: f64, volatility: f64) -> Self {
        Self {
            name: name.into(),
            expected_return,
            volatility,
            sector: None,
        }
    }

    /// Attach a sector tag.
    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }
}

/// Asset-class return model: per-asset parameters plus the correlation matrix
/// shared by all assets in the run. Supplied by an external estimator; the
/// engine consumes it, never estimates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetModel {
    /// Asset classes in matrix order.
    pub assets: Vec<AssetClass>,
    /// Row-major correlation matrix aligned with `assets`.
    pub correlations: Vec<Vec<f64>>,
}

impl AssetModel {
    /// Create a model from assets and their correlation matrix.
    pub fn new(assets: Vec<AssetClass>, correlations: Vec<Vec<f64>>) -> Self {
        Self {
            assets,
            correlations,
        }
    }

    /// Number of asset classes.
    #[inline]
    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    /// Asset names in matrix order.
    pub fn names(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.name.clone()).collect()
    }

    /// Per-asset sector tags in matrix order.
    pub fn sectors(&self) -> Vec<Option<String>> {
        self.assets.iter().map(|a| a.sector.clone()).collect()
    }

    /// Per-asset annual volatilities.
    pub fn volatilities(&self) -> Vec<f64> {
        self.assets.iter().map(|a| a.volatility).collect()
    }

    /// Covariance matrix implied by the volatilities and correlations.
    pub fn covariance(&self) -> Result<CovarianceMatrix> {
        CovarianceMatrix::from_volatilities(&self.volatilities(), &self.correlations)
    }

    /// Correlation matrix as a unit-variance covariance, for shock
    /// decomposition.
    pub fn correlation_matrix(&self) -> Result<CovarianceMatrix> {
        CovarianceMatrix::from_volatilities(&vec![1.0; self.n_assets()], &self.correlations)
    }

    /// Validate asset parameters and the correlation matrix.
    pub fn validate(&self) -> Result<()> {
        if self.assets.is_empty() {
            return Err(SimError::invalid_config("asset model has no assets"));
        }
        for (i, asset) in self.assets.iter().enumerate() {
            if asset.name.is_empty() {
                return Err(SimError::invalid_config(format!("asset {} has an empty name", i)));
            }
            if !asset.expected_return.is_finite() {
                return Err(SimError::invalid_config(format!(
                    "expected return for {} must be finite",
                    asset.name
                )));
            }
            if !asset.volatility.is_finite() || asset.volatility < 0.0 {
                return Err(SimError::invalid_config(format!(
                    "volatility for {} must be finite and non-negative",
                    asset.name
                )));
            }
            for other in &self.assets[i + 1..] {
                if other.name == asset.name {
                    return Err(SimError::invalid_config(format!(
                        "duplicate asset name {}",
                        asset.name
                    )));
                }
            }
        }
        // Shape, diagonal, range, and symmetry checks live in the covariance
        // constructor.
        self.covariance().map(|_| ())
    }

    /// Index of an asset by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.assets.iter().position(|a| a.name == name)
    }
}

/// One concrete holding: a quantity of an asset at a unit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Asset-class name; must match an entry in the run's [`AssetModel`].
    pub asset: String,
    /// Quantity held.
    pub quantity: f64,
    /// Current unit price.
    pub price: f64,
}

/// Starting portfolio, as either a value with target fractions or explicit
/// holdings. The simulator branches on the variant; there is no attribute
/// probing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PortfolioInput {
    /// A total value split across assets. With `weights: None` the initial
    /// split follows the rebalancing target weights.
    Allocation {
        initial_value: f64,
        weights: Option<Vec<f64>>,
    },
    /// Explicit per-asset holdings; assets without a holding start at zero.
    Holdings { positions: Vec<Holding> },
}

impl Default for PortfolioInput {
    fn default() -> Self {
        PortfolioInput::Allocation {
            initial_value: 100_000.0,
            weights: None,
        }
    }
}

impl PortfolioInput {
    /// Total starting value.
    pub fn initial_total(&self) -> f64 {
        match self {
            PortfolioInput::Allocation { initial_value, .. } => *initial_value,
            PortfolioInput::Holdings { positions } => {
                positions.iter().map(|p| p.quantity * p.price).sum()
            }
        }
    }

    /// Per-asset starting values in model order, using `target` when the
    /// allocation carries no explicit weights.
    pub fn initial_values(&self, model: &AssetModel, target: &[f64]) -> Vec<f64> {
        match self {
            PortfolioInput::Allocation {
                initial_value,
                weights,
            } => {
                let split = weights.as_deref().unwrap_or(target);
                split.iter().map(|w| initial_value * w).collect()
            }
            PortfolioInput::Holdings { positions } => {
                let mut values = vec![0.0; model.n_assets()];
                for position in positions {
                    if let Some(i) = model.index_of(&position.asset) {
                        values[i] = position.quantity * position.price;
                    }
                }
                values
            }
        }
    }

    /// Validate against the run's asset model.
    pub fn validate(&self, model: &AssetModel) -> Result<()> {
        match self {
            PortfolioInput::Allocation {
                initial_value,
                weights,
            } => {
                if !initial_value.is_finite() || *initial_value < 0.0 {
                    return Err(SimError::invalid_config(format!(
                        "initial value must be finite and non-negative, got {}",
                        initial_value
                    )));
                }
                if let Some(weights) = weights {
                    validate_weights(weights, model.n_assets())?;
                }
                Ok(())
            }
            PortfolioInput::Holdings { positions } => {
                if positions.is_empty() {
                    return Err(SimError::invalid_config("holdings list is empty"));
                }
                for (i, position) in positions.iter().enumerate() {
                    if model.index_of(&position.asset).is_none() {
                        return Err(SimError::invalid_config(format!(
                            "holding {} references unknown asset {}",
                            i, position.asset
                        )));
                    }
                    if !position.quantity.is_finite() || position.quantity < 0.0 {
                        return Err(SimError::invalid_config(format!(
                            "quantity for {} must be finite and non-negative",
                            position.asset
                        )));
                    }
                    if !position.price.is_finite() || position.price < 0.0 {
                        return Err(SimError::invalid_config(format!(
                            "price for {} must be finite and non-negative",
                            position.asset
                        )));
                    }
                    for other in &positions[i + 1..] {
                        if other.asset == position.asset {
                            return Err(SimError::invalid_config(format!(
                                "duplicate holding for {}",
                                position.asset
                            )));
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

/// Check a weight vector is non-negative and sums to 1 within tolerance.
pub fn validate_weights(weights: &[f64], n_assets: usize) -> Result<()> {
    if weights.len() != n_assets {
        return Err(SimError::invalid_config(format!(
            "{} weights supplied for {} assets",
            weights.len(),
            n_assets
        )));
    }
    let mut sum = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        if !w.is_finite() || w < 0.0 {
            return Err(SimError::invalid_config(format!(
                "weight {} must be finite and non-negative, got {}",
                i, w
            )));
        }
        sum += w;
    }
    if (sum - 1.0).abs() > WEIGHT_SUM_TOL {
        return Err(SimError::invalid_config(format!(
            "weights sum to {}, expected 1",
            sum
        )));
    }
    Ok(())
}

/// Periodic contribution (positive) or withdrawal (negative) schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowSchedule {
    /// Amount added each time the schedule fires; negative withdraws.
    pub amount: f64,
    /// Fire every this many periods (1 = every period).
    pub every: u32,
    /// Annual growth applied to the amount, e.g. 0.02 to grow contributions
    /// 2% per completed year.
    pub annual_growth: f64,
}

impl Default for CashFlowSchedule {
    fn default() -> Self {
        Self {
            amount: 0.0,
            every: 1,
            annual_growth: 0.0,
        }
    }
}

impl CashFlowSchedule {
    /// Cash flow for period `period` (0-based), or 0 when the schedule does
    /// not fire.
    pub fn amount_for(&self, period: usize, periods_per_year: u32) -> f64 {
        if self.amount == 0.0 || (period as u64 + 1) % self.every as u64 != 0 {
            return 0.0;
        }
        let years_elapsed = (period / periods_per_year as usize) as i32;
        self.amount * (1.0 + self.annual_growth).powi(years_elapsed)
    }

    fn validate(&self) -> Result<()> {
        if !self.amount.is_finite() {
            return Err(SimError::invalid_config("cash flow amount must be finite"));
        }
        if self.every == 0 {
            return Err(SimError::invalid_config("cash flow cadence must be at least 1 period"));
        }
        if !self.annual_growth.is_finite() || self.annual_growth <= -1.0 {
            return Err(SimError::invalid_config(format!(
                "cash flow growth must be finite and greater than -1, got {}",
                self.annual_growth
            )));
        }
        Ok(())
    }
}

/// Tail-event jump shock applied, when it fires, to every asset in a period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JumpConfig {
    /// Per-period probability of a jump, before regime adjustment.
    pub probability: f64,
    /// Mean of the jump shock (typically negative).
    pub mean: f64,
    /// Standard deviation of the jump shock.
    pub std_dev: f64,
}

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            probability: 0.0,
            mean: -0.08,
            std_dev: 0.04,
        }
    }
}

impl JumpConfig {
    fn validate(&self) -> Result<()> {
        if !self.probability.is_finite() || !(0.0..=1.0).contains(&self.probability) {
            return Err(SimError::invalid_config(format!(
                "jump probability must lie in [0, 1], got {}",
                self.probability
            )));
        }
        if !self.mean.is_finite() {
            return Err(SimError::invalid_config("jump mean must be finite"));
        }
        if !self.std_dev.is_finite() || self.std_dev < 0.0 {
            return Err(SimError::invalid_config(format!(
                "jump std dev must be finite and non-negative, got {}",
                self.std_dev
            )));
        }
        Ok(())
    }
}

/// When and whether paths snap back to the target weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RebalancePolicy {
    /// Rebalance every this many periods; 0 disables rebalancing.
    pub every: u32,
    /// Skip the rebalance when the largest per-asset weight drift from target
    /// is below this threshold. `None` always rebalances on the boundary.
    pub drift_threshold: Option<f64>,
}

impl Default for RebalancePolicy {
    fn default() -> Self {
        Self {
            every: 12,
            drift_threshold: None,
        }
    }
}

impl RebalancePolicy {
    fn validate(&self) -> Result<()> {
        if let Some(threshold) = self.drift_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(SimError::invalid_config(format!(
                    "drift threshold must be finite and non-negative, got {}",
                    threshold
                )));
            }
        }
        Ok(())
    }
}

/// Full configuration for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Number of independent paths (M).
    pub n_paths: usize,
    /// Time horizon in years.
    pub horizon_years: f64,
    /// Period granularity, e.g. 12 for monthly.
    pub periods_per_year: u32,
    /// Starting portfolio.
    pub portfolio: PortfolioInput,
    /// Contribution/withdrawal schedule.
    pub cash_flow: CashFlowSchedule,
    /// Rebalancing policy.
    pub rebalance: RebalancePolicy,
    /// Jump-risk parameters.
    pub jumps: JumpConfig,
    /// Regime-switching model.
    pub regimes: RegimeModel,
    /// Confidence level for VaR/CVaR, e.g. 0.95.
    pub confidence_level: f64,
    /// Percentiles of final value to report, in percent.
    pub percentiles: Vec<f64>,
    /// Run-level seed; batch seeds derive from it.
    pub seed: u64,
    /// Paths per batch. Reproducibility is defined per (seed, batch size).
    pub batch_size: usize,
    /// Number of failed batches tolerated before the run fails (default 0:
    /// any failure re-raises).
    pub max_failed_batches: usize,
    /// Worker-thread override; `None` uses the host's available parallelism.
    pub workers: Option<usize>,
    /// Record per-period per-asset values on every path (memory-heavy).
    pub record_asset_values: bool,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            n_paths: 10_000,
            horizon_years: 30.0,
            periods_per_year: 12,
            portfolio: PortfolioInput::default(),
            cash_flow: CashFlowSchedule::default(),
            rebalance: RebalancePolicy::default(),
            jumps: JumpConfig::default(),
            regimes: RegimeModel::default(),
            confidence_level: 0.95,
            percentiles: vec![10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0],
            seed: 42,
            batch_size: 100,
            max_failed_batches: 0,
            workers: None,
            record_asset_values: false,
        }
    }
}

impl SimulationParameters {
    /// Total simulated periods: horizon × granularity.
    pub fn periods(&self) -> usize {
        (self.horizon_years * self.periods_per_year as f64).round() as usize
    }

    /// Validate the full configuration against an asset model. Fails fast;
    /// nothing here is retried.
    pub fn validate(&self, model: &AssetModel) -> Result<()> {
        if self.n_paths == 0 {
            return Err(SimError::invalid_config("number of paths must be positive"));
        }
        if !self.horizon_years.is_finite() || self.horizon_years <= 0.0 {
            return Err(SimError::invalid_config(format!(
                "horizon must be positive, got {}",
                self.horizon_years
            )));
        }
        if self.periods_per_year == 0 {
            return Err(SimError::invalid_config("periods per year must be positive"));
        }
        if self.periods() == 0 {
            return Err(SimError::invalid_config(
                "horizon and granularity produce zero periods",
            ));
        }
        if self.batch_size == 0 {
            return Err(SimError::invalid_config("batch size must be positive"));
        }
        if !self.confidence_level.is_finite()
            || self.confidence_level <= 0.0
            || self.confidence_level >= 1.0
        {
            return Err(SimError::invalid_config(format!(
                "confidence level must lie in (0, 1), got {}",
                self.confidence_level
            )));
        }
        for &p in &self.percentiles {
            if !p.is_finite() || !(0.0..=100.0).contains(&p) {
                return Err(SimError::invalid_config(format!(
                    "percentile must lie in [0, 100], got {}",
                    p
                )));
            }
        }
        if let Some(workers) = self.workers {
            if workers == 0 {
                return Err(SimError::invalid_config("worker override must be positive"));
            }
        }
        self.cash_flow.validate()?;
        self.jumps.validate()?;
        self.rebalance.validate()?;
        self.regimes.validate()?;
        self.portfolio.validate(model)?;
        Ok(())
    }
}

/// One realized trajectory. Immutable once produced by the simulator and
/// consumed only by the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationPath {
    /// Total portfolio value per period, including the starting value
    /// (length periods + 1). Never negative.
    pub values: Vec<f64>,
    /// Growth-only return per period, measured before cash flows
    /// (length periods).
    pub returns: Vec<f64>,
    /// Regime experienced each period. Empty when the run used a shared
    /// sequence (carried once on the result instead).
    pub regimes: Vec<Regime>,
    /// Per-period per-asset values when recording was enabled.
    pub asset_values: Option<Vec<Vec<f64>>>,
    /// Final total value.
    pub final_value: f64,
    /// Std of period returns, annualized by sqrt(periods per year).
    pub annualized_volatility: f64,
    /// Largest peak-to-trough fractional decline along the path.
    pub max_drawdown: f64,
    /// Annualized mean return over annualized volatility; 0 when volatility
    /// is 0.
    pub sharpe_ratio: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_asset_model() -> AssetModel {
        AssetModel::new(
            vec![
                AssetClass::new("stocks", 0.08, 0.15),
                AssetClass::new("bonds", 0.03, 0.05),
            ],
            vec![vec![1.0, 0.1], vec![0.1, 1.0]],
        )
    }

    #[test]
    fn test_default_parameters_validate() {
        let model = two_asset_model();
        SimulationParameters::default().validate(&model).unwrap();
    }

    #[test]
    fn test_zero_paths_rejected() {
        let model = two_asset_model();
        let params = SimulationParameters {
            n_paths: 0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(&model),
            Err(SimError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let model = two_asset_model();
        let params = SimulationParameters {
            portfolio: PortfolioInput::Allocation {
                initial_value: 1000.0,
                weights: Some(vec![0.7, 0.7]),
            },
            ..Default::default()
        };
        assert!(params.validate(&model).is_err());

        let ok = SimulationParameters {
            portfolio: PortfolioInput::Allocation {
                initial_value: 1000.0,
                weights: Some(vec![0.7, 0.3]),
            },
            ..Default::default()
        };
        ok.validate(&model).unwrap();
    }

    #[test]
    fn test_holdings_must_match_model() {
        let model = two_asset_model();
        let params = SimulationParameters {
            portfolio: PortfolioInput::Holdings {
                positions: vec![Holding {
                    asset: "gold".to_string(),
                    quantity: 10.0,
                    price: 100.0,
                }],
            },
            ..Default::default()
        };
        assert!(params.validate(&model).is_err());
    }

    #[test]
    fn test_holdings_initial_values() {
        let model = two_asset_model();
        let input = PortfolioInput::Holdings {
            positions: vec![Holding {
                asset: "bonds".to_string(),
                quantity: 50.0,
                price: 20.0,
            }],
        };
        let values = input.initial_values(&model, &[0.5, 0.5]);
        assert_eq!(values, vec![0.0, 1000.0]);
        assert_eq!(input.initial_total(), 1000.0);
    }

    #[test]
    fn test_allocation_falls_back_to_target() {
        let model = two_asset_model();
        let input = PortfolioInput::Allocation {
            initial_value: 1000.0,
            weights: None,
        };
        let values = input.initial_values(&model, &[0.25, 0.75]);
        assert_eq!(values, vec![250.0, 750.0]);
    }

    #[test]
    fn test_cash_flow_cadence_and_growth() {
        let schedule = CashFlowSchedule {
            amount: 100.0,
            every: 3,
            annual_growth: 0.1,
        };
        assert_eq!(schedule.amount_for(0, 12), 0.0);
        assert_eq!(schedule.amount_for(2, 12), 100.0);
        assert_eq!(schedule.amount_for(3, 12), 0.0);
        // Period 14 sits in the second year: one growth step.
        assert!((schedule.amount_for(14, 12) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_periods_rounding() {
        let params = SimulationParameters {
            horizon_years: 10.0,
            periods_per_year: 12,
            ..Default::default()
        };
        assert_eq!(params.periods(), 120);

        let fractional = SimulationParameters {
            horizon_years: 1.5,
            periods_per_year: 12,
            ..Default::default()
        };
        assert_eq!(fractional.periods(), 18);
    }

    #[test]
    fn test_duplicate_asset_rejected() {
        let model = AssetModel::new(
            vec![
                AssetClass::new("stocks", 0.08, 0.15),
                AssetClass::new("stocks", 0.03, 0.05),
            ],
            vec![vec![1.0, 0.1], vec![0.1, 1.0]],
        );
        assert!(model.validate().is_err());
    }
}
