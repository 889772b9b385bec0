//! PortSim: Monte Carlo portfolio simulation with risk-based allocation.
//!
//! The engine simulates portfolio trajectories under a regime-switching
//! return model with correlated shocks, jump risk, cash flows, and calendar
//! rebalancing, then aggregates the paths into distribution statistics.
//! Target weights come from a risk-parity optimizer unless supplied
//! explicitly.
//!
//! Runs are reproducible: paths are generated in fixed-size batches whose
//! seeds derive only from the run seed and the batch index, so the same
//! configuration produces identical results at any worker count.
//!
//! ```
//! use portsim::{simulate_portfolio, AssetClass, AssetModel, SimulationParameters};
//!
//! let model = AssetModel::new(
//!     vec![
//!         AssetClass::new("stocks", 0.08, 0.15),
//!         AssetClass::new("bonds", 0.03, 0.05),
//!     ],
//!     vec![vec![1.0, 0.1], vec![0.1, 1.0]],
//! );
//! let params = SimulationParameters {
//!     n_paths: 200,
//!     horizon_years: 5.0,
//!     ..Default::default()
//! };
//! let result = simulate_portfolio(&model, &params, None).unwrap();
//! assert_eq!(result.paths.len(), 200);
//! ```

pub mod analyzer;
pub mod core;
pub mod metrics;
pub mod optimizer;
pub mod scenario;
pub mod simulator;

pub use crate::core::{
    validate_weights, AssetClass, AssetModel, CashFlowSchedule, CovarianceMatrix, Holding,
    JumpConfig, PortfolioInput, RebalancePolicy, Result, SimError, SimulationParameters,
    SimulationPath,
};
pub use analyzer::SummaryStatistics;
pub use optimizer::{
    compute_weights, GradientSettings, NewtonSettings, RiskBudget, RiskParityConfig,
    RiskParityWeights, SectorLimit, WeightScheme,
};
pub use scenario::{Regime, RegimeModel, RegimeParams, RegimeSampling, TransitionMatrix};
pub use simulator::{PathSimulator, SimulationResult};

/// Simulate portfolio trajectories for an asset model. With
/// `target_weights: None` the risk-parity optimizer supplies the target
/// allocation; explicit weights skip the optimizer.
pub fn simulate_portfolio(
    asset_model: &AssetModel,
    parameters: &SimulationParameters,
    target_weights: Option<&[f64]>,
) -> Result<SimulationResult> {
    let mut simulator = PathSimulator::new(asset_model.clone(), parameters.clone());
    if let Some(weights) = target_weights {
        simulator = simulator.with_target_weights(weights.to_vec());
    }
    simulator.run()
}

/// Risk-parity weights for a covariance matrix under the given
/// configuration. Budget-only problems take a damped Newton fast path;
/// bounds, sector limits, and leverage route to the constrained solver.
pub fn optimize_risk_parity(
    covariance: &CovarianceMatrix,
    config: &RiskParityConfig,
) -> Result<RiskParityWeights> {
    optimizer::optimize(covariance, config)
}
