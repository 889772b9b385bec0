//! Core data structures and error types for PortSim.

pub mod covariance;
pub mod error;
pub mod types;

pub use covariance::CovarianceMatrix;
pub use error::{Result, SimError};
pub use types::{
    validate_weights, AssetClass, AssetModel, CashFlowSchedule, Holding, JumpConfig,
    PortfolioInput, RebalancePolicy, SimulationParameters, SimulationPath, WEIGHT_SUM_TOL,
};
