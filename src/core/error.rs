//! Error types for PortSim.

use thiserror::Error;

/// Result type alias for PortSim operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Error types for the simulation and optimization engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Malformed input configuration or asset model. Raised before any
    /// simulation work starts and never retried internally.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The optimizer returned a best-effort result without meeting its
    /// convergence tolerance. Produced by `RiskParityWeights::ensure_converged`
    /// for callers that treat a degenerate result as fatal.
    #[error("Degenerate optimization: {message}")]
    OptimizationDegenerate { message: String },

    /// Numerical failure while generating one batch of paths. Carries the
    /// batch index and seed so the failing batch can be replayed alone.
    #[error("Simulation failed in batch {batch} (seed {seed}): {message}")]
    Simulation {
        batch: usize,
        seed: u64,
        message: String,
    },

    /// Covariance or correlation matrix could not be factored, even after
    /// regularization.
    #[error("Decomposition failed: {message}")]
    Decomposition { message: String },

    /// Worker pool could not be constructed.
    #[error("Worker pool error: {message}")]
    WorkerPool { message: String },
}

impl SimError {
    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a degenerate optimization error.
    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::OptimizationDegenerate {
            message: message.into(),
        }
    }

    /// Create a simulation error with batch context.
    pub fn simulation(batch: usize, seed: u64, message: impl Into<String>) -> Self {
        Self::Simulation {
            batch,
            seed,
            message: message.into(),
        }
    }

    /// Create a decomposition error.
    pub fn decomposition(message: impl Into<String>) -> Self {
        Self::Decomposition {
            message: message.into(),
        }
    }

    /// Create a worker pool error.
    pub fn worker_pool(message: impl Into<String>) -> Self {
        Self::WorkerPool {
            message: message.into(),
        }
    }
}
