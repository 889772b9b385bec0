//! Batch-parallel simulation driver.
//!
//! Paths are produced in fixed-size batches. Each batch seeds its own
//! generator from the run seed and the batch index alone, so results are
//! identical for a given (seed, batch size) no matter how many workers the
//! batches land on.

use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analyzer::SummaryStatistics;
use crate::core::error::{Result, SimError};
use crate::core::types::{validate_weights, AssetModel, SimulationParameters, SimulationPath};
use crate::optimizer::{self, RiskParityConfig, RiskParityWeights};
use crate::scenario::{Regime, RegimeSampling};
use crate::simulator::path::{simulate_batch, PathContext};

/// Seed stream reserved for the shared regime sequence, outside the batch
/// index range.
const SCENARIO_STREAM: u64 = u64::MAX;

/// Derive an independent seed from the run seed and a stream index with a
/// SplitMix64-style finalizer.
pub(crate) fn batch_seed(run_seed: u64, stream: u64) -> u64 {
    let mut z = run_seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Everything a finished run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// All simulated paths, in path order.
    pub paths: Vec<SimulationPath>,
    /// Distribution statistics over the paths.
    pub summary: SummaryStatistics,
    /// Target weights the paths rebalanced toward, with their risk
    /// decomposition.
    pub target_weights: RiskParityWeights,
    /// The regime sequence shared by all paths, when the run sampled one.
    pub shared_regimes: Option<Vec<Regime>>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Parameters the run was produced with.
    pub parameters: SimulationParameters,
}

/// Monte Carlo portfolio simulator.
pub struct PathSimulator {
    model: AssetModel,
    params: SimulationParameters,
    target: Option<Vec<f64>>,
}

impl PathSimulator {
    pub fn new(model: AssetModel, params: SimulationParameters) -> Self {
        Self {
            model,
            params,
            target: None,
        }
    }

    /// Use explicit target weights instead of running the optimizer.
    pub fn with_target_weights(mut self, weights: Vec<f64>) -> Self {
        self.target = Some(weights);
        self
    }

    /// Run the full simulation: resolve target weights, simulate every
    /// batch, and analyze the resulting distribution.
    pub fn run(&self) -> Result<SimulationResult> {
        let started = Instant::now();
        self.model.validate()?;
        self.params.validate(&self.model)?;

        let target_weights = self.resolve_target()?;
        let target = target_weights.weights.clone();

        let shock_transform = self.model.correlation_matrix()?.cholesky_factor()?;

        let periods = self.params.periods();
        let shared_regimes = match self.params.regimes.sampling {
            RegimeSampling::Shared => {
                let seed = batch_seed(self.params.seed, SCENARIO_STREAM);
                let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
                Some(self.params.regimes.generate(periods, &mut rng))
            }
            RegimeSampling::PerPath => None,
        };

        let ctx = PathContext::new(
            &self.model,
            &self.params,
            &target,
            &shock_transform,
            shared_regimes.as_deref(),
        )?;

        let n_paths = self.params.n_paths;
        let batch_size = self.params.batch_size;
        let n_batches = (n_paths + batch_size - 1) / batch_size;
        info!(
            "Simulating {} paths over {} periods in {} batches",
            n_paths, periods, n_batches
        );

        let seed = self.params.seed;
        let run_batches = || {
            (0..n_batches)
                .into_par_iter()
                .map(|b| {
                    let count = batch_size.min(n_paths - b * batch_size);
                    simulate_batch(&ctx, b, count, batch_seed(seed, b as u64))
                })
                .collect::<Vec<Result<Vec<SimulationPath>>>>()
        };
        let batch_results = match self.params.workers {
            Some(workers) => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| SimError::worker_pool(e.to_string()))?;
                pool.install(run_batches)
            }
            None => run_batches(),
        };

        let mut paths = Vec::with_capacity(n_paths);
        let mut failures = Vec::new();
        for result in batch_results {
            match result {
                Ok(batch) => paths.extend(batch),
                Err(err) => failures.push(err),
            }
        }
        if failures.len() > self.params.max_failed_batches {
            return Err(failures.swap_remove(0));
        }
        if !failures.is_empty() {
            warn!(
                "Tolerating {} failed batches out of {}",
                failures.len(),
                n_batches
            );
        }

        let summary = crate::analyzer::analyze(
            &paths,
            &self.params.percentiles,
            self.params.confidence_level,
            self.params.portfolio.initial_total(),
        )?;

        let elapsed = started.elapsed();
        debug!("Simulated {} paths in {:?}", paths.len(), elapsed);

        Ok(SimulationResult {
            paths,
            summary,
            target_weights,
            shared_regimes,
            elapsed,
            parameters: self.params.clone(),
        })
    }

    /// Explicit weights pass through with their risk decomposition computed;
    /// otherwise the optimizer supplies risk-parity weights.
    fn resolve_target(&self) -> Result<RiskParityWeights> {
        let cov = self.model.covariance()?;
        match &self.target {
            Some(weights) => {
                validate_weights(weights, self.model.n_assets())?;
                let n = weights.len();
                Ok(crate::optimizer::risk_parity::finalize(
                    self.model.names(),
                    weights.clone(),
                    &vec![1.0 / n as f64; n],
                    &cov,
                    0,
                    false,
                ))
            }
            None => {
                let config = RiskParityConfig::for_model(&self.model);
                optimizer::optimize(&cov, &config)
            }
        }
    }
}
