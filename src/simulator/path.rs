//! Single-path simulation.
//!
//! Each period applies, in order: regime selection, correlated return
//! shocks, an optional jump shock, asset growth, scheduled cash flows,
//! calendar rebalancing, and the non-negativity clamp. Every random draw
//! comes from the batch generator passed in, so a batch replays exactly
//! from its seed.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::core::error::{Result, SimError};
use crate::core::types::{AssetModel, SimulationParameters, SimulationPath};
use crate::metrics::{DrawdownTracker, StreamingMoments};
use crate::scenario::Regime;

/// Immutable per-run state shared by every batch.
pub(crate) struct PathContext<'a> {
    model: &'a AssetModel,
    params: &'a SimulationParameters,
    target: &'a [f64],
    /// Lower Cholesky factor of the asset correlation matrix.
    shock_transform: &'a DMatrix<f64>,
    /// Regime sequence shared by all paths, when the run samples one.
    shared_regimes: Option<&'a [Regime]>,
    /// Per-regime, per-asset (period mean, period volatility).
    adjusted: [Vec<(f64, f64)>; Regime::COUNT],
    /// Per-regime jump probability, already clamped to [0, 1].
    jump_probability: [f64; Regime::COUNT],
    jump_dist: Normal<f64>,
    periods: usize,
}

impl<'a> PathContext<'a> {
    pub(crate) fn new(
        model: &'a AssetModel,
        params: &'a SimulationParameters,
        target: &'a [f64],
        shock_transform: &'a DMatrix<f64>,
        shared_regimes: Option<&'a [Regime]>,
    ) -> Result<Self> {
        let ppy = params.periods_per_year as f64;
        let sqrt_ppy = ppy.sqrt();

        let mut adjusted: [Vec<(f64, f64)>; Regime::COUNT] = Default::default();
        let mut jump_probability = [0.0; Regime::COUNT];
        for regime in Regime::ALL {
            let rp = params.regimes.params(regime);
            adjusted[regime.index()] = model
                .assets
                .iter()
                .map(|asset| {
                    (
                        asset.expected_return * rp.mean_multiplier / ppy,
                        asset.volatility * rp.vol_multiplier / sqrt_ppy,
                    )
                })
                .collect();
            jump_probability[regime.index()] =
                (params.jumps.probability * rp.jump_multiplier).clamp(0.0, 1.0);
        }

        let jump_dist = Normal::new(params.jumps.mean, params.jumps.std_dev)
            .map_err(|e| SimError::invalid_config(format!("jump distribution: {}", e)))?;

        Ok(Self {
            model,
            params,
            target,
            shock_transform,
            shared_regimes,
            adjusted,
            jump_probability,
            jump_dist,
            periods: params.periods(),
        })
    }
}

/// Simulate one batch of paths from its derived seed. Any path failure
/// aborts the batch and carries the batch index and seed for replay.
pub(crate) fn simulate_batch(
    ctx: &PathContext<'_>,
    batch_index: usize,
    count: usize,
    seed: u64,
) -> Result<Vec<SimulationPath>> {
    use rand::SeedableRng;
    let mut rng = rand_xoshiro::Xoshiro256StarStar::seed_from_u64(seed);
    let mut paths = Vec::with_capacity(count);
    for _ in 0..count {
        let path = simulate_path(ctx, &mut rng)
            .map_err(|message| SimError::simulation(batch_index, seed, message))?;
        paths.push(path);
    }
    Ok(paths)
}

fn simulate_path<R: Rng + ?Sized>(
    ctx: &PathContext<'_>,
    rng: &mut R,
) -> std::result::Result<SimulationPath, String> {
    let n = ctx.model.n_assets();
    let ppy = ctx.params.periods_per_year;
    let jumps_enabled = ctx.params.jumps.probability > 0.0;

    let mut values = ctx.params.portfolio.initial_values(ctx.model, ctx.target);
    let mut total: f64 = values.iter().sum();

    let mut recorded = Vec::with_capacity(ctx.periods + 1);
    recorded.push(total);
    let mut returns = Vec::with_capacity(ctx.periods);
    let mut regimes = match ctx.shared_regimes {
        Some(_) => Vec::new(),
        None => Vec::with_capacity(ctx.periods),
    };
    let mut asset_track = if ctx.params.record_asset_values {
        let mut track = Vec::with_capacity(ctx.periods + 1);
        track.push(values.clone());
        Some(track)
    } else {
        None
    };

    let mut moments = StreamingMoments::new();
    let mut drawdown = DrawdownTracker::new();
    drawdown.update(total);

    let mut current_regime = ctx.params.regimes.initial;

    for t in 0..ctx.periods {
        let regime = match ctx.shared_regimes {
            Some(sequence) => sequence[t],
            None => {
                current_regime = ctx
                    .params
                    .regimes
                    .transition
                    .sample_next(current_regime, rng.gen());
                regimes.push(current_regime);
                current_regime
            }
        };

        let z = DVector::from_fn(n, |_, _| rng.sample::<f64, _>(StandardNormal));
        let shocks = ctx.shock_transform * &z;

        // One draw decides the jump, one more sizes it. Neither draw is
        // consumed when jumps are disabled.
        let mut jump = 0.0;
        if jumps_enabled {
            let p = ctx.jump_probability[regime.index()];
            if rng.gen::<f64>() < p {
                jump = ctx.jump_dist.sample(rng);
            }
        }

        let base = total;
        let adjusted = &ctx.adjusted[regime.index()];
        for i in 0..n {
            let (mean, vol) = adjusted[i];
            let r = mean + vol * shocks[i] + jump;
            values[i] *= 1.0 + r;
        }
        let grown: f64 = values.iter().sum();
        let period_return = if base > 0.0 { grown / base - 1.0 } else { 0.0 };

        // Cash flows scale positions pro-rata; deposits into an empty
        // portfolio land at the target weights.
        let flow = ctx.params.cash_flow.amount_for(t, ppy);
        if flow != 0.0 {
            if grown > 0.0 {
                let factor = (grown + flow).max(0.0) / grown;
                for v in values.iter_mut() {
                    *v *= factor;
                }
            } else if flow > 0.0 {
                for (v, w) in values.iter_mut().zip(ctx.target) {
                    *v = flow * w;
                }
            }
        }

        let every = ctx.params.rebalance.every;
        if every > 0 && (t as u64 + 1) % every as u64 == 0 {
            let current: f64 = values.iter().sum();
            if current > 0.0 {
                let skip = match ctx.params.rebalance.drift_threshold {
                    Some(threshold) => {
                        let max_drift = values
                            .iter()
                            .zip(ctx.target)
                            .map(|(v, w)| (v / current - w).abs())
                            .fold(0.0, f64::max);
                        max_drift < threshold
                    }
                    None => false,
                };
                if !skip {
                    for (v, w) in values.iter_mut().zip(ctx.target) {
                        *v = current * w;
                    }
                }
            }
        }

        for v in values.iter_mut() {
            if *v < 0.0 {
                *v = 0.0;
            }
        }
        total = values.iter().sum();
        if !total.is_finite() {
            return Err(format!("non-finite portfolio value at period {}", t));
        }

        recorded.push(total);
        returns.push(period_return);
        moments.update(period_return);
        drawdown.update(total);
        if let Some(track) = &mut asset_track {
            track.push(values.clone());
        }
    }

    Ok(SimulationPath {
        values: recorded,
        returns,
        regimes,
        asset_values: asset_track,
        final_value: total,
        annualized_volatility: moments.annualized_volatility(ppy),
        max_drawdown: drawdown.max_drawdown(),
        sharpe_ratio: moments.sharpe_ratio(ppy),
    })
}
