//! Markov-chain regime sequence generation.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::scenario::regime::{default_regime_params, Regime, RegimeParams};
use crate::scenario::transition::TransitionMatrix;

/// How regime sequences fan out across simulated paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegimeSampling {
    /// Every path draws its own regime sequence. Path-to-path regime
    /// independence; higher cross-path variance.
    #[default]
    PerPath,
    /// One sequence is drawn per run and shared by all paths: a single macro
    /// scenario with dispersion coming only from asset shocks.
    Shared,
}

/// Complete regime model: transition structure, per-regime adjustments, the
/// starting state, and how sequences are shared across paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeModel {
    /// Row-stochastic transition matrix.
    pub transition: TransitionMatrix,
    /// Adjustment parameters indexed by [`Regime::index`].
    pub params: [RegimeParams; Regime::COUNT],
    /// State occupied before the first period's draw.
    pub initial: Regime,
    /// Per-path or shared sequence generation.
    pub sampling: RegimeSampling,
}

impl Default for RegimeModel {
    fn default() -> Self {
        Self {
            transition: TransitionMatrix::default(),
            params: default_regime_params(),
            initial: Regime::Recovery,
            sampling: RegimeSampling::PerPath,
        }
    }
}

impl RegimeModel {
    /// A model whose single reachable state applies no adjustment. Useful for
    /// callers that want regime-free dynamics without a separate code path.
    pub fn neutral() -> Self {
        let mut rows = [[0.0; Regime::COUNT]; Regime::COUNT];
        for row in rows.iter_mut() {
            row[0] = 1.0;
        }
        Self {
            // Rows are valid by construction.
            transition: TransitionMatrix::new(rows).unwrap_or_default(),
            params: [RegimeParams::neutral(); Regime::COUNT],
            initial: Regime::Expansion,
            sampling: RegimeSampling::PerPath,
        }
    }

    /// Validate the transition matrix and every regime's parameters.
    pub fn validate(&self) -> Result<()> {
        self.transition.validate()?;
        for (i, params) in self.params.iter().enumerate() {
            params.validate(Regime::ALL[i])?;
        }
        Ok(())
    }

    /// Adjustment parameters for a regime.
    #[inline]
    pub fn params(&self, regime: Regime) -> RegimeParams {
        self.params[regime.index()]
    }

    /// Generate a regime sequence of exactly `periods` states.
    ///
    /// Starts from [`RegimeModel::initial`] and records the drawn state each
    /// period; a request for 0 periods yields an empty sequence.
    pub fn generate<R: Rng + ?Sized>(&self, periods: usize, rng: &mut R) -> Vec<Regime> {
        let mut sequence = Vec::with_capacity(periods);
        let mut current = self.initial;
        for _ in 0..periods {
            current = self.transition.sample_next(current, rng.gen::<f64>());
            sequence.push(current);
        }
        sequence
    }
}

/// Fraction of periods spent in each regime, indexed by [`Regime::index`].
pub fn occupancy(sequence: &[Regime]) -> [f64; Regime::COUNT] {
    let mut counts = [0usize; Regime::COUNT];
    for regime in sequence {
        counts[regime.index()] += 1;
    }
    let total = sequence.len().max(1) as f64;
    let mut fractions = [0.0; Regime::COUNT];
    for (f, c) in fractions.iter_mut().zip(counts) {
        *f = c as f64 / total;
    }
    fractions
}
