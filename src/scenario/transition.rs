//! Regime transition probabilities with Markov sampling.

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SimError};
use crate::scenario::regime::Regime;

/// Tolerance on each row summing to 1.
const ROW_SUM_TOL: f64 = 1e-6;

/// Row-stochastic transition matrix over the regime states.
///
/// `rows[from][to]` is the probability of moving from `from` to `to` over one
/// period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionMatrix {
    rows: [[f64; Regime::COUNT]; Regime::COUNT],
}

impl TransitionMatrix {
    /// Build a transition matrix, rejecting rows that do not sum to 1.
    pub fn new(rows: [[f64; Regime::COUNT]; Regime::COUNT]) -> Result<Self> {
        let matrix = Self { rows };
        matrix.validate()?;
        Ok(matrix)
    }

    /// Check every entry is a finite probability and every row sums to 1.
    ///
    /// Re-run by [`crate::core::types::SimulationParameters::validate`] so
    /// deserialized matrices get the same treatment as constructed ones.
    pub fn validate(&self) -> Result<()> {
        for (i, row) in self.rows.iter().enumerate() {
            let mut sum = 0.0;
            for (j, &p) in row.iter().enumerate() {
                if !p.is_finite() || p < 0.0 {
                    return Err(SimError::invalid_config(format!(
                        "transition probability [{},{}] must be a finite non-negative value, got {}",
                        i, j, p
                    )));
                }
                sum += p;
            }
            if (sum - 1.0).abs() > ROW_SUM_TOL {
                return Err(SimError::invalid_config(format!(
                    "transition row {} ({}) sums to {}, expected 1",
                    i,
                    Regime::ALL[i].label(),
                    sum
                )));
            }
        }
        Ok(())
    }

    /// Probability of moving from `from` to `to` in one period.
    #[inline]
    pub fn probability(&self, from: Regime, to: Regime) -> f64 {
        self.rows[from.index()][to.index()]
    }

    /// Sample the next regime given a uniform draw in [0, 1).
    pub fn sample_next(&self, current: Regime, draw: f64) -> Regime {
        let row = &self.rows[current.index()];
        let mut cumulative = 0.0;
        for (j, &p) in row.iter().enumerate() {
            cumulative += p;
            if draw < cumulative {
                return Regime::ALL[j];
            }
        }
        // Cumulative shortfall from rounding: land on the last reachable state.
        for j in (0..Regime::COUNT).rev() {
            if row[j] > 0.0 {
                return Regime::ALL[j];
            }
        }
        current
    }
}

impl Default for TransitionMatrix {
    /// Persistent regimes with occasional transitions; rows are ordered
    /// expansion, recession, recovery, stagflation.
    fn default() -> Self {
        Self {
            rows: [
                [0.88, 0.06, 0.02, 0.04],
                [0.05, 0.75, 0.15, 0.05],
                [0.20, 0.05, 0.70, 0.05],
                [0.10, 0.15, 0.05, 0.70],
            ],
        }
    }
}
