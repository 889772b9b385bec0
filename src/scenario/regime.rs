//! Market regime states and regime-conditioned return adjustments.

use serde::{Deserialize, Serialize};

/// Discrete macro-market state. Transitions between states follow a Markov
/// chain; each state scales the asset model's means, volatilities, and jump
/// probability while it is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    /// Sustained growth, mildly suppressed volatility.
    Expansion,
    /// Contraction: negative drift, elevated volatility and jump risk.
    Recession,
    /// Post-contraction rebound with above-trend drift.
    Recovery,
    /// Weak growth with persistent elevated volatility.
    Stagflation,
}

impl Regime {
    /// Number of regime states.
    pub const COUNT: usize = 4;

    /// All states in index order.
    pub const ALL: [Regime; Regime::COUNT] = [
        Regime::Expansion,
        Regime::Recession,
        Regime::Recovery,
        Regime::Stagflation,
    ];

    /// Index of this state into transition rows and parameter tables.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Regime::Expansion => 0,
            Regime::Recession => 1,
            Regime::Recovery => 2,
            Regime::Stagflation => 3,
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Regime::Expansion => "expansion",
            Regime::Recession => "recession",
            Regime::Recovery => "recovery",
            Regime::Stagflation => "stagflation",
        }
    }
}

/// Return adjustments applied while a regime is active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeParams {
    /// Multiplier on each asset's expected annual return.
    pub mean_multiplier: f64,
    /// Multiplier on each asset's annual volatility.
    pub vol_multiplier: f64,
    /// Multiplier on the per-period jump probability.
    pub jump_multiplier: f64,
}

impl RegimeParams {
    /// Parameters that leave the asset model unchanged.
    pub fn neutral() -> Self {
        Self {
            mean_multiplier: 1.0,
            vol_multiplier: 1.0,
            jump_multiplier: 1.0,
        }
    }

    pub(crate) fn validate(&self, regime: Regime) -> crate::core::error::Result<()> {
        let checks = [
            ("mean_multiplier", self.mean_multiplier),
            ("vol_multiplier", self.vol_multiplier),
            ("jump_multiplier", self.jump_multiplier),
        ];
        for (name, value) in checks {
            if !value.is_finite() {
                return Err(crate::core::error::SimError::invalid_config(format!(
                    "{} for {} must be finite, got {}",
                    name,
                    regime.label(),
                    value
                )));
            }
        }
        if self.vol_multiplier < 0.0 || self.jump_multiplier < 0.0 {
            return Err(crate::core::error::SimError::invalid_config(format!(
                "volatility and jump multipliers for {} must be non-negative",
                regime.label()
            )));
        }
        Ok(())
    }
}

/// Default per-regime adjustments, indexed by [`Regime::index`].
pub fn default_regime_params() -> [RegimeParams; Regime::COUNT] {
    [
        // Expansion
        RegimeParams {
            mean_multiplier: 1.2,
            vol_multiplier: 0.9,
            jump_multiplier: 0.8,
        },
        // Recession
        RegimeParams {
            mean_multiplier: -0.5,
            vol_multiplier: 1.6,
            jump_multiplier: 2.0,
        },
        // Recovery
        RegimeParams {
            mean_multiplier: 1.5,
            vol_multiplier: 1.2,
            jump_multiplier: 1.0,
        },
        // Stagflation
        RegimeParams {
            mean_multiplier: 0.3,
            vol_multiplier: 1.3,
            jump_multiplier: 1.5,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        for regime in Regime::ALL {
            assert_eq!(Regime::ALL[regime.index()], regime);
        }
    }

    #[test]
    fn test_default_params_valid() {
        for (i, params) in default_regime_params().iter().enumerate() {
            params.validate(Regime::ALL[i]).unwrap();
        }
    }

    #[test]
    fn test_negative_vol_multiplier_rejected() {
        let params = RegimeParams {
            mean_multiplier: 1.0,
            vol_multiplier: -0.1,
            jump_multiplier: 1.0,
        };
        assert!(params.validate(Regime::Expansion).is_err());
    }
}
