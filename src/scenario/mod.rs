//! Economic regime scenario generation for PortSim.

pub mod generator;
pub mod regime;
pub mod transition;

pub use generator::{occupancy, RegimeModel, RegimeSampling};
pub use regime::{default_regime_params, Regime, RegimeParams};
pub use transition::TransitionMatrix;
