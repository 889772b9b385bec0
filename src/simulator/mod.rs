//! Batch-parallel Monte Carlo path simulation.

pub mod engine;
pub(crate) mod path;

pub use engine::{PathSimulator, SimulationResult};
