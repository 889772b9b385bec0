//! Per-path metric accumulators.

pub mod drawdown;
pub mod streaming;

pub use drawdown::{max_drawdown, DrawdownTracker};
pub use streaming::StreamingMoments;
