//! Aggregation of simulated paths into reportable statistics.

pub mod summary;

pub use summary::{analyze, percentile, SummaryStatistics};
