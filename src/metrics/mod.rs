//! Performance metrics for vaultbt.

pub mod calculator;
pub mod drawdown;
pub mod streaming;

pub use calculator::{MetricsCalculator, PerformanceMetrics};
pub use drawdown::DrawdownTracker;
pub use streaming::ReturnStream;
