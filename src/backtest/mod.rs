//! Backtest driver and reports.

pub mod framework;
pub mod report;

pub use framework::{BacktestFailure, BacktestWindow, BacktestingFramework, Scenario, ScenarioOutcome};
pub use report::{export_metrics_json, export_results_csv, format_summary, metrics_json, write_results_csv};
