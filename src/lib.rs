// Suppress warning from PyO3 macro expansion (fixed in newer PyO3 versions)
#![cfg_attr(feature = "python", allow(non_local_definitions))]

//! vaultbt - Capital allocation, rebalancing and backtesting for index-fund vaults.
//!
//! This crate provides:
//! - A capital allocation manager splitting funds across synthetic RWA
//!   tokens, yield strategies and a liquidity buffer
//! - A stepwise vault simulation engine over historical price and yield data
//! - A backtesting framework with parallel scenario runs
//! - WAD-exact drawdown and streaming return metrics
//! - CSV, JSON and text reports

pub mod allocation;
pub mod backtest;
pub mod core;
pub mod data;
pub mod execution;
pub mod interfaces;
pub mod metrics;
#[cfg(feature = "python")]
pub mod python;
pub mod simulation;

pub use crate::allocation::CapitalAllocationManager;
pub use crate::backtest::{BacktestFailure, BacktestingFramework};
pub use crate::core::{Result, VaultBtConfig, VaultError};
pub use crate::data::HistoricalDataProvider;
pub use crate::metrics::{MetricsCalculator, PerformanceMetrics};
pub use crate::simulation::{AssetConfig, SimulationConfig, VaultSimulationEngine};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module entry point
#[cfg(feature = "python")]
#[pymodule]
fn _vaultbt(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    // Register config classes
    m.add_class::<python::bindings::PySimulationConfig>()?;
    m.add_class::<python::bindings::PyAssetConfig>()?;

    // Register result classes
    m.add_class::<python::bindings::PyBacktestResult>()?;
    m.add_class::<python::bindings::PyBacktestMetrics>()?;

    // Register backtest functions
    m.add_function(wrap_pyfunction!(python::bindings::run_synthetic_backtest, m)?)?;
    m.add_function(wrap_pyfunction!(python::bindings::run_price_backtest, m)?)?;
    m.add_function(wrap_pyfunction!(python::bindings::max_drawdown, m)?)?;

    Ok(())
}
