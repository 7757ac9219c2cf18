//! Core types and utilities for vaultbt.

pub mod config;
pub mod error;
pub mod math;
pub mod timeseries;
pub mod types;

pub use config::VaultBtConfig;
pub use error::{Result, VaultError};
pub use math::WAD;
pub use timeseries::TimeSeries;
pub use types::*;
