//! Historical market data.

pub mod provider;
pub mod synthetic;

pub use provider::{HistoricalDataProvider, HistoricalOracle};
pub use synthetic::{generate_paths, SyntheticAsset, SyntheticPath};
