//! Vault simulation over historical series.

pub mod asset;
pub mod config;
pub mod engine;

pub use asset::{AssetConfig, SimulatedAsset};
pub use config::{JumpGuard, JumpPolicy, SimulationConfig};
pub use engine::VaultSimulationEngine;
