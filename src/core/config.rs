//! TOML run configuration.
//!
//! A config file describes one backtest: simulation costs, the time window,
//! and the index constituents with the GBM parameters used to synthesize
//! their price history when no CSV data is supplied.

use std::path::{Path, PathBuf};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use super::error::{Result, VaultError};
use super::math::f64_to_wad;
use super::types::{asset_id, Bps, ExposureKind, Timestamp, BPS_DENOMINATOR};
use crate::data::{HistoricalDataProvider, SyntheticAsset};
use crate::execution::{FillModel, GasModel, SlippageModel};
use crate::simulation::{AssetConfig, JumpGuard, JumpPolicy, SimulationConfig};

/// Root of a vaultbt TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultBtConfig {
    pub simulation: SimulationSection,
    pub backtest: BacktestSection,
    pub assets: Vec<AssetSection>,
}

/// `[simulation]` table. USD amounts are plain decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    pub initial_deposit: f64,
    pub rebalance_threshold_bps: Bps,
    /// Seconds; 0 disables scheduled rebalances.
    pub rebalance_interval: u64,
    pub management_fee_bps: Bps,
    /// Flat gas per rebalance.
    pub gas_base: f64,
    /// Additional gas per executed trade.
    pub gas_per_trade: f64,
    pub slippage_bps: Bps,
    /// Turnover cap per rebalance; 0 fills every trade in full.
    pub max_turnover_bps: Bps,
    pub max_growth_bps: Bps,
    pub jump_policy: JumpPolicy,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            initial_deposit: 10_000.0,
            rebalance_threshold_bps: 500,
            rebalance_interval: 0,
            management_fee_bps: 0,
            gas_base: 0.0,
            gas_per_trade: 0.0,
            slippage_bps: 0,
            max_turnover_bps: 0,
            max_growth_bps: 20_000,
            jump_policy: JumpPolicy::Abort,
        }
    }
}

impl SimulationSection {
    /// Convert to engine parameters.
    pub fn to_simulation_config(&self) -> Result<SimulationConfig> {
        if !(self.initial_deposit > 0.0) || !self.initial_deposit.is_finite() {
            return Err(VaultError::invalid_config(
                "simulation.initial_deposit must be positive",
            ));
        }
        if !(self.gas_base >= 0.0) || !(self.gas_per_trade >= 0.0) {
            return Err(VaultError::invalid_config("gas amounts must be non-negative"));
        }
        if self.slippage_bps > BPS_DENOMINATOR || self.max_turnover_bps > BPS_DENOMINATOR {
            return Err(VaultError::invalid_config(
                "slippage_bps and max_turnover_bps must not exceed 10000",
            ));
        }

        let gas_model = match (f64_to_wad(self.gas_base), f64_to_wad(self.gas_per_trade)) {
            (base, per_trade) if base.is_zero() && per_trade.is_zero() => GasModel::None,
            (base, per_trade) if per_trade.is_zero() => GasModel::fixed(base),
            (base, per_trade) => GasModel::per_trade(base, per_trade),
        };
        let slippage_model = match self.slippage_bps {
            0 => SlippageModel::None,
            bps => SlippageModel::bps(bps),
        };
        let fill_model = match self.max_turnover_bps {
            0 => FillModel::Full,
            bps => FillModel::partial(bps),
        };

        Ok(SimulationConfig::new(f64_to_wad(self.initial_deposit))
            .with_threshold(self.rebalance_threshold_bps)
            .with_interval(self.rebalance_interval)
            .with_management_fee(self.management_fee_bps)
            .with_gas_model(gas_model)
            .with_slippage_model(slippage_model)
            .with_fill_model(fill_model)
            .with_jump_guard(JumpGuard {
                max_growth_bps: self.max_growth_bps,
                policy: self.jump_policy,
            }))
    }
}

/// `[backtest]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    pub start: Timestamp,
    pub end: Timestamp,
    /// Seconds between steps.
    pub step: u64,
    /// Seed for synthetic price paths.
    pub seed: u64,
    pub risk_free_bps: Bps,
    /// Recorded `kind,id,timestamp,value` rows; synthetic paths are used when absent.
    pub data: Option<PathBuf>,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            start: 0,
            end: 365 * 86_400,
            step: 86_400,
            seed: 42,
            risk_free_bps: 0,
            data: None,
        }
    }
}

/// One `[[assets]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetSection {
    pub symbol: String,
    /// Hex address; derived from the symbol when empty.
    pub address: Option<String>,
    pub weight_bps: Bps,
    pub exposure: ExposureKind,
    /// Annual yield paid by the wrapper; 0 for a non-yielding asset.
    pub yield_bps: Bps,
    /// Wrapper symbol or address; defaults to `<symbol>-yield`.
    pub wrapper: Option<String>,
    pub initial_price: f64,
    pub drift: f64,
    pub volatility: f64,
}

impl Default for AssetSection {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            address: None,
            weight_bps: 0,
            exposure: ExposureKind::DirectToken,
            yield_bps: 0,
            wrapper: None,
            initial_price: 100.0,
            drift: 0.0,
            volatility: 0.0,
        }
    }
}

impl AssetSection {
    pub fn asset(&self) -> Address {
        asset_id(self.address.as_deref().unwrap_or(&self.symbol))
    }

    pub fn wrapper(&self) -> Address {
        match &self.wrapper {
            Some(wrapper) => asset_id(wrapper),
            None => asset_id(&format!("{}-yield", self.symbol)),
        }
    }

    pub fn asset_config(&self) -> AssetConfig {
        let config =
            AssetConfig::new(self.asset(), &self.symbol, self.weight_bps).with_exposure(self.exposure);
        if self.yield_bps > 0 {
            config.with_yield(self.wrapper())
        } else {
            config
        }
    }

    pub fn synthetic_asset(&self) -> SyntheticAsset {
        let asset =
            SyntheticAsset::new(self.asset(), self.initial_price).with_gbm(self.drift, self.volatility);
        if self.yield_bps > 0 {
            asset.with_yield(self.wrapper(), self.yield_bps)
        } else {
            asset
        }
    }
}

impl VaultBtConfig {
    /// Load and validate a config file.
    pub fn from_toml(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the window and the asset list.
    pub fn validate(&self) -> Result<()> {
        if self.backtest.start >= self.backtest.end {
            return Err(VaultError::invalid_config("backtest.start must precede backtest.end"));
        }
        if self.backtest.step == 0 {
            return Err(VaultError::invalid_config("backtest.step must be positive"));
        }
        if self.assets.is_empty() {
            return Err(VaultError::invalid_config("at least one [[assets]] entry is required"));
        }
        if let Some(unnamed) = self.assets.iter().position(|a| a.symbol.trim().is_empty()) {
            return Err(VaultError::invalid_config(format!(
                "assets[{unnamed}] is missing a symbol"
            )));
        }
        let total: u64 = self.assets.iter().map(|a| u64::from(a.weight_bps)).sum();
        if total != u64::from(BPS_DENOMINATOR) {
            return Err(VaultError::invalid_config(format!(
                "asset weights sum to {total} bps, expected 10000"
            )));
        }
        Ok(())
    }

    pub fn simulation_config(&self) -> Result<SimulationConfig> {
        self.simulation.to_simulation_config()
    }

    pub fn asset_configs(&self) -> Vec<AssetConfig> {
        self.assets.iter().map(AssetSection::asset_config).collect()
    }

    pub fn synthetic_assets(&self) -> Vec<SyntheticAsset> {
        self.assets.iter().map(AssetSection::synthetic_asset).collect()
    }

    /// Initial deposit in WAD.
    pub fn initial_deposit(&self) -> U256 {
        f64_to_wad(self.simulation.initial_deposit)
    }

    /// Price and yield history for the run: the CSV file named in
    /// `backtest.data`, or seeded synthetic paths over the window.
    pub fn build_provider(&self) -> Result<HistoricalDataProvider> {
        let mut provider = HistoricalDataProvider::new();
        match &self.backtest.data {
            Some(path) => {
                provider.load_csv(path)?;
            }
            None => provider.fill_synthetic(
                &self.synthetic_assets(),
                self.backtest.start,
                self.backtest.end,
                self.backtest.step,
                self.backtest.seed,
            )?,
        }
        Ok(provider)
    }
}
