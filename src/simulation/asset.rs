//! Simulated asset positions.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::core::math::{mul_div, mul_div_up, WAD};
use crate::core::types::{Bps, ExposureKind, Timestamp};

/// Static description of an asset in the simulated index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Priced asset.
    pub asset: Address,
    pub symbol: String,
    /// Yield-bearing wrapper whose rate applies to this asset.
    pub wrapper: Address,
    pub exposure: ExposureKind,
    pub target_weight_bps: Bps,
    pub is_yield_generating: bool,
}

impl AssetConfig {
    pub fn new(asset: Address, symbol: impl Into<String>, target_weight_bps: Bps) -> Self {
        Self {
            asset,
            symbol: symbol.into(),
            wrapper: Address::ZERO,
            exposure: ExposureKind::DirectToken,
            target_weight_bps,
            is_yield_generating: false,
        }
    }

    pub fn with_exposure(mut self, exposure: ExposureKind) -> Self {
        self.exposure = exposure;
        self
    }

    /// Accrue yield at the rate recorded for `wrapper`.
    pub fn with_yield(mut self, wrapper: Address) -> Self {
        self.wrapper = wrapper;
        self.is_yield_generating = true;
        self
    }
}

/// An asset position held by the simulation, in WAD units.
#[derive(Debug, Clone)]
pub struct SimulatedAsset {
    pub config: AssetConfig,
    pub units: U256,
    pub last_price: U256,
    pub last_harvest: Timestamp,
}

impl SimulatedAsset {
    pub fn new(config: AssetConfig, price: U256, timestamp: Timestamp) -> Self {
        Self {
            config,
            units: U256::ZERO,
            last_price: price,
            last_harvest: timestamp,
        }
    }

    /// Position value at the last price.
    #[inline]
    pub fn value(&self) -> U256 {
        mul_div(self.units, self.last_price, WAD)
    }

    /// Buy `value` worth of units. No-op at a zero price.
    pub fn add_value(&mut self, value: U256) {
        self.units += mul_div(value, WAD, self.last_price);
    }

    /// Sell `value` worth of units, rounding units up and never below zero.
    pub fn remove_value(&mut self, value: U256) {
        let units = mul_div_up(value, WAD, self.last_price).min(self.units);
        self.units -= units;
    }

    #[inline]
    pub fn is_priced(&self) -> bool {
        !self.last_price.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::wad;

    #[test]
    fn test_value_follows_price() {
        let config = AssetConfig::new(Address::repeat_byte(1), "sSPX", 10_000);
        let mut asset = SimulatedAsset::new(config, wad(2), 0);
        asset.add_value(wad(100));
        assert_eq!(asset.units, wad(50));
        asset.last_price = wad(3);
        assert_eq!(asset.value(), wad(150));
        asset.remove_value(wad(30));
        assert_eq!(asset.value(), wad(120));
    }

    #[test]
    fn test_zero_price_holds_nothing() {
        let config = AssetConfig::new(Address::repeat_byte(1), "sSPX", 10_000);
        let mut asset = SimulatedAsset::new(config, U256::ZERO, 0);
        asset.add_value(wad(100));
        assert!(asset.units.is_zero());
        assert!(!asset.is_priced());
    }

    #[test]
    fn test_remove_more_than_held() {
        let config = AssetConfig::new(Address::repeat_byte(1), "sSPX", 10_000);
        let mut asset = SimulatedAsset::new(config, wad(1), 0);
        asset.add_value(wad(5));
        asset.remove_value(wad(8));
        assert!(asset.units.is_zero());
    }
}
