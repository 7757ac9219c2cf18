//! USD price oracle interface.

use std::collections::HashMap;
use std::fmt::Debug;

use alloy_primitives::{Address, U256};

use crate::core::{Result, VaultError};

/// Source of WAD scaled USD prices.
///
/// Zero or stale prices are not validated here; callers decide.
pub trait PriceOracle: Debug + Send + Sync {
    /// Price of one unit of `asset`.
    fn price(&self, asset: Address) -> Result<U256>;

    /// Price of one unit of `asset` in USD.
    fn price_usd(&self, asset: Address) -> Result<U256> {
        self.price(asset)
    }

    fn box_clone(&self) -> Box<dyn PriceOracle>;
}

impl Clone for Box<dyn PriceOracle> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Oracle returning fixed, manually set prices.
#[derive(Debug, Clone, Default)]
pub struct FixedPriceOracle {
    prices: HashMap<Address, U256>,
}

impl FixedPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the price for an asset.
    pub fn with_price(mut self, asset: Address, price: U256) -> Self {
        self.prices.insert(asset, price);
        self
    }

    pub fn set_price(&mut self, asset: Address, price: U256) {
        self.prices.insert(asset, price);
    }
}

impl PriceOracle for FixedPriceOracle {
    fn price(&self, asset: Address) -> Result<U256> {
        self.prices
            .get(&asset)
            .copied()
            .ok_or_else(|| VaultError::external("price oracle", format!("no price for {asset}")))
    }

    fn box_clone(&self) -> Box<dyn PriceOracle> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::wad;

    #[test]
    fn test_fixed_price_oracle() {
        let asset = Address::repeat_byte(7);
        let oracle = FixedPriceOracle::new().with_price(asset, wad(4_500));
        assert_eq!(oracle.price_usd(asset).unwrap(), wad(4_500));
        assert!(oracle.price(Address::repeat_byte(8)).is_err());
    }
}
