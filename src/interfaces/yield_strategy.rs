//! Yield-bearing strategy interface.

use std::fmt::Debug;

use alloy_primitives::{Address, U256};

use crate::core::types::StrategyInfo;
use crate::core::Result;

/// A yield source holding part of the vault's base asset.
///
/// Each instance serves a single vault, so `total_shares` is the vault's
/// share balance in the strategy.
pub trait YieldStrategy: Debug + Send + Sync {
    /// Strategy identity.
    fn id(&self) -> Address;

    /// Base asset accepted by `deposit`.
    fn asset(&self) -> Address;

    /// Deposit base asset, returning shares minted.
    fn deposit(&mut self, amount: U256) -> Result<U256>;

    /// Redeem shares, returning base asset released.
    fn withdraw(&mut self, shares: U256) -> Result<U256>;

    /// Current value of the vault's position, in base asset.
    fn total_value(&self) -> U256;

    /// Shares held by the vault.
    fn total_shares(&self) -> U256;

    /// Realize accrued yield, returning the base asset paid out.
    fn harvest_yield(&mut self) -> Result<U256>;

    fn strategy_info(&self) -> StrategyInfo;

    fn box_clone(&self) -> Box<dyn YieldStrategy>;

    /// Shares needed to release `value` of base asset, rounded down.
    fn shares_for_value(&self, value: U256) -> U256 {
        let total_value = self.total_value();
        if total_value.is_zero() {
            return U256::ZERO;
        }
        value * self.total_shares() / total_value
    }
}

impl Clone for Box<dyn YieldStrategy> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
