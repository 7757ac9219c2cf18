//! Fee and gas cost models.

use alloy_primitives::U256;

use crate::core::math::accrue_annual;
use crate::core::types::Bps;

/// Execution cost charged when a rebalance trades.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasModel {
    /// No gas.
    None,
    /// Fixed amount per rebalance.
    Fixed(U256),
    /// Base amount per rebalance plus an amount per executed trade.
    PerTrade { base: U256, per_trade: U256 },
}

impl Default for GasModel {
    fn default() -> Self {
        GasModel::None
    }
}

impl GasModel {
    /// Create a fixed gas model.
    pub fn fixed(amount: U256) -> Self {
        GasModel::Fixed(amount)
    }

    /// Create a per-trade gas model.
    pub fn per_trade(base: U256, per_trade: U256) -> Self {
        GasModel::PerTrade { base, per_trade }
    }

    /// Gas for a rebalance executing `trades` trades.
    ///
    /// A rebalance with no trades costs nothing under every model.
    pub fn calculate(&self, trades: usize) -> U256 {
        if trades == 0 {
            return U256::ZERO;
        }
        match self {
            GasModel::None => U256::ZERO,
            GasModel::Fixed(amount) => *amount,
            GasModel::PerTrade { base, per_trade } => *base + *per_trade * U256::from(trades),
        }
    }
}

/// Annual management fee on `value` for `elapsed` seconds.
///
/// # Arguments
/// * `value` - Portfolio value the fee is charged on
/// * `fee_bps` - Annual fee rate
/// * `elapsed` - Seconds since the fee was last charged
///
/// # Returns
/// Fee amount
#[inline]
pub fn management_fee(value: U256, fee_bps: Bps, elapsed: u64) -> U256 {
    accrue_annual(value, fee_bps, elapsed)
}
