//! Rebalance fill models.

use alloy_primitives::U256;

use crate::core::math::{bps_of, mul_div, mul_div_up};
use crate::core::types::Bps;

/// How much of a planned rebalance executes in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillModel {
    /// Every trade executes in full.
    Full,
    /// Turnover (total sold) is capped at `max_turnover_bps` of portfolio
    /// value; every trade is scaled by the same fraction.
    Partial { max_turnover_bps: Bps },
}

impl Default for FillModel {
    fn default() -> Self {
        FillModel::Full
    }
}

impl FillModel {
    /// Create a partial fill model.
    pub fn partial(max_turnover_bps: Bps) -> Self {
        FillModel::Partial { max_turnover_bps }
    }

    /// Fill ratio for a rebalance selling `turnover` out of `portfolio_value`.
    pub fn ratio(&self, turnover: U256, portfolio_value: U256) -> FillRatio {
        match self {
            FillModel::Full => FillRatio::full(),
            FillModel::Partial { max_turnover_bps } => {
                let cap = bps_of(portfolio_value, *max_turnover_bps);
                if turnover <= cap {
                    FillRatio::full()
                } else {
                    FillRatio {
                        filled: cap,
                        requested: turnover,
                    }
                }
            }
        }
    }
}

/// Fraction `filled / requested` applied to each trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillRatio {
    filled: U256,
    requested: U256,
}

impl FillRatio {
    /// Ratio of one.
    pub fn full() -> Self {
        Self {
            filled: U256::from(1u64),
            requested: U256::from(1u64),
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.filled == self.requested
    }

    /// Scaled sell amount, rounded up and never above `amount`.
    pub fn sell(&self, amount: U256) -> U256 {
        mul_div_up(amount, self.filled, self.requested).min(amount)
    }

    /// Scaled buy amount, rounded down.
    pub fn buy(&self, amount: U256) -> U256 {
        mul_div(amount, self.filled, self.requested)
    }
}
