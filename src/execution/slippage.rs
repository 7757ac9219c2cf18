//! Slippage models for rebalance execution.

use alloy_primitives::U256;

use crate::core::math::bps_of;
use crate::core::types::Bps;

/// Slippage model for simulating value lost when buying into an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlippageModel {
    /// No slippage.
    None,
    /// Fixed basis points of bought notional.
    Bps(Bps),
}

impl Default for SlippageModel {
    fn default() -> Self {
        SlippageModel::None
    }
}

impl SlippageModel {
    /// Create a basis point slippage model.
    pub fn bps(bps: Bps) -> Self {
        SlippageModel::Bps(bps)
    }

    /// Slippage on a buy of `notional`.
    pub fn calculate(&self, notional: U256) -> U256 {
        match self {
            SlippageModel::None => U256::ZERO,
            SlippageModel::Bps(bps) => bps_of(notional, *bps),
        }
    }

    /// Value actually received for a buy of `notional`, and the slippage lost.
    ///
    /// # Returns
    /// `(received, slippage)` where `received + slippage == notional`
    pub fn apply(&self, notional: U256) -> (U256, U256) {
        let slippage = self.calculate(notional).min(notional);
        (notional - slippage, slippage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::wad;

    #[test]
    fn test_bps_slippage() {
        let slip = SlippageModel::bps(25);
        let (received, lost) = slip.apply(wad(1_000));
        assert_eq!(lost, wad(1_000) / U256::from(400u64));
        assert_eq!(received + lost, wad(1_000));
    }

    #[test]
    fn test_no_slippage() {
        let (received, lost) = SlippageModel::None.apply(wad(7));
        assert_eq!(received, wad(7));
        assert!(lost.is_zero());
    }
}
