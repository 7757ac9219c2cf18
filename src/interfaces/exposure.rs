//! Synthetic exposure mechanisms (perpetuals, total-return swaps, direct tokens).

use std::fmt::Debug;

use alloy_primitives::{Address, U256};

use super::token::RwaSyntheticToken;
use crate::core::types::{AssetInfo, ExposureKind};
use crate::core::{Result, VaultError};

/// A mechanism holding notional exposure to an asset against collateral.
pub trait ExposureStrategy: Debug + Send + Sync {
    fn kind(&self) -> ExposureKind;

    /// Open a position with `collateral` backing `notional` exposure.
    fn open_exposure(&mut self, collateral: U256, notional: U256) -> Result<()>;

    /// Move the open position to `target_notional`, adding or releasing collateral 1:1.
    fn adjust_exposure(&mut self, target_notional: U256) -> Result<()>;

    /// Close the position, returning the collateral released.
    fn close_exposure(&mut self) -> Result<U256>;

    /// Current mark-to-market value of the position.
    fn exposure_value(&self) -> U256;

    /// Costs (funding, spread, fees) accrued since opening.
    fn exposure_cost(&self) -> U256;

    /// Unwind immediately regardless of cost, returning what was recovered.
    fn emergency_exit(&mut self) -> Result<U256>;

    fn is_open(&self) -> bool;

    fn box_clone(&self) -> Box<dyn ExposureStrategy>;
}

impl Clone for Box<dyn ExposureStrategy> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Presents an [`ExposureStrategy`] as a synthetic RWA token.
///
/// Minting grows the exposure, burning shrinks it, and supply is the
/// exposure's current value.
#[derive(Debug, Clone)]
pub struct ExposureBackedToken {
    id: Address,
    name: String,
    symbol: String,
    exposure: Box<dyn ExposureStrategy>,
}

impl ExposureBackedToken {
    pub fn new(
        id: Address,
        name: impl Into<String>,
        symbol: impl Into<String>,
        exposure: Box<dyn ExposureStrategy>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            symbol: symbol.into(),
            exposure,
        }
    }

    /// Underlying exposure mechanism.
    pub fn exposure(&self) -> &dyn ExposureStrategy {
        self.exposure.as_ref()
    }
}

impl RwaSyntheticToken for ExposureBackedToken {
    fn id(&self) -> Address {
        self.id
    }

    fn mint(&mut self, _to: Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        if self.exposure.is_open() {
            let target = self.exposure.exposure_value() + amount;
            self.exposure.adjust_exposure(target)
        } else {
            self.exposure.open_exposure(amount, amount)
        }
    }

    fn burn(&mut self, _from: Address, amount: U256) -> Result<()> {
        let current = self.exposure.exposure_value();
        if amount > current {
            return Err(VaultError::external(
                self.symbol.clone(),
                format!("burn {amount} exceeds exposure {current}"),
            ));
        }
        if amount == current {
            self.exposure.close_exposure().map(|_| ())
        } else {
            self.exposure.adjust_exposure(current - amount)
        }
    }

    fn total_supply(&self) -> U256 {
        self.exposure.exposure_value()
    }

    fn asset_info(&self) -> AssetInfo {
        AssetInfo {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            exposure: self.exposure.kind(),
        }
    }

    fn box_clone(&self) -> Box<dyn RwaSyntheticToken> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::memory::InMemoryExposure;

    fn token() -> ExposureBackedToken {
        ExposureBackedToken::new(
            Address::repeat_byte(0x51),
            "S&P 500 perpetual",
            "sSPX",
            Box::new(InMemoryExposure::new(ExposureKind::Perpetual)),
        )
    }

    #[test]
    fn test_mint_opens_then_grows() {
        let mut token = token();
        token.mint(Address::ZERO, U256::from(100u64)).unwrap();
        assert!(token.exposure().is_open());
        token.mint(Address::ZERO, U256::from(50u64)).unwrap();
        assert_eq!(token.total_supply(), U256::from(150u64));
        assert_eq!(token.asset_info().exposure, ExposureKind::Perpetual);
    }

    #[test]
    fn test_burn_everything_closes() {
        let mut token = token();
        token.mint(Address::ZERO, U256::from(100u64)).unwrap();
        token.burn(Address::ZERO, U256::from(40u64)).unwrap();
        assert_eq!(token.total_supply(), U256::from(60u64));
        token.burn(Address::ZERO, U256::from(60u64)).unwrap();
        assert!(!token.exposure().is_open());
        assert!(token.burn(Address::ZERO, U256::from(1u64)).is_err());
    }
}
