//! In-memory collaborators.
//!
//! Used by the simulation engine, integration tests and the CLI demo. Every
//! mutating call can be made to fail with `set_failing` so rollback paths can
//! be exercised.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use alloy_primitives::{Address, U256};

use super::exposure::ExposureStrategy;
use super::token::RwaSyntheticToken;
use super::yield_strategy::YieldStrategy;
use crate::allocation::guard::ReentrancyGuard;
use crate::core::math::{accrue_annual, bps_of, mul_div};
use crate::core::types::{AssetInfo, Bps, ExposureKind, RiskLevel, StrategyInfo};
use crate::core::{Result, VaultError};

/// Share-based yield strategy holding its balance in memory.
///
/// The first deposit mints shares 1:1; later deposits mint at the current
/// share price. Accrued yield raises the position value until harvested.
#[derive(Debug, Clone)]
pub struct InMemoryYieldStrategy {
    id: Address,
    asset: Address,
    name: String,
    apy_bps: Bps,
    risk: RiskLevel,
    total_value: U256,
    total_shares: U256,
    total_deposited: U256,
    /// Yield accrued since the last harvest.
    unharvested: U256,
    failing: bool,
}

impl InMemoryYieldStrategy {
    pub fn new(id: Address, asset: Address, name: impl Into<String>) -> Self {
        Self {
            id,
            asset,
            name: name.into(),
            apy_bps: 0,
            risk: RiskLevel::Low,
            total_value: U256::ZERO,
            total_shares: U256::ZERO,
            total_deposited: U256::ZERO,
            unharvested: U256::ZERO,
            failing: false,
        }
    }

    /// Set the advertised annual yield.
    pub fn with_apy(mut self, apy_bps: Bps) -> Self {
        self.apy_bps = apy_bps;
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk = risk;
        self
    }

    /// Make every subsequent mutating call fail.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    /// Credit `amount` of yield to the position.
    pub fn accrue(&mut self, amount: U256) {
        self.total_value += amount;
        self.unharvested += amount;
    }

    /// Accrue at the advertised APY over `elapsed` seconds, returning the amount.
    pub fn accrue_for(&mut self, elapsed: u64) -> U256 {
        let amount = accrue_annual(self.total_value, self.apy_bps, elapsed);
        self.accrue(amount);
        amount
    }

    /// Simulate a loss on the position.
    pub fn write_down(&mut self, amount: U256) {
        self.total_value = self.total_value.saturating_sub(amount);
        self.unharvested = self.unharvested.min(self.total_value);
    }

    fn check(&self, op: &str) -> Result<()> {
        if self.failing {
            return Err(VaultError::external(
                self.name.clone(),
                format!("{op} rejected"),
            ));
        }
        Ok(())
    }
}

impl YieldStrategy for InMemoryYieldStrategy {
    fn id(&self) -> Address {
        self.id
    }

    fn asset(&self) -> Address {
        self.asset
    }

    fn deposit(&mut self, amount: U256) -> Result<U256> {
        self.check("deposit")?;
        let shares = if self.total_shares.is_zero() || self.total_value.is_zero() {
            amount
        } else {
            mul_div(amount, self.total_shares, self.total_value)
        };
        self.total_value += amount;
        self.total_shares += shares;
        self.total_deposited += amount;
        Ok(shares)
    }

    fn withdraw(&mut self, shares: U256) -> Result<U256> {
        self.check("withdraw")?;
        if shares > self.total_shares {
            return Err(VaultError::external(
                self.name.clone(),
                format!("withdraw {shares} shares exceeds balance {}", self.total_shares),
            ));
        }
        let amount = if shares == self.total_shares {
            self.total_value
        } else {
            mul_div(shares, self.total_value, self.total_shares)
        };
        self.total_shares -= shares;
        self.total_value -= amount;
        self.total_deposited = self.total_deposited.saturating_sub(amount);
        self.unharvested = self.unharvested.min(self.total_value);
        Ok(amount)
    }

    fn total_value(&self) -> U256 {
        self.total_value
    }

    fn total_shares(&self) -> U256 {
        self.total_shares
    }

    fn harvest_yield(&mut self) -> Result<U256> {
        self.check("harvest")?;
        let harvested = self.unharvested;
        self.total_value -= harvested;
        self.unharvested = U256::ZERO;
        Ok(harvested)
    }

    fn strategy_info(&self) -> StrategyInfo {
        StrategyInfo {
            name: self.name.clone(),
            asset: self.asset,
            total_deposited: self.total_deposited,
            current_value: self.total_value,
            apy_bps: self.apy_bps,
            active: !self.failing,
            risk: self.risk,
        }
    }

    fn box_clone(&self) -> Box<dyn YieldStrategy> {
        Box::new(self.clone())
    }
}

/// Synthetic token with an in-memory balance sheet. Supply tracks base asset 1:1.
#[derive(Debug, Clone)]
pub struct InMemorySyntheticToken {
    id: Address,
    name: String,
    symbol: String,
    exposure: ExposureKind,
    balances: HashMap<Address, U256>,
    total_supply: U256,
    failing: bool,
    /// Flag of the manager driving this token; minting tries to enter it.
    reentry_watch: Option<Arc<AtomicBool>>,
}

impl InMemorySyntheticToken {
    pub fn new(id: Address, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            symbol: symbol.into(),
            exposure: ExposureKind::DirectToken,
            balances: HashMap::new(),
            total_supply: U256::ZERO,
            failing: false,
            reentry_watch: None,
        }
    }

    pub fn with_exposure(mut self, exposure: ExposureKind) -> Self {
        self.exposure = exposure;
        self
    }

    /// Attempt to re-enter the given rebalance flag on every mint.
    pub fn with_reentry_watch(mut self, flag: Arc<AtomicBool>) -> Self {
        self.reentry_watch = Some(flag);
        self
    }

    /// Make every subsequent mutating call fail.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    pub fn balance_of(&self, holder: Address) -> U256 {
        self.balances.get(&holder).copied().unwrap_or(U256::ZERO)
    }

    fn check(&self, op: &str) -> Result<()> {
        if self.failing {
            return Err(VaultError::external(
                self.symbol.clone(),
                format!("{op} rejected"),
            ));
        }
        Ok(())
    }
}

impl RwaSyntheticToken for InMemorySyntheticToken {
    fn id(&self) -> Address {
        self.id
    }

    fn mint(&mut self, to: Address, amount: U256) -> Result<()> {
        self.check("mint")?;
        if let Some(flag) = &self.reentry_watch {
            let _nested = ReentrancyGuard::enter(flag)?;
        }
        *self.balances.entry(to).or_insert(U256::ZERO) += amount;
        self.total_supply += amount;
        Ok(())
    }

    fn burn(&mut self, from: Address, amount: U256) -> Result<()> {
        self.check("burn")?;
        let balance = self.balance_of(from);
        if amount > balance {
            return Err(VaultError::external(
                self.symbol.clone(),
                format!("burn {amount} exceeds balance {balance}"),
            ));
        }
        self.balances.insert(from, balance - amount);
        self.total_supply -= amount;
        Ok(())
    }

    fn total_supply(&self) -> U256 {
        self.total_supply
    }

    fn asset_info(&self) -> AssetInfo {
        AssetInfo {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            exposure: self.exposure,
        }
    }

    fn box_clone(&self) -> Box<dyn RwaSyntheticToken> {
        Box::new(self.clone())
    }
}

/// Exposure position marked at its notional.
///
/// Each open or adjustment accrues `trade_cost_bps` of the traded notional as
/// cost; the cost is tracked, not deducted from the mark.
#[derive(Debug, Clone)]
pub struct InMemoryExposure {
    kind: ExposureKind,
    collateral: U256,
    notional: U256,
    trade_cost_bps: Bps,
    accrued_cost: U256,
    /// Haircut applied to the mark on emergency exit.
    exit_haircut_bps: Bps,
    open: bool,
    failing: bool,
}

impl InMemoryExposure {
    pub fn new(kind: ExposureKind) -> Self {
        Self {
            kind,
            collateral: U256::ZERO,
            notional: U256::ZERO,
            trade_cost_bps: 0,
            accrued_cost: U256::ZERO,
            exit_haircut_bps: 0,
            open: false,
            failing: false,
        }
    }

    pub fn with_trade_cost(mut self, trade_cost_bps: Bps) -> Self {
        self.trade_cost_bps = trade_cost_bps;
        self
    }

    pub fn with_exit_haircut(mut self, exit_haircut_bps: Bps) -> Self {
        self.exit_haircut_bps = exit_haircut_bps;
        self
    }

    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    /// Re-mark the position, e.g. after the underlying moved.
    pub fn mark_to(&mut self, value: U256) {
        self.notional = value;
    }

    pub fn collateral(&self) -> U256 {
        self.collateral
    }

    fn check(&self, op: &str) -> Result<()> {
        if self.failing {
            return Err(VaultError::external("exposure", format!("{op} rejected")));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.collateral = U256::ZERO;
        self.notional = U256::ZERO;
        self.open = false;
    }
}

impl ExposureStrategy for InMemoryExposure {
    fn kind(&self) -> ExposureKind {
        self.kind
    }

    fn open_exposure(&mut self, collateral: U256, notional: U256) -> Result<()> {
        self.check("open")?;
        if self.open {
            return Err(VaultError::external("exposure", "position already open"));
        }
        self.collateral = collateral;
        self.notional = notional;
        self.accrued_cost += bps_of(notional, self.trade_cost_bps);
        self.open = true;
        Ok(())
    }

    fn adjust_exposure(&mut self, target_notional: U256) -> Result<()> {
        self.check("adjust")?;
        if !self.open {
            return Err(VaultError::external("exposure", "no open position"));
        }
        let traded = if target_notional > self.notional {
            self.collateral += target_notional - self.notional;
            target_notional - self.notional
        } else {
            let released = self.notional - target_notional;
            self.collateral = self.collateral.saturating_sub(released);
            released
        };
        self.accrued_cost += bps_of(traded, self.trade_cost_bps);
        self.notional = target_notional;
        Ok(())
    }

    fn close_exposure(&mut self) -> Result<U256> {
        self.check("close")?;
        let released = self.notional;
        self.reset();
        Ok(released)
    }

    fn exposure_value(&self) -> U256 {
        self.notional
    }

    fn exposure_cost(&self) -> U256 {
        self.accrued_cost
    }

    fn emergency_exit(&mut self) -> Result<U256> {
        let haircut = bps_of(self.notional, self.exit_haircut_bps);
        let recovered = self.notional - haircut;
        self.accrued_cost += haircut;
        self.reset();
        Ok(recovered)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn box_clone(&self) -> Box<dyn ExposureStrategy> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::wad;
    use crate::core::types::SECONDS_PER_YEAR;

    #[test]
    fn test_yield_strategy_share_price() {
        let mut strategy =
            InMemoryYieldStrategy::new(Address::repeat_byte(1), Address::repeat_byte(9), "aave")
                .with_apy(500);
        assert_eq!(strategy.deposit(wad(100)).unwrap(), wad(100));
        strategy.accrue(wad(100));
        // share price is now 2
        assert_eq!(strategy.deposit(wad(100)).unwrap(), wad(50));
        assert_eq!(strategy.shares_for_value(wad(60)), wad(30));
        assert_eq!(strategy.withdraw(wad(30)).unwrap(), wad(60));
    }

    #[test]
    fn test_harvest_pays_out_accrued_yield() {
        let mut strategy =
            InMemoryYieldStrategy::new(Address::repeat_byte(1), Address::repeat_byte(9), "aave")
                .with_apy(500);
        strategy.deposit(wad(1_000)).unwrap();
        assert_eq!(strategy.accrue_for(SECONDS_PER_YEAR), wad(50));
        assert_eq!(strategy.harvest_yield().unwrap(), wad(50));
        assert_eq!(strategy.total_value(), wad(1_000));
        assert_eq!(strategy.harvest_yield().unwrap(), U256::ZERO);
    }

    #[test]
    fn test_failing_strategy_rejects_calls() {
        let mut strategy =
            InMemoryYieldStrategy::new(Address::repeat_byte(1), Address::repeat_byte(9), "aave");
        strategy.set_failing(true);
        assert!(matches!(
            strategy.deposit(wad(1)),
            Err(VaultError::External { .. })
        ));
    }

    #[test]
    fn test_token_mint_and_burn() {
        let holder = Address::repeat_byte(3);
        let mut token = InMemorySyntheticToken::new(Address::repeat_byte(2), "Gold", "sXAU");
        token.mint(holder, wad(10)).unwrap();
        token.burn(holder, wad(4)).unwrap();
        assert_eq!(token.total_supply(), wad(6));
        assert_eq!(token.balance_of(holder), wad(6));
        assert!(token.burn(holder, wad(7)).is_err());
    }

    #[test]
    fn test_exposure_costs_and_emergency_exit() {
        let mut exposure = InMemoryExposure::new(ExposureKind::TotalReturnSwap)
            .with_trade_cost(10)
            .with_exit_haircut(100);
        exposure.open_exposure(wad(1_000), wad(1_000)).unwrap();
        exposure.adjust_exposure(wad(2_000)).unwrap();
        assert_eq!(exposure.exposure_cost(), wad(2));
        assert_eq!(exposure.collateral(), wad(2_000));
        assert_eq!(exposure.emergency_exit().unwrap(), wad(1_980));
        assert!(!exposure.is_open());
    }
}
