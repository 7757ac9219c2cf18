//! Capital allocation manager.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use alloy_primitives::{keccak256, Address, U256};
use tracing::debug;

use super::events::AllocationEvent;
use super::guard::ReentrancyGuard;
use super::ledger::{Allocation, AllocationLedger, RwaAllocation, StrategyAllocation};
use super::planner::{plan_rebalance, proportional_split, withdrawal_split, Move};
use crate::core::math::{mul_div, weight_bps, WAD};
use crate::core::types::{Bps, Bucket, BucketValues, Timestamp};
use crate::core::{Result, VaultError};
use crate::interfaces::{PriceOracle, RwaSyntheticToken, YieldStrategy};

/// How the RWA bucket is valued.
#[derive(Debug, Clone)]
pub enum RwaValuation {
    /// One token unit per unit of base asset.
    Supply,
    /// Supply marked to market with a USD oracle. Minting and burning
    /// convert base asset to token units at the current price.
    Oracle(Box<dyn PriceOracle>),
}

impl Default for RwaValuation {
    fn default() -> Self {
        RwaValuation::Supply
    }
}

impl RwaValuation {
    fn value_of(&self, token: &dyn RwaSyntheticToken) -> Result<U256> {
        match self {
            RwaValuation::Supply => Ok(token.total_supply()),
            RwaValuation::Oracle(oracle) => {
                let price = oracle.price_usd(token.id())?;
                Ok(mul_div(token.total_supply(), price, WAD))
            }
        }
    }

    /// Token units worth `value`, rounded down.
    fn units_for(&self, token: &dyn RwaSyntheticToken, value: U256) -> Result<U256> {
        match self {
            RwaValuation::Supply => Ok(value),
            RwaValuation::Oracle(oracle) => {
                let price = oracle.price_usd(token.id())?;
                if price.is_zero() {
                    return Err(VaultError::external(
                        "price oracle",
                        format!("zero price for {}", token.id()),
                    ));
                }
                Ok(mul_div(value, WAD, price))
            }
        }
    }

    fn value_of_units(&self, token: &dyn RwaSyntheticToken, units: U256) -> Result<U256> {
        match self {
            RwaValuation::Supply => Ok(units),
            RwaValuation::Oracle(oracle) => {
                let price = oracle.price_usd(token.id())?;
                Ok(mul_div(units, price, WAD))
            }
        }
    }
}

/// Current weight of each bucket in bps of the total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketWeights {
    pub rwa_bps: Bps,
    pub yield_bps: Bps,
    pub buffer_bps: Bps,
}

/// Everything a rebalance may mutate. Cloned before execution so a failed
/// external call leaves the committed state untouched.
#[derive(Debug, Clone, Default)]
struct ManagerState {
    ledger: AllocationLedger,
    buffer: U256,
    tokens: HashMap<Address, Box<dyn RwaSyntheticToken>>,
    strategies: HashMap<Address, Box<dyn YieldStrategy>>,
}

impl ManagerState {
    fn bucket_values(&self, valuation: &RwaValuation) -> Result<BucketValues> {
        let mut values = BucketValues::new(U256::ZERO, U256::ZERO, self.buffer);
        for record in self.ledger.rwa.active() {
            if let Some(token) = self.tokens.get(&record.id) {
                values.rwa += valuation.value_of(token.as_ref())?;
            }
        }
        for record in self.ledger.strategies.active() {
            if let Some(strategy) = self.strategies.get(&record.id) {
                values.yield_value += strategy.total_value();
            }
        }
        Ok(values)
    }

    fn execute(&mut self, mv: &Move, valuation: &RwaValuation, holder: Address) -> Result<()> {
        // Bucket-to-bucket moves forward at most what was released.
        let mut available = mv.amount.min(self.buffer);
        if mv.from != Bucket::Buffer {
            let released = self.release(mv.from, mv.amount, valuation, holder)?;
            self.buffer += released;
            available = released.min(mv.amount);
        }
        if mv.to != Bucket::Buffer {
            let used = self.allocate(mv.to, available, valuation, holder)?;
            self.buffer -= used;
        }
        Ok(())
    }

    /// Move `amount` out of the buffer into a bucket's entities. Returns the amount used.
    fn allocate(
        &mut self,
        bucket: Bucket,
        amount: U256,
        valuation: &RwaValuation,
        holder: Address,
    ) -> Result<U256> {
        let records: Vec<_> = match bucket {
            Bucket::Rwa => self.ledger.rwa.active().copied().collect(),
            Bucket::Yield => self.ledger.strategies.active().copied().collect(),
            Bucket::Buffer => return Ok(U256::ZERO),
        };
        let percentages: Vec<Bps> = records.iter().map(|r| r.percentage).collect();
        let shares = proportional_split(amount, &percentages);

        let mut used = U256::ZERO;
        for (record, share) in records.iter().zip(shares) {
            if share.is_zero() {
                continue;
            }
            match bucket {
                Bucket::Rwa => {
                    let token = self
                        .tokens
                        .get_mut(&record.id)
                        .ok_or(VaultError::NotActive { id: record.id })?;
                    let units = valuation.units_for(token.as_ref(), share)?;
                    token.mint(holder, units)?;
                }
                _ => {
                    let strategy = self
                        .strategies
                        .get_mut(&record.id)
                        .ok_or(VaultError::NotActive { id: record.id })?;
                    strategy.deposit(share)?;
                }
            }
            debug!(bucket = %bucket, entity = %record.id, amount = %share, "allocated");
            used += share;
        }
        Ok(used)
    }

    /// Pull `amount` out of a bucket's entities. Returns the base asset released.
    fn release(
        &mut self,
        bucket: Bucket,
        amount: U256,
        valuation: &RwaValuation,
        holder: Address,
    ) -> Result<U256> {
        let records: Vec<_> = match bucket {
            Bucket::Rwa => self.ledger.rwa.active().copied().collect(),
            Bucket::Yield => self.ledger.strategies.active().copied().collect(),
            Bucket::Buffer => return Ok(U256::ZERO),
        };

        let mut values = Vec::with_capacity(records.len());
        for record in &records {
            let value = match bucket {
                Bucket::Rwa => match self.tokens.get(&record.id) {
                    Some(token) => valuation.value_of(token.as_ref())?,
                    None => U256::ZERO,
                },
                _ => self
                    .strategies
                    .get(&record.id)
                    .map_or(U256::ZERO, |strategy| strategy.total_value()),
            };
            values.push(value);
        }
        let percentages: Vec<Bps> = records.iter().map(|r| r.percentage).collect();
        let shares = withdrawal_split(amount, &percentages, &values);

        let mut released = U256::ZERO;
        for (record, share) in records.iter().zip(shares) {
            if share.is_zero() {
                continue;
            }
            let got = match bucket {
                Bucket::Rwa => {
                    let token = self
                        .tokens
                        .get_mut(&record.id)
                        .ok_or(VaultError::NotActive { id: record.id })?;
                    let units = valuation.units_for(token.as_ref(), share)?;
                    token.burn(holder, units)?;
                    valuation.value_of_units(token.as_ref(), units)?
                }
                _ => {
                    let strategy = self
                        .strategies
                        .get_mut(&record.id)
                        .ok_or(VaultError::NotActive { id: record.id })?;
                    let shares = strategy.shares_for_value(share);
                    strategy.withdraw(shares)?
                }
            };
            debug!(bucket = %bucket, entity = %record.id, amount = %got, "released");
            released += got;
        }
        Ok(released)
    }
}

/// Allocates vault capital across synthetic RWA tokens, yield strategies and
/// an idle buffer, and rebalances toward target weights.
#[derive(Debug)]
pub struct CapitalAllocationManager {
    /// Base asset every yield strategy must accept.
    base_asset: Address,
    /// Account that holds minted RWA tokens.
    holder: Address,
    valuation: RwaValuation,
    state: ManagerState,
    events: Vec<AllocationEvent>,
    rebalancing: Arc<AtomicBool>,
}

impl CapitalAllocationManager {
    /// Create a manager for `base_asset` with everything targeted at the buffer.
    pub fn new(base_asset: Address) -> Self {
        Self {
            base_asset,
            holder: Address::from_slice(&keccak256(b"vaultbt.vault")[12..]),
            valuation: RwaValuation::Supply,
            state: ManagerState::default(),
            events: Vec::new(),
            rebalancing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set how RWA tokens are valued.
    pub fn with_valuation(mut self, valuation: RwaValuation) -> Self {
        self.valuation = valuation;
        self
    }

    /// Set the account minted RWA tokens are credited to.
    pub fn with_holder(mut self, holder: Address) -> Self {
        self.holder = holder;
        self
    }

    pub fn base_asset(&self) -> Address {
        self.base_asset
    }

    pub fn holder(&self) -> Address {
        self.holder
    }

    /// Flag set while a rebalance is in flight.
    pub fn reentrancy_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.rebalancing)
    }

    // ---- funds ----

    /// Credit base asset to the buffer.
    pub fn deposit(&mut self, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Err(VaultError::zero_amount("deposit"));
        }
        self.state.buffer += amount;
        Ok(())
    }

    /// Debit base asset from the buffer.
    pub fn withdraw_from_buffer(&mut self, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Err(VaultError::zero_amount("withdraw"));
        }
        if amount > self.state.buffer {
            return Err(VaultError::InsufficientBuffer {
                requested: amount.to_string(),
                available: self.state.buffer.to_string(),
            });
        }
        self.state.buffer -= amount;
        Ok(())
    }

    /// Harvest every active yield strategy into the buffer.
    ///
    /// All-or-nothing: a failing harvest leaves every strategy untouched.
    pub fn harvest_all(&mut self) -> Result<U256> {
        let mut working = self.state.clone();
        let mut harvested = U256::ZERO;
        let active: Vec<Address> = working.ledger.strategies.active().map(|r| r.id).collect();
        for id in active {
            if let Some(strategy) = working.strategies.get_mut(&id) {
                let amount = strategy.harvest_yield()?;
                debug!(strategy = %id, amount = %amount, "harvested");
                harvested += amount;
            }
        }
        working.buffer += harvested;
        self.state = working;
        Ok(harvested)
    }

    // ---- configuration ----

    /// Replace the target allocation. Does not move funds.
    pub fn set_allocation(&mut self, rwa_bps: Bps, yield_bps: Bps, buffer_bps: Bps) -> Result<()> {
        self.state
            .ledger
            .set_allocation(rwa_bps, yield_bps, buffer_bps)?;
        self.record(AllocationEvent::AllocationSet {
            rwa_bps,
            yield_bps,
            buffer_bps,
        });
        Ok(())
    }

    /// Register a synthetic RWA token with a share of the RWA bucket.
    ///
    /// Re-adding a removed token reactivates its record; the instance
    /// registered first stays in place and `token` is dropped.
    pub fn add_rwa_token(&mut self, token: Box<dyn RwaSyntheticToken>, percentage: Bps) -> Result<()> {
        let id = token.id();
        // TODO: reject tokens settled in another base asset once the token
        // interface reports one.
        self.state.ledger.rwa.add(id, percentage, "rwa token")?;
        // A reactivated token keeps the instance holding its supply.
        if self.state.tokens.contains_key(&id) {
            debug!(token = %id, "reactivated, keeping registered instance");
        } else {
            self.state.tokens.insert(id, token);
        }
        self.record(AllocationEvent::RwaTokenAdded {
            token: id,
            percentage,
        });
        Ok(())
    }

    pub fn update_rwa_token(&mut self, token: Address, percentage: Bps) -> Result<()> {
        self.state.ledger.rwa.update(token, percentage)?;
        self.record(AllocationEvent::RwaTokenUpdated { token, percentage });
        Ok(())
    }

    pub fn remove_rwa_token(&mut self, token: Address) -> Result<()> {
        self.state.ledger.rwa.remove(token)?;
        self.record(AllocationEvent::RwaTokenRemoved { token });
        Ok(())
    }

    /// Register a yield strategy with a share of the yield bucket.
    ///
    /// Reactivation keeps the instance registered first, as for tokens.
    pub fn add_yield_strategy(
        &mut self,
        strategy: Box<dyn YieldStrategy>,
        percentage: Bps,
    ) -> Result<()> {
        let id = strategy.id();
        if id == Address::ZERO {
            return Err(VaultError::zero_identity("yield strategy"));
        }
        if strategy.asset() != self.base_asset {
            return Err(VaultError::AssetMismatch {
                expected: self.base_asset,
                actual: strategy.asset(),
            });
        }
        self.state
            .ledger
            .strategies
            .add(id, percentage, "yield strategy")?;
        if self.state.strategies.contains_key(&id) {
            debug!(strategy = %id, "reactivated, keeping registered instance");
        } else {
            self.state.strategies.insert(id, strategy);
        }
        self.record(AllocationEvent::YieldStrategyAdded {
            strategy: id,
            percentage,
        });
        Ok(())
    }

    pub fn update_yield_strategy(&mut self, strategy: Address, percentage: Bps) -> Result<()> {
        self.state.ledger.strategies.update(strategy, percentage)?;
        self.record(AllocationEvent::YieldStrategyUpdated {
            strategy,
            percentage,
        });
        Ok(())
    }

    pub fn remove_yield_strategy(&mut self, strategy: Address) -> Result<()> {
        self.state.ledger.strategies.remove(strategy)?;
        self.record(AllocationEvent::YieldStrategyRemoved { strategy });
        Ok(())
    }

    // ---- rebalancing ----

    /// Rebalance toward the target allocation, stamped with the wall clock.
    pub fn rebalance(&mut self) -> Result<Vec<Move>> {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        self.rebalance_at(now)
    }

    /// Rebalance toward the target allocation at `now`.
    ///
    /// Runs on a copy of the state and commits only if every external call
    /// succeeds.
    ///
    /// # Returns
    /// The executed moves
    pub fn rebalance_at(&mut self, now: Timestamp) -> Result<Vec<Move>> {
        let _guard = ReentrancyGuard::enter(&self.rebalancing)?;

        let values = self.state.bucket_values(&self.valuation)?;
        let total_value = values.total();
        if total_value.is_zero() {
            return Err(VaultError::NoAssets);
        }

        let moves = plan_rebalance(&values, &self.state.ledger.allocation);
        let mut working = self.state.clone();
        for mv in &moves {
            working.execute(mv, &self.valuation, self.holder)?;
        }
        working.ledger.mark_rebalanced(now);
        self.state = working;

        self.record(AllocationEvent::Rebalanced {
            total_value,
            moves: moves.clone(),
            timestamp: now,
        });
        Ok(moves)
    }

    // ---- views ----

    pub fn allocation(&self) -> &Allocation {
        &self.state.ledger.allocation
    }

    pub fn rwa_allocations(&self) -> &[RwaAllocation] {
        self.state.ledger.rwa.as_slice()
    }

    pub fn strategy_allocations(&self) -> &[StrategyAllocation] {
        self.state.ledger.strategies.as_slice()
    }

    pub fn rwa_token(&self, token: Address) -> Option<&dyn RwaSyntheticToken> {
        self.state.tokens.get(&token).map(|t| t.as_ref())
    }

    pub fn yield_strategy(&self, strategy: Address) -> Option<&dyn YieldStrategy> {
        self.state.strategies.get(&strategy).map(|s| s.as_ref())
    }

    /// Value held in each bucket, counting active entities only.
    pub fn bucket_values(&self) -> Result<BucketValues> {
        self.state.bucket_values(&self.valuation)
    }

    pub fn total_value(&self) -> Result<U256> {
        Ok(self.bucket_values()?.total())
    }

    pub fn buffer_balance(&self) -> U256 {
        self.state.buffer
    }

    pub fn current_weights(&self) -> Result<BucketWeights> {
        let values = self.bucket_values()?;
        let total = values.total();
        Ok(BucketWeights {
            rwa_bps: weight_bps(values.rwa, total),
            yield_bps: weight_bps(values.yield_value, total),
            buffer_bps: weight_bps(values.buffer, total),
        })
    }

    pub fn events(&self) -> &[AllocationEvent] {
        &self.events
    }

    fn record(&mut self, event: AllocationEvent) {
        event.log();
        self.events.push(event);
    }
}
