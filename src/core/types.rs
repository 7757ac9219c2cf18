//! Core data types for vaultbt.

use alloy_primitives::{keccak256, Address, U256};
use serde::{Deserialize, Serialize};

/// Type alias for timestamp values (seconds since epoch).
pub type Timestamp = u64;

/// Type alias for basis point values (10000 = 100%).
pub type Bps = u32;

/// Basis point denominator.
pub const BPS_DENOMINATOR: Bps = 10_000;

/// Seconds in a (365 day) year, used for time-proportional accrual.
pub const SECONDS_PER_YEAR: u64 = 365 * 86_400;

/// Identity for a symbol or hex address.
///
/// Hex addresses parse as themselves; anything else maps to the low 20 bytes
/// of the symbol's keccak256 hash.
pub fn asset_id(symbol_or_address: &str) -> Address {
    symbol_or_address
        .parse::<Address>()
        .unwrap_or_else(|_| Address::from_slice(&keccak256(symbol_or_address.as_bytes())[12..]))
}

/// Capital bucket managed by the allocation manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    /// Synthetic real-world-asset exposures.
    Rwa,
    /// Yield-bearing strategies.
    Yield,
    /// Idle liquidity buffer.
    Buffer,
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bucket::Rwa => write!(f, "RWA"),
            Bucket::Yield => write!(f, "YIELD"),
            Bucket::Buffer => write!(f, "BUFFER"),
        }
    }
}

/// Current value held in each bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketValues {
    pub rwa: U256,
    pub yield_value: U256,
    pub buffer: U256,
}

impl BucketValues {
    /// Create bucket values.
    pub fn new(rwa: U256, yield_value: U256, buffer: U256) -> Self {
        Self {
            rwa,
            yield_value,
            buffer,
        }
    }

    /// Sum of all buckets.
    #[inline]
    pub fn total(&self) -> U256 {
        self.rwa + self.yield_value + self.buffer
    }

    /// Value of a single bucket.
    pub fn get(&self, bucket: Bucket) -> U256 {
        match bucket {
            Bucket::Rwa => self.rwa,
            Bucket::Yield => self.yield_value,
            Bucket::Buffer => self.buffer,
        }
    }

    /// Mutable access to a single bucket.
    pub fn get_mut(&mut self, bucket: Bucket) -> &mut U256 {
        match bucket {
            Bucket::Rwa => &mut self.rwa,
            Bucket::Yield => &mut self.yield_value,
            Bucket::Buffer => &mut self.buffer,
        }
    }
}

/// Mechanism providing price exposure to a real-world asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureKind {
    /// Perpetual future position.
    Perpetual,
    /// Total-return swap.
    TotalReturnSwap,
    /// Direct token purchase.
    DirectToken,
}

impl Default for ExposureKind {
    fn default() -> Self {
        ExposureKind::DirectToken
    }
}

/// Qualitative risk rating reported by a yield strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Descriptive information reported by a yield strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub name: String,
    /// Base asset accepted by the strategy.
    pub asset: Address,
    pub total_deposited: U256,
    pub current_value: U256,
    /// Current annual yield in basis points.
    pub apy_bps: Bps,
    pub active: bool,
    pub risk: RiskLevel,
}

/// Descriptive information reported by a synthetic RWA token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub name: String,
    pub symbol: String,
    pub exposure: ExposureKind,
}

/// Snapshot produced by one simulation step.
///
/// Values are WAD scaled USD. Records are appended once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Step timestamp.
    pub timestamp: Timestamp,
    /// Total portfolio value after the step.
    pub portfolio_value: U256,
    /// Value per registered asset, in registration order.
    pub asset_values: Vec<U256>,
    /// Weight per registered asset in bps of the current total.
    pub asset_weights: Vec<Bps>,
    /// Unallocated rounding dust.
    pub buffer_value: U256,
    /// Yield harvested during this step.
    pub yield_harvested: U256,
    /// Management fee charged for the elapsed interval.
    pub management_fee: U256,
    /// Whether the step rebalanced.
    pub rebalanced: bool,
    /// Simulated execution cost of the rebalance.
    pub gas_cost: U256,
    /// Value lost to slippage during the rebalance.
    pub slippage_cost: U256,
}

impl BacktestResult {
    /// Sum of per-asset values.
    pub fn invested_value(&self) -> U256 {
        self.asset_values
            .iter()
            .fold(U256::ZERO, |acc, value| acc + *value)
    }

    /// Total execution cost for the step.
    #[inline]
    pub fn execution_cost(&self) -> U256 {
        self.gas_cost + self.slippage_cost
    }
}
