//! Simulation parameters.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::core::math::wad;
use crate::core::types::Bps;
use crate::execution::{FillModel, GasModel, SlippageModel};

/// What to do when portfolio value grows faster than the guard allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpPolicy {
    /// Fail the step.
    Abort,
    /// Log and keep going.
    Warn,
}

impl Default for JumpPolicy {
    fn default() -> Self {
        JumpPolicy::Abort
    }
}

/// Guard against runaway compounding between two steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpGuard {
    /// Largest allowed ratio of new to previous value, in bps (20000 = 2x).
    pub max_growth_bps: Bps,
    pub policy: JumpPolicy,
}

impl Default for JumpGuard {
    fn default() -> Self {
        Self {
            max_growth_bps: 20_000,
            policy: JumpPolicy::Abort,
        }
    }
}

/// Simulation configuration.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Capital deployed at initialization (WAD USD).
    pub initial_deposit: U256,
    /// Weight deviation that triggers a rebalance.
    pub rebalance_threshold_bps: Bps,
    /// Seconds between scheduled rebalances. Zero disables the schedule.
    pub rebalance_interval: u64,
    /// Annual management fee.
    pub management_fee_bps: Bps,
    pub gas_model: GasModel,
    pub slippage_model: SlippageModel,
    pub fill_model: FillModel,
    pub jump_guard: JumpGuard,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_deposit: wad(10_000),
            rebalance_threshold_bps: 500,
            rebalance_interval: 0,
            management_fee_bps: 0,
            gas_model: GasModel::None,
            slippage_model: SlippageModel::None,
            fill_model: FillModel::Full,
            jump_guard: JumpGuard::default(),
        }
    }
}

impl SimulationConfig {
    pub fn new(initial_deposit: U256) -> Self {
        Self {
            initial_deposit,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, rebalance_threshold_bps: Bps) -> Self {
        self.rebalance_threshold_bps = rebalance_threshold_bps;
        self
    }

    pub fn with_interval(mut self, rebalance_interval: u64) -> Self {
        self.rebalance_interval = rebalance_interval;
        self
    }

    pub fn with_management_fee(mut self, management_fee_bps: Bps) -> Self {
        self.management_fee_bps = management_fee_bps;
        self
    }

    pub fn with_gas_model(mut self, gas_model: GasModel) -> Self {
        self.gas_model = gas_model;
        self
    }

    pub fn with_slippage_model(mut self, slippage_model: SlippageModel) -> Self {
        self.slippage_model = slippage_model;
        self
    }

    pub fn with_fill_model(mut self, fill_model: FillModel) -> Self {
        self.fill_model = fill_model;
        self
    }

    pub fn with_jump_guard(mut self, jump_guard: JumpGuard) -> Self {
        self.jump_guard = jump_guard;
        self
    }
}
