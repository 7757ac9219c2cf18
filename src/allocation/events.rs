//! Allocation event log.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::planner::Move;
use crate::core::types::{Bps, Timestamp};

/// Observable state change of a [`CapitalAllocationManager`](super::CapitalAllocationManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationEvent {
    AllocationSet {
        rwa_bps: Bps,
        yield_bps: Bps,
        buffer_bps: Bps,
    },
    RwaTokenAdded { token: Address, percentage: Bps },
    RwaTokenUpdated { token: Address, percentage: Bps },
    RwaTokenRemoved { token: Address },
    YieldStrategyAdded { strategy: Address, percentage: Bps },
    YieldStrategyUpdated { strategy: Address, percentage: Bps },
    YieldStrategyRemoved { strategy: Address },
    Rebalanced {
        total_value: U256,
        moves: Vec<Move>,
        timestamp: Timestamp,
    },
}

impl AllocationEvent {
    /// Emit the event as a tracing record.
    pub(crate) fn log(&self) {
        match self {
            AllocationEvent::AllocationSet {
                rwa_bps,
                yield_bps,
                buffer_bps,
            } => info!(rwa_bps, yield_bps, buffer_bps, "allocation set"),
            AllocationEvent::RwaTokenAdded { token, percentage } => {
                info!(%token, percentage, "rwa token added")
            }
            AllocationEvent::RwaTokenUpdated { token, percentage } => {
                info!(%token, percentage, "rwa token updated")
            }
            AllocationEvent::RwaTokenRemoved { token } => info!(%token, "rwa token removed"),
            AllocationEvent::YieldStrategyAdded {
                strategy,
                percentage,
            } => info!(%strategy, percentage, "yield strategy added"),
            AllocationEvent::YieldStrategyUpdated {
                strategy,
                percentage,
            } => info!(%strategy, percentage, "yield strategy updated"),
            AllocationEvent::YieldStrategyRemoved { strategy } => {
                info!(%strategy, "yield strategy removed")
            }
            AllocationEvent::Rebalanced {
                total_value,
                moves,
                timestamp,
            } => info!(
                %total_value,
                moves = moves.len(),
                timestamp,
                "rebalanced"
            ),
        }
    }
}
