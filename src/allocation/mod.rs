//! Capital allocation and rebalancing.

pub mod events;
pub mod guard;
pub mod ledger;
pub mod manager;
pub mod planner;

pub use events::AllocationEvent;
pub use guard::ReentrancyGuard;
pub use ledger::{Allocation, AllocationLedger, AllocationRecord, RwaAllocation, StrategyAllocation};
pub use manager::{BucketWeights, CapitalAllocationManager, RwaValuation};
pub use planner::{plan_rebalance, Move};
