//! Target allocation and per-entity allocation records.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::core::math::bps_of;
use crate::core::types::{Bps, Bucket, Timestamp, BPS_DENOMINATOR};
use crate::core::{Result, VaultError};

/// Target split of managed value across the three buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub rwa_bps: Bps,
    pub yield_bps: Bps,
    pub buffer_bps: Bps,
    /// Time of the last successful rebalance.
    pub last_rebalanced: Option<Timestamp>,
}

impl Default for Allocation {
    /// Everything in the buffer.
    fn default() -> Self {
        Self {
            rwa_bps: 0,
            yield_bps: 0,
            buffer_bps: BPS_DENOMINATOR,
            last_rebalanced: None,
        }
    }
}

impl Allocation {
    /// Create a validated allocation.
    pub fn new(rwa_bps: Bps, yield_bps: Bps, buffer_bps: Bps) -> Result<Self> {
        let total = u64::from(rwa_bps) + u64::from(yield_bps) + u64::from(buffer_bps);
        if total != u64::from(BPS_DENOMINATOR) {
            return Err(VaultError::invalid_allocation(rwa_bps, yield_bps, buffer_bps));
        }
        Ok(Self {
            rwa_bps,
            yield_bps,
            buffer_bps,
            last_rebalanced: None,
        })
    }

    /// Target weight of a bucket.
    pub fn bps(&self, bucket: Bucket) -> Bps {
        match bucket {
            Bucket::Rwa => self.rwa_bps,
            Bucket::Yield => self.yield_bps,
            Bucket::Buffer => self.buffer_bps,
        }
    }

    /// Target value of a bucket given the total under management.
    #[inline]
    pub fn target(&self, bucket: Bucket, total: U256) -> U256 {
        bps_of(total, self.bps(bucket))
    }
}

/// Share of a bucket assigned to one RWA token or yield strategy.
///
/// Percentages within a bucket need not sum to 10000; distribution
/// normalizes over active records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub id: Address,
    pub percentage: Bps,
    pub active: bool,
}

pub type RwaAllocation = AllocationRecord;
pub type StrategyAllocation = AllocationRecord;

/// Append-only list of records. Removal only clears `active`, so indices stay stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordList {
    records: Vec<AllocationRecord>,
}

impl RecordList {
    /// Add or reactivate `id`, returning its index.
    pub fn add(&mut self, id: Address, percentage: Bps, context: &str) -> Result<usize> {
        if id == Address::ZERO {
            return Err(VaultError::zero_identity(context));
        }
        if percentage == 0 {
            return Err(VaultError::ZeroPercentage);
        }
        match self.position(id) {
            Some(idx) if self.records[idx].active => Err(VaultError::AlreadyActive { id }),
            Some(idx) => {
                self.records[idx].percentage = percentage;
                self.records[idx].active = true;
                Ok(idx)
            }
            None => {
                self.records.push(AllocationRecord {
                    id,
                    percentage,
                    active: true,
                });
                Ok(self.records.len() - 1)
            }
        }
    }

    pub fn update(&mut self, id: Address, percentage: Bps) -> Result<()> {
        let idx = self.active_index(id)?;
        if percentage == 0 {
            return Err(VaultError::ZeroPercentage);
        }
        self.records[idx].percentage = percentage;
        Ok(())
    }

    pub fn remove(&mut self, id: Address) -> Result<()> {
        let idx = self.active_index(id)?;
        self.records[idx].active = false;
        Ok(())
    }

    pub fn get(&self, id: Address) -> Option<&AllocationRecord> {
        self.position(id).map(|idx| &self.records[idx])
    }

    pub fn is_active(&self, id: Address) -> bool {
        self.get(id).map_or(false, |record| record.active)
    }

    /// Active records in registration order.
    pub fn active(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.records.iter().filter(|record| record.active)
    }

    pub fn as_slice(&self) -> &[AllocationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn position(&self, id: Address) -> Option<usize> {
        self.records.iter().position(|record| record.id == id)
    }

    fn active_index(&self, id: Address) -> Result<usize> {
        self.position(id)
            .filter(|&idx| self.records[idx].active)
            .ok_or(VaultError::NotActive { id })
    }
}

/// Allocation state owned by the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLedger {
    pub allocation: Allocation,
    pub rwa: RecordList,
    pub strategies: RecordList,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the target allocation, keeping `last_rebalanced`.
    pub fn set_allocation(&mut self, rwa_bps: Bps, yield_bps: Bps, buffer_bps: Bps) -> Result<()> {
        let mut allocation = Allocation::new(rwa_bps, yield_bps, buffer_bps)?;
        allocation.last_rebalanced = self.allocation.last_rebalanced;
        self.allocation = allocation;
        Ok(())
    }

    pub fn mark_rebalanced(&mut self, timestamp: Timestamp) {
        self.allocation.last_rebalanced = Some(timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_sum_invariant() {
        assert!(Allocation::new(2_000, 7_000, 1_000).is_ok());
        assert!(matches!(
            Allocation::new(2_000, 7_000, 1_001),
            Err(VaultError::InvalidAllocation { .. })
        ));
        assert!(Allocation::new(u32::MAX, 1, 0).is_err());
        let default = Allocation::default();
        assert_eq!(default.buffer_bps, 10_000);
        assert!(default.last_rebalanced.is_none());
    }

    #[test]
    fn test_set_allocation_failure_keeps_state() {
        let mut ledger = AllocationLedger::new();
        ledger.set_allocation(2_000, 7_000, 1_000).unwrap();
        assert!(ledger.set_allocation(5_000, 5_000, 1).is_err());
        assert_eq!(ledger.allocation.rwa_bps, 2_000);
        assert_eq!(ledger.allocation.yield_bps, 7_000);
    }

    #[test]
    fn test_record_lifecycle() {
        let id = Address::repeat_byte(4);
        let mut list = RecordList::default();
        assert!(matches!(
            list.add(Address::ZERO, 100, "token"),
            Err(VaultError::ZeroIdentity { .. })
        ));
        assert!(matches!(list.add(id, 0, "token"), Err(VaultError::ZeroPercentage)));
        assert_eq!(list.add(id, 100, "token").unwrap(), 0);
        assert!(matches!(
            list.add(id, 100, "token"),
            Err(VaultError::AlreadyActive { .. })
        ));
        list.remove(id).unwrap();
        assert!(matches!(list.remove(id), Err(VaultError::NotActive { .. })));
        assert!(matches!(list.update(id, 50), Err(VaultError::NotActive { .. })));
        // reactivation keeps the original index
        assert_eq!(list.add(id, 300, "token").unwrap(), 0);
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(id).unwrap().percentage, 300);
    }

    #[test]
    fn test_removed_records_keep_indices() {
        let mut list = RecordList::default();
        for byte in 1..=3u8 {
            list.add(Address::repeat_byte(byte), 100, "strategy").unwrap();
        }
        list.remove(Address::repeat_byte(2)).unwrap();
        assert_eq!(list.as_slice()[2].id, Address::repeat_byte(3));
        assert_eq!(list.active().count(), 2);
    }
}
