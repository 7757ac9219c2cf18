//! Explicit re-entrancy flag for rebalancing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::{Result, VaultError};

/// RAII holder of a rebalance flag. The flag is cleared when the guard drops.
#[derive(Debug)]
pub struct ReentrancyGuard {
    flag: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    /// Set `flag`, failing with `RebalanceInProgress` if it is already set.
    pub fn enter(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| VaultError::RebalanceInProgress)?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_enter_fails() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = ReentrancyGuard::enter(&flag).unwrap();
        assert!(matches!(
            ReentrancyGuard::enter(&flag),
            Err(VaultError::RebalanceInProgress)
        ));
        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(ReentrancyGuard::enter(&flag).is_ok());
    }
}
