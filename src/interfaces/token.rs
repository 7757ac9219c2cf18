//! Synthetic RWA token interface.

use std::fmt::Debug;

use alloy_primitives::{Address, U256};

use crate::core::types::AssetInfo;
use crate::core::Result;

/// A synthetic token tracking a real-world asset.
///
/// Minting consumes base asset from the vault, burning releases it. The
/// token does not expose its own base asset.
pub trait RwaSyntheticToken: Debug + Send + Sync {
    /// Token identity.
    fn id(&self) -> Address;

    fn mint(&mut self, to: Address, amount: U256) -> Result<()>;

    fn burn(&mut self, from: Address, amount: U256) -> Result<()>;

    fn total_supply(&self) -> U256;

    fn asset_info(&self) -> AssetInfo;

    fn box_clone(&self) -> Box<dyn RwaSyntheticToken>;
}

impl Clone for Box<dyn RwaSyntheticToken> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
