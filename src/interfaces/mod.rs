//! Capability interfaces consumed by the allocation manager.
//!
//! Oracles, yield strategies, exposure mechanisms and synthetic tokens are
//! external collaborators. The engine only sees these traits; the in-memory
//! implementations in [`memory`] back tests, simulations and demos.

pub mod exposure;
pub mod memory;
pub mod oracle;
pub mod token;
pub mod yield_strategy;

pub use exposure::{ExposureBackedToken, ExposureStrategy};
pub use memory::{InMemoryExposure, InMemorySyntheticToken, InMemoryYieldStrategy};
pub use oracle::{FixedPriceOracle, PriceOracle};
pub use token::RwaSyntheticToken;
pub use yield_strategy::YieldStrategy;
