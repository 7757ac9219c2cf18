//! Rebalance execution cost and fill simulation.

pub mod fees;
pub mod fill;
pub mod slippage;

pub use fees::{management_fee, GasModel};
pub use fill::{FillModel, FillRatio};
pub use slippage::SlippageModel;
