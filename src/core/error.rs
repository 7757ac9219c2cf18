//! Error types for vaultbt.

use alloy_primitives::Address;
use thiserror::Error;

use super::types::Timestamp;

/// Result type alias for vaultbt operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Error types for the allocation manager, simulation engine and backtests.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Target percentages do not sum to 10000 bps.
    #[error("Invalid allocation: {rwa_bps} + {yield_bps} + {buffer_bps} bps must sum to 10000")]
    InvalidAllocation {
        rwa_bps: u32,
        yield_bps: u32,
        buffer_bps: u32,
    },

    /// Zero address passed where an entity identity is required.
    #[error("Zero identity provided for {context}")]
    ZeroIdentity { context: String },

    /// Zero amount passed where a positive amount is required.
    #[error("Zero amount provided for {context}")]
    ZeroAmount { context: String },

    /// Zero percentage for an RWA token or yield strategy.
    #[error("Percentage must be greater than zero")]
    ZeroPercentage,

    /// Entity is already registered and active.
    #[error("Entity {id} is already active")]
    AlreadyActive { id: Address },

    /// Entity is not registered or was removed.
    #[error("Entity {id} is not active")]
    NotActive { id: Address },

    /// Yield strategy reports a different base asset than the manager.
    #[error("Asset mismatch: expected {expected}, got {actual}")]
    AssetMismatch { expected: Address, actual: Address },

    /// Rebalance requested while nothing is under management.
    #[error("No assets to rebalance")]
    NoAssets,

    /// A rebalance is already in flight.
    #[error("Rebalance already in progress")]
    RebalanceInProgress,

    /// Buffer balance is lower than the requested amount.
    #[error("Insufficient buffer: requested {requested}, available {available}")]
    InsufficientBuffer { requested: String, available: String },

    /// A collaborator (strategy, token, oracle) failed.
    #[error("External call to {source_name} failed: {message}")]
    External { source_name: String, message: String },

    /// No price recorded for the asset at or before the timestamp.
    #[error("No price for {asset} at or before {timestamp}")]
    MissingPrice { asset: Address, timestamp: Timestamp },

    /// Simulation stepped before `initialize`.
    #[error("Simulation not initialized")]
    NotInitialized,

    /// Simulation initialized twice, or mutated after initialization.
    #[error("Simulation already initialized")]
    AlreadyInitialized,

    /// Step timestamp earlier than the previous step.
    #[error("Non-monotonic timestamp: last step {last}, requested {requested}")]
    NonMonotonicTimestamp { last: Timestamp, requested: Timestamp },

    /// Asset target weights do not sum to 10000 bps.
    #[error("Target weights sum to {total} bps, expected 10000")]
    InvalidWeights { total: u32 },

    /// Portfolio value grew faster than the configured guard allows.
    #[error("Portfolio value jumped at {timestamp}: previous {previous}, new {current}")]
    ValueJump {
        timestamp: Timestamp,
        previous: String,
        current: String,
    },

    /// Backtest run before `configure`.
    #[error("Backtest window not configured")]
    NotConfigured,

    /// Invalid parameter value.
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Empty data error.
    #[error("Empty data provided for {context}")]
    EmptyData { context: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// Create an invalid allocation error.
    pub fn invalid_allocation(rwa_bps: u32, yield_bps: u32, buffer_bps: u32) -> Self {
        Self::InvalidAllocation {
            rwa_bps,
            yield_bps,
            buffer_bps,
        }
    }

    /// Create a zero identity error.
    pub fn zero_identity(context: impl Into<String>) -> Self {
        Self::ZeroIdentity {
            context: context.into(),
        }
    }

    /// Create a zero amount error.
    pub fn zero_amount(context: impl Into<String>) -> Self {
        Self::ZeroAmount {
            context: context.into(),
        }
    }

    /// Create an external failure error.
    pub fn external(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::External {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an empty data error.
    pub fn empty_data(context: impl Into<String>) -> Self {
        Self::EmptyData {
            context: context.into(),
        }
    }

    /// Whether the error is caller misuse rather than a data or collaborator failure.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoAssets
                | Self::NotInitialized
                | Self::AlreadyInitialized
                | Self::NonMonotonicTimestamp { .. }
                | Self::NotConfigured
                | Self::RebalanceInProgress
                | Self::InsufficientBuffer { .. }
        )
    }
}

#[cfg(feature = "python")]
impl From<VaultError> for pyo3::PyErr {
    fn from(err: VaultError) -> pyo3::PyErr {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    }
}
