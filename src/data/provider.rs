//! Historical prices and yield rates.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use serde::Deserialize;
use tracing::{debug, info};

use super::synthetic::{generate_paths, SyntheticAsset};
use crate::core::math::f64_to_wad;
use crate::core::types::{asset_id, Bps, Timestamp};
use crate::core::{Result, TimeSeries, VaultError};
use crate::interfaces::PriceOracle;

/// Time-indexed store of asset prices (WAD USD) and wrapper yield rates (bps).
///
/// Lookups are step functions: the latest entry at or before the requested
/// timestamp applies.
#[derive(Debug, Clone, Default)]
pub struct HistoricalDataProvider {
    prices: HashMap<Address, TimeSeries<U256>>,
    yield_rates: HashMap<Address, TimeSeries<Bps>>,
}

/// Row kind in a data CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RowKind {
    Price,
    Yield,
}

/// `kind,id,timestamp,value` row. Prices are USD decimals, yields are bps.
#[derive(Debug, Deserialize)]
struct DataRow {
    kind: RowKind,
    id: String,
    timestamp: Timestamp,
    value: f64,
}

impl HistoricalDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the price of `asset` at `timestamp`, replacing any existing entry.
    pub fn set_asset_price(&mut self, asset: Address, timestamp: Timestamp, price: U256) {
        self.prices
            .entry(asset)
            .or_default()
            .insert(timestamp, price);
    }

    /// Price of `asset` in effect at `timestamp`.
    pub fn asset_price(&self, asset: Address, timestamp: Timestamp) -> Result<U256> {
        self.prices
            .get(&asset)
            .and_then(|series| series.value_at(timestamp))
            .copied()
            .ok_or(VaultError::MissingPrice { asset, timestamp })
    }

    /// Record the yield rate of `wrapper` at `timestamp`.
    pub fn set_yield_rate(&mut self, wrapper: Address, timestamp: Timestamp, rate_bps: Bps) {
        self.yield_rates
            .entry(wrapper)
            .or_default()
            .insert(timestamp, rate_bps);
    }

    /// Yield rate of `wrapper` in effect at `timestamp`; zero when none is recorded.
    pub fn yield_rate(&self, wrapper: Address, timestamp: Timestamp) -> Bps {
        self.yield_rates
            .get(&wrapper)
            .and_then(|series| series.value_at(timestamp))
            .copied()
            .unwrap_or(0)
    }

    pub fn price_series(&self, asset: Address) -> Option<&TimeSeries<U256>> {
        self.prices.get(&asset)
    }

    pub fn yield_series(&self, wrapper: Address) -> Option<&TimeSeries<Bps>> {
        self.yield_rates.get(&wrapper)
    }

    /// Assets with at least one price, sorted.
    pub fn assets(&self) -> Vec<Address> {
        let mut assets: Vec<Address> = self.prices.keys().copied().collect();
        assets.sort();
        assets
    }

    /// Load `kind,id,timestamp,value` rows from a CSV file.
    ///
    /// `id` is a hex address or a symbol (see [`asset_id`]).
    ///
    /// # Returns
    /// Number of rows loaded
    pub fn load_csv(&mut self, path: &Path) -> Result<usize> {
        let file = std::fs::File::open(path)?;
        let rows = self.load_csv_reader(file)?;
        info!(path = %path.display(), rows, "loaded historical data");
        Ok(rows)
    }

    /// Load `kind,id,timestamp,value` rows from any reader.
    pub fn load_csv_reader<R: Read>(&mut self, reader: R) -> Result<usize> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut rows = 0;
        for record in csv_reader.deserialize::<DataRow>() {
            let row = record?;
            let id = asset_id(&row.id);
            match row.kind {
                RowKind::Price => {
                    if !(row.value >= 0.0) {
                        return Err(VaultError::invalid_parameter(format!(
                            "negative price for {} at {}",
                            row.id, row.timestamp
                        )));
                    }
                    self.set_asset_price(id, row.timestamp, f64_to_wad(row.value));
                }
                RowKind::Yield => {
                    if !(row.value >= 0.0) {
                        return Err(VaultError::invalid_parameter(format!(
                            "negative yield for {} at {}",
                            row.id, row.timestamp
                        )));
                    }
                    self.set_yield_rate(id, row.timestamp, row.value.round() as Bps);
                }
            }
            rows += 1;
        }
        Ok(rows)
    }

    /// Fill prices (and constant yields) from seeded GBM paths.
    pub fn fill_synthetic(
        &mut self,
        assets: &[SyntheticAsset],
        start: Timestamp,
        end: Timestamp,
        step: u64,
        seed: u64,
    ) -> Result<()> {
        let paths = generate_paths(assets, start, end, step, seed)?;
        for path in paths {
            debug!(asset = %path.asset, points = path.prices.len(), "synthetic path");
            for (timestamp, price) in path.prices {
                self.set_asset_price(path.asset, timestamp, price);
            }
        }
        for params in assets {
            if let Some(wrapper) = params.yield_wrapper {
                self.set_yield_rate(wrapper, start, params.yield_bps);
            }
        }
        Ok(())
    }
}

/// [`PriceOracle`] view of a provider pinned to one timestamp.
#[derive(Debug, Clone)]
pub struct HistoricalOracle {
    provider: Arc<HistoricalDataProvider>,
    timestamp: Timestamp,
}

impl HistoricalOracle {
    pub fn new(provider: Arc<HistoricalDataProvider>, timestamp: Timestamp) -> Self {
        Self {
            provider,
            timestamp,
        }
    }

    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl PriceOracle for HistoricalOracle {
    fn price(&self, asset: Address) -> Result<U256> {
        self.provider.asset_price(asset, self.timestamp)
    }

    fn box_clone(&self) -> Box<dyn PriceOracle> {
        Box::new(self.clone())
    }
}
