//! Deterministic synthetic price paths.
//!
//! Geometric Brownian Motion per asset, driven by a seeded xoshiro256**
//! generator. Each asset draws from its own jumped stream, so paths are
//! identical whether generated serially or on the rayon pool.

use alloy_primitives::{Address, U256};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::math::f64_to_wad;
use crate::core::types::{Bps, Timestamp, SECONDS_PER_YEAR};
use crate::core::{Result, VaultError};

/// GBM parameters for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticAsset {
    pub asset: Address,
    /// Starting USD price.
    pub initial_price: f64,
    /// Annualized drift, e.g. 0.07 for 7%.
    pub annual_drift: f64,
    /// Annualized volatility, e.g. 0.2 for 20%.
    pub annual_volatility: f64,
    /// Wrapper that pays yield, if any.
    pub yield_wrapper: Option<Address>,
    /// Constant annual yield paid by the wrapper.
    pub yield_bps: Bps,
}

impl SyntheticAsset {
    pub fn new(asset: Address, initial_price: f64) -> Self {
        Self {
            asset,
            initial_price,
            annual_drift: 0.0,
            annual_volatility: 0.0,
            yield_wrapper: None,
            yield_bps: 0,
        }
    }

    /// Set drift and volatility.
    pub fn with_gbm(mut self, annual_drift: f64, annual_volatility: f64) -> Self {
        self.annual_drift = annual_drift;
        self.annual_volatility = annual_volatility.max(0.0);
        self
    }

    /// Pay a constant yield through `wrapper`.
    pub fn with_yield(mut self, wrapper: Address, yield_bps: Bps) -> Self {
        self.yield_wrapper = Some(wrapper);
        self.yield_bps = yield_bps;
        self
    }
}

/// Generated series for one asset.
#[derive(Debug, Clone)]
pub struct SyntheticPath {
    pub asset: Address,
    /// (timestamp, WAD price) points.
    pub prices: Vec<(Timestamp, U256)>,
}

/// Gaussian shocks for one asset's GBM path (xoshiro256** core).
///
/// Each asset takes the stream left after jumping the seeded state once per
/// preceding asset, so a path depends only on the seed and the asset's
/// position, whichever thread generates it.
#[derive(Clone)]
struct ShockStream {
    s: [u64; 4],
}

impl ShockStream {
    fn seeded(seed: u64) -> Self {
        let mut z = seed;
        let mut s = [0u64; 4];
        for word in &mut s {
            z = z.wrapping_add(0x9e3779b97f4a7c15);
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
            *word = z ^ (z >> 31);
        }
        Self { s }
    }

    /// One stream per asset, in asset order.
    fn per_asset(seed: u64, count: usize) -> Vec<Self> {
        let mut base = Self::seeded(seed);
        (0..count)
            .map(|_| {
                let stream = base.clone();
                base.skip_ahead();
                stream
            })
            .collect()
    }

    /// Move to the next non-overlapping stream.
    fn skip_ahead(&mut self) {
        const JUMP: [u64; 4] =
            [0x180ec6d33cfd0aba, 0xd5a61266f0c9392c, 0xa9582618e03fc9aa, 0x39abdc4529b1661c];
        let mut acc = [0u64; 4];
        for mask in JUMP {
            for bit in 0..64 {
                if mask & (1u64 << bit) != 0 {
                    for (word, state) in acc.iter_mut().zip(self.s.iter()) {
                        *word ^= *state;
                    }
                }
                self.next_bits();
            }
        }
        self.s = acc;
    }

    fn next_bits(&mut self) -> u64 {
        let out = self.s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = self.s[1] << 17;
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);
        out
    }

    fn next_unit(&mut self) -> f64 {
        (self.next_bits() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Next N(0, 1) shock.
    fn next_shock(&mut self) -> f64 {
        let u1 = self.next_unit().max(1e-15);
        let u2 = self.next_unit();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

/// Generate GBM price paths on `[start, end]` every `step` seconds.
///
/// # Arguments
/// * `assets` - Per-asset parameters
/// * `start` - First timestamp
/// * `end` - Last timestamp (inclusive)
/// * `step` - Seconds between points
/// * `seed` - Generator seed
///
/// # Returns
/// One path per asset, in input order
pub fn generate_paths(
    assets: &[SyntheticAsset],
    start: Timestamp,
    end: Timestamp,
    step: u64,
    seed: u64,
) -> Result<Vec<SyntheticPath>> {
    if step == 0 {
        return Err(VaultError::invalid_parameter("synthetic step must be positive"));
    }
    if end < start {
        return Err(VaultError::invalid_parameter("synthetic end precedes start"));
    }
    if let Some(bad) = assets.iter().find(|a| !(a.initial_price > 0.0)) {
        return Err(VaultError::invalid_parameter(format!(
            "initial price for {} must be positive",
            bad.asset
        )));
    }

    let rngs = ShockStream::per_asset(seed, assets.len());

    let dt = step as f64 / SECONDS_PER_YEAR as f64;
    let paths = assets
        .par_iter()
        .zip(rngs.into_par_iter())
        .map(|(params, mut rng)| {
            let drift = (params.annual_drift - 0.5 * params.annual_volatility.powi(2)) * dt;
            let diffusion = params.annual_volatility * dt.sqrt();

            let mut price = params.initial_price;
            let mut points = Vec::with_capacity(((end - start) / step + 1) as usize);
            let mut t = start;
            loop {
                points.push((t, f64_to_wad(price)));
                match t.checked_add(step) {
                    Some(next) if next <= end => t = next,
                    _ => break,
                }
                price *= (drift + diffusion * rng.next_shock()).exp();
            }
            SyntheticPath {
                asset: params.asset,
                prices: points,
            }
        })
        .collect();

    Ok(paths)
}
