//! Fixed-point helpers for WAD (1e18) amounts and basis points.

use alloy_primitives::U256;

use super::types::{Bps, BPS_DENOMINATOR, SECONDS_PER_YEAR};

/// One unit in 18-decimal fixed point.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// `a * b / denominator`, rounded down. Zero denominator yields zero.
#[inline]
pub fn mul_div(a: U256, b: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::ZERO;
    }
    a * b / denominator
}

/// `a * b / denominator`, rounded up. Zero denominator yields zero.
pub fn mul_div_up(a: U256, b: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::ZERO;
    }
    let product = a * b;
    let quotient = product / denominator;
    if (product % denominator).is_zero() {
        quotient
    } else {
        quotient + U256::from(1u64)
    }
}

/// Portion of `amount` given by `bps`.
#[inline]
pub fn bps_of(amount: U256, bps: Bps) -> U256 {
    mul_div(amount, U256::from(bps), U256::from(BPS_DENOMINATOR))
}

/// Weight of `part` in `total`, in basis points. Zero total yields zero.
pub fn weight_bps(part: U256, total: U256) -> Bps {
    if total.is_zero() {
        return 0;
    }
    let weight = mul_div(part, U256::from(BPS_DENOMINATOR), total);
    weight.saturating_to::<u32>()
}

/// Linear accrual of an annual `rate_bps` on `value` over `elapsed` seconds.
///
/// `value * rate_bps * elapsed / (SECONDS_PER_YEAR * 10000)`
pub fn accrue_annual(value: U256, rate_bps: Bps, elapsed: u64) -> U256 {
    if rate_bps == 0 || elapsed == 0 {
        return U256::ZERO;
    }
    let numerator = value * U256::from(rate_bps) * U256::from(elapsed);
    numerator / (U256::from(SECONDS_PER_YEAR) * U256::from(BPS_DENOMINATOR))
}

/// Convert a WAD amount to a floating point number of units.
pub fn wad_to_f64(value: U256) -> f64 {
    let whole = value / WAD;
    let frac = value % WAD;
    whole.saturating_to::<u128>() as f64 + frac.saturating_to::<u128>() as f64 / 1e18
}

/// Convert a floating point number of units to WAD. Negative and NaN become zero.
pub fn f64_to_wad(value: f64) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::ZERO;
    }
    let whole = value.trunc();
    let frac = value - whole;
    U256::from(whole as u128) * WAD + U256::from((frac * 1e18).round() as u128)
}

/// Whole units to WAD.
#[inline]
pub fn wad(units: u64) -> U256 {
    U256::from(units) * WAD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_rounding() {
        let a = U256::from(10u64);
        let b = U256::from(1u64);
        let d = U256::from(3u64);
        assert_eq!(mul_div(a, b, d), U256::from(3u64));
        assert_eq!(mul_div_up(a, b, d), U256::from(4u64));
        assert_eq!(mul_div(a, b, U256::ZERO), U256::ZERO);
    }

    #[test]
    fn test_weight_bps() {
        assert_eq!(weight_bps(wad(2_000), wad(10_000)), 2_000);
        assert_eq!(weight_bps(wad(1), U256::ZERO), 0);
    }

    #[test]
    fn test_accrue_annual_full_year() {
        // 5% over one year
        let accrued = accrue_annual(wad(1_000), 500, SECONDS_PER_YEAR);
        assert_eq!(accrued, wad(50));
    }

    #[test]
    fn test_wad_f64_conversion() {
        assert!((wad_to_f64(wad(3)) - 3.0).abs() < 1e-12);
        assert!((wad_to_f64(f64_to_wad(98.63)) - 98.63).abs() < 1e-9);
        assert_eq!(f64_to_wad(-1.0), U256::ZERO);
    }
}
