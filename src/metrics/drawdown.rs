//! Drawdown tracking on WAD values.

use alloy_primitives::U256;

use crate::core::math::{mul_div, WAD};

/// Drawdown tracker for incremental portfolio value updates.
///
/// Drawdowns are WAD fractions of the running peak (1e18 = 100%).
#[derive(Debug, Clone, Default)]
pub struct DrawdownTracker {
    /// Current peak value.
    peak: U256,
    /// Current drawdown.
    current_drawdown: U256,
    /// Maximum drawdown seen.
    max_drawdown: U256,
    /// Steps since the last peak.
    current_duration: usize,
    /// Longest stretch below a peak.
    max_duration: usize,
    /// Index at max drawdown.
    max_drawdown_idx: usize,
    /// Total count of updates.
    count: usize,
}

impl DrawdownTracker {
    /// Create a new drawdown tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with new portfolio value.
    pub fn update(&mut self, value: U256) {
        self.count += 1;

        if value >= self.peak {
            self.peak = value;
            self.current_drawdown = U256::ZERO;
            self.current_duration = 0;
            return;
        }

        self.current_drawdown = mul_div(self.peak - value, WAD, self.peak);
        self.current_duration += 1;
        if self.current_drawdown > self.max_drawdown {
            self.max_drawdown = self.current_drawdown;
            self.max_drawdown_idx = self.count - 1;
        }
        self.max_duration = self.max_duration.max(self.current_duration);
    }

    /// Maximum drawdown as a WAD fraction.
    #[inline]
    pub fn max_drawdown(&self) -> U256 {
        self.max_drawdown
    }

    /// Current drawdown as a WAD fraction.
    #[inline]
    pub fn current_drawdown(&self) -> U256 {
        self.current_drawdown
    }

    #[inline]
    pub fn peak(&self) -> U256 {
        self.peak
    }

    #[inline]
    pub fn max_duration(&self) -> usize {
        self.max_duration
    }

    #[inline]
    pub fn max_drawdown_idx(&self) -> usize {
        self.max_drawdown_idx
    }

    #[inline]
    pub fn in_drawdown(&self) -> bool {
        !self.current_drawdown.is_zero()
    }
}

/// Drawdown from the running peak at each point, as WAD fractions.
pub fn drawdown_curve(values: &[U256]) -> Vec<U256> {
    let mut peak = U256::ZERO;
    values
        .iter()
        .map(|&value| {
            peak = peak.max(value);
            if peak.is_zero() {
                U256::ZERO
            } else {
                mul_div(peak - value, WAD, peak)
            }
        })
        .collect()
}

/// Maximum drawdown as a WAD fraction. Zero for empty, single-point and
/// monotonically rising sequences.
pub fn max_drawdown(values: &[U256]) -> U256 {
    let mut tracker = DrawdownTracker::new();
    for &value in values {
        tracker.update(value);
    }
    tracker.max_drawdown()
}
