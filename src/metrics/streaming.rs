//! Single-pass return statistics over a portfolio value stream.
//!
//! Values are fed one step at a time; each step's simple return against the
//! previous value is folded into Welford running moments, so a result
//! sequence of any length is summarized without buffering returns.

use alloy_primitives::U256;

use crate::core::math::wad_to_f64;

/// Running moments of per-step returns, annualized with a fixed period count.
#[derive(Debug, Clone)]
pub struct ReturnStream {
    periods_per_year: f64,
    /// Per-step hurdle: the annual risk-free rate spread over the periods.
    hurdle: f64,
    previous: Option<f64>,
    n: usize,
    mean: f64,
    sq_dev: f64,
    sq_shortfall: f64,
    gains: usize,
}

impl ReturnStream {
    /// # Arguments
    /// * `periods_per_year` - Steps in one year
    /// * `annual_risk_free` - Annual risk-free rate as a fraction
    pub fn new(periods_per_year: f64, annual_risk_free: f64) -> Self {
        let hurdle = if periods_per_year > 0.0 {
            annual_risk_free / periods_per_year
        } else {
            0.0
        };
        Self {
            periods_per_year,
            hurdle,
            previous: None,
            n: 0,
            mean: 0.0,
            sq_dev: 0.0,
            sq_shortfall: 0.0,
            gains: 0,
        }
    }

    /// Feed the next portfolio value (WAD). A zero previous value yields no
    /// return for this step.
    pub fn push_value(&mut self, value: U256) {
        let current = wad_to_f64(value);
        if let Some(prev) = self.previous.filter(|p| *p != 0.0) {
            self.push_return((current - prev) / prev);
        }
        self.previous = Some(current);
    }

    /// Fold one step return into the moments.
    pub fn push_return(&mut self, r: f64) {
        self.n += 1;
        if r > 0.0 {
            self.gains += 1;
        }
        let before = r - self.mean;
        self.mean += before / self.n as f64;
        self.sq_dev += before * (r - self.mean);

        let shortfall = (r - self.hurdle).min(0.0);
        self.sq_shortfall += shortfall * shortfall;
    }

    /// Number of returns folded in.
    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample standard deviation of step returns.
    pub fn std_dev(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        (self.sq_dev / (self.n - 1) as f64).sqrt()
    }

    /// Sample deviation of returns below the hurdle.
    pub fn downside_deviation(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        (self.sq_shortfall / (self.n - 1) as f64).sqrt()
    }

    pub fn volatility(&self) -> f64 {
        self.std_dev() * self.periods_per_year.sqrt()
    }

    /// Annualized excess return over volatility; zero when returns do not vary.
    pub fn sharpe_ratio(&self) -> f64 {
        let std = self.std_dev();
        if std == 0.0 {
            return 0.0;
        }
        (self.mean - self.hurdle) / std * self.periods_per_year.sqrt()
    }

    /// Like [`sharpe_ratio`](Self::sharpe_ratio) with only the downside in
    /// the denominator; zero when no step fell below the hurdle.
    pub fn sortino_ratio(&self) -> f64 {
        let downside = self.downside_deviation();
        if downside == 0.0 {
            return 0.0;
        }
        (self.mean - self.hurdle) / downside * self.periods_per_year.sqrt()
    }

    /// Share of steps with a positive return.
    pub fn win_rate(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        self.gains as f64 / self.n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::wad;

    fn stream(values: &[u64]) -> ReturnStream {
        let mut s = ReturnStream::new(365.0, 0.0);
        for &v in values {
            s.push_value(wad(v));
        }
        s
    }

    #[test]
    fn test_moments() {
        let mut s = ReturnStream::new(365.0, 0.0);
        for r in [0.01, 0.02, 0.03, 0.04] {
            s.push_return(r);
        }
        assert_eq!(s.len(), 4);
        assert!((s.mean() - 0.025).abs() < 1e-12);
        // sample std of 1,2,3,4 (scaled by 1e-2) is sqrt(5/3)
        assert!((s.std_dev() - (5.0f64 / 3.0).sqrt() * 1e-2).abs() < 1e-12);
    }

    #[test]
    fn test_values_become_returns() {
        let s = stream(&[100, 110, 99]);
        assert_eq!(s.len(), 2);
        assert!((s.mean() - 0.0).abs() < 1e-12);
        assert_eq!(s.win_rate(), 0.5);
    }

    #[test]
    fn test_zero_value_is_skipped() {
        let s = stream(&[0, 100, 110]);
        assert_eq!(s.len(), 1);
        assert!((s.mean() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_flat_values_have_zero_ratios() {
        let s = stream(&[100; 10]);
        assert_eq!(s.volatility(), 0.0);
        assert_eq!(s.sharpe_ratio(), 0.0);
        assert_eq!(s.sortino_ratio(), 0.0);
        assert_eq!(s.win_rate(), 0.0);
    }

    #[test]
    fn test_hurdle_lowers_sharpe() {
        let mut plain = ReturnStream::new(252.0, 0.0);
        let mut hurdled = ReturnStream::new(252.0, 0.05);
        for r in [0.01, -0.005, 0.02, 0.0, 0.015] {
            plain.push_return(r);
            hurdled.push_return(r);
        }
        assert!(plain.sharpe_ratio() > 0.0);
        assert!(hurdled.sharpe_ratio() < plain.sharpe_ratio());
        assert!(plain.sortino_ratio() > plain.sharpe_ratio());
    }
}
