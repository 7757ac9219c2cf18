//! Performance metrics over a backtest result sequence.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use super::drawdown;
use super::streaming::ReturnStream;
use crate::core::math::wad_to_f64;
use crate::core::types::{BacktestResult, Bps, BPS_DENOMINATOR, SECONDS_PER_YEAR};
use crate::core::{Result, VaultError};

/// Summary statistics for one backtest.
///
/// Ratios and returns are plain fractions (0.05 = 5%). Amounts are WAD USD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub start_value: U256,
    pub end_value: U256,
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    /// Maximum drawdown as a WAD fraction.
    pub max_drawdown: U256,
    pub win_rate: f64,
    pub total_yield: U256,
    pub total_management_fees: U256,
    pub total_gas: U256,
    pub total_slippage: U256,
    pub rebalance_count: usize,
    pub steps: usize,
}

impl PerformanceMetrics {
    /// Max drawdown in percent.
    pub fn max_drawdown_pct(&self) -> f64 {
        wad_to_f64(self.max_drawdown) * 100.0
    }
}

/// Computes [`PerformanceMetrics`] from results sampled every `step_size` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsCalculator {
    step_size: u64,
    risk_free_bps: Bps,
}

impl MetricsCalculator {
    /// Create a new metrics calculator.
    ///
    /// # Arguments
    /// * `step_size` - Seconds between results
    /// * `risk_free_bps` - Annual risk-free rate
    pub fn new(step_size: u64, risk_free_bps: Bps) -> Result<Self> {
        if step_size == 0 {
            return Err(VaultError::invalid_parameter("step size must be positive"));
        }
        Ok(Self {
            step_size,
            risk_free_bps,
        })
    }

    #[inline]
    pub fn periods_per_year(&self) -> f64 {
        SECONDS_PER_YEAR as f64 / self.step_size as f64
    }

    fn risk_free_rate(&self) -> f64 {
        f64::from(self.risk_free_bps) / f64::from(BPS_DENOMINATOR)
    }

    /// Maximum drawdown of portfolio values as a WAD fraction.
    pub fn max_drawdown(&self, results: &[BacktestResult]) -> U256 {
        let values: Vec<U256> = results.iter().map(|r| r.portfolio_value).collect();
        drawdown::max_drawdown(&values)
    }

    fn stats(&self, results: &[BacktestResult]) -> Result<ReturnStream> {
        if results.is_empty() {
            return Err(VaultError::empty_data("backtest results"));
        }
        let mut stats = ReturnStream::new(self.periods_per_year(), self.risk_free_rate());
        for result in results {
            stats.push_value(result.portfolio_value);
        }
        Ok(stats)
    }

    /// Annualized standard deviation of step returns.
    pub fn volatility(&self, results: &[BacktestResult]) -> Result<f64> {
        Ok(self.stats(results)?.volatility())
    }

    pub fn sharpe_ratio(&self, results: &[BacktestResult]) -> Result<f64> {
        Ok(self.stats(results)?.sharpe_ratio())
    }

    pub fn sortino_ratio(&self, results: &[BacktestResult]) -> Result<f64> {
        Ok(self.stats(results)?.sortino_ratio())
    }

    /// `end / start - 1`; zero when the start value is zero.
    pub fn total_return(&self, results: &[BacktestResult]) -> Result<f64> {
        let (first, last) = bounds(results)?;
        let start = wad_to_f64(first.portfolio_value);
        if start == 0.0 {
            return Ok(0.0);
        }
        Ok(wad_to_f64(last.portfolio_value) / start - 1.0)
    }

    /// Geometric annualized return `(end / start)^(1 / years) - 1`.
    pub fn annualized_return(&self, results: &[BacktestResult]) -> Result<f64> {
        let (first, last) = bounds(results)?;
        let start = wad_to_f64(first.portfolio_value);
        let end = wad_to_f64(last.portfolio_value);
        let years = last.timestamp.saturating_sub(first.timestamp) as f64 / SECONDS_PER_YEAR as f64;
        if start == 0.0 || years <= 0.0 {
            return Ok(0.0);
        }
        Ok((end / start).powf(1.0 / years) - 1.0)
    }

    /// Annualized return over max drawdown; zero without a drawdown.
    pub fn calmar_ratio(&self, results: &[BacktestResult]) -> Result<f64> {
        let annualized = self.annualized_return(results)?;
        let max_dd = wad_to_f64(self.max_drawdown(results));
        if max_dd == 0.0 {
            return Ok(0.0);
        }
        Ok(annualized / max_dd)
    }

    /// Compute every metric.
    pub fn calculate(&self, results: &[BacktestResult]) -> Result<PerformanceMetrics> {
        let stats = self.stats(results)?;
        let (first, last) = bounds(results)?;

        let mut metrics = PerformanceMetrics {
            start_value: first.portfolio_value,
            end_value: last.portfolio_value,
            total_return: self.total_return(results)?,
            annualized_return: self.annualized_return(results)?,
            volatility: stats.volatility(),
            sharpe_ratio: stats.sharpe_ratio(),
            sortino_ratio: stats.sortino_ratio(),
            calmar_ratio: self.calmar_ratio(results)?,
            max_drawdown: self.max_drawdown(results),
            win_rate: stats.win_rate(),
            steps: results.len(),
            ..PerformanceMetrics::default()
        };
        for result in results {
            metrics.total_yield += result.yield_harvested;
            metrics.total_management_fees += result.management_fee;
            metrics.total_gas += result.gas_cost;
            metrics.total_slippage += result.slippage_cost;
            if result.rebalanced {
                metrics.rebalance_count += 1;
            }
        }
        Ok(metrics)
    }
}

fn bounds(results: &[BacktestResult]) -> Result<(&BacktestResult, &BacktestResult)> {
    match (results.first(), results.last()) {
        (Some(first), Some(last)) => Ok((first, last)),
        _ => Err(VaultError::empty_data("backtest results")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::wad;

    const DAY: u64 = 86_400;

    fn results(values: &[u64]) -> Vec<BacktestResult> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| BacktestResult {
                timestamp: i as u64 * DAY,
                portfolio_value: wad(v),
                asset_values: vec![wad(v)],
                asset_weights: vec![10_000],
                buffer_value: U256::ZERO,
                yield_harvested: wad(1),
                management_fee: U256::ZERO,
                rebalanced: i % 2 == 0,
                gas_cost: U256::ZERO,
                slippage_cost: U256::ZERO,
            })
            .collect()
    }

    fn calculator() -> MetricsCalculator {
        MetricsCalculator::new(DAY, 0).unwrap()
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let calc = calculator();
        assert!(matches!(
            calc.calculate(&[]),
            Err(VaultError::EmptyData { .. })
        ));
        assert!(calc.sharpe_ratio(&[]).is_err());
        assert!(calc.total_return(&[]).is_err());
        assert!(calc.max_drawdown(&[]).is_zero());
    }

    #[test]
    fn test_single_result_is_zero() {
        let metrics = calculator().calculate(&results(&[100])).unwrap();
        assert_eq!(metrics.total_return, 0.0);
        assert_eq!(metrics.annualized_return, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.volatility, 0.0);
        assert!(metrics.max_drawdown.is_zero());
    }

    #[test]
    fn test_drawdown_scenario() {
        let data = results(&[100, 110, 120, 110, 100, 90, 80, 90, 100, 110]);
        let metrics = calculator().calculate(&data).unwrap();
        assert!((metrics.max_drawdown_pct() - 33.3333).abs() < 1e-3);
        assert!((metrics.total_return - 0.1).abs() < 1e-12);
        assert_eq!(metrics.rebalance_count, 5);
        assert_eq!(metrics.total_yield, wad(10));
        assert!(metrics.calmar_ratio > 0.0);
    }

    #[test]
    fn test_annualized_return_full_year() {
        let calc = MetricsCalculator::new(SECONDS_PER_YEAR, 0).unwrap();
        let data = results(&[100, 110]);
        let mut data = data;
        data[1].timestamp = SECONDS_PER_YEAR;
        assert!((calc.annualized_return(&data).unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_constant_growth_has_zero_volatility() {
        let data = results(&[100, 100, 100, 100]);
        let calc = calculator();
        assert_eq!(calc.volatility(&data).unwrap(), 0.0);
        assert_eq!(calc.sharpe_ratio(&data).unwrap(), 0.0);
    }

    #[test]
    fn test_zero_step_rejected() {
        assert!(MetricsCalculator::new(0, 0).is_err());
    }
}
