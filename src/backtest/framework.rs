//! Backtest driver over a simulation engine.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::core::types::{BacktestResult, Bps, Timestamp};
use crate::core::{Result, VaultBtConfig, VaultError};
use crate::data::HistoricalDataProvider;
use crate::metrics::{MetricsCalculator, PerformanceMetrics};
use crate::simulation::{AssetConfig, SimulationConfig, VaultSimulationEngine};

/// Upper bound on result slots reserved before a run.
const MAX_PREALLOCATED_STEPS: usize = 1 << 16;

/// Inclusive `[start, end]` window stepped by `step_size` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestWindow {
    pub start: Timestamp,
    pub end: Timestamp,
    pub step_size: u64,
}

impl BacktestWindow {
    pub fn new(start: Timestamp, end: Timestamp, step_size: u64) -> Result<Self> {
        if start >= end {
            return Err(VaultError::invalid_parameter(format!(
                "backtest start {start} must precede end {end}"
            )));
        }
        if step_size == 0 {
            return Err(VaultError::invalid_parameter("step size must be positive"));
        }
        Ok(Self {
            start,
            end,
            step_size,
        })
    }

    /// Step timestamps `start, start + step, ...` up to and including `end`.
    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> {
        let (end, step) = (self.end, self.step_size);
        std::iter::successors(Some(self.start), move |t| {
            t.checked_add(step).filter(|next| *next <= end)
        })
    }

    /// Number of steps in the window, saturating at `usize::MAX`.
    pub fn step_count(&self) -> usize {
        usize::try_from((self.end - self.start) / self.step_size)
            .ok()
            .and_then(|n| n.checked_add(1))
            .unwrap_or(usize::MAX)
    }
}

/// A backtest that stopped early.
///
/// `step` is the number of results appended before the failure; failures
/// during initialization report step 0 at the window start.
#[derive(Debug, Error)]
#[error("Backtest failed at step {step} (t={timestamp}): {source}")]
pub struct BacktestFailure {
    pub step: usize,
    pub timestamp: Timestamp,
    pub source: VaultError,
}

/// Runs a [`VaultSimulationEngine`] over a configured window and keeps the
/// per-step results.
///
/// The engine passed to [`new`](Self::new) is kept as a template; every run
/// starts from a fresh copy of it.
#[derive(Debug, Clone)]
pub struct BacktestingFramework {
    template: VaultSimulationEngine,
    engine: Option<VaultSimulationEngine>,
    window: Option<BacktestWindow>,
    risk_free_bps: Bps,
    results: Vec<BacktestResult>,
}

impl BacktestingFramework {
    /// Create a framework around an engine with its assets registered.
    pub fn new(engine: VaultSimulationEngine) -> Self {
        Self {
            template: engine,
            engine: None,
            window: None,
            risk_free_bps: 0,
            results: Vec::new(),
        }
    }

    /// Build the engine from a provider, parameters and asset list.
    pub fn from_parts(
        provider: Arc<HistoricalDataProvider>,
        config: SimulationConfig,
        assets: Vec<AssetConfig>,
    ) -> Result<Self> {
        let mut engine = VaultSimulationEngine::new(provider, config);
        for asset in assets {
            engine.add_asset(asset)?;
        }
        Ok(Self::new(engine))
    }

    /// Build a configured framework from a run config.
    pub fn from_config(config: &VaultBtConfig, provider: Arc<HistoricalDataProvider>) -> Result<Self> {
        let mut framework =
            Self::from_parts(provider, config.simulation_config()?, config.asset_configs())?
                .with_risk_free_rate(config.backtest.risk_free_bps);
        framework.configure(config.backtest.start, config.backtest.end, config.backtest.step)?;
        Ok(framework)
    }

    /// Annual risk-free rate used for Sharpe.
    pub fn with_risk_free_rate(mut self, risk_free_bps: Bps) -> Self {
        self.risk_free_bps = risk_free_bps;
        self
    }

    /// Set the backtest window.
    ///
    /// # Arguments
    /// * `start` - First step timestamp; the engine initializes here
    /// * `end` - Last step timestamp (inclusive)
    /// * `step_size` - Seconds between steps
    pub fn configure(&mut self, start: Timestamp, end: Timestamp, step_size: u64) -> Result<()> {
        self.window = Some(BacktestWindow::new(start, end, step_size)?);
        Ok(())
    }

    pub fn window(&self) -> Option<BacktestWindow> {
        self.window
    }

    /// Run the backtest, returning the number of steps completed.
    ///
    /// Results appended before a failing step are kept.
    pub fn try_run_backtest(&mut self) -> std::result::Result<usize, BacktestFailure> {
        self.results.clear();
        self.engine = None;

        let window = self.window.ok_or(BacktestFailure {
            step: 0,
            timestamp: 0,
            source: VaultError::NotConfigured,
        })?;

        let mut engine = self.template.clone();
        let outcome = Self::drive(&mut engine, window, &mut self.results);
        self.engine = Some(engine);

        match outcome {
            Ok(()) => {
                info!(
                    steps = self.results.len(),
                    start = window.start,
                    end = window.end,
                    "backtest complete"
                );
                Ok(self.results.len())
            }
            Err(failure) => {
                error!(
                    step = failure.step,
                    timestamp = failure.timestamp,
                    error = %failure.source,
                    "backtest step failed"
                );
                Err(failure)
            }
        }
    }

    /// Run the backtest; `false` when a step failed.
    pub fn run_backtest(&mut self) -> bool {
        self.try_run_backtest().is_ok()
    }

    fn drive(
        engine: &mut VaultSimulationEngine,
        window: BacktestWindow,
        results: &mut Vec<BacktestResult>,
    ) -> std::result::Result<(), BacktestFailure> {
        engine.initialize(window.start).map_err(|source| BacktestFailure {
            step: 0,
            timestamp: window.start,
            source,
        })?;

        results.reserve(window.step_count().min(MAX_PREALLOCATED_STEPS));
        for timestamp in window.timestamps() {
            let result = engine.run_step(timestamp).map_err(|source| BacktestFailure {
                step: results.len(),
                timestamp,
                source,
            })?;
            results.push(result);
        }
        Ok(())
    }

    pub fn result(&self, index: usize) -> Option<&BacktestResult> {
        self.results.get(index)
    }

    #[inline]
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    pub fn results(&self) -> &[BacktestResult] {
        &self.results
    }

    /// Move the results out, leaving the framework empty.
    pub fn take_results(&mut self) -> Vec<BacktestResult> {
        std::mem::take(&mut self.results)
    }

    /// Engine state after the last run.
    pub fn engine(&self) -> Option<&VaultSimulationEngine> {
        self.engine.as_ref()
    }

    /// Performance metrics for the retained results.
    pub fn metrics(&self) -> Result<PerformanceMetrics> {
        let window = self.window.ok_or(VaultError::NotConfigured)?;
        MetricsCalculator::new(window.step_size, self.risk_free_bps)?.calculate(&self.results)
    }

    /// Run independent scenarios over one shared provider on the rayon pool.
    ///
    /// Outcomes are returned in scenario order.
    pub fn run_parallel(
        provider: Arc<HistoricalDataProvider>,
        scenarios: Vec<Scenario>,
    ) -> Vec<ScenarioOutcome> {
        info!(scenarios = scenarios.len(), "running scenarios in parallel");
        scenarios
            .into_par_iter()
            .map(|scenario| scenario.run(Arc::clone(&provider)))
            .collect()
    }
}

/// One parameter set for [`BacktestingFramework::run_parallel`].
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub config: SimulationConfig,
    pub assets: Vec<AssetConfig>,
    pub window: BacktestWindow,
    pub risk_free_bps: Bps,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        config: SimulationConfig,
        assets: Vec<AssetConfig>,
        window: BacktestWindow,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            assets,
            window,
            risk_free_bps: 0,
        }
    }

    pub fn with_risk_free_rate(mut self, risk_free_bps: Bps) -> Self {
        self.risk_free_bps = risk_free_bps;
        self
    }

    fn run(self, provider: Arc<HistoricalDataProvider>) -> ScenarioOutcome {
        let mut framework = match BacktestingFramework::from_parts(provider, self.config, self.assets)
        {
            Ok(framework) => framework.with_risk_free_rate(self.risk_free_bps),
            Err(source) => {
                return ScenarioOutcome {
                    name: self.name,
                    results: Vec::new(),
                    metrics: None,
                    failure: Some(BacktestFailure {
                        step: 0,
                        timestamp: self.window.start,
                        source,
                    }),
                }
            }
        };
        framework.window = Some(self.window);

        let failure = framework.try_run_backtest().err();
        let metrics = framework.metrics().ok();
        ScenarioOutcome {
            name: self.name,
            results: framework.take_results(),
            metrics,
            failure,
        }
    }
}

/// Result of one parallel scenario.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub name: String,
    pub results: Vec<BacktestResult>,
    /// `None` when no step completed.
    pub metrics: Option<PerformanceMetrics>,
    pub failure: Option<BacktestFailure>,
}

impl ScenarioOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::wad;
    use alloy_primitives::Address;

    const DAY: u64 = 86_400;

    fn asset() -> Address {
        Address::repeat_byte(7)
    }

    fn provider() -> Arc<HistoricalDataProvider> {
        let mut provider = HistoricalDataProvider::new();
        for day in 0..=10u64 {
            provider.set_asset_price(asset(), day * DAY, wad(100 + day));
        }
        Arc::new(provider)
    }

    fn framework(provider: Arc<HistoricalDataProvider>) -> BacktestingFramework {
        BacktestingFramework::from_parts(
            provider,
            SimulationConfig::default(),
            vec![AssetConfig::new(asset(), "sSPX", 10_000)],
        )
        .unwrap()
    }

    #[test]
    fn test_window_timestamps() {
        let window = BacktestWindow::new(0, 10, 3).unwrap();
        assert_eq!(window.timestamps().collect::<Vec<_>>(), vec![0, 3, 6, 9]);
        assert_eq!(window.step_count(), 4);
        assert!(BacktestWindow::new(5, 5, 1).is_err());
        assert!(BacktestWindow::new(0, 5, 0).is_err());
    }

    #[test]
    fn test_step_count_saturates() {
        let window = BacktestWindow::new(0, u64::MAX, 1).unwrap();
        let expected = usize::try_from(u64::MAX)
            .ok()
            .and_then(|n| n.checked_add(1))
            .unwrap_or(usize::MAX);
        assert_eq!(window.step_count(), expected);
        assert_eq!(BacktestWindow::new(u64::MAX - 1, u64::MAX, 1).unwrap().step_count(), 2);
    }

    #[test]
    fn test_unbounded_window_stops_at_failure() {
        let mut provider = HistoricalDataProvider::new();
        provider.set_asset_price(asset(), 0, wad(100));
        provider.set_asset_price(asset(), 2, wad(300));
        let mut bt = framework(Arc::new(provider));
        bt.configure(0, u64::MAX, 1).unwrap();

        let failure = bt.try_run_backtest().unwrap_err();
        assert_eq!(failure.step, 2);
        assert_eq!(failure.timestamp, 2);
        assert!(matches!(failure.source, VaultError::ValueJump { .. }));
        assert_eq!(bt.result_count(), 2);
        assert!(!bt.run_backtest());
    }

    #[test]
    fn test_run_requires_configuration() {
        let mut bt = framework(provider());
        let failure = bt.try_run_backtest().unwrap_err();
        assert!(matches!(failure.source, VaultError::NotConfigured));
        assert!(failure.source.is_precondition());
        assert!(!bt.run_backtest());
        assert!(matches!(bt.metrics(), Err(VaultError::NotConfigured)));
    }

    #[test]
    fn test_run_collects_every_step() {
        let mut bt = framework(provider());
        bt.configure(0, 10 * DAY, DAY).unwrap();
        assert_eq!(bt.try_run_backtest().unwrap(), 11);
        assert_eq!(bt.result_count(), 11);
        assert_eq!(bt.result(0).unwrap().portfolio_value, wad(10_000));
        assert_eq!(bt.result(10).unwrap().portfolio_value, wad(11_000));
        assert!(bt.result(11).is_none());
        assert!(bt.engine().unwrap().is_initialized());
    }

    #[test]
    fn test_rerun_starts_fresh() {
        let mut bt = framework(provider());
        bt.configure(0, 5 * DAY, DAY).unwrap();
        assert!(bt.run_backtest());
        let first = bt.results().to_vec();
        assert!(bt.run_backtest());
        assert_eq!(bt.results(), first.as_slice());
    }

    #[test]
    fn test_failure_keeps_partial_results() {
        let mut provider = HistoricalDataProvider::new();
        provider.set_asset_price(asset(), 0, wad(100));
        provider.set_asset_price(asset(), 3 * DAY, wad(300));
        let mut bt = framework(Arc::new(provider));
        bt.configure(0, 5 * DAY, DAY).unwrap();

        let failure = bt.try_run_backtest().unwrap_err();
        assert_eq!(failure.step, 3);
        assert_eq!(failure.timestamp, 3 * DAY);
        assert!(matches!(failure.source, VaultError::ValueJump { .. }));
        assert!(!failure.source.is_precondition());
        assert_eq!(bt.result_count(), 3);
        assert_eq!(bt.metrics().unwrap().steps, 3);
    }

    #[test]
    fn test_initialization_failure() {
        let mut provider = HistoricalDataProvider::new();
        provider.set_asset_price(asset(), DAY, wad(100));
        let mut bt = framework(Arc::new(provider));
        bt.configure(0, 2 * DAY, DAY).unwrap();
        let failure = bt.try_run_backtest().unwrap_err();
        assert_eq!(failure.step, 0);
        assert!(matches!(failure.source, VaultError::MissingPrice { .. }));
        assert_eq!(bt.result_count(), 0);
    }

    #[test]
    fn test_metrics_after_run() {
        let mut bt = framework(provider());
        bt.configure(0, 10 * DAY, DAY).unwrap();
        bt.run_backtest();
        let metrics = bt.metrics().unwrap();
        assert_eq!(metrics.steps, 11);
        assert!((metrics.total_return - 0.1).abs() < 1e-9);
        assert!(metrics.max_drawdown.is_zero());
    }

    #[test]
    fn test_take_results() {
        let mut bt = framework(provider());
        bt.configure(0, 2 * DAY, DAY).unwrap();
        bt.run_backtest();
        assert_eq!(bt.take_results().len(), 3);
        assert_eq!(bt.result_count(), 0);
    }
}
