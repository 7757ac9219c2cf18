//! PyO3 function bindings for vaultbt.

use std::collections::HashMap;
use std::sync::Arc;

use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::backtest::BacktestingFramework;
use crate::core::config::{AssetSection, BacktestSection, SimulationSection, VaultBtConfig};
use crate::core::math::{f64_to_wad, wad_to_f64};
use crate::core::types::{BacktestResult, ExposureKind, Timestamp};
use crate::data::HistoricalDataProvider;
use crate::metrics::drawdown;
use crate::metrics::PerformanceMetrics;
use crate::simulation::JumpPolicy;

use super::numpy_bridge::*;

// ============================================================================
// Configuration Classes
// ============================================================================

/// Python-exposed simulation parameters. USD amounts are plain floats.
#[pyclass]
#[derive(Debug, Clone)]
pub struct PySimulationConfig {
    #[pyo3(get, set)]
    pub initial_deposit: f64,
    #[pyo3(get, set)]
    pub rebalance_threshold_bps: u32,
    #[pyo3(get, set)]
    pub rebalance_interval: u64,
    #[pyo3(get, set)]
    pub management_fee_bps: u32,
    #[pyo3(get, set)]
    pub gas_base: f64,
    #[pyo3(get, set)]
    pub gas_per_trade: f64,
    #[pyo3(get, set)]
    pub slippage_bps: u32,
    #[pyo3(get, set)]
    pub max_turnover_bps: u32,
    #[pyo3(get, set)]
    pub max_growth_bps: u32,
    #[pyo3(get, set)]
    pub abort_on_jump: bool,
}

#[pymethods]
impl PySimulationConfig {
    #[new]
    #[pyo3(signature = (initial_deposit=10000.0, rebalance_threshold_bps=500, rebalance_interval=0, management_fee_bps=0))]
    fn new(
        initial_deposit: f64,
        rebalance_threshold_bps: u32,
        rebalance_interval: u64,
        management_fee_bps: u32,
    ) -> Self {
        let defaults = SimulationSection::default();
        Self {
            initial_deposit,
            rebalance_threshold_bps,
            rebalance_interval,
            management_fee_bps,
            gas_base: defaults.gas_base,
            gas_per_trade: defaults.gas_per_trade,
            slippage_bps: defaults.slippage_bps,
            max_turnover_bps: defaults.max_turnover_bps,
            max_growth_bps: defaults.max_growth_bps,
            abort_on_jump: true,
        }
    }

    /// Charge `base` per rebalance plus `per_trade` per executed trade.
    fn set_gas(&mut self, base: f64, per_trade: f64) {
        self.gas_base = base;
        self.gas_per_trade = per_trade;
    }

    fn __repr__(&self) -> String {
        format!(
            "SimulationConfig(deposit={:.2}, threshold={}bps, interval={}s, fee={}bps)",
            self.initial_deposit,
            self.rebalance_threshold_bps,
            self.rebalance_interval,
            self.management_fee_bps
        )
    }
}

impl From<&PySimulationConfig> for SimulationSection {
    fn from(py_config: &PySimulationConfig) -> Self {
        Self {
            initial_deposit: py_config.initial_deposit,
            rebalance_threshold_bps: py_config.rebalance_threshold_bps,
            rebalance_interval: py_config.rebalance_interval,
            management_fee_bps: py_config.management_fee_bps,
            gas_base: py_config.gas_base,
            gas_per_trade: py_config.gas_per_trade,
            slippage_bps: py_config.slippage_bps,
            max_turnover_bps: py_config.max_turnover_bps,
            max_growth_bps: py_config.max_growth_bps,
            jump_policy: if py_config.abort_on_jump {
                JumpPolicy::Abort
            } else {
                JumpPolicy::Warn
            },
        }
    }
}

/// Python-exposed index constituent.
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyAssetConfig {
    #[pyo3(get, set)]
    pub symbol: String,
    #[pyo3(get, set)]
    pub weight_bps: u32,
    #[pyo3(get, set)]
    pub exposure: String,
    #[pyo3(get, set)]
    pub yield_bps: u32,
    #[pyo3(get, set)]
    pub initial_price: f64,
    #[pyo3(get, set)]
    pub drift: f64,
    #[pyo3(get, set)]
    pub volatility: f64,
}

#[pymethods]
impl PyAssetConfig {
    #[new]
    #[pyo3(signature = (symbol, weight_bps, exposure="direct_token", yield_bps=0, initial_price=100.0, drift=0.0, volatility=0.0))]
    fn new(
        symbol: String,
        weight_bps: u32,
        exposure: &str,
        yield_bps: u32,
        initial_price: f64,
        drift: f64,
        volatility: f64,
    ) -> Self {
        Self {
            symbol,
            weight_bps,
            exposure: exposure.to_string(),
            yield_bps,
            initial_price,
            drift,
            volatility,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "AssetConfig(symbol={}, weight={}bps, exposure={}, yield={}bps)",
            self.symbol, self.weight_bps, self.exposure, self.yield_bps
        )
    }
}

impl TryFrom<&PyAssetConfig> for AssetSection {
    type Error = PyErr;

    fn try_from(py_asset: &PyAssetConfig) -> PyResult<Self> {
        let exposure = match py_asset.exposure.as_str() {
            "perpetual" => ExposureKind::Perpetual,
            "total_return_swap" => ExposureKind::TotalReturnSwap,
            "direct_token" => ExposureKind::DirectToken,
            other => {
                return Err(PyValueError::new_err(format!(
                    "unknown exposure '{other}', expected perpetual, total_return_swap or direct_token"
                )))
            }
        };
        Ok(Self {
            symbol: py_asset.symbol.clone(),
            weight_bps: py_asset.weight_bps,
            exposure,
            yield_bps: py_asset.yield_bps,
            initial_price: py_asset.initial_price,
            drift: py_asset.drift,
            volatility: py_asset.volatility,
            ..AssetSection::default()
        })
    }
}

// ============================================================================
// Result Classes
// ============================================================================

/// Python-exposed performance metrics.
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyBacktestMetrics {
    #[pyo3(get)]
    pub start_value: f64,
    #[pyo3(get)]
    pub end_value: f64,
    #[pyo3(get)]
    pub total_return_pct: f64,
    #[pyo3(get)]
    pub annualized_return_pct: f64,
    #[pyo3(get)]
    pub volatility_pct: f64,
    #[pyo3(get)]
    pub sharpe_ratio: f64,
    #[pyo3(get)]
    pub sortino_ratio: f64,
    #[pyo3(get)]
    pub calmar_ratio: f64,
    #[pyo3(get)]
    pub max_drawdown_pct: f64,
    #[pyo3(get)]
    pub total_yield: f64,
    #[pyo3(get)]
    pub total_fees: f64,
    #[pyo3(get)]
    pub total_execution_cost: f64,
    #[pyo3(get)]
    pub rebalance_count: usize,
    #[pyo3(get)]
    pub steps: usize,
}

#[pymethods]
impl PyBacktestMetrics {
    fn __repr__(&self) -> String {
        format!(
            "BacktestMetrics(return={:.2}%, sharpe={:.2}, max_dd={:.2}%, rebalances={})",
            self.total_return_pct, self.sharpe_ratio, self.max_drawdown_pct, self.rebalance_count
        )
    }

    fn to_dict(&self, py: Python) -> PyResult<PyObject> {
        let dict = pyo3::types::PyDict::new(py);
        dict.set_item("Start Value", self.start_value)?;
        dict.set_item("End Value", self.end_value)?;
        dict.set_item("Total Return [%]", self.total_return_pct)?;
        dict.set_item("Annualized Return [%]", self.annualized_return_pct)?;
        dict.set_item("Volatility [%]", self.volatility_pct)?;
        dict.set_item("Max Drawdown [%]", self.max_drawdown_pct)?;
        dict.set_item("Sharpe Ratio", self.sharpe_ratio)?;
        dict.set_item("Sortino Ratio", self.sortino_ratio)?;
        dict.set_item("Calmar Ratio", self.calmar_ratio)?;
        dict.set_item("Total Yield", self.total_yield)?;
        dict.set_item("Management Fees", self.total_fees)?;
        dict.set_item("Execution Cost", self.total_execution_cost)?;
        dict.set_item("Rebalances", self.rebalance_count)?;
        dict.set_item("Steps", self.steps)?;
        Ok(dict.into())
    }
}

impl From<&PerformanceMetrics> for PyBacktestMetrics {
    fn from(m: &PerformanceMetrics) -> Self {
        Self {
            start_value: wad_to_f64(m.start_value),
            end_value: wad_to_f64(m.end_value),
            total_return_pct: m.total_return * 100.0,
            annualized_return_pct: m.annualized_return * 100.0,
            volatility_pct: m.volatility * 100.0,
            sharpe_ratio: m.sharpe_ratio,
            sortino_ratio: m.sortino_ratio,
            calmar_ratio: m.calmar_ratio,
            max_drawdown_pct: m.max_drawdown_pct(),
            total_yield: wad_to_f64(m.total_yield),
            total_fees: wad_to_f64(m.total_management_fees),
            total_execution_cost: wad_to_f64(m.total_gas + m.total_slippage),
            rebalance_count: m.rebalance_count,
            steps: m.steps,
        }
    }
}

/// Python-exposed backtest result.
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyBacktestResult {
    #[pyo3(get)]
    pub metrics: Option<PyBacktestMetrics>,
    /// Failure message when the run stopped early.
    #[pyo3(get)]
    pub error: Option<String>,
    timestamps: Vec<u64>,
    portfolio_values: Vec<f64>,
    drawdown_curve: Vec<f64>,
}

#[pymethods]
impl PyBacktestResult {
    #[getter]
    fn success(&self) -> bool {
        self.error.is_none()
    }

    fn timestamps<'py>(&self, py: Python<'py>) -> &'py PyArray1<u64> {
        vec_to_numpy_u64(py, self.timestamps.clone())
    }

    /// Portfolio value per step in USD.
    fn portfolio_values<'py>(&self, py: Python<'py>) -> &'py PyArray1<f64> {
        vec_to_numpy_f64(py, self.portfolio_values.clone())
    }

    /// Drawdown per step in percent.
    fn drawdown_curve<'py>(&self, py: Python<'py>) -> &'py PyArray1<f64> {
        vec_to_numpy_f64(py, self.drawdown_curve.clone())
    }

    fn __repr__(&self) -> String {
        match (&self.metrics, &self.error) {
            (_, Some(error)) => format!("BacktestResult(failed: {error})"),
            (Some(m), None) => format!(
                "BacktestResult(return={:.2}%, steps={}, max_dd={:.2}%)",
                m.total_return_pct, m.steps, m.max_drawdown_pct
            ),
            (None, None) => "BacktestResult(empty)".to_string(),
        }
    }
}

// ============================================================================
// Backtest Functions
// ============================================================================

/// Run a backtest over seeded synthetic price paths.
#[pyfunction]
#[pyo3(signature = (assets, start, end, step, seed=42, config=None, risk_free_bps=0))]
pub fn run_synthetic_backtest(
    py: Python<'_>,
    assets: Vec<PyAssetConfig>,
    start: Timestamp,
    end: Timestamp,
    step: u64,
    seed: u64,
    config: Option<&PySimulationConfig>,
    risk_free_bps: u32,
) -> PyResult<PyBacktestResult> {
    let run_config = build_config(&assets, start, end, step, seed, config, risk_free_bps)?;
    let provider = run_config.build_provider()?;
    py.allow_threads(|| run_config_backtest(&run_config, provider))
}

/// Run a backtest over recorded prices.
///
/// `prices` maps each asset symbol to a USD price array aligned with
/// `timestamps`; the window spans the first to the last timestamp.
#[pyfunction]
#[pyo3(signature = (timestamps, prices, assets, step, config=None, risk_free_bps=0))]
pub fn run_price_backtest(
    py: Python<'_>,
    timestamps: PyReadonlyArray1<u64>,
    mut prices: HashMap<String, PyReadonlyArray1<f64>>,
    assets: Vec<PyAssetConfig>,
    step: u64,
    config: Option<&PySimulationConfig>,
    risk_free_bps: u32,
) -> PyResult<PyBacktestResult> {
    let timestamps = numpy_to_vec_u64(timestamps)?;
    let (start, end) = match (timestamps.first(), timestamps.last()) {
        (Some(&start), Some(&end)) => (start, end),
        _ => return Err(PyValueError::new_err("timestamps must not be empty")),
    };
    let run_config = build_config(&assets, start, end, step, 0, config, risk_free_bps)?;

    let mut provider = HistoricalDataProvider::new();
    for section in &run_config.assets {
        let series = prices
            .remove(&section.symbol)
            .ok_or_else(|| PyValueError::new_err(format!("no prices for {}", section.symbol)))?;
        let values = numpy_to_vec_f64(series)?;
        if values.len() != timestamps.len() {
            return Err(PyValueError::new_err(format!(
                "{} has {} prices for {} timestamps",
                section.symbol,
                values.len(),
                timestamps.len()
            )));
        }
        for (&t, &price) in timestamps.iter().zip(&values) {
            provider.set_asset_price(section.asset(), t, f64_to_wad(price));
        }
        if section.yield_bps > 0 {
            provider.set_yield_rate(section.wrapper(), start, section.yield_bps);
        }
    }
    py.allow_threads(|| run_config_backtest(&run_config, provider))
}

/// Maximum drawdown of a value series, in percent.
#[pyfunction]
pub fn max_drawdown(values: PyReadonlyArray1<f64>) -> PyResult<f64> {
    let values: Vec<_> = numpy_to_vec_f64(values)?
        .into_iter()
        .map(f64_to_wad)
        .collect();
    Ok(wad_to_f64(drawdown::max_drawdown(&values)) * 100.0)
}

// ============================================================================
// Helper Functions
// ============================================================================

fn build_config(
    assets: &[PyAssetConfig],
    start: Timestamp,
    end: Timestamp,
    step: u64,
    seed: u64,
    config: Option<&PySimulationConfig>,
    risk_free_bps: u32,
) -> PyResult<VaultBtConfig> {
    let run_config = VaultBtConfig {
        simulation: config.map(SimulationSection::from).unwrap_or_default(),
        backtest: BacktestSection {
            start,
            end,
            step,
            seed,
            risk_free_bps,
            data: None,
        },
        assets: assets
            .iter()
            .map(AssetSection::try_from)
            .collect::<PyResult<Vec<_>>>()?,
    };
    run_config.validate()?;
    Ok(run_config)
}

fn run_config_backtest(
    config: &VaultBtConfig,
    provider: HistoricalDataProvider,
) -> PyResult<PyBacktestResult> {
    let mut framework = BacktestingFramework::from_config(config, Arc::new(provider))?;
    let error = framework.try_run_backtest().err().map(|e| e.to_string());
    let metrics = framework.metrics().ok().map(|m| PyBacktestMetrics::from(&m));
    Ok(convert_results(framework.results(), metrics, error))
}

fn convert_results(
    results: &[BacktestResult],
    metrics: Option<PyBacktestMetrics>,
    error: Option<String>,
) -> PyBacktestResult {
    let values: Vec<_> = results.iter().map(|r| r.portfolio_value).collect();
    PyBacktestResult {
        metrics,
        error,
        timestamps: results.iter().map(|r| r.timestamp).collect(),
        portfolio_values: values.iter().map(|v| wad_to_f64(*v)).collect(),
        drawdown_curve: drawdown::drawdown_curve(&values)
            .into_iter()
            .map(|d| wad_to_f64(d) * 100.0)
            .collect(),
    }
}
