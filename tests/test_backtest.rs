//! Integration tests for the backtesting framework, metrics and export.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use vaultbt::backtest::{self, BacktestWindow, BacktestingFramework, Scenario};
use vaultbt::core::math::{wad, wad_to_f64};
use vaultbt::core::{VaultBtConfig, VaultError};
use vaultbt::data::HistoricalDataProvider;
use vaultbt::simulation::{AssetConfig, JumpGuard, JumpPolicy, SimulationConfig};

const DAY: u64 = 86_400;

fn asset() -> Address {
    Address::repeat_byte(0x11)
}

fn wrapper() -> Address {
    Address::repeat_byte(0x22)
}

/// One stable asset paying 400 bps through its wrapper.
fn yield_provider() -> Arc<HistoricalDataProvider> {
    let mut provider = HistoricalDataProvider::new();
    provider.set_asset_price(asset(), 0, wad(1));
    provider.set_yield_rate(wrapper(), 0, 400);
    Arc::new(provider)
}

fn yield_framework() -> BacktestingFramework {
    BacktestingFramework::from_parts(
        yield_provider(),
        SimulationConfig::new(wad(10_000)),
        vec![AssetConfig::new(asset(), "sUSDY", 10_000).with_yield(wrapper())],
    )
    .unwrap()
}

/// Single asset following `prices` on consecutive days.
fn price_path_provider(prices: &[u64]) -> Arc<HistoricalDataProvider> {
    let mut provider = HistoricalDataProvider::new();
    for (day, &price) in prices.iter().enumerate() {
        provider.set_asset_price(asset(), day as u64 * DAY, wad(price));
    }
    Arc::new(provider)
}

#[test]
fn test_yield_over_quarter() {
    let mut framework = yield_framework();
    framework.configure(0, 90 * DAY, 90 * DAY).unwrap();
    assert!(framework.run_backtest());
    assert_eq!(framework.result_count(), 2);

    // 10,000 * 4% * 90 / 365
    let last = framework.result(1).unwrap();
    let harvested = wad_to_f64(last.yield_harvested);
    assert!((harvested - 98.630137).abs() < 1e-4, "harvested {harvested}");
    assert!((wad_to_f64(last.portfolio_value) - 10_098.630137).abs() < 1e-4);
}

#[test]
fn test_daily_yield_compounds() {
    let mut framework = yield_framework();
    framework.configure(0, 90 * DAY, DAY).unwrap();
    assert!(framework.run_backtest());
    assert_eq!(framework.result_count(), 91);

    let metrics = framework.metrics().unwrap();
    let total_yield = wad_to_f64(metrics.total_yield);
    assert!(total_yield > 98.63 && total_yield < 99.2, "yield {total_yield}");
    assert_eq!(metrics.end_value, metrics.start_value + metrics.total_yield);
    assert_eq!(metrics.max_drawdown, U256::ZERO);
}

#[test]
fn test_drawdown_through_framework() {
    let provider = price_path_provider(&[100, 110, 120, 100, 90, 80]);
    let mut framework = BacktestingFramework::from_parts(
        provider,
        SimulationConfig::new(wad(10_000)),
        vec![AssetConfig::new(asset(), "sSPX", 10_000)],
    )
    .unwrap();
    framework.configure(0, 5 * DAY, DAY).unwrap();
    assert!(framework.run_backtest());

    let values: Vec<f64> = framework
        .results()
        .iter()
        .map(|r| wad_to_f64(r.portfolio_value))
        .collect();
    assert!((values[2] - 12_000.0).abs() < 1e-6);
    assert!((values[5] - 8_000.0).abs() < 1e-6);

    let metrics = framework.metrics().unwrap();
    assert!((metrics.max_drawdown_pct() - 33.3333).abs() < 1e-3);
    assert!((metrics.total_return + 0.2).abs() < 1e-9);
    assert!(metrics.volatility > 0.0);
    assert!(metrics.sharpe_ratio < 0.0);
    assert_eq!(metrics.rebalance_count, 0);
}

#[test]
fn test_failure_keeps_partial_results() {
    // The price triples on day 3, beyond the default 2x growth guard.
    let provider = price_path_provider(&[100, 100, 100, 300, 300]);
    let assets = vec![AssetConfig::new(asset(), "sSPX", 10_000)];
    let mut framework = BacktestingFramework::from_parts(
        Arc::clone(&provider),
        SimulationConfig::new(wad(1_000)),
        assets.clone(),
    )
    .unwrap();
    framework.configure(0, 4 * DAY, DAY).unwrap();

    let failure = framework.try_run_backtest().unwrap_err();
    assert_eq!(failure.step, 3);
    assert_eq!(failure.timestamp, 3 * DAY);
    assert!(matches!(failure.source, VaultError::ValueJump { .. }));
    assert_eq!(framework.result_count(), 3);
    assert!(framework.metrics().is_ok());

    // The same path runs through when the guard only warns.
    let warn = SimulationConfig::new(wad(1_000)).with_jump_guard(JumpGuard {
        max_growth_bps: 20_000,
        policy: JumpPolicy::Warn,
    });
    let mut framework = BacktestingFramework::from_parts(provider, warn, assets).unwrap();
    framework.configure(0, 4 * DAY, DAY).unwrap();
    assert_eq!(framework.try_run_backtest().unwrap(), 5);
    assert!((wad_to_f64(framework.results()[4].portfolio_value) - 3_000.0).abs() < 1e-6);
}

#[test]
fn test_results_csv_round_trip() {
    let mut framework = yield_framework();
    framework.configure(0, 10 * DAY, DAY).unwrap();
    assert!(framework.run_backtest());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.csv");
    backtest::export_results_csv(&path, framework.results(), &["sUSDY".to_string()]).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[0], "timestamp");
    assert_eq!(&headers[1], "portfolio_value");
    assert!(headers.iter().any(|h| h == "value_sUSDY"));
    assert!(headers.iter().any(|h| h == "weight_bps_sUSDY"));

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), framework.result_count());
    for (row, result) in rows.iter().zip(framework.results()) {
        assert_eq!(row[0].parse::<u64>().unwrap(), result.timestamp);
        let value: U256 = row[1].parse().unwrap();
        assert_eq!(value, result.portfolio_value);
    }
}

#[test]
fn test_metrics_json_export() {
    let mut framework = yield_framework();
    framework.configure(0, 30 * DAY, DAY).unwrap();
    assert!(framework.run_backtest());
    let metrics = framework.metrics().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    backtest::export_metrics_json(&path, &metrics).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let parsed: vaultbt::metrics::PerformanceMetrics = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, metrics);
    assert!(backtest::format_summary(&metrics).contains("Total return"));
}

#[test]
fn test_parallel_matches_serial() {
    let provider = price_path_provider(&[100, 90, 120, 80, 110, 100, 95, 105]);
    let stable = Address::repeat_byte(0x33);
    let mut provider = (*provider).clone();
    provider.set_asset_price(stable, 0, wad(1));
    let provider = Arc::new(provider);

    let assets = vec![
        AssetConfig::new(asset(), "sSPX", 5_000),
        AssetConfig::new(stable, "USDC", 5_000),
    ];
    let window = BacktestWindow::new(0, 7 * DAY, DAY).unwrap();
    let thresholds = [100u32, 500, 2_000];
    let scenarios: Vec<Scenario> = thresholds
        .iter()
        .map(|&threshold| {
            Scenario::new(
                format!("threshold_{threshold}"),
                SimulationConfig::new(wad(10_000)).with_threshold(threshold),
                assets.clone(),
                window,
            )
        })
        .collect();

    let outcomes = BacktestingFramework::run_parallel(Arc::clone(&provider), scenarios);
    assert_eq!(outcomes.len(), thresholds.len());

    for (outcome, &threshold) in outcomes.iter().zip(&thresholds) {
        assert_eq!(outcome.name, format!("threshold_{threshold}"));
        assert!(outcome.is_success());

        let mut serial = BacktestingFramework::from_parts(
            Arc::clone(&provider),
            SimulationConfig::new(wad(10_000)).with_threshold(threshold),
            assets.clone(),
        )
        .unwrap();
        serial.configure(0, 7 * DAY, DAY).unwrap();
        assert!(serial.run_backtest());
        assert_eq!(outcome.results, serial.results());
    }

    // A 10% drop on day 1 moves weights by more than 100 bps.
    assert!(outcomes[0].results[1].rebalanced);
    assert!(outcomes[0].metrics.as_ref().unwrap().rebalance_count >= 1);
}

#[test]
fn test_parallel_reports_failed_scenario() {
    let provider = price_path_provider(&[100, 100]);
    let window = BacktestWindow::new(0, DAY, DAY).unwrap();
    let scenarios = vec![
        Scenario::new(
            "ok",
            SimulationConfig::new(wad(100)),
            vec![AssetConfig::new(asset(), "sSPX", 10_000)],
            window,
        ),
        Scenario::new(
            "unpriced",
            SimulationConfig::new(wad(100)),
            vec![AssetConfig::new(Address::repeat_byte(0x44), "missing", 10_000)],
            window,
        ),
    ];

    let outcomes = BacktestingFramework::run_parallel(provider, scenarios);
    assert!(outcomes[0].is_success());
    assert_eq!(outcomes[0].results.len(), 2);

    let failure = outcomes[1].failure.as_ref().unwrap();
    assert_eq!(failure.step, 0);
    assert!(matches!(failure.source, VaultError::MissingPrice { .. }));
    assert!(outcomes[1].results.is_empty());
    assert!(outcomes[1].metrics.is_none());
}

#[test]
fn test_config_driven_run_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data.csv");
    let mut csv_text = String::from("kind,id,timestamp,value\n");
    csv_text.push_str("price,sUSDY,0,1.0\n");
    csv_text.push_str("yield,sUSDY-yield,0,400\n");
    for day in 0..=10u64 {
        csv_text.push_str(&format!("price,sETH,{},{}\n", day * DAY, 2_000 + day * 10));
    }
    std::fs::write(&data, csv_text).unwrap();

    let config_path = dir.path().join("vault.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
            [simulation]
            initial_deposit = 10000.0
            rebalance_threshold_bps = 100

            [backtest]
            start = 0
            end = {end}
            step = {step}
            data = "{data}"

            [[assets]]
            symbol = "sUSDY"
            weight_bps = 5000
            yield_bps = 400

            [[assets]]
            symbol = "sETH"
            weight_bps = 5000
            "#,
            end = 10 * DAY,
            step = DAY,
            data = data.display(),
        ),
    )
    .unwrap();

    let config = VaultBtConfig::from_toml(&config_path).unwrap();
    let provider = Arc::new(config.build_provider().unwrap());
    let mut framework = BacktestingFramework::from_config(&config, provider).unwrap();
    assert_eq!(framework.try_run_backtest().unwrap(), 11);

    let metrics = framework.metrics().unwrap();
    assert!(metrics.total_return > 0.0);
    assert!(metrics.total_yield > U256::ZERO);
}

#[test]
fn test_synthetic_config_is_deterministic() {
    let text = r#"
        [backtest]
        start = 0
        end = 15552000
        step = 86400
        seed = 11

        [[assets]]
        symbol = "sSPX"
        weight_bps = 7000
        initial_price = 4500.0
        drift = 0.07
        volatility = 0.18

        [[assets]]
        symbol = "sUSDY"
        weight_bps = 3000
        yield_bps = 450
        initial_price = 1.0
    "#;
    let run = || {
        let config = VaultBtConfig::from_toml_str(text).unwrap();
        let provider = Arc::new(config.build_provider().unwrap());
        let mut framework = BacktestingFramework::from_config(&config, provider).unwrap();
        assert!(framework.run_backtest());
        framework.take_results()
    };

    let first = run();
    assert_eq!(first.len(), 181);
    assert_eq!(first, run());
}
