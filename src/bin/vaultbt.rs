//! vaultbt command line: backtests, parameter sweeps and allocation dry runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use vaultbt::allocation::CapitalAllocationManager;
use vaultbt::backtest::{self, BacktestWindow, BacktestingFramework, Scenario};
use vaultbt::core::math::{f64_to_wad, wad_to_f64};
use vaultbt::core::types::{asset_id, ExposureKind};
use vaultbt::core::VaultBtConfig;
use vaultbt::interfaces::{
    ExposureBackedToken, InMemoryExposure, InMemorySyntheticToken, InMemoryYieldStrategy,
};

#[derive(Parser, Debug)]
#[command(name = "vaultbt")]
#[command(about = "Index-fund vault allocation and backtesting")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one backtest from a TOML config
    Run {
        /// Run configuration
        #[arg(long)]
        config: PathBuf,

        /// Write per-step results as CSV
        #[arg(long)]
        results_csv: Option<PathBuf>,

        /// Write performance metrics as JSON
        #[arg(long)]
        metrics_json: Option<PathBuf>,
    },

    /// Re-run a config across rebalance thresholds in parallel
    Sweep {
        /// Run configuration
        #[arg(long)]
        config: PathBuf,

        /// Rebalance thresholds to try, in bps
        #[arg(long, value_delimiter = ',', default_value = "100,250,500,1000")]
        thresholds: Vec<u32>,

        /// Write one summary row per scenario as CSV
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Deposit into an allocation manager, rebalance and report bucket values
    Allocate {
        /// Deposit in USD
        #[arg(long, default_value = "10000")]
        deposit: f64,

        #[arg(long, default_value = "2000")]
        rwa_bps: u32,

        #[arg(long, default_value = "7000")]
        yield_bps: u32,

        #[arg(long, default_value = "1000")]
        buffer_bps: u32,

        /// Target allocation applied for a second rebalance, as rwa,yield,buffer bps
        #[arg(long, value_delimiter = ',')]
        retarget: Option<Vec<u32>>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::level_filters::LevelFilter::INFO.into()),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::Run {
            config,
            results_csv,
            metrics_json,
        } => run(config, results_csv, metrics_json),
        Command::Sweep {
            config,
            thresholds,
            output,
        } => sweep(config, thresholds, output),
        Command::Allocate {
            deposit,
            rwa_bps,
            yield_bps,
            buffer_bps,
            retarget,
        } => allocate(deposit, [rwa_bps, yield_bps, buffer_bps], retarget),
    }
}

fn load(path: &Path) -> Result<(VaultBtConfig, Arc<vaultbt::HistoricalDataProvider>)> {
    let config = VaultBtConfig::from_toml(path)
        .with_context(|| format!("loading config {}", path.display()))?;
    let provider = config
        .build_provider()
        .context("building price history")?;
    info!(
        assets = config.assets.len(),
        start = config.backtest.start,
        end = config.backtest.end,
        step = config.backtest.step,
        "config loaded"
    );
    Ok((config, Arc::new(provider)))
}

fn run(path: PathBuf, results_csv: Option<PathBuf>, metrics_json: Option<PathBuf>) -> Result<()> {
    let (config, provider) = load(&path)?;
    let symbols: Vec<String> = config.assets.iter().map(|a| a.symbol.clone()).collect();

    let mut framework = BacktestingFramework::from_config(&config, provider)?;
    let outcome = framework.try_run_backtest();

    // Partial results are still exported when a step fails.
    if let Some(csv_path) = &results_csv {
        backtest::export_results_csv(csv_path, framework.results(), &symbols)?;
        info!(path = %csv_path.display(), rows = framework.result_count(), "results written");
    }
    if framework.result_count() > 0 {
        let metrics = framework.metrics()?;
        println!("{}", backtest::format_summary(&metrics));
        if let Some(json_path) = &metrics_json {
            backtest::export_metrics_json(json_path, &metrics)?;
            info!(path = %json_path.display(), "metrics written");
        }
    }

    if let Err(failure) = outcome {
        if failure.source.is_precondition() {
            bail!("backtest could not run: {}", failure.source);
        }
        bail!(
            "backtest stopped at step {} (timestamp {}): {}",
            failure.step,
            failure.timestamp,
            failure.source
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SweepRow {
    scenario: String,
    threshold_bps: u32,
    steps: usize,
    end_value: f64,
    total_return_pct: f64,
    max_drawdown_pct: f64,
    sharpe_ratio: f64,
    rebalances: usize,
    execution_cost: f64,
    status: String,
}

fn sweep(path: PathBuf, thresholds: Vec<u32>, output: Option<PathBuf>) -> Result<()> {
    if thresholds.is_empty() {
        bail!("at least one threshold is required");
    }
    let (config, provider) = load(&path)?;
    let base = config.simulation_config()?;
    let window = BacktestWindow::new(
        config.backtest.start,
        config.backtest.end,
        config.backtest.step,
    )?;

    let scenarios: Vec<Scenario> = thresholds
        .iter()
        .map(|&threshold| {
            Scenario::new(
                format!("threshold_{threshold}"),
                base.clone().with_threshold(threshold),
                config.asset_configs(),
                window,
            )
            .with_risk_free_rate(config.backtest.risk_free_bps)
        })
        .collect();

    let outcomes = BacktestingFramework::run_parallel(provider, scenarios);

    let rows: Vec<SweepRow> = thresholds
        .iter()
        .zip(&outcomes)
        .map(|(&threshold, outcome)| {
            let metrics = outcome.metrics.clone().unwrap_or_default();
            SweepRow {
                scenario: outcome.name.clone(),
                threshold_bps: threshold,
                steps: outcome.results.len(),
                end_value: wad_to_f64(metrics.end_value),
                total_return_pct: metrics.total_return * 100.0,
                max_drawdown_pct: metrics.max_drawdown_pct(),
                sharpe_ratio: metrics.sharpe_ratio,
                rebalances: metrics.rebalance_count,
                execution_cost: wad_to_f64(metrics.total_gas + metrics.total_slippage),
                status: match &outcome.failure {
                    Some(failure) => failure.to_string(),
                    None => "ok".to_string(),
                },
            }
        })
        .collect();

    println!(
        "{:<18} {:>8} {:>14} {:>10} {:>10} {:>8} {:>11}",
        "scenario", "steps", "end value", "return %", "max dd %", "sharpe", "rebalances"
    );
    for row in &rows {
        println!(
            "{:<18} {:>8} {:>14.2} {:>10.2} {:>10.2} {:>8.3} {:>11}",
            row.scenario,
            row.steps,
            row.end_value,
            row.total_return_pct,
            row.max_drawdown_pct,
            row.sharpe_ratio,
            row.rebalances
        );
    }

    if let Some(out) = &output {
        let mut wtr = csv::Writer::from_path(out)?;
        for row in &rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        info!(path = %out.display(), rows = rows.len(), "sweep written");
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        bail!("{failed} of {} scenarios failed", outcomes.len());
    }
    Ok(())
}

fn allocate(deposit: f64, targets: [u32; 3], retarget: Option<Vec<u32>>) -> Result<()> {
    let usdc = asset_id("USDC");
    let mut manager = CapitalAllocationManager::new(usdc);
    manager.set_allocation(targets[0], targets[1], targets[2])?;

    manager.add_rwa_token(
        Box::new(
            InMemorySyntheticToken::new(asset_id("sSPX"), "Synthetic S&P 500", "sSPX")
                .with_exposure(ExposureKind::DirectToken),
        ),
        6_000,
    )?;
    manager.add_rwa_token(
        Box::new(ExposureBackedToken::new(
            asset_id("sXAU"),
            "Synthetic Gold",
            "sXAU",
            Box::new(InMemoryExposure::new(ExposureKind::Perpetual)),
        )),
        4_000,
    )?;
    manager.add_yield_strategy(
        Box::new(InMemoryYieldStrategy::new(asset_id("lending"), usdc, "Lending").with_apy(450)),
        5_000,
    )?;
    manager.add_yield_strategy(
        Box::new(InMemoryYieldStrategy::new(asset_id("staking"), usdc, "Staking").with_apy(380)),
        5_000,
    )?;

    manager.deposit(f64_to_wad(deposit))?;
    rebalance_and_print(&mut manager, "Initial rebalance")?;

    if let Some(bps) = retarget {
        let [rwa, yield_bps, buffer]: [u32; 3] = bps
            .try_into()
            .map_err(|_| anyhow::anyhow!("--retarget takes exactly three values"))?;
        manager.set_allocation(rwa, yield_bps, buffer)?;
        println!();
        rebalance_and_print(&mut manager, "Retargeted rebalance")?;
    }
    Ok(())
}

fn rebalance_and_print(manager: &mut CapitalAllocationManager, label: &str) -> Result<()> {
    let moves = manager.rebalance()?;
    println!("{label} ({} moves):", moves.len());
    for mv in &moves {
        println!("  {} -> {}: ${:.2}", mv.from, mv.to, wad_to_f64(mv.amount));
    }
    print_buckets(manager)
}

fn print_buckets(manager: &CapitalAllocationManager) -> Result<()> {
    let values = manager.bucket_values()?;
    let weights = manager.current_weights()?;
    println!("  RWA:    ${:>12.2} ({} bps)", wad_to_f64(values.rwa), weights.rwa_bps);
    println!(
        "  Yield:  ${:>12.2} ({} bps)",
        wad_to_f64(values.yield_value),
        weights.yield_bps
    );
    println!("  Buffer: ${:>12.2} ({} bps)", wad_to_f64(values.buffer), weights.buffer_bps);
    println!("  Total:  ${:>12.2}", wad_to_f64(values.total()));
    Ok(())
}
