//! Result export: per-step CSV, JSON metrics and a text summary.

use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::Writer as CsvWriter;

use crate::core::math::wad_to_f64;
use crate::core::types::BacktestResult;
use crate::core::Result;
use crate::metrics::PerformanceMetrics;

/// Fixed leading columns of the results CSV. Per-asset value and weight
/// columns follow in registration order.
pub const RESULT_COLUMNS: [&str; 9] = [
    "timestamp",
    "portfolio_value",
    "buffer_value",
    "yield_harvested",
    "management_fee",
    "gas_cost",
    "slippage_cost",
    "rebalanced",
    "portfolio_usd",
];

/// Write one CSV row per result. Amounts are raw WAD integers.
///
/// `symbols` names the per-asset columns; missing names fall back to the
/// asset index.
pub fn write_results_csv<W: Write>(
    writer: W,
    results: &[BacktestResult],
    symbols: &[String],
) -> Result<()> {
    let mut wtr = CsvWriter::from_writer(writer);
    let n_assets = results.first().map_or(symbols.len(), |r| r.asset_values.len());

    let mut header: Vec<String> = RESULT_COLUMNS.iter().map(|c| c.to_string()).collect();
    for i in 0..n_assets {
        let name = symbols.get(i).cloned().unwrap_or_else(|| i.to_string());
        header.push(format!("value_{name}"));
        header.push(format!("weight_bps_{name}"));
    }
    wtr.write_record(&header)?;

    for r in results {
        let mut row = vec![
            r.timestamp.to_string(),
            r.portfolio_value.to_string(),
            r.buffer_value.to_string(),
            r.yield_harvested.to_string(),
            r.management_fee.to_string(),
            r.gas_cost.to_string(),
            r.slippage_cost.to_string(),
            r.rebalanced.to_string(),
            format!("{:.2}", wad_to_f64(r.portfolio_value)),
        ];
        for (value, weight) in r.asset_values.iter().zip(&r.asset_weights) {
            row.push(value.to_string());
            row.push(weight.to_string());
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the results CSV to `path`.
pub fn export_results_csv(path: &Path, results: &[BacktestResult], symbols: &[String]) -> Result<()> {
    write_results_csv(File::create(path)?, results, symbols)
}

/// Pretty-printed JSON for a metrics record.
pub fn metrics_json(metrics: &PerformanceMetrics) -> Result<String> {
    Ok(serde_json::to_string_pretty(metrics)?)
}

pub fn export_metrics_json(path: &Path, metrics: &PerformanceMetrics) -> Result<()> {
    std::fs::write(path, metrics_json(metrics)?)?;
    Ok(())
}

/// Human readable summary of a run.
pub fn format_summary(metrics: &PerformanceMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Steps:              {}", metrics.steps);
    let _ = writeln!(
        out,
        "Start value:        ${:.2}",
        wad_to_f64(metrics.start_value)
    );
    let _ = writeln!(out, "End value:          ${:.2}", wad_to_f64(metrics.end_value));
    let _ = writeln!(out, "Total return:       {:.2}%", metrics.total_return * 100.0);
    let _ = writeln!(
        out,
        "Annualized return:  {:.2}%",
        metrics.annualized_return * 100.0
    );
    let _ = writeln!(out, "Volatility:         {:.2}%", metrics.volatility * 100.0);
    let _ = writeln!(out, "Sharpe ratio:       {:.3}", metrics.sharpe_ratio);
    let _ = writeln!(out, "Sortino ratio:      {:.3}", metrics.sortino_ratio);
    let _ = writeln!(out, "Calmar ratio:       {:.3}", metrics.calmar_ratio);
    let _ = writeln!(out, "Max drawdown:       {:.2}%", metrics.max_drawdown_pct());
    let _ = writeln!(out, "Rebalances:         {}", metrics.rebalance_count);
    let _ = writeln!(out, "Yield harvested:    ${:.2}", wad_to_f64(metrics.total_yield));
    let _ = writeln!(
        out,
        "Management fees:    ${:.2}",
        wad_to_f64(metrics.total_management_fees)
    );
    let _ = writeln!(
        out,
        "Execution costs:    ${:.2}",
        wad_to_f64(metrics.total_gas + metrics.total_slippage)
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::wad;
    use alloy_primitives::U256;

    fn result(timestamp: u64, value: u64) -> BacktestResult {
        BacktestResult {
            timestamp,
            portfolio_value: wad(value),
            asset_values: vec![wad(value / 2), wad(value / 2)],
            asset_weights: vec![5_000, 5_000],
            buffer_value: U256::ZERO,
            yield_harvested: U256::ZERO,
            management_fee: U256::ZERO,
            rebalanced: false,
            gas_cost: U256::ZERO,
            slippage_cost: U256::ZERO,
        }
    }

    #[test]
    fn test_csv_layout() {
        let mut buf = Vec::new();
        let symbols = vec!["sSPX".to_string()];
        write_results_csv(&mut buf, &[result(0, 100), result(60, 110)], &symbols).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("value_sSPX,weight_bps_sSPX,value_1,weight_bps_1"));
        assert!(lines[2].starts_with("60,110000000000000000000,"));
        assert!(lines[2].contains(",110.00,"));
    }

    #[test]
    fn test_summary_mentions_drawdown() {
        let metrics = PerformanceMetrics {
            max_drawdown: wad(1) / U256::from(4u64),
            ..PerformanceMetrics::default()
        };
        assert!(format_summary(&metrics).contains("Max drawdown:       25.00%"));
    }

    #[test]
    fn test_metrics_json_fields() {
        let json = metrics_json(&PerformanceMetrics::default()).unwrap();
        assert!(json.contains("\"sharpe_ratio\""));
        assert!(json.contains("\"rebalance_count\": 0"));
    }
}
