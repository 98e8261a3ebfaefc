//! `dakhla backtest` — walk-forward simulation over a date range.

use std::sync::Arc;

use anyhow::{bail, Result};

use dakhla::backtest::{BacktestConfig, BacktestEngine, RebalanceFrequency};
use dakhla::prelude::UniverseName;

use super::{parse_date, Context};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    ctx: &Context,
    universe: &str,
    start: &str,
    end: &str,
    frequency: &str,
    capital: f64,
    cost_bps: f64,
    format: &str,
) -> Result<()> {
    let name: UniverseName = universe.parse()?;
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    let frequency = match frequency {
        "monthly" => RebalanceFrequency::Monthly,
        "quarterly" => RebalanceFrequency::Quarterly,
        other => bail!("unknown frequency '{other}'"),
    };

    let config = BacktestConfig {
        frequency,
        initial_capital: capital,
        transaction_cost_bps: cost_bps,
        engine: ctx.config.clone(),
        ..BacktestConfig::quarterly(name, start, end)
    };

    let engine = BacktestEngine::new(Arc::clone(&ctx.cache), config)?;
    let result = engine.run().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result.summary)?);
        return Ok(());
    }

    let s = &result.summary;
    println!("Backtest {name} {start}..{end} ({frequency:?})");
    println!("  total return         {:>8.2}%", s.total_return * 100.0);
    println!("  annualized return    {:>8.2}%", s.annualized_return * 100.0);
    println!("  annualized vol       {:>8.2}%", s.annualized_volatility * 100.0);
    println!("  sharpe               {:>8.2}", s.sharpe_ratio);
    println!("  max drawdown         {:>8.2}%", s.max_drawdown * 100.0);
    println!("  avg turnover         {:>8.2}%", s.avg_turnover * 100.0);
    println!("  rebalances           {:>5} ({} skipped)", s.n_rebalances, s.n_skipped);

    println!("\n{:<12} {:>10} {:>10} {}", "Date", "Turnover", "Degraded", "Top holdings");
    for record in &result.rebalances {
        let mut holdings: Vec<_> = record.weights.iter().collect();
        holdings.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
        let top: Vec<String> = holdings
            .iter()
            .take(3)
            .map(|(t, w)| format!("{t} {:.1}%", **w * 100.0))
            .collect();
        let flag = if record.skipped {
            "skipped"
        } else if record.degraded {
            "yes"
        } else {
            ""
        };
        println!(
            "{:<12} {:>9.1}% {:>10} {}",
            record.date,
            record.turnover * 100.0,
            flag,
            top.join(", ")
        );
    }
    Ok(())
}
