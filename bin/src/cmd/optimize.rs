//! `dakhla optimize` — one full allocation: scores → posterior → weights
//! → discrete shares.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Duration;

use dakhla::data::UniverseProvider;
use dakhla::factors::FactorEngine;
use dakhla::optimizer::{BenchmarkQuote, BlackLittermanOptimizer, Objective};
use dakhla::prelude::{Ticker, UniverseName};
use dakhla::traits::PriceBar;

use super::{parse_date_or_today, Context};

const CALENDAR_PER_TRADING: f64 = 1.5;

pub async fn run(
    ctx: &Context,
    universe: &str,
    date: Option<&str>,
    capital: f64,
    objective: &str,
    snapshot_path: Option<&str>,
) -> Result<()> {
    let name: UniverseName = universe.parse()?;
    let as_of = parse_date_or_today(date)?;
    let objective = match objective {
        "max-sharpe" => Objective::MaxSharpe,
        "min-volatility" => Objective::MinVolatility,
        "equal-weight" => Objective::EqualWeight,
        other => bail!("unknown objective '{other}'"),
    };

    let provider = UniverseProvider::new(Arc::clone(&ctx.cache));
    let entries = provider.load(name, as_of).await?;
    let tickers: Vec<_> = entries.iter().map(|e| e.ticker.clone()).collect();

    let scores = FactorEngine::new(tickers, as_of, Arc::clone(&ctx.cache), ctx.config.clone())?
        .compute()
        .await?;

    let selected = scores.top_n(ctx.config.top_n);
    let lookback =
        (ctx.config.covariance_lookback_days as f64 * CALENDAR_PER_TRADING) as i64;
    let window_start = as_of - Duration::days(lookback);
    let mut history: BTreeMap<Ticker, Vec<PriceBar>> = BTreeMap::new();
    for ticker in &selected {
        let bars = ctx.cache.get_prices(ticker, window_start, as_of).await?;
        history.insert(ticker.clone(), bars);
    }

    let optimizer = BlackLittermanOptimizer::new(ctx.config.clone())?;
    let result = optimizer.optimize(&scores, &entries, &history, objective, None)?;

    let prices: BTreeMap<Ticker, f64> = history
        .iter()
        .filter_map(|(t, bars)| bars.last().map(|b| (t.clone(), b.close)))
        .collect();
    let result = optimizer.with_discrete(result, &prices, capital)?;

    println!("Allocation for {name} as of {as_of}");
    if result.degraded {
        println!("  (degraded: solver infeasible, equal-weight fallback)");
    }
    println!(
        "  expected return {:>6.2}%   volatility {:>6.2}%   sharpe {:.2}\n",
        result.expected_return * 100.0,
        result.volatility * 100.0,
        result.sharpe
    );
    println!("{:<8} {:>8} {:>8} {:>12}", "Ticker", "Weight", "Shares", "Value");
    let discrete = result.discrete.as_ref().expect("discrete set above");
    for (ticker, weight) in &result.weights {
        let shares = discrete.shares.get(ticker).copied().unwrap_or(0);
        let value = shares as f64 * prices.get(ticker).copied().unwrap_or(0.0);
        println!("{ticker:<8} {:>7.2}% {shares:>8} {value:>12.2}", weight * 100.0);
    }
    println!(
        "\n  invested {:.2}   leftover {:.2}",
        discrete.invested, discrete.leftover
    );

    if let Some(path) = snapshot_path {
        let benchmark = benchmark_quote(ctx, as_of).await;
        let snapshot = optimizer.snapshot(&result, &scores, benchmark);
        std::fs::write(path, snapshot.to_json()?)?;
        println!("  snapshot written to {path}");
    }
    Ok(())
}

async fn benchmark_quote(ctx: &Context, as_of: chrono::NaiveDate) -> Option<BenchmarkQuote> {
    let bars = ctx
        .cache
        .get_prices("SPY", as_of - Duration::days(10), as_of)
        .await
        .ok()?;
    bars.last().map(|b| BenchmarkQuote {
        ticker: "SPY".into(),
        price: b.close,
    })
}
