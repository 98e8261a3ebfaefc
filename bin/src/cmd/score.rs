//! `dakhla score` — factor scores for a universe at a cutoff.

use anyhow::Result;
use std::sync::Arc;

use dakhla::data::UniverseProvider;
use dakhla::factors::FactorEngine;
use dakhla::prelude::UniverseName;

use super::{parse_date_or_today, Context};

pub async fn run(ctx: &Context, universe: &str, date: Option<&str>, top: usize) -> Result<()> {
    let name: UniverseName = universe.parse()?;
    let as_of = parse_date_or_today(date)?;

    let provider = UniverseProvider::new(Arc::clone(&ctx.cache));
    let entries = provider.load(name, as_of).await?;
    let tickers: Vec<_> = entries.iter().map(|e| e.ticker.clone()).collect();

    let engine = FactorEngine::new(tickers, as_of, Arc::clone(&ctx.cache), ctx.config.clone())?;
    let scores = engine.compute().await?;

    println!("Factor scores for {name} as of {as_of} ({} tickers)\n", scores.len());
    println!(
        "{:<4} {:<8} {:>8} {:>8} {:>8} {:>8} {:>6}",
        "Rank", "Ticker", "Value", "Quality", "Momentum", "Total", "Pctl"
    );
    for ticker in scores.ranked().into_iter().take(top) {
        let s = &scores.scores[ticker];
        println!(
            "{:<4} {:<8} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>5.0}%",
            s.rank,
            ticker,
            s.value_z,
            s.quality_z,
            s.momentum_z,
            s.total_score,
            s.percentile * 100.0
        );
    }
    Ok(())
}
