//! `dakhla universe` — list a universe with point-in-time market caps.

use std::sync::Arc;

use anyhow::Result;

use dakhla::data::UniverseProvider;
use dakhla::prelude::UniverseName;

use super::{parse_date_or_today, Context};

pub async fn run(ctx: &Context, name: &str, date: Option<&str>, top: usize) -> Result<()> {
    let name: UniverseName = name.parse()?;
    let as_of = parse_date_or_today(date)?;

    let provider = UniverseProvider::new(Arc::clone(&ctx.cache));
    let entries = provider.load(name, as_of).await?;

    println!(
        "{name} as of {as_of}: {} of {} tickers resolved\n",
        entries.len(),
        UniverseProvider::tickers(name).len()
    );
    println!("{:<8} {:>14} {}", "Ticker", "Mkt cap ($B)", "Sector");
    for entry in entries.iter().take(top) {
        println!(
            "{:<8} {:>14.1} {}",
            entry.ticker,
            entry.market_cap / 1e9,
            entry.sector.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
