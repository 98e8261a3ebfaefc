//! `dakhla regime` — classify the current market state.

use anyhow::Result;
use chrono::{Duration, Utc};

use dakhla::optimizer::RegimeDetector;

use super::Context;

pub async fn run(ctx: &Context, index: &str) -> Result<()> {
    let today = Utc::now().date_naive();
    // 200 trading days of SMA needs roughly 300 calendar days of bars.
    let bars = ctx
        .cache
        .get_prices(index, today - Duration::days(320), today)
        .await?;

    let detector = RegimeDetector::default();
    let signal = detector.classify(&bars, None)?;

    println!("Regime: {}", signal.regime);
    println!("  {index} price     {:>10.2}", signal.index_price);
    println!("  200-day SMA   {:>10.2}", signal.sma_200);
    println!("  signal        {:>+9.2}%", signal.signal_strength);
    println!("  data points   {:>10}", signal.data_points);
    Ok(())
}
