//! Dakhla CLI binary.
//!
//! Thin command surface over the library: score a universe, build an
//! allocation, run a backtest, inspect the regime, maintain the cache.

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;

#[derive(Parser)]
#[command(name = "dakhla")]
#[command(about = "Systematic multi-factor portfolio construction", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory for the cache and historical store.
    #[arg(long, default_value = "data", global = true)]
    data_dir: String,

    /// Resolve from the cache tiers only; never call a live source.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute factor scores for a universe
    Score {
        /// Universe name (sp500, russell2000, nasdaq100, combined)
        #[arg(short, long, default_value = "sp500")]
        universe: String,

        /// Point-in-time cutoff (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,

        /// Rows to print
        #[arg(short, long, default_value = "25")]
        top: usize,
    },

    /// Build an optimized allocation
    Optimize {
        /// Universe name
        #[arg(short, long, default_value = "sp500")]
        universe: String,

        /// Point-in-time cutoff (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,

        /// Capital to allocate into discrete shares
        #[arg(short, long, default_value = "100000")]
        capital: f64,

        /// Objective (max-sharpe, min-volatility, equal-weight)
        #[arg(short, long, default_value = "max-sharpe")]
        objective: String,

        /// Write a portfolio snapshot JSON here
        #[arg(long)]
        snapshot: Option<String>,
    },

    /// Run a walk-forward backtest
    Backtest {
        /// Universe name
        #[arg(short, long, default_value = "sp500")]
        universe: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,

        /// Rebalance frequency (monthly, quarterly)
        #[arg(short, long, default_value = "quarterly")]
        frequency: String,

        /// Initial capital
        #[arg(long, default_value = "100000")]
        capital: f64,

        /// Transaction cost in basis points on turnover
        #[arg(long, default_value = "0")]
        cost_bps: f64,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show a universe with market caps as of a date
    Universe {
        /// Universe name
        #[arg(default_value = "sp500")]
        name: String,

        /// Point-in-time cutoff (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,

        /// Rows to print
        #[arg(short, long, default_value = "25")]
        top: usize,
    },

    /// Classify the current market regime
    Regime {
        /// Index ticker for the trend signal
        #[arg(short, long, default_value = "SPY")]
        index: String,
    },

    /// Purge expired cache entries
    CacheMaintain,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dakhla=info,warn".into()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let ctx = cmd::Context::new(&cli.data_dir, cli.offline)?;

    match cli.command {
        Commands::Score {
            universe,
            date,
            top,
        } => cmd::score::run(&ctx, &universe, date.as_deref(), top).await,
        Commands::Optimize {
            universe,
            date,
            capital,
            objective,
            snapshot,
        } => {
            cmd::optimize::run(
                &ctx,
                &universe,
                date.as_deref(),
                capital,
                &objective,
                snapshot.as_deref(),
            )
            .await
        }
        Commands::Backtest {
            universe,
            start,
            end,
            frequency,
            capital,
            cost_bps,
            format,
        } => {
            cmd::backtest::run(
                &ctx, &universe, &start, &end, &frequency, capital, cost_bps, &format,
            )
            .await
        }
        Commands::Universe { name, date, top } => {
            cmd::universe::run(&ctx, &name, date.as_deref(), top).await
        }
        Commands::Regime { index } => cmd::regime::run(&ctx, &index).await,
        Commands::CacheMaintain => cmd::cache::run(&ctx),
    }
}
