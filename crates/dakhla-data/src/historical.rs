//! Per-ticker columnar store of full adjusted price histories.
//!
//! Files live under `<root>/historical/prices/{TICKER}.parquet` with schema
//! `(date: Date32, open, high, low, close, adj_close: Float64, volume:
//! Int64)`, sorted by date ascending with no duplicates. This is the first
//! tier consulted for point-in-time reads.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use polars::prelude::*;
use tracing::debug;

use dakhla_traits::{DakhlaError, Date, PriceBar, Result};

// Offset between polars' physical date (days since the Unix epoch) and
// chrono's days-from-CE representation.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn columnar(err: PolarsError) -> DakhlaError {
    DakhlaError::Columnar(err.to_string())
}

/// Columnar store of full per-ticker price histories.
#[derive(Debug, Clone)]
pub struct HistoricalStore {
    dir: PathBuf,
}

impl HistoricalStore {
    /// Open (and create if needed) the store under the given data root.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn open(data_root: impl AsRef<Path>) -> Result<Self> {
        let dir = data_root.as_ref().join("historical").join("prices");
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of a ticker's parquet file.
    #[must_use]
    pub fn path(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.parquet", ticker.to_uppercase()))
    }

    /// Whether the store holds a history for this ticker.
    #[must_use]
    pub fn contains(&self, ticker: &str) -> bool {
        self.path(ticker).is_file()
    }

    /// Read bars with `start <= date < end`, sorted ascending.
    ///
    /// # Errors
    ///
    /// Returns [`DakhlaError::NotFound`] when the ticker has no file, or
    /// [`DakhlaError::Columnar`] when the file cannot be decoded.
    pub fn read(&self, ticker: &str, start: Date, end: Date) -> Result<Vec<PriceBar>> {
        let path = self.path(ticker);
        if !path.is_file() {
            return Err(DakhlaError::NotFound(format!(
                "no historical file for {ticker}"
            )));
        }

        let file = fs::File::open(&path)?;
        let df = ParquetReader::new(file).finish().map_err(columnar)?;

        let dates = df
            .column("date")
            .map_err(columnar)?
            .as_materialized_series()
            .date()
            .map_err(columnar)?
            .clone();
        let open = float_column(&df, "open")?;
        let high = float_column(&df, "high")?;
        let low = float_column(&df, "low")?;
        let close = float_column(&df, "close")?;
        let adj_close = float_column(&df, "adj_close")?;
        let volume = df
            .column("volume")
            .map_err(columnar)?
            .as_materialized_series()
            .i64()
            .map_err(columnar)?
            .clone();

        let days: Vec<Option<i32>> = (&dates).into_iter().collect();
        let mut bars = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let Some(days) = days[i] else {
                continue;
            };
            let Some(date) = Date::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE) else {
                continue;
            };
            if date < start || date >= end {
                continue;
            }
            bars.push(PriceBar {
                date,
                open: open.get(i).unwrap_or(f64::NAN),
                high: high.get(i).unwrap_or(f64::NAN),
                low: low.get(i).unwrap_or(f64::NAN),
                close: close.get(i).unwrap_or(f64::NAN),
                adj_close: adj_close.get(i).unwrap_or(f64::NAN),
                volume: volume.get(i).unwrap_or(0),
            });
        }

        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        debug!(ticker, rows = bars.len(), %start, %end, "historical read");
        Ok(bars)
    }

    /// Write a full history for a ticker, replacing any existing file.
    ///
    /// Bars are sorted and de-duplicated before writing; the write is atomic
    /// (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns [`DakhlaError::Columnar`] if the frame cannot be encoded.
    pub fn write(&self, ticker: &str, bars: &[PriceBar]) -> Result<()> {
        let mut sorted: Vec<PriceBar> = bars.to_vec();
        sorted.sort_by_key(|b| b.date);
        sorted.dedup_by_key(|b| b.date);

        let dates: Vec<i32> = sorted
            .iter()
            .map(|b| b.date.num_days_from_ce() - EPOCH_DAYS_FROM_CE)
            .collect();
        let date = Series::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(columnar)?;

        let mut df = DataFrame::new(vec![
            date.into(),
            Series::new("open".into(), sorted.iter().map(|b| b.open).collect::<Vec<_>>()).into(),
            Series::new("high".into(), sorted.iter().map(|b| b.high).collect::<Vec<_>>()).into(),
            Series::new("low".into(), sorted.iter().map(|b| b.low).collect::<Vec<_>>()).into(),
            Series::new(
                "close".into(),
                sorted.iter().map(|b| b.close).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "adj_close".into(),
                sorted.iter().map(|b| b.adj_close).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "volume".into(),
                sorted.iter().map(|b| b.volume).collect::<Vec<_>>(),
            )
            .into(),
        ])
        .map_err(columnar)?;

        let path = self.path(ticker);
        let tmp = path.with_extension("parquet.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            ParquetWriter::new(&mut file)
                .finish(&mut df)
                .map_err(columnar)?;
        }
        fs::rename(&tmp, &path)?;
        debug!(ticker, rows = sorted.len(), "historical write");
        Ok(())
    }
}

fn float_column(df: &DataFrame, name: &str) -> Result<Float64Chunked> {
    Ok(df
        .column(name)
        .map_err(columnar)?
        .as_materialized_series()
        .f64()
        .map_err(columnar)?
        .clone())
}
