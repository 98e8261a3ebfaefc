//! Financial Modeling Prep live source.
//!
//! Implements [`PriceSource`] and [`FundamentalsSource`] against the FMP
//! stable API. Fundamentals honor the point-in-time contract: only reports
//! whose filing date is strictly before the requested cutoff participate,
//! and flow fields are summed over the trailing four quarters.

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use dakhla_traits::{
    DakhlaError, Date, FundamentalsSnapshot, FundamentalsSource, PriceBar, PriceSource, Result,
};

/// Base URL for the FMP stable API.
const FMP_BASE_URL: &str = "https://financialmodelingprep.com/stable";

/// Quarterly periods requested per statement; eight covers two TTM windows.
const STATEMENT_LIMIT: u32 = 8;

/// Per-call network timeout.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomeStatementRow {
    date: String,
    #[serde(default)]
    filing_date: Option<String>,
    #[serde(default)]
    revenue: f64,
    #[serde(default)]
    gross_profit: f64,
    #[serde(default)]
    operating_income: f64,
    #[serde(default)]
    weighted_average_shs_out: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CashFlowRow {
    date: String,
    #[serde(default)]
    filing_date: Option<String>,
    #[serde(default)]
    free_cash_flow: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceSheetRow {
    date: String,
    #[serde(default)]
    filing_date: Option<String>,
    #[serde(default)]
    total_assets: f64,
    #[serde(default)]
    total_current_liabilities: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRow {
    #[serde(default, alias = "mktCap")]
    market_cap: Option<f64>,
    #[serde(default)]
    sector: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoricalPriceRow {
    date: String,
    #[serde(default)]
    open: f64,
    #[serde(default)]
    high: f64,
    #[serde(default)]
    low: f64,
    #[serde(default)]
    close: f64,
    #[serde(default)]
    adj_close: Option<f64>,
    #[serde(default)]
    volume: i64,
}

/// Publication date of a statement row: the filing date when reported, else
/// the fiscal period end plus a conservative 45-day filing lag.
fn publication_date(date: &str, filing_date: Option<&str>) -> Option<Date> {
    if let Some(filed) = filing_date {
        if let Ok(d) = Date::parse_from_str(filed, "%Y-%m-%d") {
            return Some(d);
        }
    }
    Date::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|d| d + chrono::Duration::days(45))
}

/// FMP API client acting as the live tier.
#[derive(Debug, Clone)]
pub struct FmpSource {
    client: Client,
    api_key: String,
}

impl FmpSource {
    /// Create a source with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    /// Create a source from the `FMP_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the variable is unset.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("FMP_API_KEY")
            .map_err(|_| DakhlaError::Config("FMP_API_KEY is not set".into()))?;
        Ok(Self::new(api_key))
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.contains('?') {
            format!("{FMP_BASE_URL}/{endpoint}&apikey={}", self.api_key)
        } else {
            format!("{FMP_BASE_URL}/{endpoint}?apikey={}", self.api_key)
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.url(endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DakhlaError::SourceUnavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DakhlaError::SourceUnavailable("FMP rate limit hit".into()));
        }
        if status.is_server_error() {
            return Err(DakhlaError::SourceUnavailable(format!("FMP HTTP {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DakhlaError::NotFound(format!("FMP HTTP {status}: {text}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| DakhlaError::SourceUnavailable(e.to_string()))?;
        if text.contains("\"Error Message\"") {
            return Err(DakhlaError::NotFound(text));
        }

        serde_json::from_str(&text)
            .map_err(|e| DakhlaError::DataIntegrity(format!("FMP response parse: {e}")))
    }

    async fn statements<T: serde::de::DeserializeOwned>(
        &self,
        symbol: &str,
        kind: &str,
    ) -> Result<Vec<T>> {
        self.get(&format!(
            "{kind}?symbol={symbol}&period=quarter&limit={STATEMENT_LIMIT}"
        ))
        .await
    }

    async fn last_close_before(&self, symbol: &str, as_of: Date) -> Result<Option<f64>> {
        let start = as_of - chrono::Duration::days(10);
        match self.get_history(symbol, start, as_of).await {
            Ok(bars) => Ok(bars.last().map(|b| b.close)),
            Err(DakhlaError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait::async_trait]
impl PriceSource for FmpSource {
    async fn get_history(&self, ticker: &str, start: Date, end: Date) -> Result<Vec<PriceBar>> {
        let symbol = ticker.to_uppercase();
        let endpoint = format!(
            "historical-price-eod/full?symbol={symbol}&from={start}&to={end}",
            start = start.format("%Y-%m-%d"),
            end = end.format("%Y-%m-%d"),
        );
        let rows: Vec<HistoricalPriceRow> = self.get(&endpoint).await?;

        let mut bars: Vec<PriceBar> = rows
            .into_iter()
            .filter_map(|row| {
                let date = Date::parse_from_str(&row.date, "%Y-%m-%d").ok()?;
                if date < start || date >= end {
                    return None;
                }
                Some(PriceBar {
                    date,
                    open: row.open,
                    high: row.high,
                    low: row.low,
                    close: row.close,
                    adj_close: row.adj_close.unwrap_or(row.close),
                    volume: row.volume,
                })
            })
            .collect();
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);

        if bars.is_empty() {
            return Err(DakhlaError::NotFound(format!(
                "{symbol} has no FMP bars in {start}..{end}"
            )));
        }
        debug!(%symbol, rows = bars.len(), "FMP price fetch");
        Ok(bars)
    }
}

#[async_trait::async_trait]
impl FundamentalsSource for FmpSource {
    async fn get_latest(&self, ticker: &str, as_of: Date) -> Result<FundamentalsSnapshot> {
        let symbol = ticker.to_uppercase();

        let profile_path = format!("profile?symbol={symbol}");
        let (income, cash, balance, profile) = tokio::join!(
            self.statements::<IncomeStatementRow>(&symbol, "income-statement"),
            self.statements::<CashFlowRow>(&symbol, "cash-flow-statement"),
            self.statements::<BalanceSheetRow>(&symbol, "balance-sheet-statement"),
            self.get::<Vec<ProfileRow>>(&profile_path),
        );

        let (income, cash, balance) = (income?, cash?, balance?);
        let profile = profile.unwrap_or_default();

        // Point-in-time filter: only rows published strictly before the cutoff.
        let mut income: Vec<(Date, IncomeStatementRow)> = income
            .into_iter()
            .filter_map(|r| {
                publication_date(&r.date, r.filing_date.as_deref())
                    .filter(|d| *d < as_of)
                    .map(|d| (d, r))
            })
            .collect();
        income.sort_by_key(|(d, _)| *d);

        let mut cash: Vec<(Date, CashFlowRow)> = cash
            .into_iter()
            .filter_map(|r| {
                publication_date(&r.date, r.filing_date.as_deref())
                    .filter(|d| *d < as_of)
                    .map(|d| (d, r))
            })
            .collect();
        cash.sort_by_key(|(d, _)| *d);

        let mut balance: Vec<(Date, BalanceSheetRow)> = balance
            .into_iter()
            .filter_map(|r| {
                publication_date(&r.date, r.filing_date.as_deref())
                    .filter(|d| *d < as_of)
                    .map(|d| (d, r))
            })
            .collect();
        balance.sort_by_key(|(d, _)| *d);

        let publication = income
            .last()
            .map(|(d, _)| *d)
            .into_iter()
            .chain(cash.last().map(|(d, _)| *d))
            .chain(balance.last().map(|(d, _)| *d))
            .max()
            .ok_or_else(|| {
                DakhlaError::NotFound(format!("no {symbol} report published before {as_of}"))
            })?;

        // Trailing twelve months over the latest four quarters.
        let ttm = |values: Vec<f64>| -> Option<f64> {
            if values.len() < 4 {
                return None;
            }
            Some(values[values.len() - 4..].iter().sum())
        };

        let revenue = ttm(income.iter().map(|(_, r)| r.revenue).collect());
        let gross_profit = ttm(income.iter().map(|(_, r)| r.gross_profit).collect());
        let ebit = ttm(income.iter().map(|(_, r)| r.operating_income).collect());
        let free_cash_flow = ttm(cash.iter().map(|(_, r)| r.free_cash_flow).collect());

        let latest_balance = balance.last().map(|(_, r)| r);
        let shares = income
            .last()
            .map(|(_, r)| r.weighted_average_shs_out)
            .filter(|s| *s > 0.0);

        // Market cap as of the cutoff: today's profile cap for a live
        // request, otherwise shares × last close before the cutoff.
        let today = Utc::now().date_naive();
        let market_cap = if as_of > today {
            profile.first().and_then(|p| p.market_cap)
        } else {
            match (shares, self.last_close_before(&symbol, as_of).await?) {
                (Some(shares), Some(close)) => Some(shares * close),
                _ => None,
            }
        };

        Ok(FundamentalsSnapshot {
            ticker: symbol,
            as_of,
            publication_date: publication,
            free_cash_flow,
            ebit,
            total_assets: latest_balance
                .map(|b| b.total_assets)
                .filter(|v| *v != 0.0),
            current_liabilities: latest_balance
                .map(|b| b.total_current_liabilities)
                .filter(|v| *v != 0.0),
            gross_profit,
            revenue,
            shares_outstanding: shares,
            market_cap,
            sector: profile.first().and_then(|p| p.sector.clone()),
        })
    }
}
