use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use common::error::DataError;
use common::models::DailyBar;
use common::traits::PriceFeed;

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct DailyQuoteDto {
    #[serde(rename = "4. close")]
    close: String,
}

#[derive(Debug, Deserialize)]
struct DailySeriesDto {
    #[serde(rename = "Time Series (Daily)")]
    series: Option<BTreeMap<String, DailyQuoteDto>>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteDto {
    #[serde(rename = "05. price")]
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteEnvelope {
    #[serde(rename = "Global Quote")]
    quote: Option<GlobalQuoteDto>,
}

/// The keyed map is ordered by date string (ISO, so lexicographic order is
/// chronological); reversing it yields newest-first bars.
fn parse_daily_series(body: &str, symbol: &str) -> Result<Vec<DailyBar>, DataError> {
    let dto: DailySeriesDto =
        serde_json::from_str(body).map_err(|e| DataError::Parse(e.to_string()))?;
    let series = dto.series.ok_or_else(|| DataError::Empty(symbol.to_string()))?;

    let mut bars = Vec::with_capacity(series.len());
    for (date, quote) in series.into_iter().rev() {
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|_| DataError::Parse(format!("bad date key: {date:?}")))?;
        let close = quote
            .close
            .parse::<f64>()
            .map_err(|_| DataError::Parse(format!("bad close for {date}: {:?}", quote.close)))?;
        bars.push(DailyBar { date, close });
    }
    Ok(bars)
}

/// An unknown ticker comes back as an empty `Global Quote` object, not an
/// HTTP error.
fn parse_global_quote(body: &str) -> Result<Option<f64>, DataError> {
    let dto: GlobalQuoteEnvelope =
        serde_json::from_str(body).map_err(|e| DataError::Parse(e.to_string()))?;
    let Some(GlobalQuoteDto { price: Some(raw) }) = dto.quote else {
        return Ok(None);
    };
    let price = raw
        .parse::<f64>()
        .map_err(|_| DataError::Parse(format!("bad quote price: {raw:?}")))?;
    Ok(Some(price))
}

/// Alpha Vantage daily-close price feed.
#[derive(Clone)]
pub struct AlphaVantageClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantageClient {
    pub fn new(api_key: &str) -> Result<Self, DataError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DataError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn query(&self, function: &str, symbol: &str) -> Result<String, DataError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", function),
                ("symbol", symbol),
                ("apikey", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| DataError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!("Alpha Vantage {} failed ({}): {}", function, status, message);
            return Err(DataError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        resp.text()
            .await
            .map_err(|e| DataError::Transport(e.to_string()))
    }
}

#[async_trait]
impl PriceFeed for AlphaVantageClient {
    async fn daily_prices(&self, symbol: &str) -> Result<Vec<DailyBar>, DataError> {
        let body = self.query("TIME_SERIES_DAILY", symbol).await?;
        parse_daily_series(&body, symbol)
    }

    async fn latest_quote(&self, symbol: &str) -> Result<Option<f64>, DataError> {
        let body = self.query("GLOBAL_QUOTE", symbol).await?;
        parse_global_quote(&body)
    }
}
