//! Binance spot REST client
//!
//! Base URL: https://api.binance.com
//!
//! # Public Endpoints (no auth required)
//! - GET /api/v3/ticker/price?symbol={symbol} - Latest price
//! - GET /api/v3/klines?symbol={symbol}&interval=1h&startTime={ms}&limit=1 - One hourly candle
//!
//! # Source
//! - https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::BINANCE_API_BASE;

/// Default timeouts: spot reads are on the sampling path, candles are not
const SPOT_TIMEOUT_SECS: u64 = 2;
const KLINE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// Binance REST client for one symbol
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    symbol: String,
    spot_timeout: Duration,
    kline_timeout: Duration,
}

impl BinanceClient {
    /// Client for BTCUSDT against the public API
    pub fn new() -> Result<Self> {
        Self::with_base_url(BINANCE_API_BASE, "BTCUSDT")
    }

    pub fn with_base_url(base_url: &str, symbol: &str) -> Result<Self> {
        Self::with_timeouts(
            base_url,
            symbol,
            Duration::from_secs(SPOT_TIMEOUT_SECS),
            Duration::from_secs(KLINE_TIMEOUT_SECS),
        )
    }

    pub fn with_timeouts(
        base_url: &str,
        symbol: &str,
        spot_timeout: Duration,
        kline_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(spot_timeout.max(kline_timeout))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            symbol: symbol.to_string(),
            spot_timeout,
            kline_timeout,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// GET /api/v3/ticker/price
    pub async fn spot_price(&self) -> Result<Decimal> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        debug!("GET {}?symbol={}", url, self.symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", self.symbol.as_str())])
            .timeout(self.spot_timeout)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }

        let ticker: TickerPrice = response.json().await.context("Failed to parse ticker")?;
        ticker
            .price
            .parse::<Decimal>()
            .with_context(|| format!("Invalid ticker price '{}'", ticker.price))
    }

    /// Open price of the 1h candle starting exactly at `start`.
    ///
    /// Returns None while the candle is not published yet (empty response, or the
    /// first row opens at a different time).
    pub async fn hour_open(&self, start: DateTime<Utc>) -> Result<Option<Decimal>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let start_ms = start.timestamp_millis();
        debug!("GET {}?symbol={}&interval=1h&startTime={}&limit=1", url, self.symbol, start_ms);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", self.symbol.clone()),
                ("interval", "1h".to_string()),
                ("startTime", start_ms.to_string()),
                ("limit", "1".to_string()),
            ])
            .timeout(self.kline_timeout)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} for {}: {}", status, url, body);
        }

        let rows: Vec<Vec<Value>> = response.json().await.context("Failed to parse klines")?;
        parse_hour_open(&rows, start_ms)
    }
}

/// Row layout: [openTime, open, high, low, close, volume, closeTime, ...]
fn parse_hour_open(rows: &[Vec<Value>], start_ms: i64) -> Result<Option<Decimal>> {
    let row = match rows.first() {
        Some(row) => row,
        None => return Ok(None),
    };

    let open_time = row.first().and_then(Value::as_i64);
    if open_time != Some(start_ms) {
        debug!("Kline open time {:?} does not match requested {}", open_time, start_ms);
        return Ok(None);
    }

    let open = row
        .get(1)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("Kline row missing open price"))?;

    let open = open
        .parse::<Decimal>()
        .with_context(|| format!("Invalid kline open '{}'", open))?;
    Ok(Some(open))
}
