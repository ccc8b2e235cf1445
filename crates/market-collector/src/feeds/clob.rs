//! REST client for the Polymarket CLOB midpoint
//!
//! Base URL: https://clob.polymarket.com
//!
//! # Public Endpoints (no auth required)
//! - GET /midpoint?token_id={token_id} - `{"mid": "0.55"}`
//!
//! # Source
//! - Endpoints: https://docs.polymarket.com/quickstart/reference/endpoints

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use crate::CLOB_REST_BASE;

const DEFAULT_TIMEOUT_SECS: u64 = 2;

/// REST client for CLOB API
#[derive(Clone)]
pub struct ClobClient {
    client: Client,
    base_url: String,
}

impl ClobClient {
    /// Create a new REST client with default base URL
    pub fn new() -> Result<Self> {
        Self::with_base_url(CLOB_REST_BASE)
    }

    /// Create a new REST client with custom base URL
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    /// Midpoint for a token.
    ///
    /// `Ok(None)` means the book has no midpoint (illiquid): the field is absent,
    /// null or empty, or the server is rate limiting us.
    pub async fn get_midpoint(&self, token_id: &str) -> Result<Option<Decimal>> {
        let url = format!("{}/midpoint", self.base_url);
        debug!("GET {}?token_id={}", url, token_id);

        let response = self
            .client
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            debug!("Rate limited on midpoint for {}", token_id);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} for {}: {}", status, url, body);
        }

        let json: Value = response.json().await.context("Failed to parse JSON")?;
        parse_midpoint(&json)
    }
}

fn parse_midpoint(json: &Value) -> Result<Option<Decimal>> {
    let mid = match json.get("mid") {
        Some(Value::String(s)) if !s.is_empty() => s.as_str(),
        Some(Value::Number(n)) => return Ok(n.to_string().parse::<Decimal>().ok()),
        _ => return Ok(None),
    };

    let mid = mid.parse::<Decimal>().with_context(|| format!("Invalid midpoint '{}'", mid))?;
    Ok(Some(mid))
}
