//! Collector configuration
//!
//! Defaults reproduce the production collector; `from_env` applies overrides.
//!
//! Expected env vars (all optional):
//! - PM_COLLECTOR_DATA_ROOT
//! - PM_COLLECTOR_SYMBOL
//! - PM_COLLECTOR_GAMMA_URL
//! - PM_COLLECTOR_CLOB_URL
//! - PM_COLLECTOR_BINANCE_URL
//! - PM_COLLECTOR_LOOK_AHEAD_HOURS
//! - PM_COLLECTOR_POLL_INTERVAL_MS

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use url::Url;

use crate::error::CollectorError;
use crate::{BINANCE_API_BASE, CLOB_REST_BASE, GAMMA_API_BASE};

/// Collector configuration
#[derive(Clone, Debug)]
pub struct CollectorConfig {
    pub gamma_base_url: String,
    pub clob_base_url: String,
    pub binance_base_url: String,

    /// Binance symbol for spot price and strike candles
    pub symbol: String,
    /// Leading part of the event slug
    pub slug_prefix: String,
    /// Timezone the slugs and folder names are expressed in
    pub timezone: Tz,
    /// Whole hours added to "now" before computing the first candidate slug
    pub look_ahead_hours: i64,
    /// Number of consecutive hours probed during discovery (1 or 2)
    pub candidate_hours: u32,

    /// Nominal sampling cadence while tracking
    pub poll_interval: Duration,
    /// Wait between discovery rounds
    pub discovery_backoff: Duration,
    /// Wait between strike candle queries
    pub strike_backoff: Duration,

    /// Per-request timeout for spot and midpoint reads
    pub feed_timeout: Duration,
    /// Per-request timeout for catalog and candle queries
    pub catalog_timeout: Duration,

    /// Root of the `<date>/<folder>/market_data.csv` tree
    pub data_root: PathBuf,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            gamma_base_url: GAMMA_API_BASE.to_string(),
            clob_base_url: CLOB_REST_BASE.to_string(),
            binance_base_url: BINANCE_API_BASE.to_string(),
            symbol: "BTCUSDT".to_string(),
            slug_prefix: "bitcoin-up-or-down".to_string(),
            timezone: chrono_tz::US::Eastern,
            look_ahead_hours: 0,
            candidate_hours: 2,
            poll_interval: Duration::from_secs(1),
            discovery_backoff: Duration::from_secs(10),
            strike_backoff: Duration::from_secs(30),
            feed_timeout: Duration::from_secs(2),
            catalog_timeout: Duration::from_secs(5),
            data_root: PathBuf::from("./data_collection"),
        }
    }
}

impl CollectorConfig {
    /// Defaults overlaid with any PM_COLLECTOR_* environment variables
    pub fn from_env() -> Result<Self, CollectorError> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("PM_COLLECTOR_DATA_ROOT") {
            config.data_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PM_COLLECTOR_SYMBOL") {
            config.symbol = v;
        }
        if let Ok(v) = std::env::var("PM_COLLECTOR_GAMMA_URL") {
            config.gamma_base_url = v;
        }
        if let Ok(v) = std::env::var("PM_COLLECTOR_CLOB_URL") {
            config.clob_base_url = v;
        }
        if let Ok(v) = std::env::var("PM_COLLECTOR_BINANCE_URL") {
            config.binance_base_url = v;
        }
        if let Ok(v) = std::env::var("PM_COLLECTOR_LOOK_AHEAD_HOURS") {
            config.look_ahead_hours = v.parse().map_err(|e| {
                CollectorError::Config(format!("PM_COLLECTOR_LOOK_AHEAD_HOURS '{}': {}", v, e))
            })?;
        }
        if let Ok(v) = std::env::var("PM_COLLECTOR_POLL_INTERVAL_MS") {
            let ms: u64 = v.parse().map_err(|e| {
                CollectorError::Config(format!("PM_COLLECTOR_POLL_INTERVAL_MS '{}': {}", v, e))
            })?;
            config.poll_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Check URLs and intervals before any client is built
    pub fn validate(&self) -> Result<(), CollectorError> {
        for (name, value) in [
            ("gamma", &self.gamma_base_url),
            ("clob", &self.clob_base_url),
            ("binance", &self.binance_base_url),
        ] {
            Url::parse(value)
                .map_err(|e| CollectorError::Config(format!("invalid {} url '{}': {}", name, value, e)))?;
        }

        if self.symbol.is_empty() {
            return Err(CollectorError::Config("symbol must not be empty".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(CollectorError::Config("poll interval must be positive".to_string()));
        }
        if self.look_ahead_hours < 0 {
            return Err(CollectorError::Config(format!(
                "look_ahead_hours must not be negative, got {}",
                self.look_ahead_hours
            )));
        }
        if !(1..=2).contains(&self.candidate_hours) {
            return Err(CollectorError::Config(format!(
                "candidate_hours must be 1 or 2, got {}",
                self.candidate_hours
            )));
        }

        Ok(())
    }
}
