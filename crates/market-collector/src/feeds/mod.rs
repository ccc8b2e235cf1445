//! Live price feeds
//!
//! Two independent, best-effort reads: the underlying spot price (Binance) and the
//! implied probability of the tracked outcome (CLOB midpoint). `None` means the
//! value is unavailable for this tick; it is never an error for the caller.

pub mod binance;
pub mod clob;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

pub use binance::BinanceClient;
pub use clob::ClobClient;

#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn underlying_price(&self) -> Option<Decimal>;

    async fn implied_probability(&self, handle: &str) -> Option<Decimal>;
}

/// Production feeds over HTTP, each request bounded by its client's timeout
#[derive(Clone)]
pub struct LiveFeeds {
    binance: BinanceClient,
    clob: ClobClient,
}

impl LiveFeeds {
    pub fn new(binance: BinanceClient, clob: ClobClient) -> Self {
        Self { binance, clob }
    }
}

#[async_trait]
impl PriceFeed for LiveFeeds {
    async fn underlying_price(&self) -> Option<Decimal> {
        match self.binance.spot_price().await {
            Ok(price) => Some(price),
            Err(e) => {
                debug!("Spot price unavailable: {:#}", e);
                None
            }
        }
    }

    async fn implied_probability(&self, handle: &str) -> Option<Decimal> {
        match self.clob.get_midpoint(handle).await {
            Ok(mid) => mid,
            Err(e) => {
                debug!("Midpoint unavailable: {:#}", e);
                None
            }
        }
    }
}
