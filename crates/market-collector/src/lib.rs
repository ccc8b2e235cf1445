//! Hourly Polymarket market collector
//!
//! Tracks the rolling "Bitcoin Up or Down" hourly markets one at a time:
//! - `gamma`: identifier computation and market discovery via the Gamma API
//! - `strike`: strike (reference open price) resolution from Binance 1h candles
//! - `feeds`: live spot price and CLOB midpoint reads
//! - `store`: append-only per-session CSV record files
//! - `controller`: discover -> resolve -> track -> rollover state machine
//!
//! # Official Documentation
//! - Gamma Structure: https://docs.polymarket.com/developers/gamma-markets-api/gamma-structure
//! - Midpoint: https://docs.polymarket.com/api-reference/pricing/get-midpoint-price
//! - Binance Klines: https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod feeds;
pub mod gamma;
pub mod store;
pub mod strike;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CollectorConfig;
pub use controller::SessionController;
pub use error::{CollectorError, SessionError, StoreError};
pub use types::*;

/// Official Gamma API base URL (market discovery)
/// Source: https://docs.polymarket.com/quickstart/reference/endpoints
pub const GAMMA_API_BASE: &str = "https://gamma-api.polymarket.com";

/// Official CLOB REST API base URL
/// Source: https://docs.polymarket.com/quickstart/reference/endpoints
pub const CLOB_REST_BASE: &str = "https://clob.polymarket.com";

/// Binance spot REST API base URL
pub const BINANCE_API_BASE: &str = "https://api.binance.com";

/// Public market page, used for human-facing links
pub const POLYMARKET_EVENT_URL: &str = "https://polymarket.com/event";
