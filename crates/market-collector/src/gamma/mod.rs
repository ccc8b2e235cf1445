//! Gamma API client and hourly market discovery
//!
//! # Components
//! - `GammaClient`: REST client for the Gamma events endpoint
//! - `ClockSlugResolver`: wall clock -> deterministic hourly event slug
//! - `MarketDiscoveryClient`: slug -> session metadata (first listed market)
//!
//! # Source
//! - Gamma Structure: https://docs.polymarket.com/developers/gamma-markets-api/gamma-structure
//! - Gamma Events: https://docs.polymarket.com/developers/gamma-markets-api/get-events

mod client;
pub mod discovery;
pub mod slug;

pub use client::GammaClient;
pub use discovery::{parse_settlement_time, MarketCatalog, MarketDiscoveryClient};
pub use slug::ClockSlugResolver;
