//! Domain and wire types for the hourly collector
//!
//! # Design Principles
//! 1. Upstream decimal strings are parsed into `Decimal`, never `f64`
//! 2. Gamma fields that may arrive as stringified JSON arrays are accepted in both shapes
//! 3. A `MarketSession` only moves forward: Discovering -> ResolvingStrike -> Tracking -> Expired
//!
//! # Sources
//! - Gamma Structure: https://docs.polymarket.com/developers/gamma-markets-api/gamma-structure

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SessionError;

// ============================================================================
// Gamma API Types
// Source: https://docs.polymarket.com/developers/gamma-markets-api/gamma-structure
// ============================================================================

/// Deserialize a token-id list that is either a JSON array or a stringified JSON
/// array (e.g., "[\"a\", \"b\"]"). Missing/null fields become an empty list.
fn deserialize_array_or_stringified<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error, SeqAccess, Visitor};

    struct ArrayOrStringVisitor;

    impl<'de> Visitor<'de> for ArrayOrStringVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a JSON array, a stringified JSON array or null")
        }

        fn visit_str<E: Error>(self, s: &str) -> Result<Self::Value, E> {
            if s.is_empty() {
                return Ok(Vec::new());
            }
            serde_json::from_str(s)
                .map_err(|e| E::custom(format!("Invalid JSON array '{}': {}", s, e)))
        }

        fn visit_string<E: Error>(self, s: String) -> Result<Self::Value, E> {
            self.visit_str(&s)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                out.push(item);
            }
            Ok(out)
        }

        fn visit_none<E: Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_unit<E: Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(ArrayOrStringVisitor)
}

/// Gamma event from GET /events?slug={slug}
///
/// Only the fields the collector reads are typed; everything else lands in `extra`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaEvent {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    /// Event end time (ISO 8601), used when the market omits its own
    #[serde(default)]
    pub end_date: Option<String>,

    /// Sub-instruments in listing order, left raw until one is selected
    #[serde(default)]
    pub markets: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GammaEvent {
    /// Decode only the first listed market. `None` if the list is empty.
    pub fn first_market(&self) -> Option<Result<GammaMarket, serde_json::Error>> {
        self.markets.first().map(|raw| GammaMarket::deserialize(raw))
    }
}

/// Market entry nested inside a Gamma event
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    /// Gamma market ID (the `tid` in public market URLs)
    #[serde(default)]
    pub id: Option<String>,

    /// Market question/title
    #[serde(default)]
    pub question: Option<String>,

    /// Market end time (ISO 8601)
    #[serde(default)]
    pub end_date: Option<String>,

    /// CLOB token IDs, index 0 is the "Yes"/"Up" outcome.
    /// Note: API usually returns this as a stringified JSON array
    #[serde(default, deserialize_with = "deserialize_array_or_stringified")]
    pub clob_token_ids: Vec<String>,

    #[serde(default)]
    pub closed: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Session Types
// ============================================================================

/// Metadata extracted from the catalog for one settlement hour
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Deterministic identifier (event slug) for the settlement hour
    pub identifier: String,
    /// Gamma market ID of the selected (first listed) market
    pub market_id: Option<String>,
    pub question: String,
    /// Token used to query the live midpoint
    pub instrument_handle: String,
    pub settlement_time: DateTime<Utc>,
}

impl SessionMetadata {
    /// Public market page for this session
    pub fn market_url(&self) -> String {
        match &self.market_id {
            Some(id) => format!("{}/{}?tid={}", crate::POLYMARKET_EVENT_URL, self.identifier, id),
            None => format!("{}/{}", crate::POLYMARKET_EVENT_URL, self.identifier),
        }
    }
}

/// Lifecycle state of a `MarketSession`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Discovering,
    ResolvingStrike,
    Tracking,
    Expired,
}

/// One tracked hourly market, from discovery to expiration.
///
/// Transitions consume the session and return it in the next state, so a session
/// can never be observed moving backwards. The next hour always gets a fresh value.
#[derive(Clone, Debug)]
pub struct MarketSession {
    metadata: Option<SessionMetadata>,
    strike: Option<Decimal>,
    state: SessionState,
}

impl MarketSession {
    /// A new session that has not located its market yet
    pub fn new() -> Self {
        Self { metadata: None, strike: None, state: SessionState::Discovering }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn metadata(&self) -> Option<&SessionMetadata> {
        self.metadata.as_ref()
    }

    pub fn identifier(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.identifier.as_str())
    }

    pub fn settlement_time(&self) -> Option<DateTime<Utc>> {
        self.metadata.as_ref().map(|m| m.settlement_time)
    }

    pub fn strike(&self) -> Option<Decimal> {
        self.strike
    }

    /// Discovering -> ResolvingStrike
    pub fn discovered(mut self, metadata: SessionMetadata) -> Result<Self, SessionError> {
        self.expect_state(SessionState::Discovering, SessionState::ResolvingStrike)?;
        self.metadata = Some(metadata);
        self.state = SessionState::ResolvingStrike;
        Ok(self)
    }

    /// ResolvingStrike -> Tracking. The strike is set exactly here and never again.
    pub fn with_strike(mut self, strike: Decimal) -> Result<Self, SessionError> {
        self.expect_state(SessionState::ResolvingStrike, SessionState::Tracking)?;
        self.strike = Some(strike);
        self.state = SessionState::Tracking;
        Ok(self)
    }

    /// Tracking -> Expired
    pub fn expire(mut self) -> Result<Self, SessionError> {
        self.expect_state(SessionState::Tracking, SessionState::Expired)?;
        self.state = SessionState::Expired;
        Ok(self)
    }

    /// Whether sampling must stop at `now`
    pub fn is_past_settlement(&self, now: DateTime<Utc>) -> bool {
        self.settlement_time().map(|t| now > t).unwrap_or(false)
    }

    fn expect_state(&self, from: SessionState, to: SessionState) -> Result<(), SessionError> {
        if self.state != from {
            return Err(SessionError::InvalidTransition { from: self.state, to });
        }
        Ok(())
    }
}

impl Default for MarketSession {
    fn default() -> Self {
        Self::new()
    }
}

/// One co-sampled observation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub captured_at: DateTime<Utc>,
    pub underlying_price: Decimal,
    /// Copy of the owning session's strike
    pub strike: Decimal,
    /// Midpoint of the "Yes" token; not range-checked
    pub implied_probability: Decimal,
}

// ============================================================================
// Component Outcomes
// ============================================================================

/// Result of one catalog lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Found(SessionMetadata),
    /// The market is not listed (or not populated) yet
    NotFoundYet,
    /// Transport error or unusable catalog entry; retryable
    Failure(String),
}

/// Result of strike resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrikeOutcome {
    Resolved(Decimal),
    /// Settlement passed before the candle was published
    Aborted,
    /// Shutdown was requested while waiting
    Interrupted,
}

/// How a session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Aborted,
    Interrupted,
}

/// Summary returned by one discover -> expire cycle
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionReport {
    /// None if interrupted before discovery succeeded
    pub identifier: Option<String>,
    pub outcome: SessionOutcome,
    pub rows_written: u64,
    pub skipped_ticks: u64,
    /// Set once the record file has been created
    pub path: Option<PathBuf>,
}

/// Process-wide counters
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub sessions_completed: u64,
    pub sessions_aborted: u64,
    pub discovery_attempts: u64,
    pub rows_written: u64,
    pub skipped_ticks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn metadata() -> SessionMetadata {
        SessionMetadata {
            identifier: "bitcoin-up-or-down-november-28-9am-et".to_string(),
            market_id: Some("12345".to_string()),
            question: "Bitcoin Up or Down - November 28, 9AM ET".to_string(),
            instrument_handle: "tok-yes".to_string(),
            settlement_time: Utc.with_ymd_and_hms(2025, 11, 28, 15, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_session_moves_forward() {
        let session = MarketSession::new();
        assert_eq!(session.state(), SessionState::Discovering);
        assert!(session.strike().is_none());

        let session = session.discovered(metadata()).unwrap();
        assert_eq!(session.state(), SessionState::ResolvingStrike);
        assert!(session.strike().is_none());

        let session = session.with_strike(dec!(91234.50)).unwrap();
        assert_eq!(session.state(), SessionState::Tracking);
        assert_eq!(session.strike(), Some(dec!(91234.50)));

        let session = session.expire().unwrap();
        assert_eq!(session.state(), SessionState::Expired);
    }

    #[test]
    fn test_strike_cannot_be_set_twice() {
        let session = MarketSession::new()
            .discovered(metadata())
            .unwrap()
            .with_strike(dec!(1))
            .unwrap();
        let err = session.with_strike(dec!(2)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition { from: SessionState::Tracking, .. }
        ));
    }

    #[test]
    fn test_strike_requires_discovery() {
        let err = MarketSession::new().with_strike(dec!(1)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition { from: SessionState::Discovering, .. }
        ));
    }

    #[test]
    fn test_expired_session_cannot_restart() {
        let session = MarketSession::new()
            .discovered(metadata())
            .unwrap()
            .with_strike(dec!(1))
            .unwrap()
            .expire()
            .unwrap();
        assert!(session.clone().discovered(metadata()).is_err());
        assert!(session.expire().is_err());
    }

    #[test]
    fn test_past_settlement_is_strict() {
        let session = MarketSession::new().discovered(metadata()).unwrap();
        let settle = Utc.with_ymd_and_hms(2025, 11, 28, 15, 0, 0).unwrap();
        assert!(!session.is_past_settlement(settle));
        assert!(session.is_past_settlement(settle + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn test_token_ids_stringified() {
        let json = r#"{"question": "q", "clobTokenIds": "[\"a\", \"b\"]"}"#;
        let market: GammaMarket = serde_json::from_str(json).unwrap();
        assert_eq!(market.clob_token_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_token_ids_plain_array() {
        let json = r#"{"question": "q", "clobTokenIds": ["a", "b"]}"#;
        let market: GammaMarket = serde_json::from_str(json).unwrap();
        assert_eq!(market.clob_token_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_token_ids_missing_or_null() {
        let market: GammaMarket = serde_json::from_str(r#"{"question": "q"}"#).unwrap();
        assert!(market.clob_token_ids.is_empty());
        let market: GammaMarket =
            serde_json::from_str(r#"{"question": "q", "clobTokenIds": null}"#).unwrap();
        assert!(market.clob_token_ids.is_empty());
    }

    #[test]
    fn test_market_url() {
        let mut meta = metadata();
        assert_eq!(
            meta.market_url(),
            "https://polymarket.com/event/bitcoin-up-or-down-november-28-9am-et?tid=12345"
        );
        meta.market_id = None;
        assert_eq!(
            meta.market_url(),
            "https://polymarket.com/event/bitcoin-up-or-down-november-28-9am-et"
        );
    }
}
