//! Market discovery for one hourly identifier
//!
//! # Selection policy
//! The first market listed under the event is the one tracked. There is no
//! ranking beyond list order; historical record files were produced this way and
//! later consumers rely on it. A closed or malformed first market is a `Failure`,
//! never a reason to fall through to the second entry.
//!
//! No retries happen here; the controller owns the retry cadence.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info};

use crate::gamma::GammaClient;
use crate::types::{DiscoveryOutcome, GammaEvent, SessionMetadata};

/// Anything that can turn an identifier into session metadata
#[async_trait]
pub trait MarketCatalog: Send + Sync {
    async fn discover(&self, identifier: &str) -> DiscoveryOutcome;
}

/// Catalog backed by the Gamma events endpoint
#[derive(Clone)]
pub struct MarketDiscoveryClient {
    gamma: GammaClient,
}

impl MarketDiscoveryClient {
    pub fn new(gamma: GammaClient) -> Self {
        Self { gamma }
    }
}

#[async_trait]
impl MarketCatalog for MarketDiscoveryClient {
    async fn discover(&self, identifier: &str) -> DiscoveryOutcome {
        match self.gamma.get_event_by_slug(identifier).await {
            Ok(Some(event)) => extract_metadata(identifier, &event),
            Ok(None) => {
                debug!("Event not listed yet: {}", identifier);
                DiscoveryOutcome::NotFoundYet
            }
            Err(e) => DiscoveryOutcome::Failure(format!("{:#}", e)),
        }
    }
}

/// Build session metadata from the first market of `event`
pub fn extract_metadata(identifier: &str, event: &GammaEvent) -> DiscoveryOutcome {
    let market = match event.first_market() {
        Some(Ok(m)) => m,
        Some(Err(e)) => {
            return DiscoveryOutcome::Failure(format!("first market of {} is malformed: {}", identifier, e))
        }
        None => {
            debug!("Event {} found, but no markets inside yet", identifier);
            return DiscoveryOutcome::NotFoundYet;
        }
    };

    if market.closed {
        return DiscoveryOutcome::Failure(format!("first market of {} is closed", identifier));
    }

    let question = match &market.question {
        Some(q) if !q.is_empty() => q.clone(),
        _ => return DiscoveryOutcome::Failure(format!("market of {} has no question", identifier)),
    };

    let instrument_handle = match market.clob_token_ids.first() {
        Some(token) if !token.is_empty() => token.clone(),
        _ => {
            return DiscoveryOutcome::Failure(format!("market of {} has no clobTokenIds", identifier))
        }
    };

    let raw_end = match market.end_date.as_ref().or(event.end_date.as_ref()) {
        Some(s) => s,
        None => return DiscoveryOutcome::Failure(format!("market of {} has no endDate", identifier)),
    };

    let settlement_time = match parse_settlement_time(raw_end) {
        Some(t) => t,
        None => {
            return DiscoveryOutcome::Failure(format!(
                "unparseable endDate '{}' for {}",
                raw_end, identifier
            ))
        }
    };

    info!("Market located: {} (settles {})", question, settlement_time);

    DiscoveryOutcome::Found(SessionMetadata {
        identifier: identifier.to_string(),
        market_id: market.id.clone(),
        question,
        instrument_handle,
        settlement_time,
    })
}

/// Parse a Gamma `endDate`.
///
/// Accepts RFC 3339 (`2025-11-28T15:00:00Z`, `+00:00` offsets, any fraction) and
/// the fixed millisecond form `2025-11-28T15:00:00.000Z`, plus the same without a
/// zone designator (read as UTC).
pub fn parse_settlement_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.3fZ", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SLUG: &str = "bitcoin-up-or-down-november-28-9am-et";

    fn event(json: serde_json::Value) -> GammaEvent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_parse_settlement_time_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 11, 28, 15, 0, 0).unwrap();
        assert_eq!(parse_settlement_time("2025-11-28T15:00:00Z"), Some(expected));
        assert_eq!(parse_settlement_time("2025-11-28T15:00:00+00:00"), Some(expected));
        assert_eq!(parse_settlement_time("2025-11-28T15:00:00.000Z"), Some(expected));
        assert_eq!(parse_settlement_time("2025-11-28T10:00:00-05:00"), Some(expected));
        assert_eq!(parse_settlement_time("2025-11-28T15:00:00"), Some(expected));
        assert_eq!(parse_settlement_time("yesterday"), None);
    }

    #[test]
    fn test_first_market_selected() {
        let ev = event(serde_json::json!({
            "endDate": "2025-11-28T15:00:00Z",
            "markets": [
                {"id": "111", "question": "first", "clobTokenIds": "[\"yes1\", \"no1\"]"},
                {"id": "222", "question": "second", "clobTokenIds": "[\"yes2\", \"no2\"]"}
            ]
        }));

        match extract_metadata(SLUG, &ev) {
            DiscoveryOutcome::Found(meta) => {
                assert_eq!(meta.question, "first");
                assert_eq!(meta.instrument_handle, "yes1");
                assert_eq!(meta.market_id.as_deref(), Some("111"));
                assert_eq!(meta.identifier, SLUG);
                assert_eq!(
                    meta.settlement_time,
                    Utc.with_ymd_and_hms(2025, 11, 28, 15, 0, 0).unwrap()
                );
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_market_end_date_wins_over_event() {
        let ev = event(serde_json::json!({
            "endDate": "2030-01-01T00:00:00Z",
            "markets": [{"question": "q", "clobTokenIds": ["t"], "endDate": "2025-11-28T15:00:00.000Z"}]
        }));
        match extract_metadata(SLUG, &ev) {
            DiscoveryOutcome::Found(meta) => assert_eq!(
                meta.settlement_time,
                Utc.with_ymd_and_hms(2025, 11, 28, 15, 0, 0).unwrap()
            ),
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_markets_not_found_yet() {
        let ev = event(serde_json::json!({"endDate": "2025-11-28T15:00:00Z", "markets": []}));
        assert_eq!(extract_metadata(SLUG, &ev), DiscoveryOutcome::NotFoundYet);
    }

    #[test]
    fn test_closed_first_market_is_failure() {
        let ev = event(serde_json::json!({
            "endDate": "2025-11-28T15:00:00Z",
            "markets": [
                {"question": "old", "clobTokenIds": ["a"], "closed": true},
                {"question": "new", "clobTokenIds": ["b"]}
            ]
        }));
        assert!(matches!(extract_metadata(SLUG, &ev), DiscoveryOutcome::Failure(_)));
    }

    #[test]
    fn test_missing_fields_are_failures() {
        let no_tokens = event(serde_json::json!({
            "endDate": "2025-11-28T15:00:00Z",
            "markets": [{"question": "q"}]
        }));
        assert!(matches!(extract_metadata(SLUG, &no_tokens), DiscoveryOutcome::Failure(_)));

        let no_end = event(serde_json::json!({"markets": [{"question": "q", "clobTokenIds": ["a"]}]}));
        assert!(matches!(extract_metadata(SLUG, &no_end), DiscoveryOutcome::Failure(_)));

        let bad_end = event(serde_json::json!({
            "endDate": "soon",
            "markets": [{"question": "q", "clobTokenIds": ["a"]}]
        }));
        assert!(matches!(extract_metadata(SLUG, &bad_end), DiscoveryOutcome::Failure(_)));
    }

    #[test]
    fn test_malformed_token_encoding_is_failure() {
        let ev = event(serde_json::json!({
            "endDate": "2025-11-28T15:00:00Z",
            "markets": [{"question": "q", "clobTokenIds": "[not json"}]
        }));
        match extract_metadata(SLUG, &ev) {
            DiscoveryOutcome::Failure(reason) => assert!(reason.contains("malformed")),
            other => panic!("expected Failure, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_later_market_is_ignored() {
        let ev = event(serde_json::json!({
            "endDate": "2025-11-28T15:00:00Z",
            "markets": [
                {"id": "1", "question": "first", "clobTokenIds": "[\"yes\", \"no\"]"},
                {"id": "2", "question": "second", "clobTokenIds": "[broken"}
            ]
        }));
        match extract_metadata(SLUG, &ev) {
            DiscoveryOutcome::Found(meta) => {
                assert_eq!(meta.question, "first");
                assert_eq!(meta.instrument_handle, "yes");
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discover_against_mock_gamma() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("slug", SLUG))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "slug": SLUG,
                "endDate": "2025-11-28T15:00:00Z",
                "markets": [{"id": "9", "question": "Bitcoin Up or Down?", "clobTokenIds": "[\"yes\", \"no\"]"}]
            }])))
            .mount(&server)
            .await;

        let client = MarketDiscoveryClient::new(GammaClient::with_base_url(&server.uri()).unwrap());
        match client.discover(SLUG).await {
            DiscoveryOutcome::Found(meta) => assert_eq!(meta.instrument_handle, "yes"),
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discover_skips_decoding_later_markets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("slug", SLUG))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "slug": SLUG,
                "endDate": "2025-11-28T15:00:00Z",
                "markets": [
                    {"id": "1", "question": "first", "clobTokenIds": "[\"yes\", \"no\"]"},
                    {"id": "2", "question": "second", "clobTokenIds": "[broken"}
                ]
            }])))
            .mount(&server)
            .await;

        let client = MarketDiscoveryClient::new(GammaClient::with_base_url(&server.uri()).unwrap());
        match client.discover(SLUG).await {
            DiscoveryOutcome::Found(meta) => {
                assert_eq!(meta.question, "first");
                assert_eq!(meta.market_id.as_deref(), Some("1"));
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discover_not_listed_and_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("slug", "missing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("slug", "broken"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("slug", "garbled"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = MarketDiscoveryClient::new(GammaClient::with_base_url(&server.uri()).unwrap());
        assert_eq!(client.discover("missing").await, DiscoveryOutcome::NotFoundYet);
        assert!(matches!(client.discover("broken").await, DiscoveryOutcome::Failure(_)));
        assert!(matches!(client.discover("garbled").await, DiscoveryOutcome::Failure(_)));
    }
}
