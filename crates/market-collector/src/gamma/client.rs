//! Gamma API REST client
//!
//! Base URL: https://gamma-api.polymarket.com
//!
//! # Endpoints
//! - GET /events?slug={slug} - Event (with nested markets) by slug
//!
//! # Source
//! - https://docs.polymarket.com/developers/gamma-markets-api/get-events

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::types::GammaEvent;
use crate::GAMMA_API_BASE;

/// Default request timeout for catalog queries
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Gamma API REST client
#[derive(Clone)]
pub struct GammaClient {
    client: Client,
    base_url: String,
}

impl GammaClient {
    /// Create a new Gamma client with default base URL
    pub fn new() -> Result<Self> {
        Self::with_base_url(GAMMA_API_BASE)
    }

    /// Create a new Gamma client with custom base URL
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

    /// GET /events?slug={slug}
    ///
    /// Returns None if the catalog has no event for the slug (empty array, null or 404).
    /// The API normally answers with an array; a bare object is accepted too.
    pub async fn get_event_by_slug(&self, slug: &str) -> Result<Option<GammaEvent>> {
        let url = format!("{}/events", self.base_url);
        debug!("GET {}?slug={}", url, slug);

        let response = self
            .client
            .get(&url)
            .query(&[("slug", slug)])
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("Event not found for slug: {}", slug);
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} for {}: {}", status, url, body);
        }

        let body: Value = response.json().await.context("Failed to parse events response")?;

        let event = match body {
            Value::Array(events) => match events.into_iter().next() {
                Some(first) => first,
                None => return Ok(None),
            },
            Value::Null => return Ok(None),
            object @ Value::Object(_) => object,
            other => anyhow::bail!("Unexpected events payload: {}", other),
        };

        let event: GammaEvent = serde_json::from_value(event).context("Failed to parse GammaEvent")?;
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_custom_base_url() {
        let client = GammaClient::with_base_url("https://example.com/").unwrap();
        assert_eq!(client.base_url, "https://example.com");
    }

    #[tokio::test]
    async fn test_event_array_takes_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("slug", "bitcoin-up-or-down-november-28-9am-et"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "1", "slug": "bitcoin-up-or-down-november-28-9am-et", "markets": []},
                {"id": "2", "slug": "other", "markets": []}
            ])))
            .mount(&server)
            .await;

        let client = GammaClient::with_base_url(&server.uri()).unwrap();
        let event = client
            .get_event_by_slug("bitcoin-up-or-down-november-28-9am-et")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_single_object_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "7", "markets": []})),
            )
            .mount(&server)
            .await;

        let client = GammaClient::with_base_url(&server.uri()).unwrap();
        let event = client.get_event_by_slug("x").await.unwrap().unwrap();
        assert_eq!(event.id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_empty_array_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = GammaClient::with_base_url(&server.uri()).unwrap();
        assert!(client.get_event_by_slug("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_err() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = GammaClient::with_base_url(&server.uri()).unwrap();
        let err = client.get_event_by_slug("x").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
