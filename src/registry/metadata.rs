// Access tokens from the instance metadata server

use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use super::SessionError;

/// Header the metadata server requires on every request
pub const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
pub const METADATA_FLAVOR_VALUE: &str = "Google";

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Short-lived OAuth access token. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
}

pub struct MetadataTokenSource {
    client: Client,
    endpoint: String,
}

impl MetadataTokenSource {
    /// Build a token source. With `timeout` unset the request has no deadline
    /// of its own; callers wanting one pass it here or wrap the call.
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self, SessionError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SessionError::TokenFetch(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Fetch a fresh access token. Single attempt, no caching.
    pub async fn fetch_access_token(&self) -> Result<AccessToken, SessionError> {
        debug!("Fetching access token from {}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
            .send()
            .await
            .map_err(|e| {
                SessionError::TokenFetch(format!(
                    "Metadata server {} unreachable: {}",
                    self.endpoint, e
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            SessionError::TokenFetch(format!("Failed to read metadata response: {}", e))
        })?;

        if !status.is_success() {
            return Err(SessionError::TokenFetch(format!(
                "Metadata server returned {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        let token = parse_token_response(&body)?;
        info!("Fetched access token from metadata server");
        Ok(token)
    }
}

fn parse_token_response(body: &str) -> Result<AccessToken, SessionError> {
    let parsed: TokenResponse = serde_json::from_str(body).map_err(|e| {
        SessionError::TokenFetch(format!("Unexpected metadata response: {}", e))
    })?;

    if parsed.access_token.is_empty() {
        return Err(SessionError::TokenFetch(
            "Metadata response contained an empty access_token".to_string(),
        ));
    }

    debug!(
        expires_in = ?parsed.expires_in,
        token_type = ?parsed.token_type,
        "Parsed metadata token response"
    );

    Ok(AccessToken(parsed.access_token))
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::{closed_endpoint, spawn_metadata_server};

    #[test]
    fn test_parse_token_response_returns_bare_token() {
        let token = parse_token_response(
            r#"{"access_token":"ya29.abc","expires_in":3599,"token_type":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(token.as_str(), "ya29.abc");
    }

    #[test]
    fn test_parse_token_response_rejects_missing_or_empty_token() {
        assert!(matches!(
            parse_token_response(r#"{"expires_in":3599}"#),
            Err(SessionError::TokenFetch(_))
        ));
        assert!(matches!(
            parse_token_response(r#"{"access_token":""}"#),
            Err(SessionError::TokenFetch(_))
        ));
        assert!(matches!(
            parse_token_response("<html>not json</html>"),
            Err(SessionError::TokenFetch(_))
        ));
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("secret-value");
        assert!(!format!("{:?}", token).contains("secret-value"));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(500);
        let truncated = truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with("(truncated, 500 total bytes)"));
        assert_eq!(truncate_body("short"), "short");
    }

    #[tokio::test]
    async fn test_fetch_sends_flavor_header() {
        let server = spawn_metadata_server(200, r#"{"access_token":"abc123"}"#).await;
        let source = MetadataTokenSource::new(&server.url, Some(Duration::from_secs(5))).unwrap();

        let token = source.fetch_access_token().await.unwrap();

        assert_eq!(token.as_str(), "abc123");
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_fetch_fails_on_error_status() {
        let server = spawn_metadata_server(503, "metadata unavailable").await;
        let source = MetadataTokenSource::new(&server.url, Some(Duration::from_secs(5))).unwrap();

        let err = source.fetch_access_token().await.unwrap_err();

        match err {
            SessionError::TokenFetch(msg) => assert!(msg.contains("503")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_fetch_without_timeout() {
        let server = spawn_metadata_server(200, r#"{"access_token":"abc123"}"#).await;
        let source = MetadataTokenSource::new(&server.url, None).unwrap();

        assert_eq!(source.fetch_access_token().await.unwrap().as_str(), "abc123");
    }

    #[tokio::test]
    async fn test_fetch_fails_when_unreachable() {
        let endpoint = closed_endpoint().await;
        let source = MetadataTokenSource::new(endpoint, Some(Duration::from_secs(5))).unwrap();

        assert!(matches!(
            source.fetch_access_token().await,
            Err(SessionError::TokenFetch(_))
        ));
    }
}
