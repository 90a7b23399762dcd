//! Class-expansion service client.
//!
//! The service receives markup and answers with style text for every utility class it
//! recognises. It is best-effort: callers downgrade any [`ExpandError`] to a warning
//! and compile with whatever style text they already have.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ExpandError {
    #[error("class-expansion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("class-expansion service answered with status {0}")]
    Status(u16),
    #[error("class-expansion response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ClassExpander: Send + Sync {
    /// Expanded style text for the utility classes used in `markup`.
    async fn expand(&self, markup: &str) -> Result<String, ExpandError>;
}

/// Expander for offline compilation: contributes no style text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExpansion;

#[async_trait]
impl ClassExpander for NoExpansion {
    async fn expand(&self, _markup: &str) -> Result<String, ExpandError> {
        Ok(String::new())
    }
}

#[derive(Debug, Serialize)]
struct ExpandRequest<'a> {
    markup: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExpandResponse {
    css: String,
}

/// Talks to the expansion service over HTTP: `POST {endpoint}` with
/// `{"markup": ...}`, expecting `{"css": ...}` back.
#[derive(Debug, Clone)]
pub struct HttpClassExpander {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpClassExpander {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        HttpClassExpander {
            client,
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ClassExpander for HttpClassExpander {
    async fn expand(&self, markup: &str) -> Result<String, ExpandError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&ExpandRequest { markup })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExpandError::Status(status.as_u16()));
        }

        let body: ExpandResponse = response
            .json()
            .await
            .map_err(|e| ExpandError::Decode(e.to_string()))?;
        Ok(body.css)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_expansion_is_empty() {
        assert_eq!(NoExpansion.expand("<div class=\"p-4\"></div>").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let expander = HttpClassExpander::new("http://127.0.0.1:9/expand")
            .with_timeout(Duration::from_millis(200));
        let err = expander.expand("<div></div>").await.unwrap_err();
        assert!(matches!(err, ExpandError::Transport(_)));
        assert!(err.to_string().starts_with("class-expansion request failed"));
    }

    #[test]
    fn test_request_wire_shape() {
        let body = serde_json::to_value(ExpandRequest { markup: "<p></p>" }).unwrap();
        assert_eq!(body, serde_json::json!({ "markup": "<p></p>" }));
        let response: ExpandResponse = serde_json::from_str(r#"{"css":".p-4{padding:1rem}"}"#).unwrap();
        assert_eq!(response.css, ".p-4{padding:1rem}");
    }
}
