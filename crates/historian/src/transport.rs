//! HTTP+JSON transport to the historian's Views API.
//!
//! The [`HistorianTransport`] trait is the only place the core touches the
//! network; the resilience layer wraps it and tests replace it.

use std::time::Duration;

use async_trait::async_trait;
use canary_core::config::HistorianConfig;
use canary_core::CanaryError;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

/// Raw outcome of one request, before retry classification.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Connect failures, timeouts and 5xx are worth another attempt. Every
    /// other 4xx and an undecodable body fail immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connect(_) | TransportError::Timeout(_) => true,
            TransportError::Status { status, .. } => *status >= 500,
            TransportError::Decode(_) => false,
        }
    }

    /// Status codes meaning the session token was rejected.
    pub fn is_auth_expiry(&self) -> bool {
        matches!(self, TransportError::Status { status: 401 | 403, .. })
    }
}

/// Posts a JSON body to a named endpoint and returns the decoded JSON reply.
#[async_trait]
pub trait HistorianTransport: Send + Sync {
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, TransportError>;
}

/// `reqwest`-backed transport posting to `{base}/api/v2/{endpoint}`.
///
/// Base URLs are tried in order, moving on only when a connection cannot be
/// established; any other failure is returned as-is for the retry layer.
pub struct HttpTransport {
    client: reqwest::Client,
    base_urls: Vec<Url>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &HistorianConfig) -> Result<Self, CanaryError> {
        let mut base_urls = Vec::with_capacity(config.base_urls.len());
        for raw in &config.base_urls {
            let mut url = Url::parse(raw)
                .map_err(|e| CanaryError::invalid_config(format!("invalid historian URL '{}': {}", raw, e)))?;
            if !url.path().ends_with('/') {
                let path = format!("{}/", url.path());
                url.set_path(&path);
            }
            base_urls.push(url);
        }
        if base_urls.is_empty() {
            return Err(CanaryError::invalid_config("no historian base URL configured"));
        }

        let timeout = config.request_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CanaryError::invalid_config(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            base_urls,
            timeout,
        })
    }

    fn endpoint_url(base: &Url, endpoint: &str) -> Result<Url, TransportError> {
        base.join(&format!("api/v2/{}", endpoint))
            .map_err(|e| TransportError::Connect(format!("bad endpoint URL: {}", e)))
    }
}

#[async_trait]
impl HistorianTransport for HttpTransport {
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, TransportError> {
        let mut last_error = TransportError::Connect("no base URL configured".to_string());

        for base in &self.base_urls {
            let url = Self::endpoint_url(base, endpoint)?;
            debug!(endpoint = %endpoint, host = url.host_str().unwrap_or(""), "Historian request");

            let response = match self.client.post(url.clone()).json(body).send().await {
                Ok(r) => r,
                Err(e) if e.is_timeout() => return Err(TransportError::Timeout(self.timeout)),
                Err(e) if e.is_connect() => {
                    warn!(host = url.host_str().unwrap_or(""), error = %e, "Historian host unreachable, trying next");
                    last_error = TransportError::Connect(e.to_string());
                    continue;
                }
                Err(e) => return Err(TransportError::Connect(e.to_string())),
            };

            let status = response.status().as_u16();
            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TransportError::Status { status, body });
            }

            return response.json::<Value>().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else {
                    TransportError::Decode(e.to_string())
                }
            });
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(TransportError::Connect("refused".into()).is_transient());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(TransportError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!TransportError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!TransportError::Decode("truncated body".into()).is_transient());
        assert!(!TransportError::Status { status: 400, body: String::new() }.is_transient());
        assert!(TransportError::Status { status: 401, body: String::new() }.is_auth_expiry());
        assert!(!TransportError::Status { status: 404, body: String::new() }.is_auth_expiry());
    }

    #[test]
    fn endpoint_urls_keep_base_path() {
        let cfg = HistorianConfig {
            base_urls: vec!["https://historian.example:55236/views".to_string()],
            ..Default::default()
        };
        let transport = HttpTransport::new(&cfg).unwrap();
        let url = HttpTransport::endpoint_url(&transport.base_urls[0], "getTagData").unwrap();
        assert_eq!(url.as_str(), "https://historian.example:55236/views/api/v2/getTagData");
    }

    #[test]
    fn rejects_unparseable_url() {
        let cfg = HistorianConfig {
            base_urls: vec!["not a url".to_string()],
            ..Default::default()
        };
        assert!(matches!(HttpTransport::new(&cfg), Err(CanaryError::Config(_))));
    }
}
