use std::time::Duration;

use canary_core::config::HistorianConfig;
use canary_core::CanaryError;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use crate::transport::{HistorianTransport, TransportError};
use crate::wire;

pub const SESSION_ENDPOINT: &str = "getSessionToken";

/// A session token issued by the historian in exchange for the API token.
#[derive(Clone)]
pub struct SessionToken {
    value: String,
    issued_at: Instant,
    expires_at: Instant,
}

impl SessionToken {
    pub fn new(value: impl Into<String>, lifetime: Duration) -> Self {
        let issued_at = Instant::now();
        Self {
            value: value.into(),
            issued_at,
            expires_at: issued_at + lifetime,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Usable only while more than `margin` of its lifetime remains.
    pub fn is_usable(&self, margin: Duration) -> bool {
        Instant::now() + margin < self.expires_at
    }

    pub fn age(&self) -> Duration {
        self.issued_at.elapsed()
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"<redacted>")
            .field("age", &self.age())
            .finish()
    }
}

/// Owns the single cached session token.
///
/// The slot lock is held across the exchange, so concurrent callers that
/// find the token stale wait for one refresh instead of issuing their own.
pub struct SessionManager {
    api_token: Option<String>,
    application: String,
    timezone: String,
    default_lifetime: Duration,
    refresh_margin: Duration,
    slot: Mutex<Option<SessionToken>>,
}

impl SessionManager {
    pub fn new(config: &HistorianConfig) -> Self {
        Self {
            api_token: config.api_token.clone(),
            application: config.application.clone(),
            timezone: config.timezone.clone(),
            default_lifetime: Duration::from_secs(config.session_ttl_secs),
            refresh_margin: config.refresh_margin(),
            slot: Mutex::new(None),
        }
    }

    /// A usable session token, exchanging credentials first if needed.
    pub async fn token(
        &self,
        transport: &dyn HistorianTransport,
        retry: &RetryPolicy,
    ) -> Result<String, CanaryError> {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref() {
            if token.is_usable(self.refresh_margin) {
                return Ok(token.value().to_string());
            }
            debug!(age_secs = token.age().as_secs(), "Session token near expiry, refreshing");
        }

        let token = self.exchange(transport, retry).await?;
        let value = token.value().to_string();
        *slot = Some(token);
        Ok(value)
    }

    /// Drop the cached token if it is still the one that was rejected.
    pub async fn invalidate(&self, stale: &str) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|t| t.value() == stale) {
            info!("Session token rejected, discarding");
            *slot = None;
        }
    }

    /// Non-blocking check used by health reporting; a refresh in progress reads as invalid.
    pub fn is_valid(&self) -> bool {
        match self.slot.try_lock() {
            Ok(slot) => slot.as_ref().is_some_and(|t| t.is_usable(self.refresh_margin)),
            Err(_) => false,
        }
    }

    async fn exchange(
        &self,
        transport: &dyn HistorianTransport,
        retry: &RetryPolicy,
    ) -> Result<SessionToken, CanaryError> {
        let api_token = self.api_token.as_deref().ok_or_else(|| {
            CanaryError::Authentication("no API token configured (CANARY_API_TOKEN)".to_string())
        })?;
        let body = json!({
            "userToken": api_token,
            "application": self.application,
            "timeZone": self.timezone,
        });

        let mut attempt = 0;
        let response = loop {
            match transport.post(SESSION_ENDPOINT, &body).await {
                Ok(v) => break v,
                Err(e) if e.is_auth_expiry() => {
                    return Err(CanaryError::Authentication(describe(&e)));
                }
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    if attempt >= retry.max_attempts {
                        return Err(CanaryError::UpstreamUnavailable {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = retry.delay_for_attempt(attempt - 1);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Session exchange failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(CanaryError::Authentication(describe(&e))),
            }
        };

        if let Some(message) = wire::status_error(&response) {
            return Err(CanaryError::Authentication(message));
        }
        let value = response
            .get("sessionToken")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                CanaryError::Authentication("historian returned no session token".to_string())
            })?;
        let lifetime = response
            .get("expiresInMs")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(self.default_lifetime);

        info!(lifetime_secs = lifetime.as_secs(), "Session token acquired");
        Ok(SessionToken::new(value, lifetime))
    }
}

fn describe(e: &TransportError) -> String {
    match e {
        TransportError::Status { status, body } if body.is_empty() => format!("HTTP {}", status),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn manager(token: Option<&str>) -> SessionManager {
        SessionManager::new(&HistorianConfig {
            api_token: token.map(str::to_string),
            session_ttl_secs: 120,
            session_refresh_margin_secs: 30,
            ..Default::default()
        })
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_ms: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn token_is_reused_until_refresh_margin() {
        let transport = ScriptedTransport::new()
            .respond(SESSION_ENDPOINT, json!({"sessionToken": "s1"}))
            .respond(SESSION_ENDPOINT, json!({"sessionToken": "s2"}));
        let m = manager(Some("api"));

        assert_eq!(m.token(&transport, &fast_retry()).await.unwrap(), "s1");
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(m.token(&transport, &fast_retry()).await.unwrap(), "s1");
        assert!(m.is_valid());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!m.is_valid());
        assert_eq!(m.token(&transport, &fast_retry()).await.unwrap(), "s2");
        assert_eq!(transport.calls(SESSION_ENDPOINT), 2);
    }

    #[tokio::test]
    async fn exchange_sends_credentials() {
        let transport =
            ScriptedTransport::new().respond(SESSION_ENDPOINT, json!({"sessionToken": "s1"}));
        manager(Some("api")).token(&transport, &fast_retry()).await.unwrap();
        let sent = &transport.requests(SESSION_ENDPOINT)[0];
        assert_eq!(sent["userToken"], "api");
        assert_eq!(sent["application"], "canary-mcp");
        assert_eq!(sent["timeZone"], "UTC");
    }

    #[tokio::test]
    async fn missing_api_token_is_an_authentication_error() {
        let transport = ScriptedTransport::new();
        let err = manager(None).token(&transport, &fast_retry()).await.unwrap_err();
        assert_eq!(err.error_type(), "authentication_error");
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn rejected_credentials_are_not_retried() {
        let transport = ScriptedTransport::new().fail(
            SESSION_ENDPOINT,
            TransportError::Status {
                status: 401,
                body: String::new(),
            },
        );
        let err = manager(Some("bad")).token(&transport, &fast_retry()).await.unwrap_err();
        assert!(matches!(err, CanaryError::Authentication(_)));
        assert_eq!(transport.calls(SESSION_ENDPOINT), 1);
    }

    #[tokio::test]
    async fn bad_status_code_is_an_authentication_error() {
        let transport = ScriptedTransport::new().respond(
            SESSION_ENDPOINT,
            json!({"statusCode": "BadUserToken", "errors": ["token disabled"]}),
        );
        let err = manager(Some("api")).token(&transport, &fast_retry()).await.unwrap_err();
        assert!(err.to_string().contains("token disabled"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_exchange_failures_retry_then_give_up() {
        let transport = ScriptedTransport::new()
            .fail(SESSION_ENDPOINT, TransportError::Connect("refused".into()))
            .fail(SESSION_ENDPOINT, TransportError::Connect("refused".into()))
            .fail(SESSION_ENDPOINT, TransportError::Connect("refused".into()));
        let err = manager(Some("api")).token(&transport, &fast_retry()).await.unwrap_err();
        assert!(matches!(err, CanaryError::UpstreamUnavailable { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn invalidate_ignores_tokens_already_replaced() {
        let transport = ScriptedTransport::new()
            .respond(SESSION_ENDPOINT, json!({"sessionToken": "s1"}))
            .respond(SESSION_ENDPOINT, json!({"sessionToken": "s2"}));
        let m = manager(Some("api"));
        m.token(&transport, &fast_retry()).await.unwrap();
        m.invalidate("old").await;
        assert!(m.is_valid());
        m.invalidate("s1").await;
        assert!(!m.is_valid());
        assert_eq!(m.token(&transport, &fast_retry()).await.unwrap(), "s2");
    }

    #[tokio::test]
    async fn debug_redacts_value() {
        let t = SessionToken::new("secret-session", Duration::from_secs(60));
        assert!(!format!("{:?}", t).contains("secret"));
    }
}
