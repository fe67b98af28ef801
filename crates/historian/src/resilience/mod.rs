//! The single choke point for historian traffic.
//!
//! Every call runs, in order: shape validation → circuit breaker → session
//! token → bounded retry with backoff → response size guard. Nothing else in
//! the workspace talks to a [`HistorianTransport`] directly.

mod breaker;
mod guard;
mod retry;
mod session;
mod validate;

use std::sync::Arc;

use canary_core::{CanaryError, Config};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::transport::{HistorianTransport, TransportError};
use crate::wire;

pub use breaker::{BreakerPermit, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use guard::{Guarded, SizeGuard, PREVIEW_BYTES};
pub use retry::RetryPolicy;
pub use session::{SessionManager, SessionToken, SESSION_ENDPOINT};
pub use validate::{validate_path, Operation, MAX_PATH_LEN};

/// Health of the resilience layer, reported without touching the network.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub breaker: BreakerSnapshot,
    pub session_valid: bool,
    pub response_max_bytes: usize,
}

/// Why one attempt sequence stopped.
enum Failure {
    /// The session token was rejected; re-authenticate and try again.
    SessionRejected(String),
    Fatal(CanaryError),
}

pub struct ResilientCore {
    transport: Arc<dyn HistorianTransport>,
    breaker: CircuitBreaker,
    session: SessionManager,
    retry: RetryPolicy,
    guard: SizeGuard,
    max_tags: usize,
}

impl ResilientCore {
    pub fn new(config: &Config, transport: Arc<dyn HistorianTransport>) -> Self {
        let resilience = &config.resilience;
        Self {
            transport,
            breaker: CircuitBreaker::new(
                resilience.circuit_failure_threshold,
                resilience.reset_timeout(),
            ),
            session: SessionManager::new(&config.historian),
            retry: RetryPolicy::from_config(resilience),
            guard: SizeGuard::new(resilience.response_max_bytes),
            max_tags: config.query.max_tags,
        }
    }

    pub fn guard(&self) -> SizeGuard {
        self.guard
    }

    pub fn max_tags(&self) -> usize {
        self.max_tags
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Execute one historian operation.
    ///
    /// Invalid parameters fail before the breaker is consulted; an open
    /// breaker fails before any request is sent.
    pub async fn call(&self, op: Operation, params: Value) -> Result<Guarded, CanaryError> {
        op.validate(&params, self.max_tags)?;
        let permit = self.breaker.acquire()?;

        let outcome = self.execute(op, &params).await;
        match &outcome {
            // The historian answered; it is healthy even if it said no.
            Ok(_) | Err(CanaryError::Upstream { .. }) => permit.success(),
            Err(CanaryError::UpstreamUnavailable { .. }) => permit.failure(),
            Err(_) => permit.release(),
        }

        Ok(self.guard.check(outcome?))
    }

    async fn execute(&self, op: Operation, params: &Value) -> Result<Value, CanaryError> {
        let mut reauthenticated = false;
        loop {
            let token = self.session.token(self.transport.as_ref(), &self.retry).await?;
            let body = with_session(params, &token);
            match self.send(op, &body).await {
                Ok(v) => return Ok(v),
                Err(Failure::SessionRejected(reason)) => {
                    self.session.invalidate(&token).await;
                    if reauthenticated {
                        return Err(CanaryError::Authentication(format!(
                            "session rejected again after re-authentication: {}",
                            reason
                        )));
                    }
                    warn!(operation = %op, reason = %reason, "Session rejected, re-authenticating once");
                    reauthenticated = true;
                }
                Err(Failure::Fatal(e)) => return Err(e),
            }
        }
    }

    async fn send(&self, op: Operation, body: &Value) -> Result<Value, Failure> {
        let endpoint = op.endpoint();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let error = match self.transport.post(endpoint, body).await {
                Ok(response) => {
                    return match wire::status_error(&response) {
                        None => {
                            debug!(operation = %op, attempt, "Historian call succeeded");
                            Ok(response)
                        }
                        Some(message) if wire::is_session_message(&message) => {
                            Err(Failure::SessionRejected(message))
                        }
                        Some(message) => Err(Failure::Fatal(CanaryError::Upstream {
                            status: 200,
                            message,
                        })),
                    };
                }
                Err(e) => e,
            };

            if error.is_auth_expiry() {
                return Err(Failure::SessionRejected(error.to_string()));
            }
            if !error.is_transient() {
                return Err(Failure::Fatal(permanent(error)));
            }
            if attempt >= self.retry.max_attempts {
                warn!(operation = %op, attempts = attempt, error = %error, "Historian call exhausted retries");
                return Err(Failure::Fatal(CanaryError::UpstreamUnavailable {
                    attempts: attempt,
                    last_error: error.to_string(),
                }));
            }
            let delay = self.retry.delay_for_attempt(attempt - 1);
            warn!(
                operation = %op,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient historian failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            breaker: self.breaker.snapshot(),
            session_valid: self.session.is_valid(),
            response_max_bytes: self.guard.max_bytes(),
        }
    }
}

fn with_session(params: &Value, token: &str) -> Value {
    let mut body = params.clone();
    if let Value::Object(map) = &mut body {
        map.insert("sessionToken".to_string(), Value::String(token.to_string()));
    }
    body
}

fn permanent(error: TransportError) -> CanaryError {
    match error {
        TransportError::Status { status, body } => CanaryError::Upstream {
            status,
            message: if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                body
            },
        },
        other => CanaryError::Upstream {
            status: 0,
            message: other.to_string(),
        },
    }
}
