use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use canary_core::CanaryError;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of the breaker for health reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub remaining_cooldown_secs: u64,
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Consecutive-failure circuit breaker shared by every historian call.
///
/// Closed → Open after `failure_threshold` failures in a row. Open rejects
/// immediately until `reset_timeout` has elapsed, then admits exactly one
/// trial request (HalfOpen). The trial's outcome closes or re-opens it.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remaining(&self, opened_at: Option<Instant>) -> Duration {
        opened_at
            .map(|at| self.reset_timeout.saturating_sub(at.elapsed()))
            .unwrap_or_default()
    }

    /// Ask to send one request. Rejections carry the cooldown left.
    ///
    /// A trial permit dropped unsettled counts as a failed trial, so a
    /// cancelled trial cannot wedge the breaker half-open. Any other
    /// unsettled permit is released without touching the failure count.
    pub fn acquire(&self) -> Result<BreakerPermit<'_>, CanaryError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(BreakerPermit::new(self, false)),
            CircuitState::Open => {
                let remaining = self.remaining(inner.opened_at);
                if remaining > Duration::ZERO {
                    return Err(CanaryError::CircuitOpen {
                        remaining_secs: ceil_secs(remaining),
                    });
                }
                info!("Circuit half-open, admitting trial request");
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                Ok(BreakerPermit::new(self, true))
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(CanaryError::CircuitOpen { remaining_secs: 0 })
                } else {
                    inner.trial_in_flight = true;
                    Ok(BreakerPermit::new(self, true))
                }
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        if trial {
            inner.trial_in_flight = false;
        }
        if inner.state != CircuitState::Closed {
            info!("Circuit closed after successful trial");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        if trial {
            inner.trial_in_flight = false;
        }
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let reopen = trial || inner.state == CircuitState::HalfOpen;
        if reopen || inner.consecutive_failures >= self.failure_threshold {
            if inner.state != CircuitState::Open {
                warn!(
                    failures = inner.consecutive_failures,
                    cooldown_secs = self.reset_timeout.as_secs(),
                    "Circuit opened"
                );
            }
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Outcome says nothing about historian health; only frees a trial slot.
    fn on_release(&self, trial: bool) {
        if trial {
            let mut inner = self.lock();
            inner.trial_in_flight = false;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let remaining = if inner.state == CircuitState::Open {
            ceil_secs(self.remaining(inner.opened_at))
        } else {
            0
        };
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            remaining_cooldown_secs: remaining,
            failure_threshold: self.failure_threshold,
            reset_timeout_secs: self.reset_timeout.as_secs(),
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Admission ticket for one request through the breaker.
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }

    pub fn release(mut self) {
        self.settled = true;
        self.breaker.on_release(self.trial);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if self.trial {
            self.breaker.on_failure(true);
        } else {
            self.breaker.on_release(false);
        }
    }
}
