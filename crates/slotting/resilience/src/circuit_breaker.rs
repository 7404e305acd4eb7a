//! Circuit breaker guarding the store.
//!
//! Prevents a flaky backend from being hammered by tracking consecutive
//! failures and failing fast while the backend cools down.

use std::future::Future;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use slotting_store::StoreError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{ResilienceError, Result};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,

    /// Circuit is open, requests are rejected without reaching the store.
    Open,

    /// Cool-down elapsed; a single trial request decides the next state.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    rejected: u64,
    last_transition: DateTime<Utc>,
}

/// Circuit breaker shared by every caller of one store.
///
/// - Closed: calls pass; `failure_threshold` consecutive transient failures open it
/// - Open: calls are rejected until `reset_timeout` has elapsed
/// - Half-Open: exactly one trial call passes; success closes, failure re-opens
pub struct CircuitBreaker {
    /// Name used in logs and errors.
    name: String,

    /// Configuration.
    config: CircuitBreakerConfig,

    /// Mutable state.
    inner: Mutex<BreakerState>,
}

/// Admission granted by [`CircuitBreaker::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Normal,
    Trial,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
                rejected: 0,
                last_transition: Utc::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state, moving Open to Half-Open once the cool-down has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.check_timeout(&mut inner);
        inner.state
    }

    /// Ask to run one call.
    pub fn try_acquire(&self) -> Result<Permit> {
        let mut inner = self.inner.lock();
        self.check_timeout(&mut inner);

        match inner.state {
            CircuitState::Closed => Ok(Permit::Normal),
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                debug!(breaker = %self.name, "Admitting half-open trial call");
                Ok(Permit::Trial)
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                inner.rejected += 1;
                Err(ResilienceError::CircuitOpen {
                    name: self.name.clone(),
                })
            }
        }
    }

    /// Run `operation` under the breaker.
    ///
    /// The future is only polled when the breaker admits the call. Transient
    /// store errors count as failures; any other answer from the store proves
    /// it is reachable and counts as a success.
    pub async fn call<T, Fut>(&self, operation: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        let permit = self.try_acquire()?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: permit == Permit::Trial,
        };

        let outcome = operation.await;
        guard.armed = false;

        match outcome {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) if err.is_transient() => {
                self.record_failure();
                Err(err.into())
            }
            Err(err) => {
                self.record_success();
                Err(err.into())
            }
        }
    }

    /// Record a successful operation.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.trial_in_flight = false;

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                info!(breaker = %self.name, "Circuit breaker closing after successful trial");
                self.transition_to(&mut inner, CircuitState::Closed);
            }
            CircuitState::Open => {
                debug!(breaker = %self.name, "Success recorded while circuit open");
            }
        }
    }

    /// Record a failed operation.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.trial_in_flight = false;

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                let failures = inner.consecutive_failures;

                if failures >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = failures,
                        "Circuit breaker opening due to failures"
                    );
                    self.transition_to(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "Circuit breaker re-opening after failed trial");
                self.transition_to(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Force the circuit to a specific state.
    pub fn force_state(&self, new_state: CircuitState) {
        let mut inner = self.inner.lock();
        info!(
            breaker = %self.name,
            old_state = %inner.state,
            new_state = %new_state,
            "Circuit breaker state forced"
        );
        self.transition_to(&mut inner, new_state);
    }

    /// Reset the circuit breaker to closed state.
    pub fn reset(&self) {
        self.force_state(CircuitState::Closed);
    }

    /// Get circuit breaker statistics.
    pub fn stats(&self) -> CircuitBreakerStats {
        let mut inner = self.inner.lock();
        self.check_timeout(&mut inner);
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            rejected_calls: inner.rejected,
            last_transition: inner.last_transition,
        }
    }

    fn check_timeout(&self, inner: &mut BreakerState) {
        if inner.state != CircuitState::Open {
            return;
        }
        let Some(opened_at) = inner.opened_at else {
            return;
        };

        if opened_at.elapsed() >= self.config.reset_timeout {
            info!(
                breaker = %self.name,
                "Circuit breaker transitioning to half-open after cool-down"
            );
            self.transition_to(inner, CircuitState::HalfOpen);
        }
    }

    fn release_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    fn transition_to(&self, inner: &mut BreakerState, new_state: CircuitState) {
        inner.state = new_state;
        inner.last_transition = Utc::now();
        inner.trial_in_flight = false;

        match new_state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.opened_at = None;
            }
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {}
        }
    }
}

/// Gives the half-open trial slot back if the trial future is dropped unfinished.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_trial();
        }
    }
}

/// Statistics for a circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Calls rejected without reaching the store.
    pub rejected_calls: u64,
    pub last_transition: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(300),
        }
    }

    fn unavailable() -> std::result::Result<(), StoreError> {
        Err(StoreError::Unavailable("connection reset".into()))
    }

    #[test]
    fn test_circuit_breaker_closed_to_open() {
        let breaker = CircuitBreaker::new("store", test_config());

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_ok());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().unwrap_err().is_circuit_open());
    }

    #[test]
    fn test_circuit_breaker_success_resets_failures() {
        let breaker = CircuitBreaker::new("store", test_config());

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_circuit_breaker_half_open_failure() {
        let breaker = CircuitBreaker::new("store", test_config());

        breaker.force_state(CircuitState::HalfOpen);
        assert_eq!(breaker.try_acquire().unwrap(), Permit::Trial);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_does_not_invoke_operation() {
        let breaker = CircuitBreaker::new("store", test_config());
        for _ in 0..3 {
            let _ = breaker.call(async { unavailable() }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let err = breaker
            .call(async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap_err();

        assert!(err.is_circuit_open());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().rejected_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_after_cool_down_closes_on_success() {
        let breaker = CircuitBreaker::new("store", test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // First caller takes the trial; a second concurrent caller is rejected.
        assert_eq!(breaker.try_acquire().unwrap(), Permit::Trial);
        assert!(breaker.try_acquire().unwrap_err().is_circuit_open());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_restarts_cool_down() {
        let breaker = CircuitBreaker::new("store", test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        tokio::time::advance(Duration::from_secs(300)).await;

        let _ = breaker.call(async { unavailable() }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_releases_slot() {
        let breaker = CircuitBreaker::new("store", test_config());
        breaker.force_state(CircuitState::HalfOpen);

        let pending = breaker.call(std::future::pending::<std::result::Result<(), StoreError>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.try_acquire().unwrap(), Permit::Trial);
    }

    #[tokio::test]
    async fn test_permanent_error_does_not_count_as_failure() {
        let breaker = CircuitBreaker::new("store", test_config());
        for _ in 0..5 {
            let err = breaker
                .call(async { Err::<(), _>(StoreError::FunctionNotFound("seq".into())) })
                .await
                .unwrap_err();
            assert!(!err.is_retryable());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
