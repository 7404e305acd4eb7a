//! # Slotting Resilience
//!
//! Every persistence call issued by the slotting engine goes through this
//! crate:
//!
//! - [`CircuitBreaker`]: CLOSED / OPEN / HALF_OPEN guard. One instance is
//!   shared by every caller, so the failures of one operation fail-fast the
//!   others until the cool-down elapses.
//! - [`retry_with_backoff`]: exponential backoff that re-enters the breaker on
//!   every attempt. One logical operation can therefore consume several
//!   breaker failure counts.
//! - [`with_timeout`]: races an operation against a timer and stops waiting
//!   when the timer fires.
//! - [`ResilientGateway`]: a [`slotting_store::Gateway`] wrapper combining the three.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState, Permit};
pub use config::{CircuitBreakerConfig, RetryPolicy};
pub use error::{ResilienceError, Result};
pub use gateway::ResilientGateway;
pub use retry::retry_with_backoff;
pub use timeout::with_timeout;
