//! Error types for slotting-resilience crate.

use std::time::Duration;

use slotting_store::StoreError;
use thiserror::Error;

/// Errors produced by the resilience layer.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The breaker is open; the store was not called.
    #[error("circuit breaker open: {name}")]
    CircuitOpen { name: String },

    /// Every attempt failed with a transient error.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: StoreError,
    },

    /// The timeout race fired before the operation finished.
    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout { operation: String, after: Duration },

    /// A store error that is not worth retrying, or a single transient failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResilienceError {
    /// Only transient store errors are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResilienceError::Store(e) if e.is_transient())
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }
}

/// Result type for resilience operations.
pub type Result<T> = std::result::Result<T, ResilienceError>;
