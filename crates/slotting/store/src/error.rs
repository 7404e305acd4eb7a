//! Error types for slotting-store crate.

use thiserror::Error;

/// Errors surfaced by a persistence gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or dropped the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend answered but timed out internally.
    #[error("store timed out: {0}")]
    Timeout(String),

    /// A remote function (e.g. a sequence) does not exist.
    #[error("remote function not found: {0}")]
    FunctionNotFound(String),

    /// The backend rejected a write.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A row could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed request.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl StoreError {
    /// Connectivity failures are worth retrying; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Unavailable("reset".into()).is_transient());
        assert!(StoreError::Timeout("slow".into()).is_transient());
        assert!(!StoreError::FunctionNotFound("next_cargo_code".into()).is_transient());
        assert!(!StoreError::Constraint("duplicate".into()).is_transient());
        assert!(!StoreError::Invalid("bad".into()).is_transient());
    }
}
