//! Error types for slotting-engine crate.

use slotting_resilience::ResilienceError;
use slotting_types::{CargoId, InvalidPositionCode, PalletId, PositionId, PositionStatus};
use thiserror::Error;

/// Errors that can occur during slotting and consolidation operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The store could not be reached, or rejected the call.
    #[error(transparent)]
    Resilience(#[from] ResilienceError),

    /// A stored row did not decode into the expected record.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A mutation targeted a cargo that does not exist.
    #[error("cargo not found: {0}")]
    CargoNotFound(CargoId),

    /// A mutation targeted a pallet that does not exist.
    #[error("pallet not found: {0}")]
    PalletNotFound(PalletId),

    /// A mutation targeted a position that does not exist.
    #[error("position not found: {0}")]
    PositionNotFound(PositionId),

    /// The position was not available when re-checked before writing.
    #[error("position {code} is not available (status: {status})")]
    PositionUnavailable {
        code: String,
        status: PositionStatus,
    },

    /// Wrong number of positions for the pallet's slot requirement.
    #[error("pallet {pallet_id} needs {required} positions, got {provided}")]
    PositionCountMismatch {
        pallet_id: PalletId,
        required: u32,
        provided: u32,
    },

    /// The pallet already occupies positions.
    #[error("pallet {0} is already addressed")]
    AlreadyAddressed(PalletId),

    /// Malformed position code.
    #[error(transparent)]
    InvalidPositionCode(#[from] InvalidPositionCode),

    /// Any other rejected input.
    #[error("validation error: {0}")]
    Validation(String),
}

impl EngineError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, EngineError::Resilience(e) if e.is_circuit_open())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
