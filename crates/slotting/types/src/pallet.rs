//! Pallet records: physical unit loads.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CargoId, PalletId, PositionId};

/// Lifecycle status of a pallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PalletStatus {
    /// Notes are still being attached.
    Assembling,
    /// Slot, cage and box counts are known.
    Finalized,
    /// Addressed to one or more positions.
    Stored,
    /// Left its positions.
    Released,
}

impl fmt::Display for PalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PalletStatus::Assembling => write!(f, "assembling"),
            PalletStatus::Finalized => write!(f, "finalized"),
            PalletStatus::Stored => write!(f, "stored"),
            PalletStatus::Released => write!(f, "released"),
        }
    }
}

/// A physical unit load.
///
/// When linked to a cargo, `volume_count` and `note_count` carry the cargo
/// totals rather than this pallet's own subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pallet {
    pub id: PalletId,
    pub code: String,
    #[serde(default)]
    pub cargo_id: Option<CargoId>,
    /// Primary (first) position the pallet occupies.
    #[serde(default)]
    pub position_id: Option<PositionId>,
    /// Every position the pallet occupies, in contiguous order for multi-slot loads.
    #[serde(default)]
    pub position_ids: Vec<PositionId>,
    pub status: PalletStatus,
    pub volume_count: u32,
    pub note_count: u32,
    /// Number of contiguous positions the pallet needs. `None` means one.
    #[serde(default)]
    pub required_positions: Option<u32>,
    #[serde(default)]
    pub cage_count: Option<u32>,
    #[serde(default)]
    pub box_count: Option<u32>,
    #[serde(default)]
    pub estimated_weight_kg: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finalized_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stored_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
}

impl Pallet {
    /// Create an empty pallet in the assembling state.
    pub fn new(code: impl Into<String>, cargo_id: Option<CargoId>) -> Self {
        Self {
            id: PalletId::generate(),
            code: code.into(),
            cargo_id,
            position_id: None,
            position_ids: Vec::new(),
            status: PalletStatus::Assembling,
            volume_count: 0,
            note_count: 0,
            required_positions: None,
            cage_count: None,
            box_count: None,
            estimated_weight_kg: None,
            created_at: Utc::now(),
            finalized_at: None,
            stored_at: None,
            released_at: None,
        }
    }

    /// Number of contiguous slots this pallet needs (at least one).
    pub fn slots_required(&self) -> u32 {
        self.required_positions.unwrap_or(1).max(1)
    }

    pub fn is_addressed(&self) -> bool {
        !self.position_ids.is_empty() || self.position_id.is_some()
    }
}
