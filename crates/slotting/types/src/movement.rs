//! Append-only movement log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MovementId, PalletId, PositionId};

/// What caused a pallet to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Addressing,
    Transfer,
    Release,
}

/// One addressing, transfer or release of a pallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub pallet_id: PalletId,
    pub kind: MovementKind,
    #[serde(default)]
    pub from_position_id: Option<PositionId>,
    #[serde(default)]
    pub to_position_id: Option<PositionId>,
    pub actor: String,
    /// Ordering key: microseconds since the epoch, bumped to stay strictly
    /// increasing within one process.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}
