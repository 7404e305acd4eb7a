//! Cargo records: logical shipments grouping pallets for one destination.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::CargoId;

/// Lifecycle status of a cargo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CargoStatus {
    /// Accepting pallets.
    Open,
    /// Every linked pallet has been addressed to a position.
    Stored,
    /// Every linked pallet has left its position.
    Released,
}

impl fmt::Display for CargoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CargoStatus::Open => write!(f, "open"),
            CargoStatus::Stored => write!(f, "stored"),
            CargoStatus::Released => write!(f, "released"),
        }
    }
}

/// Denormalized summary of one consolidated invoice note, cached on the cargo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSummary {
    pub invoice_number: String,
    pub supplier: String,
    pub destination: String,
    pub volumes: u32,
    pub pallet_code: String,
}

/// A logical shipment.
///
/// `total_volumes` and `total_notes` mirror the invoice-deduplicated notes of
/// every linked pallet and are rewritten by each consolidation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cargo {
    pub id: CargoId,
    pub code: String,
    pub destination_client: String,
    pub destination: String,
    #[serde(default)]
    pub batch: Option<String>,
    pub status: CargoStatus,
    pub pallet_count: u32,
    pub total_volumes: u32,
    pub total_notes: u32,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub notes: Vec<NoteSummary>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stored_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
}

impl Cargo {
    /// Create an open, empty cargo.
    pub fn new(
        code: impl Into<String>,
        destination_client: impl Into<String>,
        destination: impl Into<String>,
        batch: Option<String>,
    ) -> Self {
        Self {
            id: CargoId::generate(),
            code: code.into(),
            destination_client: destination_client.into(),
            destination: destination.into(),
            batch,
            status: CargoStatus::Open,
            pallet_count: 0,
            total_volumes: 0,
            total_notes: 0,
            observations: None,
            notes: Vec::new(),
            created_at: Utc::now(),
            stored_at: None,
            released_at: None,
        }
    }
}
