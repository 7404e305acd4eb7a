//! # Slotting Types
//!
//! Shared records for the warehouse slotting and consolidation layer.
//!
//! - [`Cargo`]: a logical shipment grouping pallets bound for one destination
//! - [`Pallet`]: a physical unit load tagged with invoice notes
//! - [`Position`]: an addressable storage slot (`PREFIX-NUMBER-LEVEL`)
//! - [`PalletNotes`]: the per-pallet list of attached invoice notes
//! - [`Movement`]: one entry of the append-only addressing/transfer log

pub mod cargo;
pub mod ids;
pub mod movement;
pub mod notes;
pub mod pallet;
pub mod position;

pub use cargo::{Cargo, CargoStatus, NoteSummary};
pub use ids::{CargoId, MovementId, PalletId, PalletNotesId, PositionId};
pub use movement::{Movement, MovementKind};
pub use notes::{InvoiceNote, NoteItem, PalletNotes};
pub use pallet::{Pallet, PalletStatus};
pub use position::{InvalidPositionCode, Position, PositionCode, PositionStatus, MAX_LEVEL};
