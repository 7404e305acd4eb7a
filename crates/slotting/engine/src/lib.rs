//! # Slotting Engine
//!
//! Warehouse slotting and consolidation over a resilient persistence gateway.
//!
//! - [`ZoneResolver`]: destination abbreviations and preferential zones
//! - [`CodeGenerator`]: cargo and pallet codes from a remote sequence, with fallbacks
//! - [`SlottingEngine`]: ranked single-slot and contiguous multi-slot placements
//! - [`ConsolidationEngine`]: cargo and pallet aggregates from the note lists
//! - [`WarehouseService`]: the operations the surrounding modules call
//!
//! ## Example
//!
//! ```rust,ignore
//! use slotting_engine::{EngineConfig, WarehouseService};
//! use slotting_store::InMemoryGateway;
//!
//! let service = WarehouseService::new(Arc::new(InMemoryGateway::new()), &EngineConfig::default());
//! let cargo = service.create_or_reuse_cargo("RP", "RIBEIRAO PRETO - SP").await?;
//! let pallet = service.create_pallet(Some(cargo.id), None).await?;
//! let suggestions = service.suggest_positions(pallet.id, Some(5)).await?;
//! ```

pub mod codes;
pub mod config;
pub mod consolidation;
pub mod error;
pub mod repository;
pub mod service;
pub mod slotting;
pub mod zone;

pub use codes::{CodeGenerator, PalletSplit};
pub use config::{CodeConfig, EngineConfig, ResilienceSettings, ScoreWeights, SlottingConfig};
pub use consolidation::{merge_notes, ConsolidationEngine, ConsolidationReport};
pub use error::{EngineError, Result};
pub use repository::Repository;
pub use service::{Addressing, FinalizeRequest, InvoiceLookup, WarehouseService};
pub use slotting::{PlacementSuggestion, SlottingEngine};
pub use zone::{ZoneRange, ZoneResolver, ZoneTable};
