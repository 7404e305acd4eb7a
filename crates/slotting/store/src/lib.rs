//! # Slotting Store
//!
//! The relational persistence gateway consumed by the slotting engine.
//!
//! The gateway is deliberately generic: rows are JSON objects addressed by
//! [`Collection`], read with a [`Query`] (filters, ordering, range) and written
//! with upsert/update/delete. Remote atomic sequences back code generation.
//!
//! [`InMemoryGateway`] implements the trait for development and tests, with
//! fault injection to exercise the resilience layer.

pub mod error;
pub mod gateway;
pub mod memory;
pub mod query;

pub use error::{Result, StoreError};
pub use gateway::Gateway;
pub use memory::InMemoryGateway;
pub use query::{Collection, Filter, FilterOp, Order, Query, Row};
