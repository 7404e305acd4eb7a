//! Shared fixtures for engine scenarios.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use slotting_engine::{EngineConfig, WarehouseService};
use slotting_store::{Collection, Filter, Gateway, InMemoryGateway, Query, Row, StoreError};
use slotting_types::{InvoiceNote, Position};

pub const RIBEIRAO: &str = "RIBEIRAO PRETO - SP";

/// An in-memory store with both code sequences registered.
pub fn store() -> Arc<InMemoryGateway> {
    Arc::new(
        InMemoryGateway::new()
            .with_sequence("next_cargo_code", 0)
            .with_sequence("next_pallet_code", 0),
    )
}

pub fn service(store: &Arc<InMemoryGateway>) -> WarehouseService {
    WarehouseService::new(store.clone(), &EngineConfig::default())
}

pub async fn register(service: &WarehouseService, codes: &[&str]) -> Vec<Position> {
    let mut positions = Vec::with_capacity(codes.len());
    for code in codes {
        positions.push(service.register_position(code, 1000.0).await.unwrap());
    }
    positions
}

pub fn note(invoice: &str, volumes: u32) -> InvoiceNote {
    InvoiceNote {
        invoice_number: invoice.to_string(),
        barcode: format!("35240{invoice}55001"),
        supplier: "DISTRIBUIDORA CENTRAL".to_string(),
        destination_client: "RP".to_string(),
        destination: RIBEIRAO.to_string(),
        volumes,
    }
}

/// Store wrapper that rejects a single `update` on one collection once a
/// given number of updates to it have gone through.
pub struct RejectingStore {
    inner: Arc<InMemoryGateway>,
    collection: Collection,
    /// Updates still allowed before the rejection; negative when disarmed.
    remaining: AtomicI64,
}

impl RejectingStore {
    pub fn new(inner: Arc<InMemoryGateway>, collection: Collection) -> Arc<Self> {
        Arc::new(Self {
            inner,
            collection,
            remaining: AtomicI64::new(-1),
        })
    }

    /// Reject the update that follows `passing` successful ones.
    pub fn reject_after(&self, passing: u32) {
        self.remaining.store(i64::from(passing), Ordering::SeqCst);
    }

    fn should_reject(&self, collection: Collection) -> bool {
        if collection != self.collection {
            return false;
        }
        let previous = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n >= 0).then(|| n - 1))
            .unwrap_or(-1);
        previous == 0
    }
}

#[async_trait]
impl Gateway for RejectingStore {
    async fn query(&self, collection: Collection, query: &Query) -> slotting_store::Result<Vec<Row>> {
        self.inner.query(collection, query).await
    }

    async fn upsert(
        &self,
        collection: Collection,
        record: Row,
        conflict_key: Option<&str>,
    ) -> slotting_store::Result<Row> {
        self.inner.upsert(collection, record, conflict_key).await
    }

    async fn update(&self, collection: Collection, filters: &[Filter], patch: Row) -> slotting_store::Result<()> {
        if self.should_reject(collection) {
            return Err(StoreError::Constraint("rejected update".to_string()));
        }
        self.inner.update(collection, filters, patch).await
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> slotting_store::Result<()> {
        self.inner.delete(collection, filters).await
    }

    async fn call_sequence(&self, name: &str) -> slotting_store::Result<Value> {
        self.inner.call_sequence(name).await
    }
}

pub fn service_over(gateway: Arc<dyn Gateway>) -> WarehouseService {
    WarehouseService::new(gateway, &EngineConfig::default())
}
