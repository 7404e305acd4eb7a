//! Typed access to the slotting collections.
//!
//! Every call goes through the shared [`ResilientGateway`]. Records are
//! stored as JSON rows; absence is reported as `None` or an empty vector.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use slotting_resilience::ResilientGateway;
use slotting_store::{Collection, Filter, Order, Query, Row};
use slotting_types::{
    Cargo, CargoId, CargoStatus, Movement, Pallet, PalletId, PalletNotes, Position, PositionId,
    PositionStatus,
};

use crate::error::{EngineError, Result};

/// Record-level reads and writes over the resilient gateway.
#[derive(Clone)]
pub struct Repository {
    gateway: ResilientGateway,
}

impl Repository {
    pub fn new(gateway: ResilientGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &ResilientGateway {
        &self.gateway
    }

    // Cargo operations

    pub async fn get_cargo(&self, id: CargoId) -> Result<Option<Cargo>> {
        self.find_by_id(Collection::Cargos, id).await
    }

    pub async fn save_cargo(&self, cargo: &Cargo) -> Result<Cargo> {
        self.save(Collection::Cargos, cargo, None).await
    }

    pub async fn patch_cargo(&self, id: CargoId, patch: Value) -> Result<()> {
        self.patch(Collection::Cargos, id, patch).await
    }

    /// The oldest open cargo for a client/destination pair within a batch.
    /// `batch == None` only matches cargos created without a batch tag.
    pub async fn find_open_cargo(
        &self,
        destination_client: &str,
        destination: &str,
        batch: Option<&str>,
    ) -> Result<Option<Cargo>> {
        let batch_filter = match batch {
            Some(batch) => Filter::eq("batch", batch),
            None => Filter::is_null("batch"),
        };
        let query = Query::new()
            .filter(Filter::eq("destination_client", destination_client))
            .filter(Filter::eq("destination", destination))
            .filter(Filter::eq("status", status_value(CargoStatus::Open)?))
            .filter(batch_filter)
            .order_by(Order::asc("code"))
            .limit(1);

        Ok(self.fetch(Collection::Cargos, &query).await?.into_iter().next())
    }

    // Pallet operations

    pub async fn get_pallet(&self, id: PalletId) -> Result<Option<Pallet>> {
        self.find_by_id(Collection::Pallets, id).await
    }

    pub async fn save_pallet(&self, pallet: &Pallet) -> Result<Pallet> {
        self.save(Collection::Pallets, pallet, None).await
    }

    pub async fn patch_pallet(&self, id: PalletId, patch: Value) -> Result<()> {
        self.patch(Collection::Pallets, id, patch).await
    }

    /// Pallets linked to a cargo, in code order.
    pub async fn pallets_for_cargo(&self, cargo_id: CargoId) -> Result<Vec<Pallet>> {
        let query = Query::new()
            .filter(Filter::eq("cargo_id", cargo_id))
            .order_by(Order::asc("code"));
        self.fetch(Collection::Pallets, &query).await
    }

    // Position operations

    pub async fn get_position(&self, id: PositionId) -> Result<Option<Position>> {
        self.find_by_id(Collection::Positions, id).await
    }

    pub async fn save_position(&self, position: &Position) -> Result<Position> {
        self.save(Collection::Positions, position, None).await
    }

    pub async fn patch_position(&self, id: PositionId, patch: Value) -> Result<()> {
        self.patch(Collection::Positions, id, patch).await
    }

    pub async fn find_position_by_code(&self, code: &str) -> Result<Option<Position>> {
        let row = self
            .gateway
            .find_one(Collection::Positions, vec![Filter::eq("code", code)])
            .await?;
        row.map(from_row).transpose()
    }

    pub async fn available_positions(&self) -> Result<Vec<Position>> {
        let query = Query::new()
            .filter(Filter::eq("status", status_value(PositionStatus::Available)?))
            .order_by(Order::asc("code"));
        self.fetch(Collection::Positions, &query).await
    }

    // Pallet notes operations

    pub async fn pallet_notes(&self, pallet_id: PalletId) -> Result<Option<PalletNotes>> {
        let row = self
            .gateway
            .find_one(Collection::PalletNotes, vec![Filter::eq("pallet_id", pallet_id)])
            .await?;
        row.map(from_row).transpose()
    }

    /// One record per pallet: writes merge into the existing row for the pallet.
    pub async fn save_pallet_notes(&self, notes: &PalletNotes) -> Result<PalletNotes> {
        self.save(Collection::PalletNotes, notes, Some("pallet_id"))
            .await
    }

    /// The pallet-notes record holding an invoice number, if any.
    pub async fn find_notes_by_invoice(&self, invoice_number: &str) -> Result<Option<PalletNotes>> {
        let filter = Filter::contains("items", json!([{ "invoice_number": invoice_number }]));
        let row = self
            .gateway
            .find_one(Collection::PalletNotes, vec![filter])
            .await?;
        row.map(from_row).transpose()
    }

    // Movement log

    pub async fn append_movement(&self, movement: &Movement) -> Result<Movement> {
        self.save(Collection::Movements, movement, None).await
    }

    pub async fn movements_for_pallet(&self, pallet_id: PalletId) -> Result<Vec<Movement>> {
        let query = Query::new()
            .filter(Filter::eq("pallet_id", pallet_id))
            .order_by(Order::asc("sequence"));
        self.fetch(Collection::Movements, &query).await
    }

    /// The `limit` highest codes in a collection, highest first.
    pub async fn recent_codes(&self, collection: Collection, limit: usize) -> Result<Vec<String>> {
        let query = Query::new()
            .filter(Filter::not_null("code"))
            .order_by(Order::desc("code"))
            .limit(limit);
        let rows = self.gateway.query(collection, &query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row.get("code") {
                Some(Value::String(code)) => Some(code.clone()),
                _ => None,
            })
            .collect())
    }

    // Helpers

    async fn find_by_id<T, I>(&self, collection: Collection, id: I) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        I: Into<Value>,
    {
        let row = self
            .gateway
            .find_one(collection, vec![Filter::eq("id", id)])
            .await?;
        row.map(from_row).transpose()
    }

    async fn fetch<T: DeserializeOwned>(&self, collection: Collection, query: &Query) -> Result<Vec<T>> {
        self.gateway
            .query(collection, query)
            .await?
            .into_iter()
            .map(from_row)
            .collect()
    }

    async fn save<T>(&self, collection: Collection, record: &T, conflict_key: Option<&str>) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let stored = self
            .gateway
            .upsert(collection, to_row(record)?, conflict_key)
            .await?;
        from_row(stored)
    }

    async fn patch<I: Into<Value>>(&self, collection: Collection, id: I, patch: Value) -> Result<()> {
        let patch = match patch {
            Value::Object(fields) => fields,
            other => {
                return Err(EngineError::Validation(format!(
                    "patch for {collection} must be an object, got {other}"
                )))
            }
        };
        self.gateway
            .update(collection, &[Filter::eq("id", id)], patch)
            .await?;
        Ok(())
    }
}

fn to_row<T: Serialize>(record: &T) -> Result<Row> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        other => Err(EngineError::Validation(format!(
            "record did not serialize to an object: {other}"
        ))),
    }
}

fn from_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Serialized form of a status enum, for use as a filter value.
pub(crate) fn status_value<S: Serialize>(status: S) -> Result<Value> {
    Ok(serde_json::to_value(status)?)
}
