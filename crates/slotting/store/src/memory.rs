//! In-memory gateway for development and testing.
//!
//! Every call yields to the scheduler once before touching data so that
//! concurrent callers interleave the way they would around real network
//! round trips. Not suitable for production use.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::gateway::Gateway;
use crate::query::{Collection, Filter, Query, Row};

/// In-memory gateway implementation.
pub struct InMemoryGateway {
    /// Rows per collection, in insertion order.
    tables: DashMap<Collection, Vec<Row>>,

    /// Registered sequences and their current values.
    sequences: DashMap<String, i64>,

    /// Number of upcoming calls that fail with `StoreError::Unavailable`.
    pending_failures: AtomicU32,

    /// Calls that reached the backend (including injected failures).
    calls: AtomicU64,
}

impl InMemoryGateway {
    /// Create an empty gateway with no sequences registered.
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            sequences: DashMap::new(),
            pending_failures: AtomicU32::new(0),
            calls: AtomicU64::new(0),
        }
    }

    /// Register a sequence starting after `start`.
    pub fn with_sequence(self, name: impl Into<String>, start: i64) -> Self {
        self.sequences.insert(name.into(), start);
        self
    }

    /// Make the next `count` calls fail as if the backend were unreachable.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of calls that reached the backend.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of rows in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.tables.get(&collection).map(|t| t.len()).unwrap_or(0)
    }

    /// Insert rows directly, bypassing fault injection and call counting.
    pub fn seed(&self, collection: Collection, rows: impl IntoIterator<Item = Row>) {
        let mut table = self.tables.entry(collection).or_default();
        for mut row in rows {
            ensure_id(&mut row);
            table.push(row);
        }
    }

    async fn enter(&self, operation: &str, collection: Option<Collection>) -> Result<()> {
        tokio::task::yield_now().await;
        self.calls.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            debug!(operation, ?collection, "Injected store failure");
            return Err(StoreError::Unavailable(format!(
                "injected failure during {operation}"
            )));
        }
        Ok(())
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_id(row: &mut Row) {
    if row.get("id").map_or(true, Value::is_null) {
        row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
    }
}

fn merge(target: &mut Row, patch: Row) {
    for (key, value) in patch {
        if key == "id" && target.contains_key("id") {
            continue;
        }
        target.insert(key, value);
    }
}

#[async_trait]
impl Gateway for InMemoryGateway {
    async fn query(&self, collection: Collection, query: &Query) -> Result<Vec<Row>> {
        self.enter("query", Some(collection)).await?;

        let mut rows: Vec<Row> = self
            .tables
            .get(&collection)
            .map(|table| table.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        if !query.order.is_empty() {
            rows.sort_by(|a, b| query.compare(a, b));
        }

        let rows = rows.into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        })
    }

    async fn upsert(
        &self,
        collection: Collection,
        mut record: Row,
        conflict_key: Option<&str>,
    ) -> Result<Row> {
        self.enter("upsert", Some(collection)).await?;

        let key = conflict_key.unwrap_or("id");
        let mut table = self.tables.entry(collection).or_default();

        let conflict_value = record.get(key).filter(|v| !v.is_null()).cloned();
        if let Some(value) = conflict_value {
            if let Some(existing) = table.iter_mut().find(|r| r.get(key) == Some(&value)) {
                merge(existing, record);
                return Ok(existing.clone());
            }
        } else if key != "id" {
            return Err(StoreError::Invalid(format!(
                "upsert into {collection} is missing conflict key {key}"
            )));
        }

        ensure_id(&mut record);
        table.push(record.clone());
        Ok(record)
    }

    async fn update(&self, collection: Collection, filters: &[Filter], patch: Row) -> Result<()> {
        self.enter("update", Some(collection)).await?;

        if let Some(mut table) = self.tables.get_mut(&collection) {
            for row in table
                .iter_mut()
                .filter(|r| filters.iter().all(|f| f.matches(r)))
            {
                merge(row, patch.clone());
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<()> {
        self.enter("delete", Some(collection)).await?;

        if let Some(mut table) = self.tables.get_mut(&collection) {
            table.retain(|r| !filters.iter().all(|f| f.matches(r)));
        }
        Ok(())
    }

    async fn call_sequence(&self, name: &str) -> Result<Value> {
        self.enter("call_sequence", None).await?;

        let mut current = self
            .sequences
            .get_mut(name)
            .ok_or_else(|| StoreError::FunctionNotFound(name.to_string()))?;
        *current += 1;
        Ok(Value::from(*current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Order;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_inserts_and_merges() {
        let gateway = InMemoryGateway::new();

        let stored = gateway
            .upsert(Collection::Cargos, row(json!({"code": "CG-000001"})), None)
            .await
            .unwrap();
        let id = stored["id"].clone();
        assert!(id.is_string());

        gateway
            .upsert(
                Collection::Cargos,
                row(json!({"id": id.clone(), "total_volumes": 5})),
                None,
            )
            .await
            .unwrap();

        let rows = gateway
            .query(Collection::Cargos, &Query::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["code"], json!("CG-000001"));
        assert_eq!(rows[0]["total_volumes"], json!(5));
    }

    #[tokio::test]
    async fn test_upsert_with_conflict_key_keeps_original_id() {
        let gateway = InMemoryGateway::new();
        let first = gateway
            .upsert(
                Collection::PalletNotes,
                row(json!({"id": "a", "pallet_id": "p1", "total_volumes": 1})),
                Some("pallet_id"),
            )
            .await
            .unwrap();
        let second = gateway
            .upsert(
                Collection::PalletNotes,
                row(json!({"id": "b", "pallet_id": "p1", "total_volumes": 4})),
                Some("pallet_id"),
            )
            .await
            .unwrap();

        assert_eq!(first["id"], json!("a"));
        assert_eq!(second["id"], json!("a"));
        assert_eq!(second["total_volumes"], json!(4));
        assert_eq!(gateway.len(Collection::PalletNotes), 1);
    }

    #[tokio::test]
    async fn test_query_order_and_range() {
        let gateway = InMemoryGateway::new();
        gateway.seed(
            Collection::Positions,
            (1..=5).map(|n| row(json!({"number": n, "status": "available"}))),
        );

        let query = Query::new()
            .filter(Filter::eq("status", "available"))
            .order_by(Order::desc("number"))
            .range(1, 2);
        let rows = gateway.query(Collection::Positions, &query).await.unwrap();
        let numbers: Vec<i64> = rows.iter().map(|r| r["number"].as_i64().unwrap()).collect();
        assert_eq!(numbers, vec![4, 3]);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let gateway = InMemoryGateway::new();
        gateway.seed(
            Collection::Pallets,
            vec![
                row(json!({"id": "p1", "cargo_id": "c1"})),
                row(json!({"id": "p2", "cargo_id": "c1"})),
                row(json!({"id": "p3", "cargo_id": "c2"})),
            ],
        );

        gateway
            .update(
                Collection::Pallets,
                &[Filter::eq("cargo_id", "c1")],
                row(json!({"volume_count": 9})),
            )
            .await
            .unwrap();
        gateway
            .delete(Collection::Pallets, &[Filter::eq("id", "p3")])
            .await
            .unwrap();

        let rows = gateway
            .query(Collection::Pallets, &Query::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["volume_count"] == json!(9)));
    }

    #[tokio::test]
    async fn test_sequences() {
        let gateway = InMemoryGateway::new().with_sequence("next_cargo_code", 41);
        assert_eq!(gateway.call_sequence("next_cargo_code").await.unwrap(), json!(42));
        assert_eq!(gateway.call_sequence("next_cargo_code").await.unwrap(), json!(43));

        let err = gateway.call_sequence("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::FunctionNotFound(_)));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next(2);

        for _ in 0..2 {
            let err = gateway
                .query(Collection::Cargos, &Query::new())
                .await
                .unwrap_err();
            assert!(err.is_transient());
        }
        assert!(gateway.query(Collection::Cargos, &Query::new()).await.is_ok());
        assert_eq!(gateway.call_count(), 3);
    }
}
