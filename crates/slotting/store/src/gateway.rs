//! Gateway trait definition.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::query::{Collection, Filter, Query, Row};

/// A generic relational persistence backend.
///
/// Absence of rows is never an error: reads return an empty vector.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Read rows matching the query.
    async fn query(&self, collection: Collection, query: &Query) -> Result<Vec<Row>>;

    /// Insert a row, or merge it into the row whose `conflict_key` field
    /// matches (`id` when `None`). Returns the stored row.
    async fn upsert(
        &self,
        collection: Collection,
        record: Row,
        conflict_key: Option<&str>,
    ) -> Result<Row>;

    /// Merge `patch` into every row matching `filters`.
    async fn update(&self, collection: Collection, filters: &[Filter], patch: Row) -> Result<()>;

    /// Delete every row matching `filters`.
    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<()>;

    /// Advance a remote atomic sequence and return its new value.
    async fn call_sequence(&self, name: &str) -> Result<Value>;

    /// Read the first row matching the filters.
    async fn find_one(&self, collection: Collection, filters: Vec<Filter>) -> Result<Option<Row>> {
        let query = Query {
            filters,
            limit: Some(1),
            ..Query::default()
        };
        Ok(self.query(collection, &query).await?.into_iter().next())
    }
}
