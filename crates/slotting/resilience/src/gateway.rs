//! Store access through the breaker, retry loop and optional timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use slotting_store::{Collection, Filter, Gateway, Query, Row};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::RetryPolicy;
use crate::error::Result;
use crate::retry::retry_with_backoff;
use crate::timeout::with_timeout;

/// A [`Gateway`] whose every call is guarded by a shared [`CircuitBreaker`]
/// and retried with exponential backoff.
///
/// Each retry attempt re-enters the breaker. Several gateways may share one
/// breaker so that they observe the same backend health.
#[derive(Clone)]
pub struct ResilientGateway {
    inner: Arc<dyn Gateway>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    call_timeout: Option<Duration>,
}

impl ResilientGateway {
    pub fn new(inner: Arc<dyn Gateway>, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self {
            inner,
            breaker,
            retry,
            call_timeout: None,
        }
    }

    /// Bound the total wall-clock time of each operation, retries included.
    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = Some(limit);
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn execute<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = slotting_store::Result<T>>,
    {
        let breaker: &CircuitBreaker = &self.breaker;
        let run = retry_with_backoff(&self.retry, operation, move || breaker.call(call()));

        match self.call_timeout {
            Some(limit) => with_timeout(operation, limit, run).await,
            None => run.await,
        }
    }

    pub async fn query(&self, collection: Collection, query: &Query) -> Result<Vec<Row>> {
        self.execute("query", || self.inner.query(collection, query))
            .await
    }

    pub async fn find_one(&self, collection: Collection, filters: Vec<Filter>) -> Result<Option<Row>> {
        let query = Query {
            filters,
            limit: Some(1),
            ..Query::default()
        };
        Ok(self.query(collection, &query).await?.into_iter().next())
    }

    pub async fn upsert(
        &self,
        collection: Collection,
        record: Row,
        conflict_key: Option<&str>,
    ) -> Result<Row> {
        self.execute("upsert", || {
            self.inner.upsert(collection, record.clone(), conflict_key)
        })
        .await
    }

    pub async fn update(&self, collection: Collection, filters: &[Filter], patch: Row) -> Result<()> {
        self.execute("update", || {
            self.inner.update(collection, filters, patch.clone())
        })
        .await
    }

    pub async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<()> {
        self.execute("delete", || self.inner.delete(collection, filters))
            .await
    }

    pub async fn call_sequence(&self, name: &str) -> Result<Value> {
        self.execute("call_sequence", || self.inner.call_sequence(name))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::config::CircuitBreakerConfig;
    use crate::error::ResilienceError;
    use serde_json::json;
    use slotting_store::InMemoryGateway;

    fn setup() -> (Arc<InMemoryGateway>, ResilientGateway) {
        let store = Arc::new(InMemoryGateway::new());
        let breaker = Arc::new(CircuitBreaker::new("store", CircuitBreakerConfig::default()));
        let gateway = ResilientGateway::new(store.clone(), breaker, RetryPolicy::default());
        (store, gateway)
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_from_transient_failures() {
        let (store, gateway) = setup();
        store.fail_next(2);

        let row = json!({"code": "CG-000001"}).as_object().cloned().unwrap();
        let stored = gateway.upsert(Collection::Cargos, row, None).await.unwrap();

        assert_eq!(stored["code"], json!("CG-000001"));
        assert_eq!(store.call_count(), 3);
        // Two failures then a success: the breaker stays closed.
        assert_eq!(gateway.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_exhausted_operation_opens_shared_breaker() {
        let store = Arc::new(InMemoryGateway::new());
        let breaker = Arc::new(CircuitBreaker::new("store", CircuitBreakerConfig::default()));
        let positions = ResilientGateway::new(store.clone(), breaker.clone(), RetryPolicy::default());
        let cargos = ResilientGateway::new(store.clone(), breaker.clone(), RetryPolicy::default());

        store.fail_next(3);
        let err = positions
            .query(Collection::Positions, &Query::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResilienceError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(breaker.state(), CircuitState::Open);

        // A different caller sharing the breaker now fails fast.
        let calls_before = store.call_count();
        let err = cargos
            .query(Collection::Cargos, &Query::new())
            .await
            .unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(store.call_count(), calls_before);

        // After the cool-down a single trial succeeds and closes the breaker.
        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(cargos.query(Collection::Cargos, &Query::new()).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_bounds_retries() {
        let (store, gateway) = setup();
        let gateway = gateway.with_call_timeout(Duration::from_millis(1500));
        store.fail_next(3);

        // First failure sleeps 1s, second 2s: the 1.5s timer fires mid-backoff.
        let err = gateway
            .query(Collection::Cargos, &Query::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResilienceError::Timeout { .. }));
        assert_eq!(store.call_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_sequence_is_not_retried() {
        let (store, gateway) = setup();
        let err = gateway.call_sequence("next_cargo_code").await.unwrap_err();
        assert!(matches!(
            err,
            ResilienceError::Store(slotting_store::StoreError::FunctionNotFound(_))
        ));
        assert_eq!(store.call_count(), 1);
    }
}
