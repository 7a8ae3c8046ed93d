//! In-memory backend.
//!
//! Serves canned results: each registered fixture pairs a query substring
//! with the `RawResult` to return. It records every query it receives and
//! counts commits and rollbacks, which is what the executor and engine
//! tests assert against.
//!
//! ## Limitations
//!
//! - **No Cypher evaluation**: the first fixture whose needle occurs in the
//!   query wins; unmatched queries return an empty result.
//! - **Read-only**: `ReadWrite` transactions are refused, like `HttpBackend`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{GraphBackend, GraphError, RawResult, RunOptions};
use crate::tx::{Transaction, TxId, TxMode};

// ============================================================================
// MemoryBackend
// ============================================================================

/// Fixture-driven graph backend.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    fixtures: RwLock<Vec<(String, RawResult)>>,
    failure: RwLock<Option<GraphError>>,
    delay: RwLock<Option<Duration>>,
    queries: RwLock<Vec<String>>,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `result` for queries containing `needle`.
    pub fn with_result(self, needle: impl Into<String>, result: RawResult) -> Self {
        self.inner.fixtures.write().push((needle.into(), result));
        self
    }

    /// Fail every `run` with `error`.
    pub fn failing_with(self, error: GraphError) -> Self {
        *self.inner.failure.write() = Some(error);
        self
    }

    /// Sleep before answering each `run`.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.write() = Some(delay);
        self
    }

    /// Every query passed to `run`, in order.
    pub fn queries(&self) -> Vec<String> {
        self.inner.queries.read().clone()
    }

    pub fn commits(&self) -> u64 {
        self.inner.commits.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.inner.rollbacks.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("fixtures", &self.inner.fixtures.read().len())
            .field("queries", &self.inner.queries.read().len())
            .finish()
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// In-memory transaction (a marker; there is nothing to isolate).
#[derive(Debug)]
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode {
        self.mode
    }

    fn id(&self) -> TxId {
        self.id
    }
}

#[async_trait]
impl GraphBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx, GraphError> {
        if mode != TxMode::ReadOnly {
            return Err(GraphError::TxMode(mode));
        }
        Ok(MemoryTx { id: TxId::next(), mode })
    }

    async fn commit_tx(&self, _tx: MemoryTx) -> Result<(), GraphError> {
        self.inner.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn rollback_tx(&self, _tx: MemoryTx) -> Result<(), GraphError> {
        self.inner.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn run(&self, _tx: &mut MemoryTx, query: &str, _options: RunOptions) -> Result<RawResult, GraphError> {
        self.inner.queries.write().push(query.to_string());

        let delay = *self.inner.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.inner.failure.read().clone() {
            return Err(error);
        }

        let fixtures = self.inner.fixtures.read();
        Ok(fixtures
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fixture_lookup_and_bookkeeping() {
        let backend = MemoryBackend::new().with_result(
            "TARGETS",
            RawResult::new(vec!["therapy_name".into()]).with_record(vec![json!("Vemurafenib")]),
        );
        let mut tx = backend.begin_tx(TxMode::ReadOnly).await.unwrap();
        let hit = backend.run(&mut tx, "MATCH (t)-[:TARGETS]->(g) RETURN t", RunOptions::default()).await.unwrap();
        let miss = backend.run(&mut tx, "MATCH (g:Gene) RETURN g", RunOptions::default()).await.unwrap();
        backend.rollback_tx(tx).await.unwrap();

        assert_eq!(hit.records, vec![vec![json!("Vemurafenib")]]);
        assert!(miss.records.is_empty());
        assert_eq!(backend.queries().len(), 2);
        assert_eq!((backend.commits(), backend.rollbacks()), (0, 1));
    }

    #[tokio::test]
    async fn test_refuses_write_transactions() {
        let backend = MemoryBackend::new();
        assert!(matches!(backend.begin_tx(TxMode::ReadWrite).await, Err(GraphError::TxMode(_))));
    }
}
