//! Read-only query execution.
//!
//! Runs a validated query against a `GraphBackend` inside a read-only
//! transaction that is always rolled back, bounded by the configured
//! timeout, and normalizes the rows. No retries: a failed query is
//! reported, not re-run.

pub mod normalize;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::config::PipelineConfig;
use crate::model::Row;
use crate::storage::{GraphBackend, GraphError, RunOptions};
use crate::tx::{Transaction, TxMode};
use crate::validator::GraphSchema;

pub use normalize::{coerce_list, RowNormalizer};

/// Execution failure, with the query that failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("query execution failed: {source}")]
pub struct ExecutionError {
    pub query: String,
    pub source: GraphError,
}

impl ExecutionError {
    pub fn new(query: impl Into<String>, source: GraphError) -> Self {
        Self { query: query.into(), source }
    }
}

/// Runs validated queries.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute_read(&self, query: &str) -> Result<Vec<Row>, ExecutionError>;
}

/// `QueryExecutor` over any `GraphBackend`.
#[derive(Debug)]
pub struct GraphExecutor<B: GraphBackend> {
    backend: B,
    normalizer: RowNormalizer,
    options: RunOptions,
}

impl<B: GraphBackend> GraphExecutor<B> {
    pub fn new(backend: B, schema: Arc<GraphSchema>, config: &PipelineConfig) -> Self {
        Self {
            backend,
            normalizer: RowNormalizer::new(schema),
            options: RunOptions { timeout: config.execution_timeout(), fetch_size: config.fetch_size() },
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }
}

#[async_trait]
impl<B: GraphBackend> QueryExecutor for GraphExecutor<B> {
    async fn execute_read(&self, query: &str) -> Result<Vec<Row>, ExecutionError> {
        let started = Instant::now();
        let fail = |source: GraphError| ExecutionError::new(query, source);

        let mut tx = self.backend.begin_tx(TxMode::ReadOnly).await.map_err(fail)?;
        if !tx.is_read_only() {
            let mode = tx.mode();
            let _ = self.backend.rollback_tx(tx).await;
            return Err(fail(GraphError::TxMode(mode)));
        }

        let outcome = tokio::time::timeout(
            self.options.timeout,
            self.backend.run(&mut tx, query, self.options),
        )
        .await;

        let tx_id = tx.id();
        if let Err(e) = self.backend.rollback_tx(tx).await {
            tracing::warn!(tx = %tx_id, error = %e, "rollback of read transaction failed");
        }

        let raw = match outcome {
            Ok(result) => result.map_err(fail)?,
            Err(_) => {
                tracing::warn!(timeout = ?self.options.timeout, "query timed out");
                return Err(fail(GraphError::Timeout(self.options.timeout)));
            }
        };

        let rows = self.normalizer.normalize(raw);
        tracing::debug!(rows = rows.len(), elapsed_ms = started.elapsed().as_millis() as u64, "query executed");
        Ok(rows)
    }
}
