//! # Graph Backend Trait
//!
//! The contract between the executor and a graph database. The pipeline
//! only ever runs validated read queries, so the surface is small:
//! transactions plus "run this Cypher and hand back rows".
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `HttpBackend` | `http` | Neo4j transactional HTTP API |
//! | `MemoryBackend` | `memory` | Canned results for tests and offline demos |

pub mod http;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tx::{Transaction, TxMode};

pub use http::HttpBackend;
pub use memory::MemoryBackend;

// ============================================================================
// Run options and results
// ============================================================================

/// Per-query execution knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Deadline for the whole query, including reading the result
    pub timeout: Duration,
    /// Records requested per batch; advisory for backends that buffer
    pub fetch_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(15), fetch_size: 100 }
    }
}

/// Columns and records exactly as the database returned them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub columns: Vec<String>,
    pub records: Vec<Vec<serde_json::Value>>,
}

impl RawResult {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, records: Vec::new() }
    }

    pub fn with_record(mut self, record: Vec<serde_json::Value>) -> Self {
        self.records.push(record);
        self
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Backend failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    /// The database refused the statement (syntax, security, runtime).
    #[error("database rejected query [{code}]: {message}")]
    Rejected { code: String, message: String },

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("transaction mode {0:?} is not supported here")]
    TxMode(TxMode),
}

impl GraphError {
    pub fn kind(&self) -> &'static str {
        match self {
            GraphError::Timeout(_) => "timeout",
            GraphError::Connection(_) => "connection",
            GraphError::Rejected { .. } => "rejected",
            GraphError::Protocol(_) => "protocol",
            GraphError::TxMode(_) => "tx_mode",
        }
    }
}

// ============================================================================
// GraphBackend Trait
// ============================================================================

#[async_trait]
pub trait GraphBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    /// Begin a new transaction.
    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx, GraphError>;

    /// Commit a transaction.
    async fn commit_tx(&self, tx: Self::Tx) -> Result<(), GraphError>;

    /// Roll back a transaction.
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<(), GraphError>;

    /// Run one Cypher statement inside `tx`.
    async fn run(&self, tx: &mut Self::Tx, query: &str, options: RunOptions) -> Result<RawResult, GraphError>;

    /// Release connections. Default: nothing to release.
    async fn shutdown(&self) -> Result<(), GraphError> {
        Ok(())
    }
}
