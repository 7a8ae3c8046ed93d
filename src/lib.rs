//! # oncograph: Natural-Language Questions over an Oncology Knowledge Graph
//!
//! Questions are answered by a five-step pipeline: an LLM expands the
//! question into schema-aware instructions, drafts a Cypher query, a
//! rule-based validator checks and rewrites it, the query runs in a
//! read-only transaction, and an LLM summarizes the rows with citations.
//!
//! ## Design Principles
//!
//! 1. **Validator is the boundary**: LLM output is untrusted; nothing reaches the
//!    database without passing `QueryValidator`
//! 2. **Trait-first**: every step is a trait object, so the engine never names a provider
//! 3. **Fail fast**: every error aborts the run with the step that failed
//! 4. **Observable**: every step emits start/end/error events to a `TraceSink`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use oncograph::{
//!     GraphExecutor, GraphSchema, HttpBackend, PipelineConfig, QueryEngine,
//!     RuleBasedValidator, Neo4jSection,
//! };
//! use oncograph::pipeline::{TemplateExpander, LlmCypherGenerator, LlmSummarizer};
//! use oncograph::llm::{GeminiClient, GeminiConfig, LlmCall, RetryPolicy};
//! use oncograph::trace::ConsoleTraceSink;
//!
//! # async fn example() -> oncograph::Result<()> {
//! let schema = Arc::new(GraphSchema::oncology());
//! let config = PipelineConfig::default();
//! let gemini = GeminiClient::new(GeminiConfig::new("api-key", "gemini-2.5-flash"))
//!     .map_err(|e| oncograph::Error::Config(e.to_string()))?;
//! let gemini = Arc::new(gemini);
//!
//! let engine = QueryEngine::new(
//!     Arc::new(TemplateExpander::new(schema.clone())),
//!     Arc::new(LlmCypherGenerator::new(LlmCall::new("generator", gemini.clone(), RetryPolicy::default()), schema.clone())),
//!     Arc::new(RuleBasedValidator::new(schema.clone(), &config)),
//!     Arc::new(GraphExecutor::new(HttpBackend::new(&Neo4jSection::default())?, schema.clone(), &config)),
//!     Arc::new(LlmSummarizer::new(LlmCall::new("summarizer", gemini, RetryPolicy::default()))),
//!     Arc::new(ConsoleTraceSink),
//! );
//!
//! let result = engine.run("What drugs target BRAF?").await?;
//! println!("{}\n{}", result.answer, result.query);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Role |
//! |--------|------|
//! | `validator` | Keyword/schema allowlists, limit and case rewrites |
//! | `executor` | Read-only execution, timeout, row normalization |
//! | `pipeline` | Expander, generator, summarizer adapters |
//! | `llm` | Provider trait, Gemini client, retry, cache wrapper |
//! | `cache` | TTL cache and stable cache keys |
//! | `trace` | Trace events and composable sinks |
//! | `engine` | Five-step orchestrator |
//! | `setup` | Settings → engine and trace sink wiring |
//! | `server` | HTTP API (feature `server`) |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod config;
pub mod cypher;
pub mod validator;
pub mod cache;
pub mod trace;
pub mod llm;
pub mod pipeline;
pub mod storage;
pub mod tx;
pub mod executor;
pub mod engine;
pub mod setup;
#[cfg(feature = "server")]
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{Row, Value};
pub use config::{PipelineConfig, Settings, Neo4jSection};
pub use validator::{GraphSchema, QueryValidator, RuleBasedValidator, SchemaKind, ValidationError};
pub use cache::{TtlCache, stable_hash};
pub use trace::{TraceEvent, TraceSink};
pub use llm::{LlmError, TextGenerator};
pub use storage::{GraphBackend, GraphError, HttpBackend, RunOptions};
pub use tx::{Transaction, TxMode, TxId};
pub use executor::{ExecutionError, GraphExecutor, QueryExecutor};
pub use engine::{QueryEngine, QueryEngineResult, Step};

// ============================================================================
// Error Types
// ============================================================================

/// Pipeline error, scoped to the step that produced it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("instruction expansion failed: {0}")]
    Expansion(#[source] LlmError),

    #[error("query generation failed: {0}")]
    Generation(#[source] LlmError),

    #[error("query rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("summarization failed: {0}")]
    Summarization(#[source] LlmError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Pipeline step this error came from, if any.
    pub fn step(&self) -> Option<Step> {
        match self {
            Error::Expansion(_) => Some(Step::Expand),
            Error::Generation(_) => Some(Step::Generate),
            Error::Validation(_) => Some(Step::Validate),
            Error::Execution(_) => Some(Step::Execute),
            Error::Summarization(_) => Some(Step::Summarize),
            Error::Config(_) | Error::Io(_) => None,
        }
    }

    /// Stable internal code for API clients. Never carries upstream text.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Expansion(_) | Error::Generation(_) | Error::Summarization(_) => {
                "UPSTREAM_LLM_FAILURE"
            }
            Error::Validation(_) => "VALIDATION_REJECTED",
            Error::Execution(_) => "QUERY_EXECUTION_FAILED",
            Error::Config(_) | Error::Io(_) => "INTERNAL_ERROR",
        }
    }

    /// Short error class for traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Expansion(e) | Error::Generation(e) | Error::Summarization(e) => e.kind(),
            Error::Validation(e) => e.kind(),
            Error::Execution(e) => e.source.kind(),
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
