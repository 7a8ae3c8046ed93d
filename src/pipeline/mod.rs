//! # Pipeline Adapters
//!
//! The three LLM-backed steps around the validator and executor. Each is a
//! trait so the engine can run against real models, offline templates, or
//! test stubs. Every operation takes the request's trace sink so adapter
//! events (cache hits, retry attempts) land in the same trace as the
//! engine's step events.

pub mod expander;
pub mod generator;
pub mod prompts;
pub mod summarizer;

use async_trait::async_trait;

use crate::llm::LlmError;
use crate::model::Row;
use crate::trace::TraceSink;

pub use expander::{LlmInstructionExpander, TemplateExpander};
pub use generator::{extract_cypher, LlmCypherGenerator};
pub use summarizer::{format_rows, LlmSummarizer};

/// Question → schema-aware instruction text.
#[async_trait]
pub trait InstructionExpander: Send + Sync {
    async fn expand_instructions(&self, question: &str, trace: &dyn TraceSink) -> Result<String, LlmError>;
}

/// Instruction text → draft Cypher. The draft is untrusted.
#[async_trait]
pub trait CypherGenerator: Send + Sync {
    async fn generate_cypher(&self, instructions: &str, trace: &dyn TraceSink) -> Result<String, LlmError>;
}

/// Question plus result rows → answer text with citations.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, question: &str, rows: &[Row], trace: &dyn TraceSink) -> Result<String, LlmError>;
}

/// Trimmed input, or `InvalidInput` when blank.
pub(crate) fn require_text<'a>(text: &'a str, what: &str) -> Result<&'a str, LlmError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(LlmError::InvalidInput(format!("{what} must be a non-empty string")));
    }
    Ok(text)
}
