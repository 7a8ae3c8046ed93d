//! # LLM Plumbing
//!
//! `TextGenerator` is the provider contract; `GeminiClient` implements it
//! over REST. `LlmCall` wraps a generator with the shared call policy:
//! cache lookup, bounded retry with backoff, and per-attempt trace events.

pub mod call;
pub mod gemini;
pub mod retry;

use async_trait::async_trait;

pub use call::LlmCall;
pub use gemini::{GeminiClient, GeminiConfig};
pub use retry::{AttemptOutcome, RetryPolicy};

/// Text-in, text-out model call.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Model identifier, part of the cache key.
    fn model(&self) -> &str;

    /// Sampling temperature, part of the cache key.
    fn temperature(&self) -> f32;
}

/// LLM call failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    /// Non-success HTTP response, with the provider's error body when parseable.
    #[error("provider returned HTTP {status}: {message}")]
    Provider {
        status: u16,
        code: Option<i64>,
        reason: Option<String>,
        message: String,
    },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl LlmError {
    /// Worth retrying: rate limits, server errors, timeouts, connection failures.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Provider { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            LlmError::Timeout | LlmError::Transport(_) => true,
            LlmError::EmptyResponse | LlmError::InvalidResponse(_) | LlmError::InvalidInput(_) => {
                false
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::Provider { .. } => "provider",
            LlmError::Timeout => "timeout",
            LlmError::Transport(_) => "transport",
            LlmError::EmptyResponse => "empty_response",
            LlmError::InvalidResponse(_) => "invalid_response",
            LlmError::InvalidInput(_) => "invalid_input",
        }
    }

    /// HTTP status of a provider error.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::InvalidResponse(e.to_string())
        } else {
            LlmError::Transport(e.to_string())
        }
    }
}
