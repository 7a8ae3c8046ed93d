//! # Cypher Language
//!
//! Tokenizer for the read-only Cypher subset the validator accepts.
//! Pure functions with no I/O or state.

pub mod lexer;

pub use lexer::{tokenize, Span, Token, TokenKind};

/// Tokenization failure at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at position {position}")]
pub struct LexError {
    pub position: usize,
    pub message: String,
}

impl LexError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self { position, message: message.into() }
    }
}
