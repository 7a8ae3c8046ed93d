//! # Query Validator
//!
//! The security boundary between LLM-drafted Cypher and the database.
//! Validation is a pure function: no I/O, no state, same input → same output.
//!
//! ## Passes
//!
//! | Pass | Rejects with |
//! |------|--------------|
//! | Tokenize (masks string literals) | `Malformed` |
//! | Parameters | `ParameterUse` |
//! | Keyword blocklist / unsupported clauses | `UnknownKeyword` |
//! | Comments, multiple statements | `Malformed` |
//! | Query start, function allowlist | `UnknownKeyword` |
//! | Labels, relationship types, properties | `SchemaViolation` |
//! | `RETURN` present, `LIMIT` shape | `Malformed` |
//!
//! Accepted queries are rewritten, never stripped: the result limit is
//! appended or clamped, and equality on name-like properties becomes
//! case-insensitive. Validating a rewritten query returns it unchanged.

pub mod rewrite;
pub mod rules;
pub mod scan;
pub mod schema;

use std::fmt;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::cypher::{tokenize, Token, TokenKind};

pub use schema::GraphSchema;

// ============================================================================
// Errors
// ============================================================================

/// What kind of schema element failed the allowlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Label,
    RelationshipType,
    Property,
    /// `x['name']` or `x {.*}`
    DynamicAccess,
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchemaKind::Label => "label",
            SchemaKind::RelationshipType => "relationship type",
            SchemaKind::Property => "property",
            SchemaKind::DynamicAccess => "dynamic property access",
        })
    }
}

/// Why a query was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("forbidden or unsupported keyword: {keyword}")]
    UnknownKeyword { keyword: String },

    #[error("{kind} not in schema: {name}")]
    SchemaViolation { kind: SchemaKind, name: String },

    #[error("query parameters are not allowed: ${name}")]
    ParameterUse { name: String },

    #[error("malformed query at position {position}: {message}")]
    Malformed { position: usize, message: String },
}

impl ValidationError {
    pub fn malformed(position: usize, message: impl Into<String>) -> Self {
        ValidationError::Malformed { position, message: message.into() }
    }

    /// Stable short name for traces and API error codes.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::UnknownKeyword { .. } => "unknown_keyword",
            ValidationError::SchemaViolation { .. } => "schema_violation",
            ValidationError::ParameterUse { .. } => "parameter_use",
            ValidationError::Malformed { .. } => "malformed",
        }
    }
}

// ============================================================================
// Validator trait
// ============================================================================

/// Check a candidate query and return the (possibly rewritten) query to run.
pub trait QueryValidator: Send + Sync {
    fn validate(&self, query: &str) -> Result<String, ValidationError>;
}

/// Lexical/structural validator driven by a [`GraphSchema`].
#[derive(Debug, Clone)]
pub struct RuleBasedValidator {
    schema: Arc<GraphSchema>,
    default_limit: u64,
    max_limit: u64,
}

impl RuleBasedValidator {
    pub fn new(schema: Arc<GraphSchema>, config: &PipelineConfig) -> Self {
        Self {
            schema,
            default_limit: config.default_limit(),
            max_limit: config.max_limit(),
        }
    }

    pub fn schema(&self) -> &GraphSchema {
        &self.schema
    }
}

impl Default for RuleBasedValidator {
    fn default() -> Self {
        Self::new(Arc::new(GraphSchema::oncology()), &PipelineConfig::default())
    }
}

impl QueryValidator for RuleBasedValidator {
    fn validate(&self, query: &str) -> Result<String, ValidationError> {
        let body = strip_terminator(query);
        if body.is_empty() {
            return Err(ValidationError::malformed(0, "empty query"));
        }

        let tokens = tokenize(body)
            .map_err(|e| ValidationError::Malformed { position: e.position, message: e.message })?;

        check_parameters(&tokens)?;
        check_keywords(&tokens, body)?;
        check_statement_shape(&tokens)?;
        check_query_start(&tokens)?;

        let scan = scan::Scan::new(&tokens)?;
        scan::check_functions(&scan)?;
        scan::check_clause_words(&scan)?;
        scan::check_schema(&scan, &self.schema)?;

        let mut edits = rewrite::limit_edits(&scan, body, self.default_limit, self.max_limit)?;
        edits.extend(rewrite::case_insensitive_edits(&scan, body, &self.schema));

        let rewritten = rewrite::apply(body, edits);
        if rewritten != body {
            tracing::debug!(original = body, rewritten = %rewritten, "query rewritten");
        }
        Ok(rewritten)
    }
}

/// Trim and drop a single trailing `;`.
fn strip_terminator(query: &str) -> &str {
    let trimmed = query.trim();
    trimmed.strip_suffix(';').map_or(trimmed, str::trim_end)
}

fn check_parameters(tokens: &[Token]) -> Result<(), ValidationError> {
    match tokens.iter().find(|t| t.kind == TokenKind::Parameter) {
        Some(t) => Err(ValidationError::ParameterUse { name: t.text.clone() }),
        None => Ok(()),
    }
}

/// Forbidden and unsupported keywords, matched on whole unquoted words.
/// Literals containing backslash escapes are also scanned, since a
/// different escape interpretation could end them early.
fn check_keywords(tokens: &[Token], source: &str) -> Result<(), ValidationError> {
    for tok in tokens {
        match tok.kind {
            TokenKind::Identifier => {
                let word = tok.upper();
                if rules::is_forbidden(&word) || rules::is_unsupported_clause(&word) {
                    return Err(ValidationError::UnknownKeyword { keyword: word });
                }
            }
            TokenKind::StringLiteral => {
                let raw = tok.raw(source);
                if raw.contains('\\') {
                    if let Some(word) = rules::forbidden_words_in(raw) {
                        return Err(ValidationError::UnknownKeyword { keyword: word });
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// One statement, no comments, no back-to-back literals (`'a''b'`).
fn check_statement_shape(tokens: &[Token]) -> Result<(), ValidationError> {
    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::Comment => {
                return Err(ValidationError::malformed(tok.span.start, "comments are not allowed"));
            }
            TokenKind::Semicolon => {
                return Err(ValidationError::malformed(
                    tok.span.start,
                    "multiple statements are not allowed",
                ));
            }
            TokenKind::StringLiteral => {
                if let Some(next) = tokens.get(i + 1) {
                    if next.kind == TokenKind::StringLiteral {
                        return Err(ValidationError::malformed(
                            next.span.start,
                            "adjacent string literals",
                        ));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_query_start(tokens: &[Token]) -> Result<(), ValidationError> {
    let first = &tokens[0];
    if rules::QUERY_STARTERS.contains(&first.upper().as_str()) && first.kind.is_keyword() {
        return Ok(());
    }
    match first.kind {
        TokenKind::Identifier => Err(ValidationError::UnknownKeyword { keyword: first.upper() }),
        _ => Err(ValidationError::malformed(
            first.span.start,
            "query must start with MATCH, OPTIONAL MATCH, WITH, UNWIND or RETURN",
        )),
    }
}
