//! Span-based rewrites: result limits and case-insensitive equality.
//!
//! Edits are computed against the original text and spliced back in, so
//! everything outside an edited span stays byte-identical.

use crate::cypher::{Span, TokenKind};

use super::scan::{Frame, Scan};
use super::schema::GraphSchema;
use super::ValidationError;

/// Replace `span` with `replacement`. An empty span at the end of the text
/// is an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub span: Span,
    pub replacement: String,
}

impl Edit {
    pub fn replace(span: Span, replacement: impl Into<String>) -> Self {
        Self { span, replacement: replacement.into() }
    }

    pub fn append(at: usize, text: impl Into<String>) -> Self {
        Self { span: Span { start: at, end: at }, replacement: text.into() }
    }
}

/// Apply non-overlapping edits, last first so earlier spans stay valid.
pub fn apply(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by(|a, b| b.span.start.cmp(&a.span.start));
    let mut out = source.to_string();
    for edit in edits {
        out.replace_range(edit.span.start..edit.span.end, &edit.replacement);
    }
    out
}

// ============================================================================
// Result limit
// ============================================================================

/// Tokens that may follow `LIMIT n`.
fn ends_limit(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Eof
            | TokenKind::Match
            | TokenKind::Optional
            | TokenKind::With
            | TokenKind::Unwind
            | TokenKind::Return
            | TokenKind::RBrace
    )
}

/// Clamp every `LIMIT` to `max_limit` and make sure the final `RETURN`
/// carries exactly one, appending `LIMIT default_limit` when it has none.
pub fn limit_edits(
    scan: &Scan<'_>,
    source: &str,
    default_limit: u64,
    max_limit: u64,
) -> Result<Vec<Edit>, ValidationError> {
    let tokens = scan.tokens();
    let mut edits = Vec::new();

    for i in 0..scan.len() {
        if scan.kind(i) != TokenKind::Limit {
            continue;
        }
        let limit = &tokens[i];
        let value = &tokens[i + 1];
        if value.kind != TokenKind::Integer || !ends_limit(scan.kind(i + 2)) {
            return Err(ValidationError::malformed(
                limit.span.start,
                "LIMIT must be followed by a single integer literal",
            ));
        }
        // Anything that does not fit in u64 is over the cap
        let n = value.text.parse::<u64>().unwrap_or(u64::MAX);
        if n > max_limit {
            edits.push(Edit::replace(value.span, max_limit.to_string()));
        }
    }

    let final_return = scan
        .final_return()
        .ok_or_else(|| ValidationError::malformed(source.len(), "query has no RETURN clause"))?;
    let final_limits: Vec<usize> = (final_return + 1..scan.len())
        .filter(|&i| scan.kind(i) == TokenKind::Limit && scan.depth(i) == 0)
        .collect();

    match final_limits.as_slice() {
        [] => edits.push(Edit::append(source.len(), format!(" LIMIT {default_limit}"))),
        [_] => {}
        [_, second, ..] => {
            return Err(ValidationError::malformed(
                tokens[*second].span.start,
                "more than one LIMIT after the final RETURN",
            ));
        }
    }

    Ok(edits)
}

// ============================================================================
// Case-insensitive equality
// ============================================================================

/// `a.name = 'x'` → `toLower(a.name) = toLower('x')` for name-like
/// properties, so matches do not depend on the literal's casing.
pub fn case_insensitive_edits(scan: &Scan<'_>, source: &str, schema: &GraphSchema) -> Vec<Edit> {
    let tokens = scan.tokens();
    let mut edits = Vec::new();

    for i in 0..scan.len().saturating_sub(4) {
        let shape = tokens[i].kind.is_name()
            && tokens[i + 1].kind == TokenKind::Dot
            && tokens[i + 2].kind.is_name()
            && tokens[i + 3].kind == TokenKind::Eq
            && tokens[i + 4].kind == TokenKind::StringLiteral;
        if !shape || !schema.is_case_insensitive(&tokens[i + 2].text) {
            continue;
        }
        let bound_left = i == 0
            || !matches!(
                tokens[i - 1].kind,
                TokenKind::Dot
                    | TokenKind::Plus
                    | TokenKind::Dash
                    | TokenKind::Star
                    | TokenKind::Slash
                    | TokenKind::Percent
                    | TokenKind::Caret
            );
        let bound_right = !matches!(
            scan.kind(i + 5),
            TokenKind::Plus | TokenKind::Dot | TokenKind::LBracket
        );
        if !bound_left || !bound_right || scan.enclosing(i).is_some_and(|f| f == Frame::PropertyMap) {
            continue;
        }

        let lhs = Span { start: tokens[i].span.start, end: tokens[i + 2].span.end };
        let rhs = tokens[i + 4].span;
        edits.push(Edit::replace(lhs, format!("toLower({})", &source[lhs.start..lhs.end])));
        edits.push(Edit::replace(rhs, format!("toLower({})", &source[rhs.start..rhs.end])));
    }

    edits
}
