//! Bracket-frame scan over a token stream.
//!
//! Cypher reuses `:` for labels, relationship types and map keys, and `{`
//! for property maps, map projections, map literals and subqueries. The
//! scan records, for every token, which bracket frame encloses it so the
//! schema walk can tell these apart without a full grammar.

use smallvec::SmallVec;

use crate::cypher::{Token, TokenKind};

use super::rules;
use super::schema::GraphSchema;
use super::{SchemaKind, ValidationError};

/// Kind of bracketed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// `(` in a node pattern or a parenthesized expression
    Paren,
    /// `(` directly after a function name
    Call,
    /// `[` after `-` or `<-`
    RelPattern,
    /// Any other `[`: list literal, comprehension, index, slice
    List,
    /// `{` inside a node or relationship pattern; keys are properties
    PropertyMap,
    /// `{` after a variable: `g {.symbol, alias: expr}`
    Projection,
    /// Free-standing `{key: value}`
    MapLiteral,
    /// `{` after EXISTS, COUNT or COLLECT
    Subquery,
}

impl Frame {
    fn closer(self) -> TokenKind {
        match self {
            Frame::Paren | Frame::Call => TokenKind::RParen,
            Frame::RelPattern | Frame::List => TokenKind::RBracket,
            Frame::PropertyMap | Frame::Projection | Frame::MapLiteral | Frame::Subquery => {
                TokenKind::RBrace
            }
        }
    }

    fn is_map(self) -> bool {
        matches!(self, Frame::PropertyMap | Frame::Projection | Frame::MapLiteral)
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    enclosing: Option<Frame>,
    depth: usize,
    opens: Option<Frame>,
}

/// Token stream annotated with its bracket structure.
#[derive(Debug)]
pub struct Scan<'t> {
    tokens: &'t [Token],
    slots: Vec<Slot>,
}

impl<'t> Scan<'t> {
    /// Annotate `tokens` (which must end with `Eof`). Unbalanced or
    /// mismatched brackets are malformed.
    pub fn new(tokens: &'t [Token]) -> Result<Self, ValidationError> {
        let mut stack: SmallVec<[(Frame, usize); 16]> = SmallVec::new();
        let mut slots = Vec::with_capacity(tokens.len());

        for (i, tok) in tokens.iter().enumerate() {
            let top = stack.last().map(|(f, _)| *f);
            match tok.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    let frame = classify_opener(tokens, i, stack.last().copied());
                    slots.push(Slot { enclosing: top, depth: stack.len(), opens: Some(frame) });
                    stack.push((frame, i));
                }
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    match stack.pop() {
                        Some((frame, _)) if frame.closer() == tok.kind => {}
                        _ => {
                            return Err(ValidationError::malformed(
                                tok.span.start,
                                format!("unbalanced '{}'", tok.text),
                            ));
                        }
                    }
                    slots.push(Slot {
                        enclosing: stack.last().map(|(f, _)| *f),
                        depth: stack.len(),
                        opens: None,
                    });
                }
                _ => slots.push(Slot { enclosing: top, depth: stack.len(), opens: None }),
            }
        }

        if let Some((_, open)) = stack.first() {
            return Err(ValidationError::malformed(
                tokens[*open].span.start,
                format!("unclosed '{}'", tokens[*open].text),
            ));
        }

        Ok(Self { tokens, slots })
    }

    pub fn tokens(&self) -> &'t [Token] {
        self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Innermost frame around token `i`. Brackets belong to the outer frame.
    pub fn enclosing(&self, i: usize) -> Option<Frame> {
        self.slots.get(i).and_then(|s| s.enclosing)
    }

    /// Bracket nesting depth of token `i`.
    pub fn depth(&self, i: usize) -> usize {
        self.slots.get(i).map_or(0, |s| s.depth)
    }

    /// Frame opened by token `i`, if it is an opening bracket.
    pub fn opens(&self, i: usize) -> Option<Frame> {
        self.slots.get(i).and_then(|s| s.opens)
    }

    /// Kind of token `i`, `Eof` past the end.
    pub fn kind(&self, i: usize) -> TokenKind {
        self.tokens.get(i).map_or(TokenKind::Eof, |t| t.kind)
    }

    /// Index of the last `RETURN` outside every bracket.
    pub fn final_return(&self) -> Option<usize> {
        (0..self.len())
            .rev()
            .find(|&i| self.kind(i) == TokenKind::Return && self.depth(i) == 0)
    }
}

fn classify_opener(tokens: &[Token], i: usize, top: Option<(Frame, usize)>) -> Frame {
    let prev = i.checked_sub(1).map(|p| &tokens[p]);
    let prev_kind = prev.map(|t| t.kind);

    match tokens[i].kind {
        TokenKind::LParen => match prev_kind {
            Some(k) if k.is_name() || k == TokenKind::Exists => Frame::Call,
            _ => Frame::Paren,
        },
        TokenKind::LBracket => match prev_kind {
            Some(TokenKind::Dash) | Some(TokenKind::LeftArrow) => Frame::RelPattern,
            _ => Frame::List,
        },
        _ => {
            let opens_subquery = prev
                .filter(|t| t.is_word())
                .is_some_and(|t| rules::SUBQUERY_OPENERS.contains(&t.upper().as_str()));
            if opens_subquery {
                Frame::Subquery
            } else if is_pattern_map(tokens, i, top) {
                Frame::PropertyMap
            } else if prev_kind.is_some_and(TokenKind::is_name) {
                Frame::Projection
            } else {
                Frame::MapLiteral
            }
        }
    }
}

/// `{` right after the variable or label of a node or relationship pattern,
/// or right after the pattern's opening bracket.
fn is_pattern_map(tokens: &[Token], i: usize, top: Option<(Frame, usize)>) -> bool {
    let follows_element = i.checked_sub(1).is_some_and(|p| {
        let kind = tokens[p].kind;
        kind.is_name() || matches!(kind, TokenKind::LParen | TokenKind::LBracket)
    });
    match top {
        Some((Frame::RelPattern, _)) => follows_element,
        Some((Frame::Paren, open)) => follows_element && is_node_pattern(tokens, open),
        _ => false,
    }
}

/// Whether the `(` at `open` starts a node pattern rather than a
/// parenthesized expression.
fn is_node_pattern(tokens: &[Token], open: usize) -> bool {
    const JOINS: [TokenKind; 3] = [TokenKind::Dash, TokenKind::Arrow, TokenKind::LeftArrow];

    let prev = open.checked_sub(1).map(|p| tokens[p].kind);
    if prev.is_some_and(|k| k == TokenKind::Match || JOINS.contains(&k)) {
        return true;
    }
    let next = matching_close(tokens, open).and_then(|close| tokens.get(close + 1)).map(|t| t.kind);
    if next.is_some_and(|k| JOINS.contains(&k)) {
        return true;
    }
    match prev {
        // `EXISTS { (g:Gene {symbol: 'BRAF'}) }`
        Some(TokenKind::LBrace) => true,
        // `MATCH (a), (b {...})` and `MATCH p = (a {...})`
        Some(TokenKind::Comma) | Some(TokenKind::Eq) => clause_of(tokens, open) == Some(TokenKind::Match),
        _ => false,
    }
}

fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (j, tok) in tokens.iter().enumerate().skip(open) {
        match tok.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
    }
    None
}

/// Clause keyword governing position `before`, looking back within the
/// same bracket frame.
fn clause_of(tokens: &[Token], before: usize) -> Option<TokenKind> {
    const CLAUSES: [TokenKind; 6] = [
        TokenKind::Match,
        TokenKind::Where,
        TokenKind::With,
        TokenKind::Return,
        TokenKind::Unwind,
        TokenKind::Order,
    ];

    let mut depth = 0usize;
    for tok in tokens[..before].iter().rev() {
        match tok.kind {
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => depth += 1,
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                depth = depth.checked_sub(1)?;
            }
            k if depth == 0 && CLAUSES.contains(&k) => return Some(k),
            _ => {}
        }
    }
    None
}

// ============================================================================
// Function calls
// ============================================================================

/// Reject calls outside the read-only function allowlist, including any
/// namespaced call such as `apoc.meta.schema()`.
pub fn check_functions(scan: &Scan<'_>) -> Result<(), ValidationError> {
    let tokens = scan.tokens();
    for i in 0..scan.len() {
        if scan.opens(i) != Some(Frame::Call) {
            continue;
        }
        let name = &tokens[i - 1];
        if name.kind == TokenKind::Exists {
            continue;
        }
        if i >= 2 && scan.kind(i - 2) == TokenKind::Dot {
            return Err(ValidationError::UnknownKeyword { keyword: qualified_name(tokens, i - 1) });
        }
        if !rules::is_allowed_function(&name.text) {
            return Err(ValidationError::UnknownKeyword { keyword: name.text.clone() });
        }
    }
    Ok(())
}

// ============================================================================
// Clause positions
// ============================================================================

/// Reject a bare word standing where only a clause keyword can: directly
/// after a complete expression at statement level, e.g. the `FOO` in
/// `MATCH (g) FOO RETURN g`.
pub fn check_clause_words(scan: &Scan<'_>) -> Result<(), ValidationError> {
    let tokens = scan.tokens();
    for i in 1..scan.len() {
        let tok = &tokens[i];
        if tok.kind != TokenKind::Identifier {
            continue;
        }
        let statement_level = scan.depth(i) == 0 || scan.enclosing(i) == Some(Frame::Subquery);
        if statement_level && ends_expression(scan.kind(i - 1)) && !rules::is_clause_position_word(&tok.upper()) {
            return Err(ValidationError::UnknownKeyword { keyword: tok.upper() });
        }
    }
    Ok(())
}

fn ends_expression(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::RParen
            | TokenKind::RBracket
            | TokenKind::RBrace
            | TokenKind::Identifier
            | TokenKind::QuotedIdentifier
            | TokenKind::Integer
            | TokenKind::Float
            | TokenKind::StringLiteral
            | TokenKind::Null
            | TokenKind::True
            | TokenKind::False
            | TokenKind::End
    )
}

fn qualified_name(tokens: &[Token], mut last: usize) -> String {
    let mut parts = vec![tokens[last].text.as_str()];
    while last >= 2 && tokens[last - 1].kind == TokenKind::Dot && tokens[last - 2].kind.is_name() {
        last -= 2;
        parts.push(tokens[last].text.as_str());
    }
    parts.reverse();
    parts.join(".")
}

// ============================================================================
// Schema walk
// ============================================================================

/// Check every label, relationship type and property name against the
/// schema allowlists.
pub fn check_schema(scan: &Scan<'_>, schema: &GraphSchema) -> Result<(), ValidationError> {
    let tokens = scan.tokens();
    let mut i = 0;
    while i < scan.len() {
        let tok = &tokens[i];
        match tok.kind {
            TokenKind::Colon => {
                let in_rel = scan.enclosing(i) == Some(Frame::RelPattern);
                i = label_expression(scan, schema, i + 1, in_rel)?;
                continue;
            }
            TokenKind::Is => {
                // `(p IS Gene)`, `-[r IS TARGETS]-`, `WHERE x IS Gene`; not
                // `IS [NOT] NULL`, and `IS ::` type predicates fall to the `:` arm
                let mut j = i + 1;
                if scan.kind(j) == TokenKind::Not {
                    j += 1;
                }
                if !matches!(scan.kind(j), TokenKind::Null | TokenKind::Colon) {
                    let in_rel = scan.enclosing(i) == Some(Frame::RelPattern);
                    i = label_expression(scan, schema, j, in_rel)?;
                    continue;
                }
            }
            TokenKind::Dot => {
                let next = &tokens[i + 1];
                match next.kind {
                    k if k.is_name() || next.is_word() => {
                        // Namespaced calls are handled by `check_functions`
                        if scan.kind(i + 2) != TokenKind::LParen {
                            require(schema.has_property(&next.text), SchemaKind::Property, &next.text)?;
                        }
                    }
                    TokenKind::Star => {
                        return Err(ValidationError::SchemaViolation {
                            kind: SchemaKind::Property,
                            name: "*".into(),
                        });
                    }
                    _ => {
                        return Err(ValidationError::malformed(
                            tok.span.start,
                            "expected a property name after '.'",
                        ));
                    }
                }
                i += 2;
                continue;
            }
            TokenKind::LBracket if is_dynamic_access(scan, i) => {
                return Err(ValidationError::SchemaViolation {
                    kind: SchemaKind::DynamicAccess,
                    name: tokens[i + 1].text.clone(),
                });
            }
            _ if is_map_key(scan, i) => {
                if scan.enclosing(i) == Some(Frame::PropertyMap) {
                    require(schema.has_property(&tok.text), SchemaKind::Property, &tok.text)?;
                }
                // Skip the key's colon
                i += 2;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

fn require(ok: bool, kind: SchemaKind, name: &str) -> Result<(), ValidationError> {
    if ok {
        Ok(())
    } else {
        Err(ValidationError::SchemaViolation { kind, name: name.to_string() })
    }
}

fn is_map_key(scan: &Scan<'_>, i: usize) -> bool {
    let tok = &scan.tokens()[i];
    (tok.kind.is_name() || tok.is_word())
        && scan.enclosing(i).is_some_and(Frame::is_map)
        && scan.kind(i + 1) == TokenKind::Colon
        && i > 0
        && matches!(scan.kind(i - 1), TokenKind::LBrace | TokenKind::Comma)
}

/// Subscript on a value: `g['symbol']`, `g[key]`, `g[toLower('x')]`. Any key
/// other than an integer index or slice can name a property the allowlist
/// never sees.
fn is_dynamic_access(scan: &Scan<'_>, i: usize) -> bool {
    if scan.opens(i) != Some(Frame::List) || i == 0 {
        return false;
    }
    let subscripted = matches!(
        scan.kind(i - 1),
        TokenKind::Identifier
            | TokenKind::QuotedIdentifier
            | TokenKind::RParen
            | TokenKind::RBracket
            | TokenKind::RBrace
    );
    if !subscripted {
        return false;
    }

    let depth = scan.depth(i);
    let mut j = i + 1;
    while j < scan.len() && scan.depth(j) > depth {
        if !matches!(scan.kind(j), TokenKind::Integer | TokenKind::DotDot | TokenKind::Dash) {
            return true;
        }
        j += 1;
    }
    // `g[]`
    j == i + 1
}

/// Walk a label expression starting at `j` (just after `:` or `IS`). Names chain
/// through `:`, `|` and `&`, optionally negated with `!`. Returns the index
/// of the first token after the expression.
fn label_expression(
    scan: &Scan<'_>,
    schema: &GraphSchema,
    mut j: usize,
    in_rel: bool,
) -> Result<usize, ValidationError> {
    let tokens = scan.tokens();
    loop {
        while scan.kind(j) == TokenKind::Bang {
            j += 1;
        }
        let tok = &tokens[j.min(tokens.len() - 1)];
        if !tok.kind.is_name() && !tok.is_word() {
            return Err(ValidationError::malformed(
                tok.span.start,
                if in_rel { "expected a relationship type" } else { "expected a label" },
            ));
        }
        if in_rel {
            require(schema.has_relationship_type(&tok.text), SchemaKind::RelationshipType, &tok.text)?;
        } else {
            require(schema.has_label(&tok.text), SchemaKind::Label, &tok.text)?;
        }
        j += 1;

        let connector = scan.kind(j);
        if !matches!(connector, TokenKind::Colon | TokenKind::Pipe | TokenKind::Ampersand) {
            return Ok(j);
        }
        let mut next = j + 1;
        if connector == TokenKind::Pipe && scan.kind(next) == TokenKind::Colon {
            next += 1;
        }
        while scan.kind(next) == TokenKind::Bang {
            next += 1;
        }
        let continues = tokens.get(next).is_some_and(|t| t.kind.is_name() || t.is_word())
            // `[x IN xs WHERE x:Gene | x.symbol]` ends the label at `|`
            && !(connector == TokenKind::Pipe && !in_rel && scan.kind(next + 1) == TokenKind::Dot);
        if !continues {
            return Ok(j);
        }
        j = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::tokenize;

    fn frames(query: &str) -> Vec<(String, Frame)> {
        let tokens = tokenize(query).unwrap();
        let scan = Scan::new(&tokens).unwrap();
        (0..scan.len())
            .filter_map(|i| scan.opens(i).map(|f| (tokens[i].text.clone(), f)))
            .collect()
    }

    #[test]
    fn test_classifies_brackets() {
        let f = frames(
            "MATCH (t:Therapy {name: 'x'})-[r:TARGETS]->(g) \
             WHERE EXISTS { (g)<-[:VARIANT_OF]-(:Variant) } \
             RETURN t {.name, score: 1}, collect(g.symbol)[0], {k: 1}",
        );
        let kinds: Vec<Frame> = f.iter().map(|(_, k)| *k).collect();
        assert_eq!(kinds, vec![
            Frame::Paren,
            Frame::PropertyMap,
            Frame::RelPattern,
            Frame::Paren,
            Frame::Subquery,
            Frame::Paren,
            Frame::RelPattern,
            Frame::Paren,
            Frame::Projection,
            Frame::Call,
            Frame::List,
            Frame::MapLiteral,
        ]);
    }

    #[test]
    fn test_depth_and_final_return() {
        let tokens = tokenize("MATCH (g) WHERE COUNT { MATCH (g)--(v) RETURN v } > 1 RETURN g").unwrap();
        let scan = Scan::new(&tokens).unwrap();
        let last = scan.final_return().unwrap();
        assert_eq!(tokens[last].span.start, 54);
        assert_eq!(scan.depth(last), 0);
    }

    #[test]
    fn test_unbalanced_brackets() {
        let tokens = tokenize("MATCH (g RETURN g").unwrap();
        assert!(matches!(Scan::new(&tokens), Err(ValidationError::Malformed { .. })));
        let tokens = tokenize("MATCH (g)] RETURN g").unwrap();
        assert!(matches!(Scan::new(&tokens), Err(ValidationError::Malformed { .. })));
    }

    #[test]
    fn test_maps_in_patterns_and_expressions() {
        let f = frames("MATCH (a), (b {k: 1}), p = (c:Gene {k: 1}) RETURN ({k: 1}) AS m, (a)");
        let kinds: Vec<Frame> = f.iter().map(|(_, k)| *k).collect();
        assert_eq!(kinds, vec![
            Frame::Paren,
            Frame::Paren,
            Frame::PropertyMap,
            Frame::Paren,
            Frame::PropertyMap,
            Frame::Paren,
            Frame::MapLiteral,
            Frame::Paren,
        ]);
    }

    #[test]
    fn test_word_after_expression_is_not_a_clause() {
        let tokens = tokenize("MATCH (g:Gene) RETURN g.symbol FROBNICATE 5").unwrap();
        let scan = Scan::new(&tokens).unwrap();
        assert_eq!(
            check_clause_words(&scan),
            Err(ValidationError::UnknownKeyword { keyword: "FROBNICATE".into() })
        );

        let tokens = tokenize("MATCH (g:Gene) RETURN g.symbol ORDER BY g.symbol DESC NULLS LAST").unwrap();
        let scan = Scan::new(&tokens).unwrap();
        assert_eq!(check_clause_words(&scan), Ok(()));
    }

    #[test]
    fn test_qualified_name() {
        let tokens = tokenize("apoc.meta.schema()").unwrap();
        let scan = Scan::new(&tokens).unwrap();
        assert_eq!(
            check_functions(&scan),
            Err(ValidationError::UnknownKeyword { keyword: "apoc.meta.schema".into() })
        );
    }
}
