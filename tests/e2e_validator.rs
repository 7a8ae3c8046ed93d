//! End-to-end tests for the query validator.
//!
//! The validator is the only thing standing between model output and the
//! database, so these tests feed it adversarial drafts: write clauses in any
//! casing, keywords hidden in and around string literals, and limits of every
//! size. Property tests check that accepted output is always a fixed point.

use std::sync::Arc;
use std::time::Duration;

use oncograph::cypher::{tokenize, Token, TokenKind};
use oncograph::validator::rules::{forbidden_words_in, FORBIDDEN_KEYWORDS};
use oncograph::{GraphSchema, PipelineConfig, QueryValidator, RuleBasedValidator, ValidationError};
use proptest::prelude::*;

fn validator() -> RuleBasedValidator {
    RuleBasedValidator::default()
}

fn mixed_case(word: &str, mask: &[bool]) -> String {
    word.chars()
        .zip(mask.iter().cycle())
        .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
        .collect()
}

// ============================================================================
// 1. Write clauses never pass, whatever their casing
// ============================================================================

const WRITE_CLAUSES: &[&str] = &[
    "DELETE g",
    "DETACH DELETE g",
    "SET g.symbol = 'X'",
    "REMOVE g.symbol",
    "MERGE (x:Gene {symbol: 'X'})",
    "CREATE (x:Gene {symbol: 'X'})",
];

proptest! {
    #[test]
    fn prop_write_clauses_are_rejected(
        clause in prop::sample::select(WRITE_CLAUSES),
        mask in prop::collection::vec(any::<bool>(), 1..8),
    ) {
        let query = format!("MATCH (g:Gene) {} RETURN g.symbol", mixed_case(clause, &mask));
        let err = validator().validate(&query).unwrap_err();
        prop_assert!(
            matches!(err, ValidationError::UnknownKeyword { .. }),
            "expected unknown keyword for {query:?}, got {err:?}"
        );
    }
}

// ============================================================================
// 2. Literals are data, not syntax
// ============================================================================

proptest! {
    #[test]
    fn prop_plain_literals_are_accepted_verbatim(text in "[A-Za-z0-9 ]{1,24}") {
        let query = format!("MATCH (t:Therapy) WHERE t.name = '{text}' RETURN t.name");
        let out = validator().validate(&query).unwrap();
        let quoted = format!("'{text}'");
        prop_assert!(out.contains(&quoted));
        prop_assert!(out.ends_with("LIMIT 100"));
    }

    #[test]
    fn prop_accepted_output_is_a_fixed_point(
        text in "[A-Za-z0-9 ]{1,16}",
        limit in proptest::option::of(1u64..5_000),
    ) {
        let v = validator();
        let mut query = format!("MATCH (g:Gene) WHERE g.symbol = '{text}' RETURN g.symbol");
        if let Some(limit) = limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }
        let once = v.validate(&query).unwrap();
        let twice = v.validate(&once).unwrap();
        prop_assert_eq!(once, twice);
    }
}

fn structure(tokens: &[Token]) -> Vec<TokenKind> {
    tokens.iter().map(|t| t.kind).filter(|k| *k != TokenKind::StringLiteral).collect()
}

/// Quotes, backslashes and `\u` escapes mixed with write keywords.
fn escape_heavy_text() -> impl Strategy<Value = String> {
    let fragment = prop_oneof![
        r#"['\\"uA-Za-z ]{1,6}"#,
        prop::sample::select(FORBIDDEN_KEYWORDS).prop_map(str::to_string),
    ];
    prop::collection::vec(fragment, 1..6).prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn prop_escaped_literals_never_smuggle_keywords(text in escape_heavy_text()) {
        let query = format!("MATCH (g:Gene) WHERE g.symbol = '{text}' RETURN g.symbol LIMIT 5");
        if let Ok(out) = validator().validate(&query) {
            let before = tokenize(&query).unwrap();
            let after = tokenize(&out).unwrap();
            prop_assert_eq!(structure(&before), structure(&after));

            for tok in &after {
                match tok.kind {
                    TokenKind::Identifier => {
                        prop_assert!(
                            !FORBIDDEN_KEYWORDS.contains(&tok.text.to_ascii_uppercase().as_str()),
                            "{} outside a literal in {:?}", tok.text, out
                        );
                    }
                    TokenKind::StringLiteral if tok.raw(&out).contains('\\') => {
                        prop_assert_eq!(forbidden_words_in(tok.raw(&out)), None);
                    }
                    _ => {}
                }
            }
        }
    }
}

#[test]
fn test_keyword_after_escaped_quote_is_caught() {
    let err = validator()
        .validate(r"MATCH (g:Gene) WHERE g.symbol = 'a\' REMOVE g.symbol //' RETURN g")
        .unwrap_err();
    assert_eq!(err, ValidationError::UnknownKeyword { keyword: "REMOVE".into() });
}

#[test]
fn test_keyword_inside_double_quoted_literal_is_harmless() {
    let out = validator()
        .validate(r#"MATCH (g:Gene) WHERE g.symbol = "DELETE" RETURN g.symbol"#)
        .unwrap();
    assert!(out.ends_with("LIMIT 100"));
}

// ============================================================================
// 3. Limits
// ============================================================================

proptest! {
    #[test]
    fn prop_final_limit_never_exceeds_max(limit in 1u64..100_000) {
        let out = validator()
            .validate(&format!("MATCH (g:Gene) RETURN g.symbol LIMIT {limit}"))
            .unwrap();
        let expected = format!("LIMIT {}", limit.min(200));
        prop_assert!(out.ends_with(&expected));
    }
}

#[test]
fn test_custom_limits_from_config() {
    let config = PipelineConfig::new(10, 25, Duration::from_secs(5), 50).unwrap();
    let v = RuleBasedValidator::new(Arc::new(GraphSchema::oncology()), &config);

    assert_eq!(
        v.validate("MATCH (g:Gene) RETURN g.symbol").unwrap(),
        "MATCH (g:Gene) RETURN g.symbol LIMIT 10"
    );
    assert_eq!(
        v.validate("MATCH (g:Gene) RETURN g.symbol LIMIT 90").unwrap(),
        "MATCH (g:Gene) RETURN g.symbol LIMIT 25"
    );
}

// ============================================================================
// 4. Schema allowlists
// ============================================================================

#[test]
fn test_extended_schema_accepts_new_label() {
    let schema = GraphSchema::oncology().with_label("Trial");
    let v = RuleBasedValidator::new(Arc::new(schema), &PipelineConfig::default());

    assert!(validator().validate("MATCH (x:Trial) RETURN x").is_err());
    assert!(v.validate("MATCH (x:Trial) RETURN x").is_ok());
}

#[test]
fn test_realistic_drafts_are_accepted() {
    let v = validator();
    for draft in [
        "MATCH (t:Therapy)-[:TARGETS]->(g:Gene {symbol: 'BRAF'}) RETURN t.name AS therapy",
        "MATCH (v:Variant)-[:VARIANT_OF]->(g:Gene) WHERE g.symbol = 'EGFR' RETURN v.name LIMIT 50",
        "MATCH (b:Biomarker)-[r:AFFECTS_RESPONSE_TO]->(t:Therapy) \
         RETURN t.name, r.effect, r.pmids ORDER BY r.evidence_count DESC",
    ] {
        assert!(v.validate(draft).is_ok(), "rejected: {draft}");
    }
}
