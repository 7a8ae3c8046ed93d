//! Keyword and function tables.

/// Words that introduce writes, schema changes, procedures, admin commands
/// or database switching. Any unquoted occurrence rejects the query.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "CREATE", "MERGE", "SET", "DELETE", "DETACH", "NODETACH", "REMOVE",
    "CALL", "LOAD", "DROP", "FOREACH", "ALTER", "GRANT", "DENY", "REVOKE",
    "START", "STOP", "TERMINATE", "SHOW", "USE", "RENAME", "INSERT",
];

/// Read clauses outside the accepted subset.
pub const UNSUPPORTED_CLAUSES: &[&str] = &["UNION", "YIELD", "FINISH", "LET", "NEXT", "FILTER"];

/// Read-only functions callable from an accepted query. Matched
/// case-insensitively.
pub const ALLOWED_FUNCTIONS: &[&str] = &[
    // strings
    "tolower", "toupper", "lower", "upper", "trim", "ltrim", "rtrim", "replace",
    "substring", "split", "left", "right", "reverse", "tostring",
    // conversion
    "tointeger", "tofloat", "toboolean", "coalesce",
    // aggregation
    "collect", "count", "sum", "avg", "min", "max", "percentilecont", "percentiledisc", "stdev",
    // lists
    "size", "length", "head", "last", "tail", "range", "reduce", "isempty",
    // predicates
    "exists", "any", "all", "none", "single",
    // graph
    "type", "labels", "nodes", "relationships", "startnode", "endnode",
    "shortestpath", "allshortestpaths",
    // numeric
    "abs", "round", "ceil", "floor", "sign",
];

/// Keywords that may open a query.
pub const QUERY_STARTERS: &[&str] = &["MATCH", "OPTIONAL", "WITH", "UNWIND", "RETURN"];

/// Words that open a subquery expression when followed by `{`.
pub const SUBQUERY_OPENERS: &[&str] = &["EXISTS", "COUNT", "COLLECT"];

/// Unreserved words that may follow a complete expression at statement
/// level (`ORDER BY x NULLS LAST`).
pub const CLAUSE_POSITION_WORDS: &[&str] = &["NULLS", "FIRST", "LAST"];

pub fn is_forbidden(word_upper: &str) -> bool {
    FORBIDDEN_KEYWORDS.contains(&word_upper)
}

pub fn is_unsupported_clause(word_upper: &str) -> bool {
    UNSUPPORTED_CLAUSES.contains(&word_upper)
}

pub fn is_clause_position_word(word_upper: &str) -> bool {
    CLAUSE_POSITION_WORDS.contains(&word_upper)
}

pub fn is_allowed_function(name: &str) -> bool {
    ALLOWED_FUNCTIONS.contains(&name.to_ascii_lowercase().as_str())
}

/// Forbidden keywords appearing as words inside raw text. Used on literals
/// whose escapes make their boundaries ambiguous.
pub fn forbidden_words_in(raw: &str) -> Option<String> {
    raw.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(str::to_ascii_uppercase)
        .find(|w| is_forbidden(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_lookup_ignores_case() {
        assert!(is_allowed_function("toLower"));
        assert!(is_allowed_function("COUNT"));
        assert!(!is_allowed_function("keys"));
        assert!(!is_allowed_function("properties"));
    }

    #[test]
    fn test_forbidden_words_in_raw_text() {
        assert_eq!(forbidden_words_in(r"'x\' DETACH delete n //'"), Some("DETACH".into()));
        assert_eq!(forbidden_words_in(r"'Dabrafenib\'s'"), None);
        // Substrings are not words
        assert_eq!(forbidden_words_in("'Settlement'"), None);
    }
}
