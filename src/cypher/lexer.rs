//! Cypher lexer: tokenizes a query string.
//!
//! Strings are decoded with Neo4j's escape rules (backslash escapes, either
//! quote style) and become opaque `StringLiteral` tokens. Comments are kept
//! as tokens so callers can decide what to do with them.

use super::LexError;

/// A token from the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Decoded text: string contents without quotes, identifier names
    /// without backticks, parameter names without `$`.
    pub text: String,
}

impl Token {
    /// Source text covered by this token, including quotes and backticks.
    pub fn raw<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.start..self.span.end]
    }

    /// Upper-cased text, for keyword comparison.
    pub fn upper(&self) -> String {
        self.text.to_ascii_uppercase()
    }

    pub fn is_word(&self) -> bool {
        self.kind.is_keyword() || self.kind == TokenKind::Identifier
    }
}

/// Source span (byte offsets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Token kinds.
///
/// Only the read-query vocabulary gets a keyword kind. Every other bare word
/// (including write clauses) is an `Identifier` and is classified by the
/// validator's keyword tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Match, Optional, Where, Return, With, Unwind,
    Order, By, Skip, Limit, Asc, Desc, Distinct, As,
    And, Or, Not, Xor, Is, Null, True, False, In,
    Case, When, Then, Else, End,
    Starts, Ends, Contains, Exists,

    // Literals
    Integer, Float, StringLiteral,

    // Identifiers and parameters
    Identifier, QuotedIdentifier, Parameter,

    // Punctuation
    LParen, RParen, LBracket, RBracket, LBrace, RBrace,
    Dot, Comma, Colon, Semicolon, Pipe, Ampersand, Bang, Star,
    Arrow,      // ->
    LeftArrow,  // <-
    Dash,       // -
    DotDot,     // ..

    // Operators
    Eq, Neq, Lt, Lte, Gt, Gte,
    Plus, Slash, Percent, Caret,
    PlusEq,     // +=
    RegexMatch, // =~

    // Comments
    Comment,

    Eof,
}

impl TokenKind {
    pub fn is_keyword(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Match | Optional | Where | Return | With | Unwind
                | Order | By | Skip | Limit | Asc | Desc | Distinct | As
                | And | Or | Not | Xor | Is | Null | True | False | In
                | Case | When | Then | Else | End
                | Starts | Ends | Contains | Exists
        )
    }

    /// Names and labels: bare or backticked identifiers.
    pub fn is_name(self) -> bool {
        matches!(self, TokenKind::Identifier | TokenKind::QuotedIdentifier)
    }
}

/// Tokenize a Cypher query string.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => { chars.next(); }

            // Block comments /* ... */
            '/' if matches!(chars.clone().nth(1), Some((_, '*'))) => {
                chars.next();
                chars.next();
                let end = loop {
                    match chars.next() {
                        Some((_, '*')) => {
                            if let Some(&(slash, '/')) = chars.peek() {
                                chars.next();
                                break slash + 1;
                            }
                        }
                        Some(_) => {}
                        None => return Err(LexError::new(pos, "unterminated block comment")),
                    }
                };
                tokens.push(Token {
                    kind: TokenKind::Comment,
                    span: Span { start: pos, end },
                    text: input[pos..end].to_string(),
                });
            }

            // Line comments
            '/' if matches!(chars.clone().nth(1), Some((_, '/'))) => {
                let mut end = input.len();
                while let Some(&(i, c)) = chars.peek() {
                    if c == '\n' {
                        end = i;
                        break;
                    }
                    chars.next();
                }
                tokens.push(Token {
                    kind: TokenKind::Comment,
                    span: Span { start: pos, end },
                    text: input[pos..end].to_string(),
                });
            }

            // String literals
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let start = pos;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((esc_pos, '\\')) => match chars.next() {
                            Some((_, 'n')) => s.push('\n'),
                            Some((_, 't')) => s.push('\t'),
                            Some((_, 'r')) => s.push('\r'),
                            Some((_, 'b')) => s.push('\u{8}'),
                            Some((_, 'f')) => s.push('\u{c}'),
                            Some((_, 'u')) | Some((_, 'U')) => {
                                s.push(read_unicode_escape(&mut chars, esc_pos)?);
                            }
                            Some((_, c)) if c == '\\' || c == '\'' || c == '"' => s.push(c),
                            Some((_, c)) => { s.push('\\'); s.push(c); }
                            None => return Err(LexError::new(start, "unterminated string literal")),
                        },
                        Some((end, c)) if c == quote => {
                            tokens.push(Token {
                                kind: TokenKind::StringLiteral,
                                span: Span { start, end: end + 1 },
                                text: s,
                            });
                            break;
                        }
                        Some((_, c)) => s.push(c),
                        None => return Err(LexError::new(start, "unterminated string literal")),
                    }
                }
            }

            // Backtick-quoted names; a doubled backtick is a literal backtick
            '`' => {
                chars.next();
                let start = pos;
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((i, '`')) => {
                            if matches!(chars.peek(), Some(&(_, '`'))) {
                                chars.next();
                                name.push('`');
                            } else {
                                tokens.push(Token {
                                    kind: TokenKind::QuotedIdentifier,
                                    span: Span { start, end: i + 1 },
                                    text: name,
                                });
                                break;
                            }
                        }
                        Some((_, c)) => name.push(c),
                        None => return Err(LexError::new(start, "unterminated quoted identifier")),
                    }
                }
            }

            // Numbers. A '.' only continues a number when a digit follows,
            // so `*1..3` lexes as Integer DotDot Integer.
            c if c.is_ascii_digit() => {
                let start = pos;
                let mut end = pos;
                let mut is_float = false;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        end = i + 1;
                        chars.next();
                    } else if c == '.' && !is_float
                        && matches!(chars.clone().nth(1), Some((_, d)) if d.is_ascii_digit())
                    {
                        is_float = true;
                        end = i + 1;
                        chars.next();
                    } else if (c == 'e' || c == 'E') && exponent_follows(&chars) {
                        is_float = true;
                        chars.next();
                        if let Some(&(i, sign)) = chars.peek() {
                            if sign == '+' || sign == '-' {
                                end = i + 1;
                                chars.next();
                            }
                        }
                    } else if c.is_alphanumeric() || c == '_' {
                        return Err(LexError::new(start, "invalid number literal"));
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: if is_float { TokenKind::Float } else { TokenKind::Integer },
                    span: Span { start, end },
                    text: input[start..end].to_string(),
                });
            }

            // Parameter: $name
            '$' => {
                chars.next();
                let start = pos;
                let mut end = pos + 1;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Parameter,
                    span: Span { start, end },
                    text: input[start + 1..end].to_string(),
                });
            }

            // Identifiers and keywords
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                let mut end = pos;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let ident = &input[start..end];
                tokens.push(Token {
                    kind: keyword_or_ident(ident),
                    span: Span { start, end },
                    text: ident.to_string(),
                });
            }

            // Punctuation
            '(' => { chars.next(); tokens.push(punct(TokenKind::LParen, pos, "(")); }
            ')' => { chars.next(); tokens.push(punct(TokenKind::RParen, pos, ")")); }
            '[' => { chars.next(); tokens.push(punct(TokenKind::LBracket, pos, "[")); }
            ']' => { chars.next(); tokens.push(punct(TokenKind::RBracket, pos, "]")); }
            '{' => { chars.next(); tokens.push(punct(TokenKind::LBrace, pos, "{")); }
            '}' => { chars.next(); tokens.push(punct(TokenKind::RBrace, pos, "}")); }
            ',' => { chars.next(); tokens.push(punct(TokenKind::Comma, pos, ",")); }
            ':' => { chars.next(); tokens.push(punct(TokenKind::Colon, pos, ":")); }
            ';' => { chars.next(); tokens.push(punct(TokenKind::Semicolon, pos, ";")); }
            '|' => { chars.next(); tokens.push(punct(TokenKind::Pipe, pos, "|")); }
            '&' => { chars.next(); tokens.push(punct(TokenKind::Ampersand, pos, "&")); }
            '!' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Neq, pos, "!="));
                } else {
                    tokens.push(punct(TokenKind::Bang, pos, "!"));
                }
            }
            '*' => { chars.next(); tokens.push(punct(TokenKind::Star, pos, "*")); }
            '.' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '.'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::DotDot, pos, ".."));
                } else {
                    tokens.push(punct(TokenKind::Dot, pos, "."));
                }
            }
            '+' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::PlusEq, pos, "+="));
                } else {
                    tokens.push(punct(TokenKind::Plus, pos, "+"));
                }
            }
            '/' => { chars.next(); tokens.push(punct(TokenKind::Slash, pos, "/")); }
            '%' => { chars.next(); tokens.push(punct(TokenKind::Percent, pos, "%")); }
            '^' => { chars.next(); tokens.push(punct(TokenKind::Caret, pos, "^")); }
            '=' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '~'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::RegexMatch, pos, "=~"));
                } else {
                    tokens.push(punct(TokenKind::Eq, pos, "="));
                }
            }
            '<' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Lte, pos, "<="));
                } else if matches!(chars.peek(), Some(&(_, '-'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::LeftArrow, pos, "<-"));
                } else if matches!(chars.peek(), Some(&(_, '>'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Neq, pos, "<>"));
                } else {
                    tokens.push(punct(TokenKind::Lt, pos, "<"));
                }
            }
            '>' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Gte, pos, ">="));
                } else {
                    tokens.push(punct(TokenKind::Gt, pos, ">"));
                }
            }
            '-' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '>'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Arrow, pos, "->"));
                } else {
                    tokens.push(punct(TokenKind::Dash, pos, "-"));
                }
            }

            other => {
                return Err(LexError::new(pos, format!("unexpected character: '{other}'")));
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span { start: input.len(), end: input.len() },
        text: String::new(),
    });

    Ok(tokens)
}

fn punct(kind: TokenKind, pos: usize, text: &str) -> Token {
    Token {
        kind,
        span: Span { start: pos, end: pos + text.len() },
        text: text.to_string(),
    }
}

fn exponent_follows(chars: &std::iter::Peekable<std::str::CharIndices<'_>>) -> bool {
    let mut ahead = chars.clone();
    ahead.next();
    match ahead.next() {
        Some((_, d)) if d.is_ascii_digit() => true,
        Some((_, '+')) | Some((_, '-')) => matches!(ahead.next(), Some((_, d)) if d.is_ascii_digit()),
        _ => false,
    }
}

fn read_unicode_escape(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    esc_pos: usize,
) -> Result<char, LexError> {
    let mut code = 0u32;
    for _ in 0..4 {
        let digit = chars
            .next()
            .and_then(|(_, c)| c.to_digit(16))
            .ok_or_else(|| LexError::new(esc_pos, "invalid unicode escape"))?;
        code = code * 16 + digit;
    }
    char::from_u32(code).ok_or_else(|| LexError::new(esc_pos, "invalid unicode escape"))
}

fn keyword_or_ident(s: &str) -> TokenKind {
    match s.to_ascii_uppercase().as_str() {
        "MATCH" => TokenKind::Match,
        "OPTIONAL" => TokenKind::Optional,
        "WHERE" => TokenKind::Where,
        "RETURN" => TokenKind::Return,
        "WITH" => TokenKind::With,
        "UNWIND" => TokenKind::Unwind,
        "ORDER" => TokenKind::Order,
        "BY" => TokenKind::By,
        "SKIP" | "OFFSET" => TokenKind::Skip,
        "LIMIT" => TokenKind::Limit,
        "ASC" | "ASCENDING" => TokenKind::Asc,
        "DESC" | "DESCENDING" => TokenKind::Desc,
        "DISTINCT" => TokenKind::Distinct,
        "AS" => TokenKind::As,
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "NOT" => TokenKind::Not,
        "XOR" => TokenKind::Xor,
        "IS" => TokenKind::Is,
        "NULL" => TokenKind::Null,
        "TRUE" => TokenKind::True,
        "FALSE" => TokenKind::False,
        "IN" => TokenKind::In,
        "CASE" => TokenKind::Case,
        "WHEN" => TokenKind::When,
        "THEN" => TokenKind::Then,
        "ELSE" => TokenKind::Else,
        "END" => TokenKind::End,
        "STARTS" => TokenKind::Starts,
        "ENDS" => TokenKind::Ends,
        "CONTAINS" => TokenKind::Contains,
        "EXISTS" => TokenKind::Exists,
        _ => TokenKind::Identifier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_match() {
        assert_eq!(kinds("MATCH (g:Gene) RETURN g"), vec![
            TokenKind::Match,
            TokenKind::LParen,
            TokenKind::Identifier, // g
            TokenKind::Colon,
            TokenKind::Identifier, // Gene
            TokenKind::RParen,
            TokenKind::Return,
            TokenKind::Identifier, // g
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_relationship_pattern() {
        assert_eq!(kinds("(t)-[:TARGETS]->(g)"), vec![
            TokenKind::LParen,
            TokenKind::Identifier,
            TokenKind::RParen,
            TokenKind::Dash,
            TokenKind::LBracket,
            TokenKind::Colon,
            TokenKind::Identifier,
            TokenKind::RBracket,
            TokenKind::Arrow,
            TokenKind::LParen,
            TokenKind::Identifier,
            TokenKind::RParen,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_write_keywords_are_identifiers() {
        let tokens = tokenize("DETACH DELETE n").unwrap();
        assert!(tokens[..3].iter().all(|t| t.kind == TokenKind::Identifier));
    }

    #[test]
    fn test_string_literal_is_decoded() {
        let tokens = tokenize(r#"'it\'s' "say \"hi\"""#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].text, "it's");
        assert_eq!(tokens[1].text, "say \"hi\"");
        assert_eq!(tokens[1].span, Span { start: 8, end: 20 });
    }

    #[test]
    fn test_unicode_escape() {
        let tokens = tokenize(r"'\u0041BC'").unwrap();
        assert_eq!(tokens[0].text, "ABC");
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("MATCH (g) WHERE g.symbol = 'BRAF").unwrap_err();
        assert_eq!(err.position, 27);
    }

    #[test]
    fn test_backtick_identifier() {
        let tokens = tokenize("(n:`Gene`)").unwrap();
        assert_eq!(tokens[3].kind, TokenKind::QuotedIdentifier);
        assert_eq!(tokens[3].text, "Gene");
        assert_eq!(tokens[3].raw("(n:`Gene`)"), "`Gene`");
    }

    #[test]
    fn test_range_is_not_a_float() {
        assert_eq!(kinds("*1..3"), vec![
            TokenKind::Star,
            TokenKind::Integer,
            TokenKind::DotDot,
            TokenKind::Integer,
            TokenKind::Eof,
        ]);
        assert_eq!(kinds("4.5")[0], TokenKind::Float);
        assert_eq!(kinds("1e3")[0], TokenKind::Float);
    }

    #[test]
    fn test_parameter_span() {
        let tokens = tokenize("$myParam").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Parameter);
        assert_eq!(tokens[0].text, "myParam");
        assert_eq!(tokens[0].span, Span { start: 0, end: 8 });
    }

    #[test]
    fn test_comments_are_tokens() {
        let tokens = tokenize("MATCH /* multi\nline */ (n) // tail").unwrap();
        let comments: Vec<_> = tokens.iter().filter(|t| t.kind == TokenKind::Comment).collect();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[1].text, "// tail");
    }

    #[test]
    fn test_unterminated_block_comment() {
        assert!(tokenize("MATCH /* unterminated").is_err());
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("MATCH (n) RETURN n ~").unwrap_err();
        assert_eq!(err.position, 19);
    }
}
