//! LLM-backed Cypher generation and draft extraction.

use std::sync::Arc;

use async_trait::async_trait;

use super::prompts::{render, CYPHER_TEMPLATE, QUERY_RULES};
use super::{require_text, CypherGenerator};
use crate::llm::{LlmCall, LlmError};
use crate::trace::TraceSink;
use crate::validator::GraphSchema;

/// Words a draft may open with.
const READ_CLAUSES: &[&str] = &["MATCH", "OPTIONAL", "WITH", "UNWIND", "RETURN"];

/// Labels models like to put in front of the query.
const ANSWER_LABELS: &[&str] = &["cypher:", "query:"];

#[derive(Debug, Clone)]
pub struct LlmCypherGenerator {
    call: LlmCall,
    schema: Arc<GraphSchema>,
}

impl LlmCypherGenerator {
    pub fn new(call: LlmCall, schema: Arc<GraphSchema>) -> Self {
        Self { call, schema }
    }

    pub fn prompt(&self, instructions: &str) -> String {
        render(
            CYPHER_TEMPLATE,
            &[("schema", self.schema.describe()), ("rules", QUERY_RULES), ("instructions", instructions)],
        )
    }
}

#[async_trait]
impl CypherGenerator for LlmCypherGenerator {
    async fn generate_cypher(&self, instructions: &str, trace: &dyn TraceSink) -> Result<String, LlmError> {
        let instructions = require_text(instructions, "instructions")?;
        let raw = self.call.complete(&self.prompt(instructions), trace).await?;
        extract_cypher(&raw)
    }
}

/// Inner text of the first ```` ``` ```` block (language tag dropped), or
/// the trimmed input when there is no fence.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(start) = text.find("```") else {
        return text;
    };
    let after = &text[start + 3..];
    // Language tag runs to the end of the opening line
    let body = match after.find('\n') {
        Some(nl) if !after[..nl].trim().contains(' ') => &after[nl + 1..],
        _ => after,
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Pull a single query out of model output.
///
/// Strips code fences and a leading `cypher:`/`query:` label. Fails with
/// `InvalidResponse` when nothing is left or the text does not open with a
/// read clause.
pub fn extract_cypher(raw: &str) -> Result<String, LlmError> {
    let mut text = strip_code_fence(raw);
    for label in ANSWER_LABELS {
        if text.get(..label.len()).is_some_and(|head| head.eq_ignore_ascii_case(label)) {
            text = text[label.len()..].trim_start();
            break;
        }
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(LlmError::InvalidResponse("model returned no query".into()));
    }

    let first_word: String = text.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if !READ_CLAUSES.iter().any(|clause| first_word.eq_ignore_ascii_case(clause)) {
        return Err(LlmError::InvalidResponse(format!(
            "output does not look like a read query (starts with '{}')",
            text.chars().take(20).collect::<String>()
        )));
    }
    Ok(text.to_string())
}
