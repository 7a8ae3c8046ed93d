//! Answer summarization.

use async_trait::async_trait;

use super::generator::strip_code_fence;
use super::prompts::{render, SUMMARY_TEMPLATE};
use super::{require_text, Summarizer};
use crate::llm::{LlmCall, LlmError};
use crate::model::Row;
use crate::trace::TraceSink;

#[derive(Debug, Clone)]
pub struct LlmSummarizer {
    call: LlmCall,
}

impl LlmSummarizer {
    pub fn new(call: LlmCall) -> Self {
        Self { call }
    }

    pub fn prompt(&self, question: &str, rows: &[Row]) -> String {
        render(SUMMARY_TEMPLATE, &[("question", question), ("rows", &format_rows(rows))])
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, question: &str, rows: &[Row], trace: &dyn TraceSink) -> Result<String, LlmError> {
        let question = require_text(question, "question")?;
        let text = self.call.complete(&self.prompt(question, rows), trace).await?;
        let text = strip_code_fence(&text);
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

/// Numbered `key: value; key: a, b` lines, or `(no rows)`.
pub fn format_rows(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let fields: Vec<String> = row
                .iter()
                .map(|(key, value)| format!("{key}: {}", value.to_plain_string()))
                .collect();
            format!("{}. {}", i + 1, fields.join("; "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_rows() {
        let rows = vec![
            Row::from_iter([
                ("gene_symbol", Value::from("BRAF")),
                ("pmids", Value::from(vec!["123", "456"])),
            ]),
            Row::from_iter([("gene_symbol", Value::from("KRAS")), ("pmids", Value::List(vec![]))]),
        ];
        assert_eq!(
            format_rows(&rows),
            "1. gene_symbol: BRAF; pmids: 123, 456\n2. gene_symbol: KRAS; pmids: "
        );
        assert_eq!(format_rows(&[]), "(no rows)");
    }

    #[test]
    fn test_prompt_embeds_rows() {
        use crate::llm::{RetryPolicy, TextGenerator};
        use std::sync::Arc;

        struct Never;
        #[async_trait]
        impl TextGenerator for Never {
            async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
                Err(LlmError::Timeout)
            }
            fn model(&self) -> &str {
                "never"
            }
            fn temperature(&self) -> f32 {
                0.0
            }
        }

        let summarizer = LlmSummarizer::new(LlmCall::new("summarizer", Arc::new(Never), RetryPolicy::none()));
        let prompt = summarizer.prompt("Which drugs target BRAF?", &[]);
        assert!(prompt.contains("Which drugs target BRAF?"));
        assert!(prompt.contains("(no rows)"));
    }
}
