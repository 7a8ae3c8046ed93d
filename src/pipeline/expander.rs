//! Instruction expanders.

use std::sync::Arc;

use async_trait::async_trait;

use super::generator::strip_code_fence;
use super::prompts::{render, INSTRUCTION_TEMPLATE, QUERY_RULES};
use super::{require_text, InstructionExpander};
use crate::llm::{LlmCall, LlmError};
use crate::trace::TraceSink;
use crate::validator::GraphSchema;

/// LLM-backed expander: question plus schema snippet in, bullet list out.
#[derive(Debug, Clone)]
pub struct LlmInstructionExpander {
    call: LlmCall,
    schema: Arc<GraphSchema>,
}

impl LlmInstructionExpander {
    pub fn new(call: LlmCall, schema: Arc<GraphSchema>) -> Self {
        Self { call, schema }
    }

    pub fn prompt(&self, question: &str) -> String {
        render(
            INSTRUCTION_TEMPLATE,
            &[("schema", self.schema.describe()), ("rules", QUERY_RULES), ("question", question)],
        )
    }
}

#[async_trait]
impl InstructionExpander for LlmInstructionExpander {
    async fn expand_instructions(&self, question: &str, trace: &dyn TraceSink) -> Result<String, LlmError> {
        let question = require_text(question, "question")?;
        let text = self.call.complete(&self.prompt(question), trace).await?;
        let text = strip_code_fence(&text);
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

/// Deterministic expander that needs no model: fixed schema guidance plus
/// the question.
#[derive(Debug, Clone)]
pub struct TemplateExpander {
    schema: Arc<GraphSchema>,
}

impl TemplateExpander {
    pub fn new(schema: Arc<GraphSchema>) -> Self {
        Self { schema }
    }

    fn guidance(&self) -> Vec<String> {
        let mut lists: Vec<&str> = self.schema.list_properties().collect();
        lists.sort_unstable();
        vec![
            "- Use the graph labels Gene, Variant, Therapy, Disease (Biomarker marks evidence-bearing genes and variants).".into(),
            "- Keep the query tumor-agnostic unless a disease is named.".into(),
            "- Prefer simple MATCH patterns and return well-named columns.".into(),
            format!("- Return list properties intact ({}).", lists.join(", ")),
        ]
    }
}

#[async_trait]
impl InstructionExpander for TemplateExpander {
    async fn expand_instructions(&self, question: &str, _trace: &dyn TraceSink) -> Result<String, LlmError> {
        let question = require_text(question, "question")?;
        let mut lines = self.guidance();
        lines.push(format!("- User question: {question}"));
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{RetryPolicy, TextGenerator};
    use crate::trace::NullTraceSink;

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok("```\n- Use TARGETS from Therapy to Gene\n```".into())
        }
        fn model(&self) -> &str {
            "echo"
        }
        fn temperature(&self) -> f32 {
            0.0
        }
    }

    #[tokio::test]
    async fn test_template_expander_mentions_question() {
        let expander = TemplateExpander::new(Arc::new(GraphSchema::oncology()));
        let text = expander.expand_instructions("  What drugs target BRAF? ", &NullTraceSink).await.unwrap();
        assert!(text.ends_with("- User question: What drugs target BRAF?"));
        assert!(text.contains("pmids"));
        assert!(text.lines().all(|l| l.starts_with("- ")));
    }

    #[tokio::test]
    async fn test_blank_question_is_rejected() {
        let expander = TemplateExpander::new(Arc::new(GraphSchema::oncology()));
        let err = expander.expand_instructions(" \n", &NullTraceSink).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_llm_expander_strips_fences() {
        let call = LlmCall::new("expander", Arc::new(Echo), RetryPolicy::none());
        let expander = LlmInstructionExpander::new(call, Arc::new(GraphSchema::oncology()));
        let text = expander.expand_instructions("BRAF drugs?", &NullTraceSink).await.unwrap();
        assert_eq!(text, "- Use TARGETS from Therapy to Gene");

        let prompt = expander.prompt("BRAF drugs?");
        assert!(prompt.contains("AFFECTS_RESPONSE_TO"));
        assert!(prompt.ends_with("Question: BRAF drugs?"));
    }
}
