//! # Query Engine
//!
//! Runs one question through the fixed step sequence:
//!
//! ```text
//! Expand → Generate → Validate → Execute → Summarize → Done
//! ```
//!
//! Steps are never skipped or reordered. Each step emits a `phase: "start"`
//! event with its input and a `phase: "end"` event with its output. A failing
//! step emits one `error` event and the run stops there with an [`Error`]
//! naming the step.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::executor::QueryExecutor;
use crate::model::Row;
use crate::pipeline::{CypherGenerator, InstructionExpander, Summarizer};
use crate::trace::TraceSink;
use crate::validator::QueryValidator;
use crate::{Error, Result};

/// Pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    #[serde(rename = "expand_instructions")]
    Expand,
    #[serde(rename = "generate_cypher")]
    Generate,
    #[serde(rename = "validate_cypher")]
    Validate,
    #[serde(rename = "execute_read")]
    Execute,
    #[serde(rename = "summarize")]
    Summarize,
}

impl Step {
    /// In execution order.
    pub const ALL: [Step; 5] = [Step::Expand, Step::Generate, Step::Validate, Step::Execute, Step::Summarize];

    /// Trace step name.
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Expand => "expand_instructions",
            Step::Generate => "generate_cypher",
            Step::Validate => "validate_cypher",
            Step::Execute => "execute_read",
            Step::Summarize => "summarize",
        }
    }

    pub fn from_name(name: &str) -> Option<Step> {
        Step::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEngineResult {
    pub answer: String,
    /// The validated query that was executed
    pub query: String,
    pub rows: Vec<Row>,
}

/// Orchestrates the five pipeline steps.
#[derive(Clone)]
pub struct QueryEngine {
    expander: Arc<dyn InstructionExpander>,
    generator: Arc<dyn CypherGenerator>,
    validator: Arc<dyn QueryValidator>,
    executor: Arc<dyn QueryExecutor>,
    summarizer: Arc<dyn Summarizer>,
    trace: Arc<dyn TraceSink>,
}

impl QueryEngine {
    pub fn new(
        expander: Arc<dyn InstructionExpander>,
        generator: Arc<dyn CypherGenerator>,
        validator: Arc<dyn QueryValidator>,
        executor: Arc<dyn QueryExecutor>,
        summarizer: Arc<dyn Summarizer>,
        trace: Arc<dyn TraceSink>,
    ) -> Self {
        Self { expander, generator, validator, executor, summarizer, trace }
    }

    /// Same components, different trace sink. Used to bind per-request
    /// context such as a `run_id`.
    pub fn with_trace(&self, trace: Arc<dyn TraceSink>) -> Self {
        Self { trace, ..self.clone() }
    }

    pub fn trace(&self) -> &Arc<dyn TraceSink> {
        &self.trace
    }

    /// Answer `question`.
    pub async fn run(&self, question: &str) -> Result<QueryEngineResult> {
        let trace: &dyn TraceSink = self.trace.as_ref();

        self.start(Step::Expand, json!({"question": question}));
        let instructions = match self.expander.expand_instructions(question, trace).await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(Error::Expansion(e), None)),
        };
        self.end(Step::Expand, json!({"instructions": instructions}));

        self.start(Step::Generate, json!({"instructions": instructions}));
        let draft = match self.generator.generate_cypher(&instructions, trace).await {
            Ok(query) => query,
            Err(e) => return Err(self.fail(Error::Generation(e), None)),
        };
        self.end(Step::Generate, json!({"query": draft}));

        self.start(Step::Validate, json!({"query": draft}));
        let query = match self.validator.validate(&draft) {
            Ok(query) => query,
            Err(e) => return Err(self.fail(Error::Validation(e), Some(&draft))),
        };
        self.end(Step::Validate, json!({"query": query, "rewritten": query != draft}));

        self.start(Step::Execute, json!({"query": query}));
        let rows = match self.executor.execute_read(&query).await {
            Ok(rows) => rows,
            Err(e) => return Err(self.fail(Error::Execution(e), Some(&query))),
        };
        self.end(Step::Execute, json!({"row_count": rows.len()}));

        self.start(Step::Summarize, json!({"question": question, "row_count": rows.len()}));
        let answer = match self.summarizer.summarize(question, &rows, trace).await {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail(Error::Summarization(e), Some(&query))),
        };
        self.end(Step::Summarize, json!({"answer": answer}));

        tracing::info!(rows = rows.len(), "query answered");
        Ok(QueryEngineResult { answer, query, rows })
    }

    fn start(&self, step: Step, mut payload: JsonValue) {
        tracing::debug!(step = %step, "step started");
        if let JsonValue::Object(map) = &mut payload {
            map.insert("phase".into(), json!("start"));
        }
        self.trace.emit(step.as_str(), payload);
    }

    fn end(&self, step: Step, mut payload: JsonValue) {
        if let JsonValue::Object(map) = &mut payload {
            map.insert("phase".into(), json!("end"));
        }
        self.trace.emit(step.as_str(), payload);
    }

    /// Record the failure and hand the error back.
    fn fail(&self, error: Error, query: Option<&str>) -> Error {
        let step = error.step().map(Step::as_str).unwrap_or("unknown");
        tracing::warn!(step, kind = error.kind(), error = %error, "pipeline step failed");

        let mut payload = json!({
            "error_step": step,
            "error": error.to_string(),
            "error_kind": error.kind(),
        });
        if let (Some(query), JsonValue::Object(map)) = (query, &mut payload) {
            map.insert("query".into(), json!(query));
        }
        self.trace.emit("error", payload);
        error
    }
}

impl fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionError;
    use crate::llm::LlmError;
    use crate::model::Value;
    use crate::trace::{QueueTraceSink, TraceEvent};
    use crate::validator::RuleBasedValidator;
    use async_trait::async_trait;

    struct FixedExpander;
    #[async_trait]
    impl InstructionExpander for FixedExpander {
        async fn expand_instructions(&self, q: &str, _: &dyn TraceSink) -> std::result::Result<String, LlmError> {
            Ok(format!("- {q}"))
        }
    }

    struct FixedGenerator(&'static str);
    #[async_trait]
    impl CypherGenerator for FixedGenerator {
        async fn generate_cypher(&self, _: &str, _: &dyn TraceSink) -> std::result::Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    struct OneRow;
    #[async_trait]
    impl QueryExecutor for OneRow {
        async fn execute_read(&self, _: &str) -> std::result::Result<Vec<Row>, ExecutionError> {
            Ok(vec![Row::from_iter([("therapy_name", Value::from("Dabrafenib"))])])
        }
    }

    struct CountRows;
    #[async_trait]
    impl Summarizer for CountRows {
        async fn summarize(&self, _: &str, rows: &[Row], _: &dyn TraceSink) -> std::result::Result<String, LlmError> {
            Ok(format!("{} rows", rows.len()))
        }
    }

    fn engine(draft: &'static str, trace: Arc<dyn TraceSink>) -> QueryEngine {
        QueryEngine::new(
            Arc::new(FixedExpander),
            Arc::new(FixedGenerator(draft)),
            Arc::new(RuleBasedValidator::default()),
            Arc::new(OneRow),
            Arc::new(CountRows),
            trace,
        )
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<TraceEvent>) -> Vec<TraceEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let (sink, mut rx) = QueueTraceSink::channel();
        let result = engine("MATCH (t:Therapy) RETURN t.name AS therapy_name", Arc::new(sink))
            .run("What drugs target BRAF?")
            .await
            .unwrap();

        assert_eq!(result.query, "MATCH (t:Therapy) RETURN t.name AS therapy_name LIMIT 100");
        assert_eq!(result.answer, "1 rows");

        let steps: Vec<(String, JsonValue)> = drain(&mut rx)
            .into_iter()
            .map(|e| (e.step.clone(), e.get("phase").cloned().unwrap_or(JsonValue::Null)))
            .collect();
        let expected: Vec<(String, JsonValue)> = Step::ALL
            .iter()
            .flat_map(|s| [(s.as_str().to_string(), json!("start")), (s.as_str().to_string(), json!("end"))])
            .collect();
        assert_eq!(steps, expected);
    }

    #[tokio::test]
    async fn test_rejection_stops_before_execution() {
        let (sink, mut rx) = QueueTraceSink::channel();
        let err = engine("MATCH (n) DETACH DELETE n", Arc::new(sink))
            .run("delete everything")
            .await
            .unwrap_err();

        assert_eq!(err.step(), Some(Step::Validate));
        assert_eq!(err.code(), "VALIDATION_REJECTED");

        let events = drain(&mut rx);
        assert!(events.iter().all(|e| e.step != "execute_read" && e.step != "summarize"));
        let error = events.last().unwrap();
        assert_eq!(error.step, "error");
        assert_eq!(error.get("error_step"), Some(&json!("validate_cypher")));
        assert_eq!(error.get("error_kind"), Some(&json!("unknown_keyword")));
        assert_eq!(error.get("query"), Some(&json!("MATCH (n) DETACH DELETE n")));
    }

    #[test]
    fn test_step_names_round_trip() {
        for step in Step::ALL {
            assert_eq!(Step::from_name(step.as_str()), Some(step));
            assert_eq!(serde_json::to_value(step).unwrap(), json!(step.as_str()));
        }
        assert_eq!(Step::from_name("planner"), None);
    }
}
