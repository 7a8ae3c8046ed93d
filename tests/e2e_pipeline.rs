//! End-to-end tests for the full question pipeline.
//!
//! Each test exercises: expand -> generate -> validate -> execute -> summarize,
//! with canned model output and a fixture-driven `MemoryBackend` in place of
//! Neo4j. Trace events are collected through a `QueueTraceSink`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oncograph::llm::{LlmCall, LlmError, RetryPolicy, TextGenerator};
use oncograph::pipeline::{LlmCypherGenerator, LlmSummarizer, TemplateExpander};
use oncograph::storage::{MemoryBackend, RawResult};
use oncograph::trace::QueueTraceSink;
use oncograph::{
    Error, GraphError, GraphExecutor, GraphSchema, PipelineConfig, QueryEngine, RuleBasedValidator,
    TraceEvent, Value,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

const BRAF_QUERY: &str = "MATCH (t:Therapy)-[:TARGETS]->(g:Gene {symbol: 'BRAF'}) \
                          RETURN t.name AS therapy, t.tags AS tags";

/// Returns each scripted reply in turn, then repeats the last one.
struct Canned {
    replies: Mutex<Vec<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl Canned {
    fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies), prompts: Mutex::new(Vec::new()) })
    }

    fn text(reply: &str) -> Arc<Self> {
        Self::new(vec![Ok(reply.to_string())])
    }
}

#[async_trait]
impl TextGenerator for Canned {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().push(prompt.to_string());
        let mut replies = self.replies.lock();
        if replies.len() > 1 { replies.remove(0) } else { replies[0].clone() }
    }

    fn model(&self) -> &str {
        "canned"
    }

    fn temperature(&self) -> f32 {
        0.0
    }
}

fn braf_backend() -> MemoryBackend {
    MemoryBackend::new().with_result(
        "'BRAF'",
        RawResult::new(vec!["therapy".into(), "tags".into()])
            .with_record(vec![json!("Vemurafenib"), json!("BRAF inhibitor;kinase inhibitor")])
            .with_record(vec![json!("Dabrafenib"), json!(null)]),
    )
}

fn engine(
    generator: Arc<Canned>,
    summarizer: Arc<Canned>,
    backend: MemoryBackend,
    config: &PipelineConfig,
) -> (QueryEngine, UnboundedReceiver<TraceEvent>) {
    let schema = Arc::new(GraphSchema::oncology());
    let (sink, rx) = QueueTraceSink::channel();
    let engine = QueryEngine::new(
        Arc::new(TemplateExpander::new(schema.clone())),
        Arc::new(LlmCypherGenerator::new(
            LlmCall::new("generator", generator, RetryPolicy::immediate(3)),
            schema.clone(),
        )),
        Arc::new(RuleBasedValidator::new(schema.clone(), config)),
        Arc::new(GraphExecutor::new(backend, schema, config)),
        Arc::new(LlmSummarizer::new(LlmCall::new("summarizer", summarizer, RetryPolicy::none()))),
        Arc::new(sink),
    );
    (engine, rx)
}

fn drain(rx: &mut UnboundedReceiver<TraceEvent>) -> Vec<TraceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn step_events<'a>(events: &'a [TraceEvent], step: &str) -> Vec<&'a TraceEvent> {
    events.iter().filter(|e| e.step == step).collect()
}

// ============================================================================
// 1. BRAF question answered end to end
// ============================================================================

#[tokio::test]
async fn test_braf_question_is_answered() {
    let generator = Canned::text(&format!("```cypher\n{BRAF_QUERY}\n```"));
    let summarizer = Canned::text("Vemurafenib and Dabrafenib target BRAF.");
    let backend = braf_backend();
    let (engine, mut rx) = engine(generator.clone(), summarizer.clone(), backend.clone(), &PipelineConfig::default());

    let result = engine.run("What drugs target BRAF?").await.unwrap();

    assert_eq!(result.answer, "Vemurafenib and Dabrafenib target BRAF.");
    assert!(result.query.ends_with("LIMIT 100"));
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0].get("therapy"), Some(&Value::from("Vemurafenib")));
    assert_eq!(
        result.rows[0].get("tags"),
        Some(&Value::List(vec!["BRAF inhibitor".into(), "kinase inhibitor".into()]))
    );
    assert_eq!(result.rows[1].get("tags"), Some(&Value::List(Vec::new())));

    // The executed query is the validated one, in a rolled-back read tx
    assert_eq!(backend.queries(), vec![result.query.clone()]);
    assert_eq!(backend.rollbacks(), 1);
    assert_eq!(backend.commits(), 0);

    // The generator saw the expanded instructions, the summarizer saw the rows
    assert!(generator.prompts.lock()[0].contains("User question: What drugs target BRAF?"));
    assert!(summarizer.prompts.lock()[0].contains("Vemurafenib"));

    let events = drain(&mut rx);
    let steps: Vec<&str> = events
        .iter()
        .filter(|e| e.get("phase").is_some())
        .map(|e| e.step.as_str())
        .collect();
    assert_eq!(
        steps,
        vec![
            "expand_instructions", "expand_instructions",
            "generate_cypher", "generate_cypher",
            "validate_cypher", "validate_cypher",
            "execute_read", "execute_read",
            "summarize", "summarize",
        ]
    );
    assert!(step_events(&events, "error").is_empty());
}

// ============================================================================
// 2. Rejected draft never reaches the database
// ============================================================================

#[tokio::test]
async fn test_rejected_draft_is_not_executed() {
    let generator = Canned::text("MATCH (g:Gene) DETACH DELETE g");
    let summarizer = Canned::text("unused");
    let backend = braf_backend();
    let (engine, mut rx) = engine(generator, summarizer.clone(), backend.clone(), &PipelineConfig::default());

    let err = engine.run("Remove every gene").await.unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(err.code(), "VALIDATION_REJECTED");
    assert!(backend.queries().is_empty());
    assert!(summarizer.prompts.lock().is_empty());

    let events = drain(&mut rx);
    assert!(step_events(&events, "execute_read").is_empty());
    let errors = step_events(&events, "error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].get("error_step"), Some(&json!("validate_cypher")));
    assert_eq!(errors[0].get("error_kind"), Some(&json!("unknown_keyword")));
    assert_eq!(errors[0].get("query"), Some(&json!("MATCH (g:Gene) DETACH DELETE g")));
}

// ============================================================================
// 3. Upstream failures
// ============================================================================

#[tokio::test]
async fn test_transient_generator_failure_is_retried() {
    let generator = Canned::new(vec![
        Err(LlmError::Provider { status: 503, code: None, reason: None, message: "overloaded".into() }),
        Ok(BRAF_QUERY.to_string()),
    ]);
    let summarizer = Canned::text("BRAF is targeted by two therapies.");
    let (engine, mut rx) = engine(generator.clone(), summarizer, braf_backend(), &PipelineConfig::default());

    let result = engine.run("What drugs target BRAF?").await.unwrap();
    assert_eq!(result.rows.len(), 2);
    assert_eq!(generator.prompts.lock().len(), 2);

    let attempts = step_events(&drain(&mut rx), "llm_attempt")
        .into_iter()
        .filter(|e| e.get("component") == Some(&json!("generator")))
        .count();
    assert_eq!(attempts, 2);
}

#[tokio::test]
async fn test_non_query_output_fails_generation() {
    let generator = Canned::text("I cannot answer that question.");
    let (engine, _rx) = engine(generator, Canned::text("unused"), braf_backend(), &PipelineConfig::default());

    let err = engine.run("What drugs target BRAF?").await.unwrap_err();
    assert!(matches!(err, Error::Generation(LlmError::InvalidResponse(_))));
    assert_eq!(err.step().map(|s| s.as_str()), Some("generate_cypher"));
}

#[tokio::test]
async fn test_blank_summary_fails_summarization() {
    let (engine, _rx) = engine(Canned::text(BRAF_QUERY), Canned::text("   "), braf_backend(), &PipelineConfig::default());

    let err = engine.run("What drugs target BRAF?").await.unwrap_err();
    assert!(matches!(err, Error::Summarization(LlmError::EmptyResponse)));
}

// ============================================================================
// 4. Execution failures
// ============================================================================

#[tokio::test]
async fn test_database_rejection_surfaces_as_execution_error() {
    let backend = MemoryBackend::new().failing_with(GraphError::Rejected {
        code: "Neo.ClientError.Statement.SyntaxError".into(),
        message: "Invalid input".into(),
    });
    let (engine, mut rx) = engine(Canned::text(BRAF_QUERY), Canned::text("unused"), backend.clone(), &PipelineConfig::default());

    let err = engine.run("What drugs target BRAF?").await.unwrap_err();
    match &err {
        Error::Execution(e) => {
            assert_eq!(e.source.kind(), "rejected");
            assert!(e.query.ends_with("LIMIT 100"));
        }
        other => panic!("expected execution error, got {other:?}"),
    }
    assert_eq!(backend.rollbacks(), 1);

    let events = drain(&mut rx);
    assert_eq!(step_events(&events, "error")[0].get("error_step"), Some(&json!("execute_read")));
}

#[tokio::test(start_paused = true)]
async fn test_slow_query_times_out() {
    let config = PipelineConfig::new(100, 200, Duration::from_secs(2), 100).unwrap();
    let backend = braf_backend().with_delay(Duration::from_secs(30));
    let (engine, _rx) = engine(Canned::text(BRAF_QUERY), Canned::text("unused"), backend, &config);

    let err = engine.run("What drugs target BRAF?").await.unwrap_err();
    match err {
        Error::Execution(e) => assert_eq!(e.source, GraphError::Timeout(Duration::from_secs(2))),
        other => panic!("expected timeout, got {other:?}"),
    }
}

// ============================================================================
// 5. Empty results still get summarized
// ============================================================================

#[tokio::test]
async fn test_empty_result_is_summarized() {
    let query = "MATCH (g:Gene {symbol: 'NOTAGENE'}) RETURN g.symbol";
    let summarizer = Canned::text("No matching genes were found.");
    let (engine, _rx) = engine(Canned::text(query), summarizer.clone(), braf_backend(), &PipelineConfig::default());

    let result = engine.run("Tell me about NOTAGENE").await.unwrap();
    assert!(result.rows.is_empty());
    assert_eq!(result.answer, "No matching genes were found.");
    assert!(summarizer.prompts.lock()[0].contains("(no rows)"));
}
