//! # HTTP API
//!
//! | Route | Method | Response |
//! |-------|--------|----------|
//! | `/query` | POST `{question}` | `{answer, query, rows}`, run id in `x-run-id` |
//! | `/query/stream?question=` | GET | SSE `run`, `progress`*, then `result` or `error` |
//! | `/query/feedback` | POST `{run_id, correct}` | 204 |
//! | `/healthz` | GET | `{"status":"ok"}` |
//!
//! Every query request gets a fresh `run_id` merged into all of its trace
//! events.

pub mod error;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use uuid::Uuid;

use crate::config::ServerSection;
use crate::engine::{QueryEngine, QueryEngineResult, Step};
use crate::trace::{ContextTraceSink, FanOutTraceSink, QueueTraceSink, TraceEvent, TraceSink};
use crate::{Error, Result};

pub use error::{ApiError, ErrorBody};

/// Response header carrying the run id.
pub const RUN_ID_HEADER: &str = "x-run-id";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: QueryEngine,
    /// Base sink; per-request sinks wrap it
    pub trace: Arc<dyn TraceSink>,
}

impl AppState {
    pub fn new(engine: QueryEngine) -> Self {
        let trace = engine.trace().clone();
        Self { engine, trace }
    }

    /// Engine whose events carry `run_id`, also forwarded to `extra`.
    fn engine_for_run(&self, run_id: Uuid, extra: Option<Arc<dyn TraceSink>>) -> QueryEngine {
        let base: Arc<dyn TraceSink> = match extra {
            Some(extra) => Arc::new(FanOutTraceSink::new(vec![self.trace.clone(), extra])),
            None => self.trace.clone(),
        };
        let sink = ContextTraceSink::with_run_id(base, run_id.to_string());
        self.engine.with_trace(Arc::new(sink))
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub run_id: String,
    pub correct: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

// ============================================================================
// Router
// ============================================================================

/// Routes without CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/query/stream", get(stream_handler))
        .route("/query/feedback", post(feedback_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
}

/// CORS for the configured origins; an empty list or `*` allows any.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let values = origins
            .iter()
            .map(|o| HeaderValue::from_str(o).map_err(|_| Error::Config(format!("invalid CORS origin {o:?}"))))
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(values)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(RUN_ID_HEADER)]))
}

/// Full application: routes plus CORS.
pub fn app(state: AppState, config: &ServerSection) -> Result<Router> {
    Ok(router(state).layer(cors_layer(&config.cors_origins)?))
}

/// Bind `config.listen_addr` and serve until the process ends.
pub async fn serve(state: AppState, config: &ServerSection) -> Result<()> {
    let app = app(state, config)?;
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "oncograph server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

fn require_question(question: &str) -> std::result::Result<&str, ApiError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("question must not be blank".into()));
    }
    Ok(question)
}

/// Run the engine and record the `run` summary event on success.
async fn run_traced(engine: &QueryEngine, question: &str) -> Result<QueryEngineResult> {
    let started = Instant::now();
    let result = engine.run(question).await?;
    engine.trace().emit(
        "run",
        json!({
            "question": question,
            "query": result.query,
            "row_count": result.rows.len(),
            "duration_ms": started.elapsed().as_millis() as u64,
        }),
    );
    Ok(result)
}

async fn query_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let question = require_question(&request.question)?;

    let run_id = Uuid::new_v4();
    let engine = state.engine_for_run(run_id, None);
    let result = run_traced(&engine, question).await?;

    let header = HeaderValue::from_str(&run_id.to_string()).map_err(|_| ApiError::Pipeline(Error::Config("run id header".into())))?;
    Ok(([(HeaderName::from_static(RUN_ID_HEADER), header)], Json(result)))
}

/// Progress text shown after `step` completes.
fn progress_message(event: &TraceEvent) -> Option<String> {
    if event.get("phase").and_then(|p| p.as_str()) != Some("end") {
        return None;
    }
    let message = match Step::from_name(&event.step)? {
        Step::Expand => "Generating the query".to_string(),
        Step::Generate => "Validating the query".to_string(),
        Step::Validate => "Searching the knowledge graph".to_string(),
        Step::Execute => {
            let rows = event.get("row_count").and_then(|v| v.as_u64()).unwrap_or(0);
            format!("Summarizing {rows} results")
        }
        Step::Summarize => "Answer ready".to_string(),
    };
    Some(message)
}

fn progress_event(message: &str) -> Event {
    Event::default().event("progress").data(json!({"message": message}).to_string())
}

fn error_event(body: &ErrorBody) -> Event {
    let data = serde_json::to_string(body).unwrap_or_else(|_| r#"{"code":"INTERNAL_ERROR"}"#.to_string());
    Event::default().event("error").data(data)
}

async fn stream_handler(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError> {
    let question = require_question(&params.question)?.to_string();

    let run_id = Uuid::new_v4();
    let (queue, mut rx) = QueueTraceSink::channel();
    let engine = state.engine_for_run(run_id, Some(Arc::new(queue)));
    // The queue sender lives in the engine, so the channel closes when the run ends
    let task = tokio::spawn(async move { run_traced(&engine, &question).await });

    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(Event::default().event("run").data(run_id.to_string()));
        yield Ok(progress_event("Expanding the query"));
        while let Some(event) = rx.recv().await {
            if let Some(message) = progress_message(&event) {
                yield Ok(progress_event(&message));
            }
        }

        match task.await {
            Ok(Ok(result)) => match serde_json::to_string(&result) {
                Ok(data) => yield Ok(Event::default().event("result").data(data)),
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize query result");
                    yield Ok(error_event(&ApiError::Pipeline(Error::Config("serialization".into())).body()));
                }
            },
            Ok(Err(e)) => yield Ok(error_event(&ApiError::Pipeline(e).body())),
            Err(e) => {
                tracing::error!(error = %e, "query task failed");
                yield Ok(error_event(&ApiError::Pipeline(Error::Config("query task failed".into())).body()));
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn feedback_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<FeedbackRequest>, JsonRejection>,
) -> std::result::Result<StatusCode, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let run_id = Uuid::parse_str(request.run_id.trim())
        .map_err(|_| ApiError::BadRequest("run_id must be a UUID".into()))?;

    state.trace.emit(
        "feedback",
        json!({"run_id": run_id.to_string(), "correct": request.correct, "comment": request.comment}),
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}
