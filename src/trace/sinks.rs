//! Trace sink implementations.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use hashbrown::HashSet;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use super::{TraceEvent, TraceSink};

// ============================================================================
// Null
// ============================================================================

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn record(&self, _event: TraceEvent) {}
}

// ============================================================================
// JSONL file
// ============================================================================

/// `dir/YYYYMMDD.jsonl` for today (UTC).
pub fn daily_trace_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.jsonl", Utc::now().format("%Y%m%d")))
}

#[derive(Debug)]
enum JsonlTarget {
    Fixed(PathBuf),
    Daily(PathBuf),
}

/// Appends one flat JSON object per line. Parent directories are created
/// on first write.
#[derive(Debug)]
pub struct JsonlTraceSink {
    target: JsonlTarget,
    lock: Mutex<()>,
}

impl JsonlTraceSink {
    /// Always write to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { target: JsonlTarget::Fixed(path.into()), lock: Mutex::new(()) }
    }

    /// Write to a per-day file under `dir`, rolling over at UTC midnight.
    pub fn daily(dir: impl Into<PathBuf>) -> Self {
        Self { target: JsonlTarget::Daily(dir.into()), lock: Mutex::new(()) }
    }

    /// File the next event will be appended to.
    pub fn current_path(&self) -> PathBuf {
        match &self.target {
            JsonlTarget::Fixed(path) => path.clone(),
            JsonlTarget::Daily(dir) => daily_trace_path(dir),
        }
    }

    fn append(&self, event: &TraceEvent) -> std::io::Result<()> {
        let path = self.current_path();
        let mut line = serde_json::to_string(&event.to_flat_json())?;
        line.push('\n');

        let _guard = self.lock.lock();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: TraceEvent) {
        if let Err(e) = self.append(&event) {
            tracing::warn!(error = %e, step = %event.step, "failed to write trace event");
        }
    }
}

// ============================================================================
// Console
// ============================================================================

/// Emits events through `tracing` on target `oncograph::trace`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleTraceSink;

impl TraceSink for ConsoleTraceSink {
    fn record(&self, event: TraceEvent) {
        let payload = Value::Object(event.payload);
        tracing::info!(target: "oncograph::trace", step = %event.step, payload = %payload, "trace");
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Pushes events into an unbounded channel. Events sent after the receiver
/// is dropped are discarded.
#[derive(Debug, Clone)]
pub struct QueueTraceSink {
    tx: mpsc::UnboundedSender<TraceEvent>,
}

impl QueueTraceSink {
    pub fn new(tx: mpsc::UnboundedSender<TraceEvent>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TraceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TraceSink for QueueTraceSink {
    fn record(&self, event: TraceEvent) {
        let _ = self.tx.send(event);
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Forwards `{run_id, timestamp, step, payload}` to an external store.
///
/// Each event is posted from a spawned task on the current tokio runtime;
/// outside a runtime the event is dropped with a warning.
#[derive(Debug, Clone)]
pub struct HttpTraceSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTraceSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into() }
    }

    fn body(event: &TraceEvent) -> Value {
        json!({
            "run_id": event.payload.get("run_id").cloned().unwrap_or(Value::Null),
            "timestamp": event.timestamp.to_rfc3339(),
            "step": event.step,
            "payload": Value::Object(event.payload.clone()),
        })
    }
}

impl TraceSink for HttpTraceSink {
    fn record(&self, event: TraceEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(step = %event.step, "no runtime for HTTP trace sink, event dropped");
            return;
        };
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let body = Self::body(&event);
        handle.spawn(async move {
            let result = client.post(&endpoint).json(&body).send().await;
            match result {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => {
                    tracing::warn!(status = %resp.status(), endpoint = %endpoint, "trace store rejected event");
                }
                Err(e) => {
                    tracing::warn!(error = %e, endpoint = %endpoint, "failed to post trace event");
                }
            }
        });
    }
}

// ============================================================================
// Composition
// ============================================================================

/// Forwards each event to every child, in order.
#[derive(Clone, Default)]
pub struct FanOutTraceSink {
    sinks: Vec<Arc<dyn TraceSink>>,
}

impl FanOutTraceSink {
    pub fn new(sinks: Vec<Arc<dyn TraceSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn TraceSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TraceSink for FanOutTraceSink {
    fn record(&self, event: TraceEvent) {
        let Some((last, rest)) = self.sinks.split_last() else { return };
        for sink in rest {
            sink.record(event.clone());
        }
        last.record(event);
    }
}

/// Merges fixed context fields into every event's payload. Fields already
/// on the event win.
#[derive(Clone)]
pub struct ContextTraceSink {
    inner: Arc<dyn TraceSink>,
    context: Map<String, Value>,
}

impl ContextTraceSink {
    pub fn new(inner: Arc<dyn TraceSink>, context: Map<String, Value>) -> Self {
        Self { inner, context }
    }

    /// Shorthand for a single `run_id` field.
    pub fn with_run_id(inner: Arc<dyn TraceSink>, run_id: impl Into<String>) -> Self {
        let mut context = Map::new();
        context.insert("run_id".into(), Value::String(run_id.into()));
        Self::new(inner, context)
    }
}

impl TraceSink for ContextTraceSink {
    fn record(&self, event: TraceEvent) {
        self.inner.record(event.with_fields(&self.context));
    }
}

/// Forwards only events whose step is in the allowed set.
#[derive(Clone)]
pub struct FilteredTraceSink {
    inner: Arc<dyn TraceSink>,
    allowed: HashSet<String>,
}

impl FilteredTraceSink {
    pub fn new<I, S>(inner: Arc<dyn TraceSink>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { inner, allowed: allowed.into_iter().map(Into::into).collect() }
    }
}

impl TraceSink for FilteredTraceSink {
    fn record(&self, event: TraceEvent) {
        if self.allowed.contains(event.step.as_str()) {
            self.inner.record(event);
        }
    }
}
