//! # Trace Events
//!
//! Every pipeline step reports what it did as a [`TraceEvent`]. Sinks decide
//! where events go and compose by wrapping one another:
//!
//! | Sink | Destination |
//! |------|-------------|
//! | `JsonlTraceSink` | One JSON object per line in a file |
//! | `ConsoleTraceSink` | `tracing` at info level |
//! | `QueueTraceSink` | Tokio channel, for live progress streams |
//! | `HttpTraceSink` | External trace store, fire-and-forget POST |
//! | `FanOutTraceSink` | Every child sink, in order |
//! | `ContextTraceSink` | Inner sink, with fixed fields (e.g. `run_id`) merged in |
//! | `FilteredTraceSink` | Inner sink, only for allowed steps |
//!
//! Recording never fails outward: a broken sink must not break a query.

pub mod sinks;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use sinks::{
    daily_trace_path, ConsoleTraceSink, ContextTraceSink, FanOutTraceSink, FilteredTraceSink,
    HttpTraceSink, JsonlTraceSink, NullTraceSink, QueueTraceSink,
};

/// One observation from the pipeline. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub timestamp: DateTime<Utc>,
    pub step: String,
    pub payload: Map<String, Value>,
}

impl TraceEvent {
    /// Event stamped now. A non-object payload is stored under `"value"`.
    pub fn new(step: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        Self { timestamp: Utc::now(), step: step.into(), payload }
    }

    /// Copy with `extra` fields merged in. Existing payload fields win.
    pub fn with_fields(&self, extra: &Map<String, Value>) -> Self {
        let mut payload = extra.clone();
        for (k, v) in &self.payload {
            payload.insert(k.clone(), v.clone());
        }
        Self { timestamp: self.timestamp, step: self.step.clone(), payload }
    }

    /// Flat JSON object: `timestamp`, `step`, then the payload fields.
    pub fn to_flat_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("timestamp".into(), Value::String(self.timestamp.to_rfc3339()));
        obj.insert("step".into(), Value::String(self.step.clone()));
        for (k, v) in &self.payload {
            if k != "timestamp" && k != "step" {
                obj.insert(k.clone(), v.clone());
            }
        }
        Value::Object(obj)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }
}

/// Destination for trace events.
pub trait TraceSink: Send + Sync {
    /// Record one event. Must not panic; failures are swallowed.
    fn record(&self, event: TraceEvent);

    /// Build and record an event.
    fn emit(&self, step: &str, payload: Value) {
        self.record(TraceEvent::new(step, payload));
    }
}

impl<T: TraceSink + ?Sized> TraceSink for Arc<T> {
    fn record(&self, event: TraceEvent) {
        (**self).record(event)
    }
}

impl<T: TraceSink + ?Sized> TraceSink for &T {
    fn record(&self, event: TraceEvent) {
        (**self).record(event)
    }
}
