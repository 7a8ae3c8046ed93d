//! Wiring: `Settings` in, ready-to-run engine out.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::config::{ModelSection, Settings, TraceSection};
use crate::engine::QueryEngine;
use crate::executor::GraphExecutor;
use crate::llm::{GeminiClient, GeminiConfig, LlmCall, RetryPolicy};
use crate::pipeline::{LlmCypherGenerator, LlmInstructionExpander, LlmSummarizer};
use crate::storage::HttpBackend;
use crate::trace::{ConsoleTraceSink, FanOutTraceSink, HttpTraceSink, JsonlTraceSink, NullTraceSink, TraceSink};
use crate::validator::{GraphSchema, RuleBasedValidator};
use crate::{Error, Result};

/// Sink for the configured trace destinations. Nothing configured means
/// events are dropped.
pub fn build_trace_sink(config: &TraceSection) -> Arc<dyn TraceSink> {
    let mut fan = FanOutTraceSink::default();
    if let Some(dir) = &config.jsonl_dir {
        fan.push(Arc::new(JsonlTraceSink::daily(dir.clone())));
    }
    if config.stdout {
        fan.push(Arc::new(ConsoleTraceSink));
    }
    if let Some(endpoint) = &config.http_endpoint {
        fan.push(Arc::new(HttpTraceSink::new(endpoint.clone())));
    }
    if fan.is_empty() {
        Arc::new(NullTraceSink)
    } else {
        Arc::new(fan)
    }
}

/// Gemini-backed engine over Neo4j HTTP, per `settings`.
pub fn build_engine(settings: &Settings) -> Result<QueryEngine> {
    settings.validate()?;
    let config = settings.pipeline_config()?;
    let schema = Arc::new(GraphSchema::oncology());

    let api_key = settings
        .llm
        .api_key
        .clone()
        .ok_or_else(|| Error::Config("GOOGLE_API_KEY is not set".into()))?;
    let cache = (settings.cache.ttl_secs > 0)
        .then(|| Arc::new(TtlCache::<String>::new(Duration::from_secs(settings.cache.ttl_secs))));

    let call = |component: &'static str, model: &ModelSection| -> Result<LlmCall> {
        let gemini = GeminiClient::new(
            GeminiConfig::new(api_key.clone(), model.model.clone())
                .with_base_url(settings.llm.base_url.clone())
                .with_temperature(model.temperature)
                .with_top_p(settings.llm.top_p)
                .with_max_output_tokens(settings.llm.max_output_tokens)
                .with_timeout(Duration::from_secs(settings.llm.timeout_secs)),
        )
        .map_err(|e| Error::Config(format!("{component}: {e}")))?;
        let call = LlmCall::new(component, Arc::new(gemini), RetryPolicy::default());
        Ok(match &cache {
            Some(cache) => call.with_cache(cache.clone()),
            None => call,
        })
    };

    let backend = HttpBackend::new(&settings.neo4j)?;
    tracing::info!(
        neo4j = %backend.commit_url(),
        generator = %settings.llm.generator.model,
        cache_ttl_secs = settings.cache.ttl_secs,
        "engine configured"
    );

    Ok(QueryEngine::new(
        Arc::new(LlmInstructionExpander::new(call("expander", &settings.llm.expander)?, schema.clone())),
        Arc::new(LlmCypherGenerator::new(call("generator", &settings.llm.generator)?, schema.clone())),
        Arc::new(RuleBasedValidator::new(schema.clone(), &config)),
        Arc::new(GraphExecutor::new(backend, schema, &config)),
        Arc::new(LlmSummarizer::new(call("summarizer", &settings.llm.summarizer)?)),
        build_trace_sink(&settings.trace),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_config_error() {
        let err = build_engine(&Settings::default()).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("GOOGLE_API_KEY")));
    }

    #[test]
    fn test_engine_builds_with_key() {
        let mut settings = Settings::default();
        settings.llm.api_key = Some("test-key".into());
        settings.trace.jsonl_dir = None;
        assert!(build_engine(&settings).is_ok());
    }

    #[test]
    fn test_trace_sink_without_destinations() {
        let config = TraceSection { jsonl_dir: None, stdout: false, http_endpoint: None };
        // Dropped silently
        build_trace_sink(&config).emit("run", serde_json::json!({}));
    }
}
