//! Shared LLM call policy: cache, retry, trace.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{AttemptOutcome, LlmError, RetryPolicy, TextGenerator};
use crate::cache::{cache_key, TtlCache};
use crate::trace::TraceSink;

/// One component's view of a model: which generator, how to retry, and an
/// optional response cache shared across components.
#[derive(Clone)]
pub struct LlmCall {
    component: &'static str,
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    cache: Option<Arc<TtlCache<String>>>,
}

impl LlmCall {
    pub fn new(component: &'static str, generator: Arc<dyn TextGenerator>, retry: RetryPolicy) -> Self {
        Self { component, generator, retry, cache: None }
    }

    pub fn with_cache(mut self, cache: Arc<TtlCache<String>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// Complete `prompt`, consulting the cache first and retrying transient
    /// failures. Whitespace-only output counts as `EmptyResponse`.
    pub async fn complete(&self, prompt: &str, trace: &dyn TraceSink) -> Result<String, LlmError> {
        let key = cache_key(self.component, self.generator.model(), self.generator.temperature(), prompt);

        if let Some(cache) = &self.cache {
            let cached = cache.get(&key);
            trace.emit(
                "llm_cache",
                json!({"component": self.component, "hit": cached.is_some(), "key": key}),
            );
            if let Some(text) = cached {
                tracing::debug!(component = self.component, "LLM cache hit");
                return Ok(text);
            }
        }

        let model = self.generator.model().to_string();
        let text = self
            .retry
            .run(
                |_| async {
                    let text = self.generator.generate(prompt).await?;
                    if text.trim().is_empty() {
                        return Err(LlmError::EmptyResponse);
                    }
                    Ok(text)
                },
                |outcome| trace.emit("llm_attempt", self.attempt_payload(&model, outcome)),
            )
            .await?;

        if let Some(cache) = &self.cache {
            cache.set(key, &text);
        }
        Ok(text)
    }

    fn attempt_payload(&self, model: &str, outcome: &AttemptOutcome<'_>) -> Value {
        let mut payload = json!({
            "component": self.component,
            "model": model,
            "attempt": outcome.attempt,
            "max_attempts": outcome.max_attempts,
            "outcome": if outcome.error.is_some() { "error" } else { "ok" },
        });
        if let (Some(error), Value::Object(map)) = (outcome.error, &mut payload) {
            map.insert("error".into(), json!(error.to_string()));
            map.insert("error_kind".into(), json!(error.kind()));
            map.insert("transient".into(), json!(error.is_transient()));
            if let LlmError::Provider { status, code, reason, .. } = error {
                map.insert("status".into(), json!(status));
                map.insert("code".into(), json!(code));
                map.insert("reason".into(), json!(reason));
            }
            if let Some(delay) = outcome.retry_in {
                map.insert("retry_in_ms".into(), json!(delay.as_millis() as u64));
            }
        }
        payload
    }
}

impl std::fmt::Debug for LlmCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmCall")
            .field("component", &self.component)
            .field("model", &self.generator.model())
            .field("retry", &self.retry)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceEvent;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replays scripted responses.
    struct Scripted {
        responses: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(responses: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self { responses: Mutex::new(responses.into()), calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().pop_front().unwrap_or(Err(LlmError::EmptyResponse))
        }
        fn model(&self) -> &str {
            "scripted"
        }
        fn temperature(&self) -> f32 {
            0.1
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<TraceEvent>>);

    impl TraceSink for Collect {
        fn record(&self, event: TraceEvent) {
            self.0.lock().push(event);
        }
    }

    fn rate_limited() -> LlmError {
        LlmError::Provider {
            status: 429,
            code: Some(429),
            reason: Some("RESOURCE_EXHAUSTED".into()),
            message: "quota".into(),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_provider() {
        let r#gen = Scripted::new(vec![Ok("answer".into())]);
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let call = LlmCall::new("summarizer", r#gen.clone(), RetryPolicy::none()).with_cache(cache.clone());
        let trace = Collect::default();

        assert_eq!(call.complete("p", &trace).await.unwrap(), "answer");
        assert_eq!(call.complete("p", &trace).await.unwrap(), "answer");
        assert_eq!(r#gen.calls.load(Ordering::SeqCst), 1);

        let events = trace.0.lock();
        let hits: Vec<_> = events
            .iter()
            .filter(|e| e.step == "llm_cache")
            .map(|e| e.get("hit").cloned())
            .collect();
        assert_eq!(hits, vec![Some(json!(false)), Some(json!(true))]);
        assert_eq!(cache.delete_by_prefix("summarizer:"), 1);
    }

    #[tokio::test]
    async fn test_retry_events_carry_provider_detail() {
        let r#gen = Scripted::new(vec![Err(rate_limited()), Ok("MATCH (g:Gene) RETURN g".into())]);
        let call = LlmCall::new("generator", r#gen.clone(), RetryPolicy::immediate(3));
        let trace = Collect::default();

        let out = call.complete("p", &trace).await.unwrap();
        assert!(out.starts_with("MATCH"));

        let events = trace.0.lock();
        let attempts: Vec<_> = events.iter().filter(|e| e.step == "llm_attempt").collect();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].get("outcome"), Some(&json!("error")));
        assert_eq!(attempts[0].get("status"), Some(&json!(429)));
        assert_eq!(attempts[0].get("reason"), Some(&json!("RESOURCE_EXHAUSTED")));
        assert_eq!(attempts[1].get("outcome"), Some(&json!("ok")));
        // No cache configured, no cache events
        assert!(events.iter().all(|e| e.step != "llm_cache"));
    }

    #[tokio::test]
    async fn test_blank_output_is_empty_response_and_not_cached() {
        let r#gen = Scripted::new(vec![Ok("   ".into())]);
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let call = LlmCall::new("expander", r#gen, RetryPolicy::immediate(3)).with_cache(cache.clone());

        let err = call.complete("p", &crate::trace::NullTraceSink).await.unwrap_err();
        assert_eq!(err, LlmError::EmptyResponse);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_original_cause() {
        let r#gen = Scripted::new(vec![Err(rate_limited()), Err(rate_limited()), Err(rate_limited())]);
        let call = LlmCall::new("generator", r#gen.clone(), RetryPolicy::immediate(3));
        let err = call.complete("p", &crate::trace::NullTraceSink).await.unwrap_err();
        assert_eq!(err, rate_limited());
        assert_eq!(r#gen.calls.load(Ordering::SeqCst), 3);
    }
}
