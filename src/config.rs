//! Configuration.
//!
//! [`PipelineConfig`] is the immutable, validated set of execution bounds the
//! validator and executor share. [`Settings`] is everything a deployment
//! configures: defaults, then an optional TOML file, then environment
//! variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// Pipeline bounds
// ============================================================================

/// Result-size and execution bounds. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    default_limit: u64,
    max_limit: u64,
    execution_timeout: Duration,
    fetch_size: usize,
}

impl PipelineConfig {
    /// Fails unless `0 < default_limit <= max_limit`, the timeout is
    /// non-zero and `fetch_size > 0`.
    pub fn new(
        default_limit: u64,
        max_limit: u64,
        execution_timeout: Duration,
        fetch_size: usize,
    ) -> Result<Self> {
        if default_limit == 0 {
            return Err(Error::Config("default_limit must be positive".into()));
        }
        if default_limit > max_limit {
            return Err(Error::Config(format!(
                "default_limit ({default_limit}) exceeds max_limit ({max_limit})"
            )));
        }
        if execution_timeout.is_zero() {
            return Err(Error::Config("execution timeout must be positive".into()));
        }
        if fetch_size == 0 {
            return Err(Error::Config("fetch_size must be positive".into()));
        }
        Ok(Self { default_limit, max_limit, execution_timeout, fetch_size })
    }

    pub fn default_limit(&self) -> u64 { self.default_limit }
    pub fn max_limit(&self) -> u64 { self.max_limit }
    pub fn execution_timeout(&self) -> Duration { self.execution_timeout }
    pub fn fetch_size(&self) -> usize { self.fetch_size }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 200,
            execution_timeout: Duration::from_secs(15),
            fetch_size: 100,
        }
    }
}

// ============================================================================
// Deployment settings
// ============================================================================

/// Full deployment configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub neo4j: Neo4jSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub trace: TraceSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_limit")]
    pub default_limit: u64,
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,
    /// Query execution timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

fn default_limit() -> u64 { 100 }
fn default_max_limit() -> u64 { 200 }
fn default_timeout_secs() -> f64 { 15.0 }
fn default_fetch_size() -> usize { 100 }

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            timeout_secs: default_timeout_secs(),
            fetch_size: default_fetch_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neo4jSection {
    /// `http(s)://` endpoint, or a `bolt://`/`neo4j://` URI mapped to the
    /// HTTP port
    #[serde(default = "default_neo4j_uri")]
    pub uri: String,
    #[serde(default = "default_neo4j_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_neo4j_database")]
    pub database: String,
}

fn default_neo4j_uri() -> String { "http://localhost:7474".into() }
fn default_neo4j_user() -> String { "neo4j".into() }
fn default_neo4j_database() -> String { "neo4j".into() }

impl Default for Neo4jSection {
    fn default() -> Self {
        Self {
            uri: default_neo4j_uri(),
            user: default_neo4j_user(),
            password: String::new(),
            database: default_neo4j_database(),
        }
    }
}

/// Model and sampling temperature for one LLM call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String { "gemini-2.5-flash".into() }
fn default_temperature() -> f32 { 0.1 }

impl Default for ModelSection {
    fn default() -> Self {
        Self { model: default_model(), temperature: default_temperature() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub expander: ModelSection,
    #[serde(default)]
    pub generator: ModelSection,
    #[serde(default)]
    pub summarizer: ModelSection,
}

fn default_llm_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".into() }
fn default_llm_timeout_secs() -> u64 { 60 }
fn default_top_p() -> f32 { 0.95 }
fn default_max_output_tokens() -> u32 { 2048 }

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            timeout_secs: default_llm_timeout_secs(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
            expander: ModelSection::default(),
            generator: ModelSection::default(),
            summarizer: ModelSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSection {
    /// LLM response TTL in seconds; 0 disables caching
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 { 172_800 }

impl Default for CacheSection {
    fn default() -> Self {
        Self { ttl_secs: default_cache_ttl_secs() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSection {
    /// Directory for daily JSONL trace files; `None` disables file traces
    #[serde(default = "default_trace_dir")]
    pub jsonl_dir: Option<PathBuf>,
    /// Mirror trace events to the log
    #[serde(default)]
    pub stdout: bool,
    /// External trace store that accepts one JSON event per POST
    #[serde(default)]
    pub http_endpoint: Option<String>,
}

fn default_trace_dir() -> Option<PathBuf> { Some(PathBuf::from("logs/traces")) }

impl Default for TraceSection {
    fn default() -> Self {
        Self { jsonl_dir: default_trace_dir(), stdout: false, http_endpoint: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_listen_addr() -> String { "127.0.0.1:8000".into() }

impl Default for ServerSection {
    fn default() -> Self {
        Self { listen_addr: default_listen_addr(), cors_origins: Vec::new() }
    }
}

impl Settings {
    /// Load settings from a TOML file. Missing sections take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("invalid settings file: {e}")))
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_env()?;
        Ok(settings)
    }

    /// Defaults, then `config_file` if given and present, then environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut settings = match config_file {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "loading settings file");
                Self::from_file(path)?
            }
            Some(path) => {
                tracing::warn!(path = %path.display(), "settings file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Override from the process environment.
    ///
    /// Supported variables:
    /// - `NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD`, `NEO4J_DATABASE`
    /// - `NEO4J_TIMEOUT_SECONDS`, `NEO4J_FETCH_SIZE`
    /// - `QUERY_DEFAULT_LIMIT`, `QUERY_MAX_LIMIT`
    /// - `GOOGLE_API_KEY`, `GEMINI_BASE_URL`
    /// - `GEMINI_{INSTRUCTION_EXPANDER,CYPHER_GENERATOR,SUMMARIZER}_{MODEL,TEMPERATURE}`
    /// - `LLM_CACHE_TTL_SECONDS` (falls back to `CACHE_TTL_SECONDS`)
    /// - `TRACE_DIR`, `TRACE_STDOUT`, `TRACE_HTTP_ENDPOINT`
    /// - `ONCOGRAPH_LISTEN_ADDR`, `CORS_ORIGINS` (comma-separated)
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override from an arbitrary key lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // Neo4j
        if let Some(v) = get("NEO4J_URI") { self.neo4j.uri = v; }
        if let Some(v) = get("NEO4J_USER") { self.neo4j.user = v; }
        if let Some(v) = get("NEO4J_PASSWORD") { self.neo4j.password = v; }
        if let Some(v) = get("NEO4J_DATABASE") { self.neo4j.database = v; }

        // Pipeline bounds
        if let Some(v) = get("NEO4J_TIMEOUT_SECONDS") { self.pipeline.timeout_secs = parse("NEO4J_TIMEOUT_SECONDS", &v)?; }
        if let Some(v) = get("NEO4J_FETCH_SIZE") { self.pipeline.fetch_size = parse("NEO4J_FETCH_SIZE", &v)?; }
        if let Some(v) = get("QUERY_DEFAULT_LIMIT") { self.pipeline.default_limit = parse("QUERY_DEFAULT_LIMIT", &v)?; }
        if let Some(v) = get("QUERY_MAX_LIMIT") { self.pipeline.max_limit = parse("QUERY_MAX_LIMIT", &v)?; }

        // LLM
        if let Some(v) = get("GOOGLE_API_KEY") { self.llm.api_key = Some(v); }
        if let Some(v) = get("GEMINI_BASE_URL") { self.llm.base_url = v; }
        for (prefix, section) in [
            ("GEMINI_INSTRUCTION_EXPANDER", &mut self.llm.expander),
            ("GEMINI_CYPHER_GENERATOR", &mut self.llm.generator),
            ("GEMINI_SUMMARIZER", &mut self.llm.summarizer),
        ] {
            let model_key = format!("{prefix}_MODEL");
            let temp_key = format!("{prefix}_TEMPERATURE");
            if let Some(v) = get(&model_key) { section.model = v; }
            if let Some(v) = get(&temp_key) { section.temperature = parse(&temp_key, &v)?; }
        }

        // Cache
        if let Some(v) = get("LLM_CACHE_TTL_SECONDS") {
            self.cache.ttl_secs = parse("LLM_CACHE_TTL_SECONDS", &v)?;
        } else if let Some(v) = get("CACHE_TTL_SECONDS") {
            self.cache.ttl_secs = parse("CACHE_TTL_SECONDS", &v)?;
        }

        // Tracing
        if let Some(v) = get("TRACE_DIR") {
            self.trace.jsonl_dir = match v.as_str() {
                "off" | "none" => None,
                _ => Some(PathBuf::from(v)),
            };
        }
        if let Some(v) = get("TRACE_STDOUT") {
            self.trace.stdout = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = get("TRACE_HTTP_ENDPOINT") { self.trace.http_endpoint = Some(v); }

        // Server
        if let Some(v) = get("ONCOGRAPH_LISTEN_ADDR") { self.server.listen_addr = v; }
        if let Some(v) = get("CORS_ORIGINS") {
            self.server.cors_origins = v
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        Ok(())
    }

    /// Build the validated pipeline bounds.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        if !self.pipeline.timeout_secs.is_finite() || self.pipeline.timeout_secs <= 0.0 {
            return Err(Error::Config("pipeline.timeout_secs must be positive".into()));
        }
        PipelineConfig::new(
            self.pipeline.default_limit,
            self.pipeline.max_limit,
            Duration::from_secs_f64(self.pipeline.timeout_secs),
            self.pipeline.fetch_size,
        )
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.pipeline_config()?;
        if self.neo4j.uri.is_empty() {
            return Err(Error::Config("neo4j.uri is required".into()));
        }
        for (name, section) in [
            ("expander", &self.llm.expander),
            ("generator", &self.llm.generator),
            ("summarizer", &self.llm.summarizer),
        ] {
            if section.model.is_empty() {
                return Err(Error::Config(format!("llm.{name}.model is required")));
            }
            if !(0.0..=2.0).contains(&section.temperature) {
                return Err(Error::Config(format!("llm.{name}.temperature must be within 0..=2")));
            }
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{key}: cannot parse {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.default_limit(), 100);
        assert_eq!(config.max_limit(), 200);
        assert_eq!(config.execution_timeout(), Duration::from_secs(15));
        assert_eq!(config.fetch_size(), 100);
        assert_eq!(Settings::default().pipeline_config().unwrap(), config);
    }

    #[test]
    fn test_default_above_max_is_rejected() {
        let err = PipelineConfig::new(300, 200, Duration::from_secs(1), 10).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_env_from(env(&[
                ("NEO4J_URI", "bolt://graph:7687"),
                ("GOOGLE_API_KEY", "k"),
                ("GEMINI_CYPHER_GENERATOR_TEMPERATURE", "0.0"),
                ("CACHE_TTL_SECONDS", "60"),
                ("TRACE_STDOUT", "true"),
                ("CORS_ORIGINS", "http://a.test, http://b.test"),
            ]))
            .unwrap();
        assert_eq!(settings.neo4j.uri, "bolt://graph:7687");
        assert_eq!(settings.llm.api_key.as_deref(), Some("k"));
        assert_eq!(settings.llm.generator.temperature, 0.0);
        assert_eq!(settings.llm.expander.temperature, 0.1);
        assert_eq!(settings.cache.ttl_secs, 60);
        assert!(settings.trace.stdout);
        assert_eq!(settings.server.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_llm_cache_ttl_wins_over_generic() {
        let mut settings = Settings::default();
        settings
            .apply_env_from(env(&[("LLM_CACHE_TTL_SECONDS", "5"), ("CACHE_TTL_SECONDS", "60")]))
            .unwrap();
        assert_eq!(settings.cache.ttl_secs, 5);
    }

    #[test]
    fn test_bad_env_value_is_a_config_error() {
        let mut settings = Settings::default();
        let err = settings.apply_env_from(env(&[("QUERY_MAX_LIMIT", "lots")])).unwrap_err();
        assert!(err.to_string().contains("QUERY_MAX_LIMIT"));
    }

    #[test]
    fn test_from_toml_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oncograph.toml");
        std::fs::write(
            &path,
            "[pipeline]\nmax_limit = 50\ndefault_limit = 25\n\n[llm.summarizer]\nmodel = \"gemini-2.5-pro\"\n",
        )
        .unwrap();
        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.pipeline.max_limit, 50);
        assert_eq!(settings.pipeline.timeout_secs, 15.0);
        assert_eq!(settings.llm.summarizer.model, "gemini-2.5-pro");
        assert_eq!(settings.llm.summarizer.temperature, 0.1);
        assert_eq!(settings.llm.expander.model, "gemini-2.5-flash");
        settings.validate().unwrap();
    }
}
