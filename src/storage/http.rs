//! Neo4j transactional HTTP API backend.
//!
//! Each `run` is one `POST {base}/db/{database}/tx/commit` request, so a
//! transaction here is an auto-commit scope: `begin_tx` allocates an id,
//! `rollback_tx` and `commit_tx` have nothing left to send. Read-only
//! transactions carry `access-mode: READ`, which makes the server route to
//! a reader and refuse writes on its own.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::json;

use super::{GraphBackend, GraphError, RawResult, RunOptions};
use crate::config::Neo4jSection;
use crate::tx::{Transaction, TxId, TxMode};
use crate::{Error, Result};

const HTTP_PORT: u16 = 7474;
const HTTPS_PORT: u16 = 7473;

/// Read-only Neo4j access over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    commit_url: String,
    user: String,
    password: String,
}

/// Auto-commit transaction scope.
#[derive(Debug)]
pub struct HttpTx {
    id: TxId,
    mode: TxMode,
}

impl Transaction for HttpTx {
    fn mode(&self) -> TxMode {
        self.mode
    }

    fn id(&self) -> TxId {
        self.id
    }
}

impl HttpBackend {
    pub fn new(config: &Neo4jSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
        Self::with_client(client, config)
    }

    pub fn with_client(client: reqwest::Client, config: &Neo4jSection) -> Result<Self> {
        let base = http_base_url(&config.uri)?;
        if config.database.trim().is_empty() {
            return Err(Error::Config("neo4j database name is empty".into()));
        }
        Ok(Self {
            client,
            commit_url: format!("{base}/db/{}/tx/commit", config.database),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    pub fn commit_url(&self) -> &str {
        &self.commit_url
    }
}

/// HTTP base URL for a Neo4j URI. `bolt://` and `neo4j://` map to the HTTP
/// port on the same host; their `+s`/`+ssc` variants map to HTTPS.
pub fn http_base_url(uri: &str) -> Result<String> {
    let url = reqwest::Url::parse(uri.trim()).map_err(|e| Error::Config(format!("neo4j uri '{uri}': {e}")))?;
    let (scheme, default_port) = match url.scheme() {
        "http" | "https" => return Ok(url.as_str().trim_end_matches('/').to_string()),
        "bolt" | "neo4j" => ("http", HTTP_PORT),
        "bolt+s" | "bolt+ssc" | "neo4j+s" | "neo4j+ssc" => ("https", HTTPS_PORT),
        other => return Err(Error::Config(format!("unsupported neo4j uri scheme '{other}'"))),
    };
    let host = url
        .host_str()
        .ok_or_else(|| Error::Config(format!("neo4j uri '{uri}' has no host")))?;
    Ok(format!("{scheme}://{host}:{default_port}"))
}

fn map_transport(e: reqwest::Error, options: RunOptions) -> GraphError {
    if e.is_timeout() {
        GraphError::Timeout(options.timeout)
    } else if e.is_decode() {
        GraphError::Protocol(e.to_string())
    } else {
        GraphError::Connection(e.to_string())
    }
}

#[async_trait]
impl GraphBackend for HttpBackend {
    type Tx = HttpTx;

    async fn begin_tx(&self, mode: TxMode) -> std::result::Result<HttpTx, GraphError> {
        if mode != TxMode::ReadOnly {
            return Err(GraphError::TxMode(mode));
        }
        Ok(HttpTx { id: TxId::next(), mode })
    }

    async fn commit_tx(&self, _tx: HttpTx) -> std::result::Result<(), GraphError> {
        Ok(())
    }

    async fn rollback_tx(&self, _tx: HttpTx) -> std::result::Result<(), GraphError> {
        Ok(())
    }

    async fn run(
        &self,
        tx: &mut HttpTx,
        query: &str,
        options: RunOptions,
    ) -> std::result::Result<RawResult, GraphError> {
        if !tx.is_read_only() {
            return Err(GraphError::TxMode(tx.mode));
        }
        tracing::debug!(tx = %tx.id, fetch_size = options.fetch_size, "running read query over HTTP");

        let body = json!({
            "statements": [{"statement": query, "resultDataContents": ["row"]}],
        });
        let response = self
            .client
            .post(&self.commit_url)
            .basic_auth(&self.user, Some(&self.password))
            .header(ACCEPT, "application/json")
            .header("access-mode", tx.mode.access_mode())
            .timeout(options.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport(e, options))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| map_transport(e, options))?;
        let parsed: CommitResponse = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                GraphError::Protocol(format!("malformed response: {e}"))
            } else {
                GraphError::Protocol(format!("HTTP {status}"))
            }
        })?;

        if let Some(error) = parsed.errors.into_iter().next() {
            return Err(GraphError::Rejected { code: error.code, message: error.message });
        }
        if !status.is_success() {
            return Err(GraphError::Protocol(format!("HTTP {status}")));
        }

        let result = parsed
            .results
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::Protocol("response has no statement result".into()))?;
        Ok(RawResult {
            columns: result.columns,
            records: result.data.into_iter().map(|d| d.row).collect(),
        })
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<ServerError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<DataRow>,
}

#[derive(Debug, Deserialize)]
struct DataRow {
    #[serde(default)]
    row: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    code: String,
    #[serde(default)]
    message: String,
}
