//! HTTP transport to the server's `/ping`, `/query` and `/write` endpoints

use crate::batch::WriteSink;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use fluxgate_core::QueryResponse;
use tracing::debug;

/// Version reported by a server that is up but not ready, or that sent no
/// version header at all
pub const UNKNOWN_VERSION: &str = "unknown";

/// Header carrying the server version on every response
pub const VERSION_HEADER: &str = "X-Influxdb-Version";

/// Timestamp precision used for writes and for reading back query results
const PRECISION: &str = "ms";

/// HTTP client bound to one server and one set of credentials
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe `/ping` once and return the reported version.
    ///
    /// A non-success status or a missing header reads as [`UNKNOWN_VERSION`];
    /// only transport failures are errors.
    pub async fn ping(&self) -> Result<String> {
        let url = format!("{}/ping", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            debug!("Ping returned status {}", response.status());
            return Ok(UNKNOWN_VERSION.to_string());
        }

        let version = response
            .headers()
            .get(VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(UNKNOWN_VERSION)
            .to_string();
        Ok(version)
    }

    /// Run a read statement (`GET /query`) with millisecond epochs
    pub async fn query(&self, database: &str, statement: &str) -> Result<QueryResponse> {
        debug!("Query on {}: {}", database, statement);
        let url = format!("{}/query", self.base_url);
        let request = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("db", database), ("q", statement), ("epoch", PRECISION)]);

        Self::read_query_response(request.send().await?).await
    }

    /// Run a statement that changes server state (`POST /query`)
    pub async fn execute(&self, statement: &str) -> Result<QueryResponse> {
        debug!("Execute: {}", statement);
        let url = format!("{}/query", self.base_url);
        let request = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("q", statement)]);

        Self::read_query_response(request.send().await?).await
    }

    async fn read_query_response(response: reqwest::Response) -> Result<QueryResponse> {
        let response = Self::check_status(response).await?;
        let body = response.text().await?;
        Ok(QueryResponse::from_json(&body)?.into_result()?)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(ClientError::Server { status, message })
    }
}

#[async_trait]
impl WriteSink for HttpTransport {
    async fn write(&self, database: &str, retention_policy: &str, body: String) -> Result<()> {
        let url = format!("{}/write", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("db", database), ("rp", retention_policy), ("precision", PRECISION)])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }
}
