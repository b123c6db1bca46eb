//! Client for the Ollama daemon the gateway fronts.
//!
//! Covers the catalog probe used for interception decisions and startup
//! reconciliation, plus the operations the queue worker drives: pulling
//! native models and importing converted ones over the Modelfile create
//! channel.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Catalog and health probes are quick; pulls and imports move gigabytes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("backend returned status {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("invalid backend response: {0}")]
    Decode(#[source] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, BackendError>;

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Raw `/api/tags` payload, as the backend returned it.
    pub async fn tags(&self) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(BackendError::Unreachable)?;
        let response = check_status(response).await?;
        response.json().await.map_err(BackendError::Decode)
    }

    /// Model identifiers currently held by the backend.
    ///
    /// Every model is present under both its full `name:tag` form and its
    /// bare `name`, so callers can match either.
    pub async fn model_names(&self) -> Result<HashSet<String>> {
        let tags = self.tags().await?;
        let mut names = HashSet::new();
        if let Some(models) = tags.get("models").and_then(Value::as_array) {
            for model in models {
                if let Some(name) = model.get("name").and_then(Value::as_str) {
                    names.insert(name.to_string());
                    if let Some(base) = name.split(':').next() {
                        names.insert(base.to_string());
                    }
                }
            }
        }
        Ok(names)
    }

    /// Short-deadline reachability probe for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(BackendError::Unreachable)?;
        check_status(response).await?;
        Ok(())
    }

    /// Pull a model through the backend's own downloader (non-streaming).
    pub async fn pull(&self, name: &str) -> Result<()> {
        debug!("Pulling model {} via backend", name);
        let response = self
            .http
            .post(format!("{}/api/pull", self.base_url))
            .timeout(TRANSFER_TIMEOUT)
            .json(&json!({ "name": name, "stream": false }))
            .send()
            .await
            .map_err(BackendError::Unreachable)?;
        check_status(response).await?;
        Ok(())
    }

    /// Register a model from a rendered Modelfile over the backend's native
    /// import channel.
    pub async fn create(&self, name: &str, modelfile: &str) -> Result<()> {
        debug!("Creating model {} from Modelfile", name);
        let response = self
            .http
            .post(format!("{}/api/create", self.base_url))
            .timeout(TRANSFER_TIMEOUT)
            .json(&json!({ "name": name, "modelfile": modelfile, "stream": false }))
            .send()
            .await
            .map_err(BackendError::Unreachable)?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        detail,
    })
}
