//! Authenticated hub HTTP client.

use crate::{HubError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
}

#[derive(Clone)]
pub struct HubClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: String, timeout: Duration) -> reqwest::RequestBuilder {
        let mut request = self.http.get(url).timeout(timeout);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Filenames in a repository, from the model metadata endpoint.
    pub async fn list_files(&self, repo: &str) -> Result<Vec<String>> {
        let url = format!("{}/api/models/{}", self.base_url, repo);
        debug!("Listing files for {}", repo);
        let response = self.get(url, METADATA_TIMEOUT).send().await?;

        match response.status().as_u16() {
            404 => return Err(HubError::NotFound),
            401 => return Err(HubError::AuthRequired),
            403 => return Err(HubError::Gated),
            _ => {}
        }
        let response = check_status(response).await?;
        let info: RepoInfo = response.json().await?;
        Ok(info.siblings.into_iter().map(|s| s.rfilename).collect())
    }

    /// The repository's `config.json`, parsed.
    pub async fn get_config(&self, repo: &str) -> Result<Value> {
        let url = format!("{}/{}/raw/main/config.json", self.base_url, repo);
        let response = self.get(url, METADATA_TIMEOUT).send().await?;
        if response.status().as_u16() == 404 {
            return Err(HubError::NotFound);
        }
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Download URL for a file in a repository.
    pub(crate) fn resolve_url(&self, repo: &str, filename: &str) -> String {
        format!("{}/{}/resolve/main/{}", self.base_url, repo, filename)
    }

    pub(crate) fn ranged_get(&self, url: String, offset: u64) -> reqwest::RequestBuilder {
        let mut request = self.get(url, crate::fetch::DOWNLOAD_TIMEOUT);
        if offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={}-", offset));
        }
        request
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(HubError::Status {
        status: status.as_u16(),
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn lists_sibling_filenames() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/models/owner/model");
                then.status(200).json_body(serde_json::json!({
                    "siblings": [
                        {"rfilename": "config.json"},
                        {"rfilename": "model-Q4_K_M.gguf"}
                    ]
                }));
            })
            .await;

        let client = HubClient::new(server.base_url(), None);
        let files = client.list_files("owner/model").await.unwrap();
        assert_eq!(files, vec!["config.json", "model-Q4_K_M.gguf"]);
    }

    #[tokio::test]
    async fn maps_access_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/models/missing/repo");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/models/gated/repo");
                then.status(403);
            })
            .await;

        let client = HubClient::new(server.base_url(), None);
        assert!(matches!(
            client.list_files("missing/repo").await.unwrap_err(),
            HubError::NotFound
        ));
        assert!(matches!(
            client.list_files("gated/repo").await.unwrap_err(),
            HubError::Gated
        ));
    }

    #[tokio::test]
    async fn sends_bearer_token_when_configured() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/models/owner/model")
                    .header("authorization", "Bearer hf_secret");
                then.status(200).json_body(serde_json::json!({"siblings": []}));
            })
            .await;

        let client = HubClient::new(server.base_url(), Some("hf_secret".to_string()));
        client.list_files("owner/model").await.unwrap();
        mock.assert_async().await;
    }
}
