//! Resumable artifact downloads.
//!
//! Files are streamed to `<name>.part` and renamed into place once complete,
//! so a reader never observes a torn final name. On re-entry the fetch
//! resumes from the partial file's byte offset with a range request; a
//! server that ignores the range restarts the file from zero.

use crate::{HubClient, HubError, Result};
use futures_util::StreamExt;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub(crate) const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

impl HubClient {
    /// Download `repo`'s `filename` into `out_dir`, resuming a previous
    /// partial transfer when possible. Returns the final path.
    pub async fn download(&self, repo: &str, filename: &str, out_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(out_dir).await?;

        let final_path = out_dir.join(filename);
        if final_path.exists() {
            debug!("{} already downloaded", final_path.display());
            return Ok(final_path);
        }
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part_path = part_path(&final_path);
        let offset = match tokio::fs::metadata(&part_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let url = self.resolve_url(repo, filename);
        let response = self.ranged_get(url, offset).send().await?;

        let mut file;
        match response.status() {
            StatusCode::PARTIAL_CONTENT if offset > 0 => {
                debug!("Resuming {} from byte {}", filename, offset);
                file = OpenOptions::new().append(true).open(&part_path).await?;
            }
            StatusCode::OK => {
                if offset > 0 {
                    debug!("Range not honored for {}, restarting", filename);
                }
                file = File::create(&part_path).await?;
            }
            status if status.is_success() => {
                file = File::create(&part_path).await?;
            }
            status => {
                let detail = response.text().await.unwrap_or_default();
                return Err(HubError::Status {
                    status: status.as_u16(),
                    detail,
                });
            }
        }

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&part_path, &final_path).await?;
        info!(
            "Downloaded {} ({} bytes this attempt) to {}",
            filename,
            written,
            final_path.display()
        );
        Ok(final_path)
    }
}

fn part_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    final_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn downloads_and_renames_into_place() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/owner/model/resolve/main/m.gguf");
                then.status(200).body("gguf-bytes");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = HubClient::new(server.base_url(), None);
        let path = client
            .download("owner/model", "m.gguf", dir.path())
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("m.gguf"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "gguf-bytes");
        assert!(!dir.path().join("m.gguf.part").exists());
    }

    #[tokio::test]
    async fn resumes_from_partial_file() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/owner/model/resolve/main/m.gguf")
                    .header("range", "bytes=5-");
                then.status(206).body("bytes");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.gguf.part"), "gguf-").unwrap();

        let client = HubClient::new(server.base_url(), None);
        let path = client
            .download("owner/model", "m.gguf", dir.path())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "gguf-bytes");
    }

    #[tokio::test]
    async fn restarts_when_range_is_ignored() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/owner/model/resolve/main/m.gguf");
                then.status(200).body("full-content");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.gguf.part"), "stale").unwrap();

        let client = HubClient::new(server.base_url(), None);
        let path = client
            .download("owner/model", "m.gguf", dir.path())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "full-content");
    }

    #[tokio::test]
    async fn existing_final_file_is_not_refetched() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path_matches(Regex::from(".*"));
                then.status(200).body("should-not-be-fetched");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.gguf"), "cached").unwrap();

        let client = HubClient::new(server.base_url(), None);
        let path = client
            .download("owner/model", "m.gguf", dir.path())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "cached");
        assert_eq!(mock.hits_async().await, 0);
    }
}
