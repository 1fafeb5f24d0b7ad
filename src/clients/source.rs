//! Source-video resolution and download.
//!
//! Resolves a content URL to a direct media URL through the resolver API,
//! then streams the media to a local file. The full streamed download is
//! raced against a wall-clock ceiling; losing the race deletes the partial
//! file. This is the one stage whose failure is fatal to a session.

use crate::config::SourceConfig;
use crate::timeout::with_timeout;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Fetches the referenced media onto local disk.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Resolve `source_url` and download the media to `dest`.
    async fn fetch(&self, source_url: &str, dest: &Path) -> Result<()>;
}

/// Resolver-API-backed implementation.
pub struct HttpSourceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    download_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    media_url: String,
}

impl HttpSourceClient {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            client: super::build_http_client(Duration::from_secs(config.request_timeout_secs)),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
        }
    }

    async fn resolve(&self, source_url: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/resolve", self.base_url))
            .query(&[("url", source_url)])
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .context("Failed to reach source resolver")?;

        if !response.status().is_success() {
            bail!("source resolver returned HTTP {}", response.status());
        }

        let resolved: ResolveResponse = response
            .json()
            .await
            .context("Failed to parse resolver response")?;
        Ok(resolved.media_url)
    }

    async fn download(&self, media_url: &str, dest: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(media_url)
            .send()
            .await
            .context("Failed to start media download")?;

        if !response.status().is_success() {
            bail!("media download returned HTTP {}", response.status());
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create download file {:?}", dest))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.context("Download stream broke")? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(bytes = written, dest = ?dest, "media download complete");
        Ok(())
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch(&self, source_url: &str, dest: &Path) -> Result<()> {
        let media_url = self.resolve(source_url).await?;
        info!(source = source_url, "resolved direct media url");

        let result = with_timeout(self.download_timeout, self.download(&media_url, dest)).await;
        if result.timed_out() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        result.into_result(|| {
            anyhow::anyhow!(
                "media download exceeded {}s ceiling",
                self.download_timeout.as_secs()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> SourceConfig {
        SourceConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            request_timeout_secs: 5,
            download_timeout_secs: 10,
        }
    }

    #[tokio::test]
    async fn fetch_resolves_then_streams_to_disk() {
        let server = MockServer::start().await;
        let media_url = format!("{}/media/clip.mp4", server.uri());

        Mock::given(method("GET"))
            .and(path("/resolve"))
            .and(query_param("url", "https://example.com/reel/abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "media_url": media_url })),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/media/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("download.mp4");
        let client = HttpSourceClient::new(&config(&server));

        client
            .fetch("https://example.com/reel/abc", &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn fetch_fails_when_resolver_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("download.mp4");
        let client = HttpSourceClient::new(&config(&server));

        let err = client
            .fetch("https://example.com/reel/abc", &dest)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn slow_download_hits_the_ceiling_and_removes_partial_file() {
        let server = MockServer::start().await;
        let media_url = format!("{}/media/slow.mp4", server.uri());

        Mock::given(method("GET"))
            .and(path("/resolve"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "media_url": media_url })),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/media/slow.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![7u8; 1024])
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("download.mp4");
        let mut cfg = config(&server);
        cfg.download_timeout_secs = 1;
        let client = HttpSourceClient::new(&cfg);

        let err = client
            .fetch("https://example.com/reel/abc", &dest)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ceiling"));
        assert!(!dest.exists());
    }
}
