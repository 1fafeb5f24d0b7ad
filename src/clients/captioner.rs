//! AI caption generation.
//!
//! The most latency- and quota-expensive capability in the pipeline, so a
//! session uploads the media at most once and reuses the remote handle for
//! every generation it needs (short-form caption, optional long-form
//! title/description) before releasing it. Oversized inputs are trimmed to
//! a short clip before upload instead of being rejected.

use crate::clients::extract::CaptionInfo;
use crate::config::CaptionerConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Platform-specific texts produced from one uploaded media handle.
#[derive(Debug, Clone, Default)]
pub struct GeneratedCaptions {
    pub instagram: Option<String>,
    pub youtube: Option<YtMeta>,
}

/// Long-form platform metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtMeta {
    pub title: String,
    pub description: String,
}

/// Caption-generation boundary.
#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    /// Generate captions for `video` using the extracted source context.
    /// Invoked at most once per session.
    async fn generate(
        &self,
        video: &Path,
        context: &CaptionInfo,
        want_youtube: bool,
    ) -> Result<GeneratedCaptions>;
}

/// HTTP implementation against the captioning API.
pub struct HttpCaptioner {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    upload_cap_bytes: u64,
    trim_secs: f64,
    poll_interval: Duration,
    poll_timeout: Duration,
    caption_max_chars: usize,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    handle: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

impl HttpCaptioner {
    pub fn new(config: &CaptionerConfig) -> Self {
        Self {
            client: super::build_http_client(Duration::from_secs(60)),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            upload_cap_bytes: config.upload_cap_bytes,
            trim_secs: config.trim_secs,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            caption_max_chars: config.caption_max_chars,
        }
    }

    /// Trim an oversized input to a short highly compressed clip so the
    /// upload stays under the cap. The trimmed sibling shares the input's
    /// filename stem, keeping it inside the session's cleanup namespace.
    async fn prepare_upload(&self, video: &Path) -> Result<PathBuf> {
        let size = tokio::fs::metadata(video).await?.len();
        if size <= self.upload_cap_bytes {
            return Ok(video.to_path_buf());
        }

        let trimmed = video.with_extension("trim.mp4");
        info!(
            bytes = size,
            cap = self.upload_cap_bytes,
            "input over captioner cap, trimming before upload"
        );
        reelcast_av::trim_clip(video, &trimmed, self.trim_secs, 28, Duration::from_secs(120))
            .await
            .context("failed to trim oversized captioner input")?;
        Ok(trimmed)
    }

    async fn upload(&self, video: &Path) -> Result<String> {
        let bytes = tokio::fs::read(video).await?;
        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .header("Content-Type", "video/mp4")
            .body(bytes)
            .send()
            .await
            .context("captioner upload unreachable")?;

        if !response.status().is_success() {
            bail!("captioner upload returned HTTP {}", response.status());
        }

        let file: FileResponse = response.json().await.context("invalid upload payload")?;
        Ok(file.handle)
    }

    /// Wait for the uploaded media to finish remote processing.
    async fn await_active(&self, handle: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.poll_timeout;
        loop {
            let response = self
                .client
                .get(format!("{}/files/{}", self.base_url, handle))
                .header("X-Api-Key", &self.api_key)
                .send()
                .await
                .context("captioner status unreachable")?;

            if !response.status().is_success() {
                bail!("captioner status returned HTTP {}", response.status());
            }

            let file: FileResponse = response.json().await.context("invalid status payload")?;
            match file.state.as_str() {
                "ACTIVE" => return Ok(()),
                "FAILED" => bail!("captioner failed to process the upload"),
                other => debug!(state = other, "captioner still processing"),
            }

            if tokio::time::Instant::now() + self.poll_interval > deadline {
                bail!(
                    "captioner processing exceeded {}s",
                    self.poll_timeout.as_secs()
                );
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn generate_text(&self, handle: &str, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .json(&json!({ "handle": handle, "prompt": prompt }))
            .send()
            .await
            .context("captioner generate unreachable")?;

        if !response.status().is_success() {
            bail!("captioner generate returned HTTP {}", response.status());
        }

        let generated: GenerateResponse =
            response.json().await.context("invalid generate payload")?;
        Ok(generated.text.trim().to_string())
    }

    async fn release(&self, handle: &str) {
        let result = self
            .client
            .delete(format!("{}/files/{}", self.base_url, handle))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await;
        if let Err(e) = result {
            warn!(error = %e, "failed to release captioner handle");
        }
    }

    fn instagram_prompt(&self, context: &CaptionInfo) -> String {
        let mut prompt = format!(
            "Write an engaging social caption for this short video, at most {} characters, \
             with a hook line and a call to action.",
            self.caption_max_chars
        );
        if !context.caption.is_empty() {
            prompt.push_str(&format!(" Original caption: \"{}\".", context.caption));
        }
        if let Some(author) = &context.author {
            prompt.push_str(&format!(" Credit the creator {}.", author));
        }
        prompt
    }

    fn youtube_prompt(&self, context: &CaptionInfo) -> String {
        let mut prompt = "Write metadata for this short video. Respond in exactly this format:\n\
                          TITLE: <title>\nDESCRIPTION: <description>"
            .to_string();
        if !context.caption.is_empty() {
            prompt.push_str(&format!("\nOriginal caption: \"{}\".", context.caption));
        }
        prompt
    }
}

#[async_trait]
impl CaptionGenerator for HttpCaptioner {
    async fn generate(
        &self,
        video: &Path,
        context: &CaptionInfo,
        want_youtube: bool,
    ) -> Result<GeneratedCaptions> {
        let upload_path = self.prepare_upload(video).await?;
        let handle = self.upload(&upload_path).await?;
        debug!(handle = %handle, "captioner upload accepted");

        // The handle must be released whatever happens past this point.
        let result = async {
            self.await_active(&handle).await?;

            let mut captions = GeneratedCaptions {
                instagram: Some(
                    self.generate_text(&handle, &self.instagram_prompt(context))
                        .await?,
                ),
                youtube: None,
            };

            if want_youtube {
                let raw = self
                    .generate_text(&handle, &self.youtube_prompt(context))
                    .await?;
                captions.youtube = parse_yt_meta(&raw);
            }

            Ok(captions)
        }
        .await;

        self.release(&handle).await;
        result
    }
}

/// Parse a `TITLE:`/`DESCRIPTION:` formatted response.
fn parse_yt_meta(raw: &str) -> Option<YtMeta> {
    let mut title = None;
    let mut description_lines = Vec::new();
    let mut in_description = false;

    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("TITLE:") {
            title = Some(rest.trim().to_string());
            in_description = false;
        } else if let Some(rest) = line.strip_prefix("DESCRIPTION:") {
            description_lines.push(rest.trim().to_string());
            in_description = true;
        } else if in_description {
            description_lines.push(line.to_string());
        }
    }

    let title = title.filter(|t| !t.is_empty())?;
    Some(YtMeta {
        title,
        description: description_lines.join("\n").trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> CaptionerConfig {
        CaptionerConfig {
            base_url: server.uri(),
            api_key: "key".to_string(),
            upload_cap_bytes: 1024 * 1024,
            trim_secs: 10.0,
            poll_interval_secs: 0,
            poll_timeout_secs: 2,
            caption_max_chars: 500,
        }
    }

    #[test]
    fn parses_title_description_format() {
        let meta = parse_yt_meta("TITLE: Big Moment\nDESCRIPTION: What a play.\nMore detail.")
            .unwrap();
        assert_eq!(meta.title, "Big Moment");
        assert_eq!(meta.description, "What a play.\nMore detail.");
    }

    #[test]
    fn missing_title_yields_none() {
        assert!(parse_yt_meta("DESCRIPTION: only a description").is_none());
        assert!(parse_yt_meta("free-form text").is_none());
    }

    #[tokio::test]
    async fn generates_instagram_caption_and_releases_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "handle": "files/h1", "state": "PROCESSING" }),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/files/h1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "handle": "files/h1", "state": "ACTIVE" }),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "text": "fresh caption" })),
            )
            .mount(&server)
            .await;
        let release = Mock::given(method("DELETE"))
            .and(path("/files/files/h1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount_as_scoped(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, vec![0u8; 512]).unwrap();

        let captioner = HttpCaptioner::new(&config(&server));
        let captions = captioner
            .generate(&video, &CaptionInfo::default(), false)
            .await
            .unwrap();

        assert_eq!(captions.instagram.as_deref(), Some("fresh caption"));
        assert!(captions.youtube.is_none());
        drop(release);
    }

    #[tokio::test]
    async fn handle_is_released_even_when_generation_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "handle": "files/h2", "state": "PROCESSING" }),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/files/h2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "handle": "files/h2", "state": "FAILED" }),
            ))
            .mount(&server)
            .await;
        let release = Mock::given(method("DELETE"))
            .and(path("/files/files/h2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount_as_scoped(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, vec![0u8; 512]).unwrap();

        let captioner = HttpCaptioner::new(&config(&server));
        let result = captioner
            .generate(&video, &CaptionInfo::default(), false)
            .await;

        assert!(result.is_err());
        drop(release);
    }
}
