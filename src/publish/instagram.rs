//! Instagram-like publishing flow.
//!
//! Container create, processing poll, publish, best-effort first comment,
//! permalink fetch. Each remote step carries its own bounded retry with
//! status-code-specific waits; the outer per-account retry engine wraps the
//! whole flow. Client-identity headers are re-randomized per publish to
//! reduce fingerprint correlation across accounts.

use super::{Platform, PublishError, PublishRequest, PublishSuccess, Publisher};
use crate::config::persist::InstagramAccount;
use crate::config::InstagramConfig;
use crate::publish::caption::truncate_with_ellipsis;
use crate::store::TransientStore;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const API_VERSIONS: &[&str] = &["v22.0", "v21.0", "v20.0"];

/// Wait/attempt budgets for each step of the flow. Defaults mirror the
/// platform's observed throttling behavior; tests shrink them.
#[derive(Debug, Clone)]
pub struct IgTimings {
    /// Attempts for the local re-download of the staged artifact.
    pub download_attempts: u32,
    pub download_wait: Duration,
    /// Attempts for container create and publish calls.
    pub call_attempts: u32,
    pub rate_limit_wait: Duration,
    pub error_wait: Duration,
    /// Processing poll budget.
    pub poll_iterations: u32,
    pub poll_min_wait: Duration,
    pub poll_max_wait: Duration,
    pub poll_wall_clock: Duration,
    pub poll_rate_limit_wait: Duration,
    pub poll_server_error_wait: Duration,
}

impl Default for IgTimings {
    fn default() -> Self {
        Self {
            download_attempts: 3,
            download_wait: Duration::from_secs(5),
            call_attempts: 3,
            rate_limit_wait: Duration::from_secs(60),
            error_wait: Duration::from_secs(10),
            poll_iterations: 30,
            poll_min_wait: Duration::from_secs(5),
            poll_max_wait: Duration::from_secs(13),
            poll_wall_clock: Duration::from_secs(300),
            poll_rate_limit_wait: Duration::from_secs(45),
            poll_server_error_wait: Duration::from_secs(15),
        }
    }
}

/// Publisher for one Instagram-like account.
pub struct InstagramPublisher {
    client: reqwest::Client,
    base_url: String,
    account: InstagramAccount,
    caption_limit: usize,
    default_hashtags: String,
    comment_lines: Vec<String>,
    store: TransientStore,
    timings: IgTimings,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status_code: String,
}

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    permalink: Option<String>,
}

impl InstagramPublisher {
    pub fn new(config: &InstagramConfig, account: InstagramAccount, store: TransientStore) -> Self {
        Self {
            client: crate::clients::build_http_client(Duration::from_secs(60)),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account,
            caption_limit: config.caption_limit,
            default_hashtags: config.default_hashtags.clone(),
            comment_lines: config.comment_lines.clone(),
            store,
            timings: IgTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: IgTimings) -> Self {
        self.timings = timings;
        self
    }

    fn url(&self, api_version: &str, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, api_version, path)
    }

    /// Fetch the staged artifact back to local disk. Transient network
    /// failures here are common and cheap, so this has its own fixed-spacing
    /// retry instead of escalating to the outer backoff policy.
    async fn download_local(&self, staged_url: &str, dest: &Path) -> Result<(), PublishError> {
        let mut last_error = None;
        for attempt in 1..=self.timings.download_attempts {
            match self.try_download(staged_url, dest).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, error = %e, "staged artifact download failed");
                    last_error = Some(e);
                    if attempt < self.timings.download_attempts {
                        tokio::time::sleep(self.timings.download_wait).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            PublishError::Network("staged artifact download failed".to_string())
        }))
    }

    async fn try_download(&self, staged_url: &str, dest: &Path) -> Result<(), PublishError> {
        let mut response = self
            .client
            .get(staged_url)
            .send()
            .await
            .map_err(PublishError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(PublishError::Http {
                status: response.status().as_u16(),
                message: "staged artifact fetch failed".to_string(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response.chunk().await.map_err(PublishError::from_reqwest)? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    /// POST with the create/publish retry pattern: bounded attempts, 429
    /// waits longer than other failures.
    async fn post_with_retries(
        &self,
        url: &str,
        user_agent: &str,
        body: serde_json::Value,
        step: &str,
    ) -> Result<IdResponse, PublishError> {
        let mut last_error = None;
        for attempt in 1..=self.timings.call_attempts {
            let result = self
                .client
                .post(url)
                .header("User-Agent", user_agent)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<IdResponse>()
                        .await
                        .map_err(PublishError::from_reqwest);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let message = response.text().await.unwrap_or_default();
                    let error = PublishError::Http { status, message };
                    if error.is_non_retryable() {
                        return Err(error);
                    }
                    warn!(step, attempt, status, "platform call failed");
                    last_error = Some(error);
                    if attempt < self.timings.call_attempts {
                        let wait = if status == 429 {
                            self.timings.rate_limit_wait
                        } else {
                            self.timings.error_wait
                        };
                        tokio::time::sleep(wait).await;
                    }
                }
                Err(e) => {
                    let error = PublishError::from_reqwest(e);
                    if error.is_non_retryable() {
                        return Err(error);
                    }
                    last_error = Some(error);
                    if attempt < self.timings.call_attempts {
                        tokio::time::sleep(self.timings.error_wait).await;
                    }
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| PublishError::Network(format!("{} exhausted retries", step))))
    }

    async fn create_container(
        &self,
        api_version: &str,
        user_agent: &str,
        staged_url: &str,
        caption: &str,
    ) -> Result<String, PublishError> {
        let url = self.url(api_version, &format!("{}/media", self.account.id));
        let body = json!({
            "media_type": "REELS",
            "video_url": staged_url,
            "caption": caption,
            "access_token": self.account.token,
        });
        let created = self
            .post_with_retries(&url, user_agent, body, "container create")
            .await?;
        info!(container = %created.id, account = %self.account.name, "upload container created");
        Ok(created.id)
    }

    /// Poll container processing until it finishes, fails, or exhausts its
    /// iteration and wall-clock budgets.
    async fn poll_container(
        &self,
        api_version: &str,
        user_agent: &str,
        container_id: &str,
    ) -> Result<(), PublishError> {
        let url = self.url(api_version, container_id);
        let deadline = tokio::time::Instant::now() + self.timings.poll_wall_clock;

        for iteration in 1..=self.timings.poll_iterations {
            if tokio::time::Instant::now() >= deadline {
                return Err(PublishError::Stalled(format!(
                    "container processing exceeded {}s",
                    self.timings.poll_wall_clock.as_secs()
                )));
            }

            let result = self
                .client
                .get(&url)
                .header("User-Agent", user_agent)
                .query(&[
                    ("fields", "status_code"),
                    ("access_token", self.account.token.as_str()),
                ])
                .send()
                .await;

            let wait = match result {
                Ok(response) if response.status().is_success() => {
                    let status: StatusResponse =
                        response.json().await.map_err(PublishError::from_reqwest)?;
                    match status.status_code.as_str() {
                        "FINISHED" => return Ok(()),
                        "ERROR" => {
                            return Err(PublishError::Platform(
                                "container processing ended in error".to_string(),
                            ))
                        }
                        other => {
                            // Log every 5th iteration to avoid flooding.
                            if iteration % 5 == 0 {
                                debug!(iteration, state = other, "container still processing");
                            }
                            self.random_poll_wait()
                        }
                    }
                }
                Ok(response) if response.status().as_u16() == 429 => {
                    self.timings.poll_rate_limit_wait
                }
                Ok(response) if response.status().is_server_error() => {
                    self.timings.poll_server_error_wait
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let message = response.text().await.unwrap_or_default();
                    let error = PublishError::Http { status, message };
                    if error.is_non_retryable() {
                        return Err(error);
                    }
                    self.random_poll_wait()
                }
                Err(e) => {
                    let error = PublishError::from_reqwest(e);
                    if error.is_non_retryable() {
                        return Err(error);
                    }
                    self.random_poll_wait()
                }
            };

            tokio::time::sleep(wait).await;
        }

        Err(PublishError::Stalled(
            "container never reached a terminal state".to_string(),
        ))
    }

    fn random_poll_wait(&self) -> Duration {
        let min = self.timings.poll_min_wait;
        let max = self.timings.poll_max_wait;
        if max <= min {
            return min;
        }
        let spread = (max - min).as_millis() as u64;
        min + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }

    async fn publish_container(
        &self,
        api_version: &str,
        user_agent: &str,
        container_id: &str,
    ) -> Result<String, PublishError> {
        let url = self
            .url(api_version, &format!("{}/media_publish", self.account.id));
        let body = json!({
            "creation_id": container_id,
            "access_token": self.account.token,
        });
        let published = self
            .post_with_retries(&url, user_agent, body, "media publish")
            .await?;
        info!(media = %published.id, account = %self.account.name, "reel published");
        Ok(published.id)
    }

    /// Best-effort first comment. A failure here must never undo a
    /// successful publish, so errors are logged and swallowed.
    async fn post_comment(&self, api_version: &str, user_agent: &str, media_id: &str) {
        let line = {
            let mut rng = rand::thread_rng();
            self.comment_lines.choose(&mut rng).cloned()
        };
        let Some(line) = line else { return };

        let message = if self.default_hashtags.is_empty() {
            line
        } else {
            format!("{}\n{}", line, self.default_hashtags)
        };
        let url = self.url(api_version, &format!("{}/comments", media_id));
        let result = self
            .client
            .post(url)
            .header("User-Agent", user_agent)
            .json(&json!({
                "message": message,
                "access_token": self.account.token,
            }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(media = media_id, "first comment posted");
            }
            Ok(response) => {
                warn!(media = media_id, status = %response.status(), "first comment failed");
            }
            Err(e) => {
                warn!(media = media_id, error = %e, "first comment failed");
            }
        }
    }

    async fn fetch_permalink(
        &self,
        api_version: &str,
        user_agent: &str,
        media_id: &str,
    ) -> Option<String> {
        let url = self.url(api_version, media_id);
        let result = self
            .client
            .get(url)
            .header("User-Agent", user_agent)
            .query(&[
                ("fields", "permalink"),
                ("access_token", self.account.token.as_str()),
            ])
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => response
                .json::<PermalinkResponse>()
                .await
                .ok()
                .and_then(|p| p.permalink),
            _ => None,
        }
    }

    async fn run_flow(
        &self,
        request: &PublishRequest<'_>,
        local: &Path,
    ) -> Result<PublishSuccess, PublishError> {
        // Preparing: fresh client identity and final caption.
        let (user_agent, api_version) = {
            let mut rng = rand::thread_rng();
            (
                *USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0]),
                *API_VERSIONS.choose(&mut rng).unwrap_or(&API_VERSIONS[0]),
            )
        };
        let caption = truncate_with_ellipsis(&request.captions.instagram, self.caption_limit);

        self.download_local(request.staged_url, local).await?;

        let container = self
            .create_container(api_version, user_agent, request.staged_url, &caption)
            .await?;
        self.poll_container(api_version, user_agent, &container)
            .await?;
        let media_id = self
            .publish_container(api_version, user_agent, &container)
            .await?;

        self.post_comment(api_version, user_agent, &media_id).await;
        let permalink = self
            .fetch_permalink(api_version, user_agent, &media_id)
            .await;

        Ok(PublishSuccess { permalink })
    }
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn account_id(&self) -> &str {
        &self.account.id
    }

    fn account_name(&self) -> &str {
        &self.account.name
    }

    async fn publish(&self, request: &PublishRequest<'_>) -> Result<PublishSuccess, PublishError> {
        let local = self
            .store
            .path_for(request.session_id, &format!("igdl-{}", self.account.id));

        let result = self.run_flow(request, &local).await;

        // The local temp download goes away whatever happened above.
        if let Err(e) = tokio::fs::remove_file(&local).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(file = ?local, error = %e, "failed to delete local publish temp");
            }
        }

        result
    }
}
