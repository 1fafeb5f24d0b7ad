//! YouTube-like publishing flow.
//!
//! One upload call per account: a multipart request carrying the metadata
//! snippet and the video bytes. Expired access tokens are refreshed in
//! place, and the refreshed credentials are handed to a [`RefreshHook`] so
//! other processes see them; persistence failures never fail the publish.

use super::{Platform, PublishError, PublishRequest, PublishSuccess, Publisher};
use crate::config::persist::{CredentialStore, YouTubeAccount};
use crate::config::YouTubeConfig;
use crate::inbound::split_hashtags;
use crate::publish::caption::sanitize_tags;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const TAG_CHAR_LIMIT: usize = 30;
const TAGS_JOINED_LIMIT: usize = 500;

/// Receives refreshed account credentials. Called after a successful token
/// refresh; errors are logged, never propagated into the publish result.
pub trait RefreshHook: Send + Sync {
    fn credentials_refreshed(&self, account: &YouTubeAccount) -> anyhow::Result<()>;
}

/// Persists refreshed tokens back into the credentials file.
pub struct StoreRefreshHook {
    store: CredentialStore,
}

impl StoreRefreshHook {
    pub fn new(store: CredentialStore) -> Self {
        Self { store }
    }
}

impl RefreshHook for StoreRefreshHook {
    fn credentials_refreshed(&self, account: &YouTubeAccount) -> anyhow::Result<()> {
        let mut accounts = self.store.load()?;
        match accounts.youtube.iter_mut().find(|a| a.name == account.name) {
            Some(existing) => *existing = account.clone(),
            None => accounts.youtube.push(account.clone()),
        }
        self.store.save_youtube(&accounts.youtube)
    }
}

/// Publisher for one YouTube-like account.
pub struct YouTubePublisher {
    client: reqwest::Client,
    base_url: String,
    auth_base_url: String,
    client_id: String,
    client_secret: String,
    title_limit: usize,
    description_limit: usize,
    category_id: String,
    account_name: String,
    refresh_token: String,
    access_token: Mutex<String>,
    refresh_hook: Option<Arc<dyn RefreshHook>>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl YouTubePublisher {
    pub fn new(config: &YouTubeConfig, account: YouTubeAccount) -> Self {
        Self {
            client: crate::clients::build_http_client(Duration::from_secs(300)),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_base_url: config.auth_base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            title_limit: config.title_limit,
            description_limit: config.description_limit,
            category_id: config.category_id.clone(),
            account_name: account.name,
            refresh_token: account.refresh_token,
            access_token: Mutex::new(account.access_token),
            refresh_hook: None,
        }
    }

    pub fn with_refresh_hook(mut self, hook: Arc<dyn RefreshHook>) -> Self {
        self.refresh_hook = Some(hook);
        self
    }

    fn metadata_json(&self, request: &PublishRequest<'_>) -> serde_json::Value {
        let meta = &request.captions.youtube;
        // Tags come from the hashtags embedded in the description.
        let (_, hashtags) = split_hashtags(&meta.description);
        let bare: Vec<String> = hashtags
            .iter()
            .map(|t| t.trim_start_matches('#').to_string())
            .collect();
        let tags = sanitize_tags(&bare, TAG_CHAR_LIMIT, TAGS_JOINED_LIMIT);

        json!({
            "snippet": {
                "title": meta.title.chars().take(self.title_limit).collect::<String>(),
                "description": meta
                    .description
                    .chars()
                    .take(self.description_limit)
                    .collect::<String>(),
                "tags": tags,
                "categoryId": self.category_id,
            },
            "status": { "privacyStatus": "public" },
        })
    }

    async fn upload_once(
        &self,
        request: &PublishRequest<'_>,
        access_token: &str,
    ) -> Result<UploadResponse, PublishError> {
        let bytes = tokio::fs::read(request.local_artifact).await?;
        let metadata = self.metadata_json(request);

        let meta_part = reqwest::multipart::Part::text(metadata.to_string())
            .mime_str("application/json")
            .map_err(PublishError::from_reqwest)?;
        let video_part = reqwest::multipart::Part::bytes(bytes)
            .file_name("upload.mp4")
            .mime_str("video/mp4")
            .map_err(PublishError::from_reqwest)?;
        let form = reqwest::multipart::Form::new()
            .part("metadata", meta_part)
            .part("video", video_part);

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .bearer_auth(access_token)
            .multipart(form)
            .send()
            .await
            .map_err(PublishError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(PublishError::Http { status, message });
        }

        response
            .json::<UploadResponse>()
            .await
            .map_err(PublishError::from_reqwest)
    }

    /// Exchange the refresh token for a new access token and propagate it
    /// to the refresh hook.
    async fn refresh_access_token(&self) -> Result<String, PublishError> {
        let response = self
            .client
            .post(format!("{}/token", self.auth_base_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(PublishError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(PublishError::Http { status, message });
        }

        let token: TokenResponse = response.json().await.map_err(PublishError::from_reqwest)?;
        *self.access_token.lock() = token.access_token.clone();
        info!(account = %self.account_name, "access token refreshed");

        if let Some(hook) = &self.refresh_hook {
            let refreshed = YouTubeAccount {
                name: self.account_name.clone(),
                access_token: token.access_token.clone(),
                refresh_token: self.refresh_token.clone(),
            };
            if let Err(e) = hook.credentials_refreshed(&refreshed) {
                warn!(account = %self.account_name, error = %e, "failed to persist refreshed token");
            }
        }

        Ok(token.access_token)
    }
}

#[async_trait]
impl Publisher for YouTubePublisher {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn account_id(&self) -> &str {
        &self.account_name
    }

    fn account_name(&self) -> &str {
        &self.account_name
    }

    async fn publish(&self, request: &PublishRequest<'_>) -> Result<PublishSuccess, PublishError> {
        let token = self.access_token.lock().clone();

        let uploaded = match self.upload_once(request, &token).await {
            Ok(uploaded) => uploaded,
            Err(PublishError::Http { status: 401, .. }) => {
                // One refresh-and-retry; a second 401 is terminal.
                let fresh = self.refresh_access_token().await?;
                self.upload_once(request, &fresh).await?
            }
            Err(e) => return Err(e),
        };

        info!(video = %uploaded.id, account = %self.account_name, "video published");
        let permalink = uploaded
            .link
            .or_else(|| Some(format!("https://youtu.be/{}", uploaded.id)));
        Ok(PublishSuccess { permalink })
    }
}
