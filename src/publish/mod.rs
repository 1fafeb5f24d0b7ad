//! Platform publishing flows.
//!
//! One [`Publisher`] per configured account. Failures stay isolated to the
//! account that raised them; the classifier on [`PublishError`] decides
//! whether the outer retry engine should keep trying.

pub mod caption;
pub mod instagram;
pub mod youtube;

pub use caption::ResolvedCaptions;
pub use instagram::InstagramPublisher;
pub use youtube::{RefreshHook, StoreRefreshHook, YouTubePublisher};

use async_trait::async_trait;
use std::path::Path;
use uuid::Uuid;

/// Publishing platform of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Instagram,
    YouTube,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Instagram => write!(f, "instagram"),
            Platform::YouTube => write!(f, "youtube"),
        }
    }
}

/// Everything a publisher needs for one account's attempt.
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    pub session_id: Uuid,
    /// Public URL where the final artifact is staged.
    pub staged_url: &'a str,
    /// The final artifact on local disk.
    pub local_artifact: &'a Path,
    pub captions: &'a ResolvedCaptions,
}

/// A successful publish for one account.
#[derive(Debug, Clone)]
pub struct PublishSuccess {
    /// Public permalink of the published item, when the platform returns one.
    pub permalink: Option<String>,
}

/// Errors raised by a publish flow.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The platform answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Transport-level failure likely to clear up on retry.
    #[error("network error: {0}")]
    Network(String),

    /// The destination host could not be reached at all.
    #[error("host unreachable: {0}")]
    Unreachable(String),

    /// The platform reported a terminal processing state.
    #[error("platform error: {0}")]
    Platform(String),

    /// Processing never reached a terminal state within budget.
    #[error("processing stalled: {0}")]
    Stalled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message fragments that mark a failure as permanent.
const NON_RETRYABLE_FRAGMENTS: &[&str] = &[
    "invalid media",
    "unsupported format",
    "media type not supported",
    "quota exceeded",
    "api limit exceeded",
    "invalid access token",
    "access token has expired",
];

impl PublishError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Self::Unreachable(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }

    /// Whether a repeat attempt has no chance of succeeding.
    ///
    /// Auth failures, invalid/unsupported media, permanently exceeded
    /// quotas, bad tokens, and unreachable hosts are permanent. Everything
    /// else, including HTTP 429 and 5xx, stays retryable.
    pub fn is_non_retryable(&self) -> bool {
        match self {
            PublishError::Http { status: 401, .. } | PublishError::Http { status: 403, .. } => {
                true
            }
            PublishError::Unreachable(_) => true,
            PublishError::Http { message, .. } | PublishError::Platform(message) => {
                let lower = message.to_lowercase();
                NON_RETRYABLE_FRAGMENTS.iter().any(|f| lower.contains(f))
            }
            _ => false,
        }
    }
}

/// One account's publish flow.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Stable identifier of the target account.
    fn account_id(&self) -> &str;

    /// Human-readable account label for status reporting.
    fn account_name(&self) -> &str;

    async fn publish(&self, request: &PublishRequest<'_>) -> Result<PublishSuccess, PublishError>;
}
