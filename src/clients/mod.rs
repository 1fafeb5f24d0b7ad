//! Remote capability clients.
//!
//! Each external capability is an `#[async_trait]` trait with one HTTP
//! implementation, so the orchestrator and tests depend only on the
//! contract. Base URLs come from config, which also lets tests point the
//! real implementations at a local mock server.

pub mod captioner;
pub mod extract;
pub mod source;
pub mod storage;

pub use captioner::{CaptionGenerator, GeneratedCaptions, HttpCaptioner, YtMeta};
pub use extract::{CaptionExtractor, CaptionInfo, ChainedExtractor};
pub use source::{HttpSourceClient, SourceClient};
pub use storage::{HttpRemoteStorage, RemoteStorage, StorageError};

use std::time::Duration;

/// Build a reqwest client with a per-request timeout.
pub(crate) fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout: {}", e);
            reqwest::Client::new()
        })
}
