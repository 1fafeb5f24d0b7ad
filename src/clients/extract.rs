//! Best-effort caption extraction.
//!
//! Tries an ordered chain of independent methods: the metadata-embed
//! endpoint, a secondary structured-data lookup, then a raw page scrape for
//! embedded structured data or meta tags. First success wins. Every method
//! has its own short timeout and the whole chain is raced against an outer
//! ceiling. Extraction never fails the pipeline: exhausting the chain
//! resolves to an empty caption.

use crate::config::ExtractConfig;
use crate::inbound::split_hashtags;
use crate::timeout::{with_timeout, Timed};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Caption context extracted from the source, consumed by every downstream
/// caption path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptionInfo {
    pub caption: String,
    pub hashtags: Vec<String>,
    pub author: Option<String>,
}

impl CaptionInfo {
    fn from_raw(raw_caption: &str, author: Option<String>) -> Self {
        let (caption, hashtags) = split_hashtags(raw_caption);
        Self {
            caption,
            hashtags,
            author,
        }
    }
}

/// Best-effort caption extraction boundary.
#[async_trait]
pub trait CaptionExtractor: Send + Sync {
    /// Extract caption context for `source_url`. Never fails; resolves to
    /// an empty [`CaptionInfo`] when every method comes up short.
    async fn extract(&self, source_url: &str) -> CaptionInfo;
}

/// HTTP implementation chaining the three extraction methods.
pub struct ChainedExtractor {
    client: reqwest::Client,
    embed_base_url: String,
    lookup_base_url: String,
    embed_timeout: Duration,
    lookup_timeout: Duration,
    scrape_timeout: Duration,
    overall_timeout: Duration,
}

static LD_JSON_CAPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""caption"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("ld+json regex"));

static META_DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<meta\s+property="og:description"\s+content="([^"]*)""#).expect("meta regex")
});

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    title: Option<String>,
    author_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    caption: Option<String>,
    author: Option<String>,
}

impl ChainedExtractor {
    pub fn new(config: &ExtractConfig) -> Self {
        // Per-method timeouts are applied per request, so the shared client
        // carries the largest one.
        let max_method = config
            .embed_timeout_secs
            .max(config.lookup_timeout_secs)
            .max(config.scrape_timeout_secs);
        Self {
            client: super::build_http_client(Duration::from_secs(max_method)),
            embed_base_url: config.embed_base_url.trim_end_matches('/').to_string(),
            lookup_base_url: config.lookup_base_url.trim_end_matches('/').to_string(),
            embed_timeout: Duration::from_secs(config.embed_timeout_secs),
            lookup_timeout: Duration::from_secs(config.lookup_timeout_secs),
            scrape_timeout: Duration::from_secs(config.scrape_timeout_secs),
            overall_timeout: Duration::from_secs(config.overall_timeout_secs),
        }
    }

    async fn run_chain(&self, source_url: &str) -> Option<CaptionInfo> {
        match with_timeout(self.embed_timeout, self.from_embed(source_url)).await {
            Timed::Completed(info) => return Some(info),
            Timed::Failed(e) => debug!(error = %e, "embed extraction failed"),
            Timed::TimedOut => debug!("embed extraction timed out"),
        }

        match with_timeout(self.lookup_timeout, self.from_lookup(source_url)).await {
            Timed::Completed(info) => return Some(info),
            Timed::Failed(e) => debug!(error = %e, "lookup extraction failed"),
            Timed::TimedOut => debug!("lookup extraction timed out"),
        }

        match with_timeout(self.scrape_timeout, self.from_page(source_url)).await {
            Timed::Completed(info) => return Some(info),
            Timed::Failed(e) => debug!(error = %e, "page scrape failed"),
            Timed::TimedOut => debug!("page scrape timed out"),
        }

        None
    }

    async fn from_embed(&self, source_url: &str) -> Result<CaptionInfo> {
        let response = self
            .client
            .get(format!("{}/oembed", self.embed_base_url))
            .query(&[("url", source_url)])
            .send()
            .await
            .context("embed endpoint unreachable")?;

        if !response.status().is_success() {
            bail!("embed endpoint returned HTTP {}", response.status());
        }

        let embed: EmbedResponse = response.json().await.context("invalid embed payload")?;
        match embed.title {
            Some(title) if !title.trim().is_empty() => {
                Ok(CaptionInfo::from_raw(title.trim(), embed.author_name))
            }
            _ => bail!("embed payload carried no title"),
        }
    }

    async fn from_lookup(&self, source_url: &str) -> Result<CaptionInfo> {
        let shortcode = shortcode_of(source_url).context("no shortcode in url")?;
        let response = self
            .client
            .get(format!("{}/media/{}", self.lookup_base_url, shortcode))
            .send()
            .await
            .context("lookup endpoint unreachable")?;

        if !response.status().is_success() {
            bail!("lookup endpoint returned HTTP {}", response.status());
        }

        let lookup: LookupResponse = response.json().await.context("invalid lookup payload")?;
        match lookup.caption {
            Some(caption) if !caption.trim().is_empty() => {
                Ok(CaptionInfo::from_raw(caption.trim(), lookup.author))
            }
            _ => bail!("lookup payload carried no caption"),
        }
    }

    async fn from_page(&self, source_url: &str) -> Result<CaptionInfo> {
        let response = self
            .client
            .get(source_url)
            .send()
            .await
            .context("source page unreachable")?;

        if !response.status().is_success() {
            bail!("source page returned HTTP {}", response.status());
        }

        let html = response.text().await.context("could not read source page")?;

        if let Some(m) = LD_JSON_CAPTION.captures(&html) {
            let raw = unescape_json_fragment(&m[1]);
            if !raw.trim().is_empty() {
                return Ok(CaptionInfo::from_raw(raw.trim(), None));
            }
        }

        if let Some(m) = META_DESCRIPTION.captures(&html) {
            let raw = &m[1];
            if !raw.trim().is_empty() {
                return Ok(CaptionInfo::from_raw(raw.trim(), None));
            }
        }

        bail!("no structured caption data in page")
    }
}

#[async_trait]
impl CaptionExtractor for ChainedExtractor {
    async fn extract(&self, source_url: &str) -> CaptionInfo {
        let outcome: Timed<Option<CaptionInfo>, std::convert::Infallible> = with_timeout(
            self.overall_timeout,
            async { Ok(self.run_chain(source_url).await) },
        )
        .await;

        match outcome {
            Timed::Completed(Some(info)) => info,
            Timed::Completed(None) => {
                warn!(source = source_url, "caption extraction exhausted all methods");
                CaptionInfo::default()
            }
            Timed::Failed(_) => CaptionInfo::default(),
            Timed::TimedOut => {
                warn!(source = source_url, "caption extraction hit overall ceiling");
                CaptionInfo::default()
            }
        }
    }
}

/// Last path segment of a content URL.
fn shortcode_of(url: &str) -> Option<&str> {
    url.split('?')
        .next()?
        .split('/')
        .filter(|s| !s.is_empty())
        .next_back()
}

fn unescape_json_fragment(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}
