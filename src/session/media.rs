//! Local media validation and transformation.
//!
//! Thin boundary over the av crate so the orchestrator and its tests never
//! depend on ffmpeg binaries being installed.

use crate::config::TransformPolicy;
use crate::store::TransientStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reelcast_av::{BrandingSpec, MusicBed, PaceSpec, TransformLimits, TransformSpec};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Validates and transforms the downloaded media on local disk.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    /// Reject inputs that are not genuine videos.
    async fn validate(&self, input: &Path) -> Result<()>;

    /// Apply the cosmetic transform chain. A failed stage falls back to its
    /// input, so the returned path always names a playable artifact.
    async fn transform(&self, session_id: Uuid, input: &Path) -> PathBuf;
}

/// ffmpeg/ffprobe-backed implementation.
pub struct AvMediaProcessor {
    policy: TransformPolicy,
    min_video_bytes: u64,
    store: TransientStore,
}

impl AvMediaProcessor {
    pub fn new(policy: TransformPolicy, min_video_bytes: u64, store: TransientStore) -> Self {
        Self {
            policy,
            min_video_bytes,
            store,
        }
    }

    fn limits(&self) -> TransformLimits {
        TransformLimits {
            probe_timeout: Duration::from_secs(self.policy.probe_timeout_secs),
            transcode_timeout: Duration::from_secs(self.policy.transcode_timeout_secs),
        }
    }

    fn pace_spec(&self) -> TransformSpec {
        TransformSpec::Pace(PaceSpec {
            speed: self.policy.speed,
            brightness: self.policy.brightness,
            strip_metadata: self.policy.strip_metadata,
            music: self.policy.music_path.as_ref().map(|path| MusicBed {
                path: path.clone(),
                volume: self.policy.music_volume,
            }),
        })
    }

    fn branding_spec(&self) -> TransformSpec {
        TransformSpec::Branding(BrandingSpec {
            target_width: self.policy.target_width,
            target_height: self.policy.target_height,
            text: self.policy.branding_text.clone(),
            ..BrandingSpec::default()
        })
    }
}

#[async_trait]
impl MediaProcessor for AvMediaProcessor {
    async fn validate(&self, input: &Path) -> Result<()> {
        let probe_timeout = Duration::from_secs(self.policy.probe_timeout_secs);
        let info = reelcast_av::validate_video(input, self.min_video_bytes, probe_timeout)
            .await
            .context("downloaded file failed video validation")?;
        info!(
            duration = info.duration_secs(),
            streams = info.video_streams.len(),
            "download validated as video"
        );
        Ok(())
    }

    async fn transform(&self, session_id: Uuid, input: &Path) -> PathBuf {
        let limits = self.limits();

        let paced = self.store.path_for(session_id, "paced");
        let current = reelcast_av::apply(input, &paced, &self.pace_spec(), &limits).await;

        if self.policy.branding_text.is_empty() {
            return current;
        }

        let branded = self.store.path_for(session_id, "branded");
        reelcast_av::apply(&current, &branded, &self.branding_spec(), &limits).await
    }
}
