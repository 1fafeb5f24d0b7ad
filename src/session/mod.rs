//! Session orchestration.
//!
//! One inbound request becomes one session: admit, download, validate,
//! transform, stage, caption, fan out to every configured account, report,
//! clean up. Cleanup and gate release run on every exit path, success or
//! not, so a crashed stage never leaks a slot or a transient file.

pub mod media;

pub use media::{AvMediaProcessor, MediaProcessor};

use crate::clients::captioner::{CaptionGenerator, GeneratedCaptions};
use crate::clients::extract::{CaptionExtractor, CaptionInfo};
use crate::clients::source::SourceClient;
use crate::clients::storage::{RemoteStorage, StorageError};
use crate::config::Config;
use crate::gate::ConcurrencyGate;
use crate::inbound::InboundRequest;
use crate::publish::{caption, Platform, PublishError, PublishRequest, Publisher};
use crate::report::{NoticeLevel, Phase, ProgressReporter, StatusUpdate};
use crate::retry::with_retry;
use crate::store::TransientStore;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How the session sources its caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Normal run: operator override, then AI caption, then template.
    Standard,
    /// Carry the source's original caption verbatim when one exists.
    Repost,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Standard => write!(f, "standard"),
            SessionMode::Repost => write!(f, "repost"),
        }
    }
}

/// Fatal session failures. Publishing failures are not here: they are
/// per-account outcomes inside a completed session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("all session slots are busy, try again shortly")]
    Busy,

    #[error("process is using {rss_mb}MB, over the {ceiling_mb}MB admission ceiling")]
    MemoryCeiling { rss_mb: u64, ceiling_mb: u64 },

    #[error("source fetch failed: {0}")]
    SourceFetch(String),

    #[error("downloaded file is not a usable video: {0}")]
    InvalidVideo(String),

    #[error(transparent)]
    Staging(#[from] StorageError),
}

/// One account's terminal publish outcome.
#[derive(Debug)]
pub struct AccountResult {
    pub platform: Platform,
    pub account: String,
    pub permalink: Option<String>,
    pub error: Option<String>,
}

impl AccountResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-platform completion tally.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformSummary {
    pub total: usize,
    pub completed: usize,
}

impl PlatformSummary {
    pub fn succeeded(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }

    pub fn partial(&self) -> bool {
        self.completed > 0 && self.completed < self.total
    }

    pub fn failed(&self) -> bool {
        self.total > 0 && self.completed == 0
    }
}

/// Terminal state of a completed session.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub instagram: PlatformSummary,
    pub youtube: PlatformSummary,
    pub results: Vec<AccountResult>,
    pub elapsed: Duration,
}

impl SessionOutcome {
    /// Combined terminal phase across both platforms.
    pub fn phase(&self) -> Phase {
        let total = self.instagram.total + self.youtube.total;
        let completed = self.instagram.completed + self.youtube.completed;
        if total == 0 || completed == total {
            Phase::Succeeded
        } else if completed == 0 {
            Phase::Failed
        } else {
            Phase::PartialSuccess
        }
    }
}

/// Drives one session end to end. Shared immutably across sessions.
pub struct SessionRunner {
    config: Config,
    gate: Arc<ConcurrencyGate>,
    store: TransientStore,
    reporter: Arc<dyn ProgressReporter>,
    source: Arc<dyn SourceClient>,
    extractor: Arc<dyn CaptionExtractor>,
    storage: Arc<dyn RemoteStorage>,
    captioner: Arc<dyn CaptionGenerator>,
    media: Arc<dyn MediaProcessor>,
    publishers: Vec<Arc<dyn Publisher>>,
}

impl SessionRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        gate: Arc<ConcurrencyGate>,
        store: TransientStore,
        reporter: Arc<dyn ProgressReporter>,
        source: Arc<dyn SourceClient>,
        extractor: Arc<dyn CaptionExtractor>,
        storage: Arc<dyn RemoteStorage>,
        captioner: Arc<dyn CaptionGenerator>,
        media: Arc<dyn MediaProcessor>,
        publishers: Vec<Arc<dyn Publisher>>,
    ) -> Self {
        Self {
            config,
            gate,
            store,
            reporter,
            source,
            extractor,
            storage,
            captioner,
            media,
            publishers,
        }
    }

    /// Run one session for `request`.
    pub async fn run(&self, request: &InboundRequest) -> Result<SessionOutcome, SessionError> {
        let session_id = Uuid::new_v4();
        if !self.gate.try_admit(session_id) {
            return Err(SessionError::Busy);
        }

        if let Err(e) = self.check_memory() {
            self.gate.release(&session_id);
            return Err(e);
        }

        info!(%session_id, url = %request.source_url, mode = %request.mode, "session admitted");
        let started = Instant::now();
        let result = self.execute(session_id, request, started).await;

        // Cleanup covers every exit path above.
        let purged = self.store.purge_session(session_id);
        let orphans = self
            .store
            .purge_orphans(Duration::from_secs(self.config.pipeline.orphan_age_secs));
        debug!(%session_id, purged, orphans, "transient files cleaned up");
        self.gate.release(&session_id);

        if let Err(e) = &result {
            self.reporter
                .update_status(StatusUpdate::new(
                    Phase::Failed,
                    "Session failed",
                    e.to_string(),
                ))
                .await;
        }

        result
    }

    /// Reject admission under memory pressure; a ceiling of zero disables
    /// the check.
    fn check_memory(&self) -> Result<(), SessionError> {
        let ceiling_mb = self.config.pipeline.memory_ceiling_mb;
        if ceiling_mb == 0 {
            return Ok(());
        }

        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let Some(process) = system.process(pid) else {
            return Ok(());
        };

        let rss_mb = process.memory() / (1024 * 1024);
        if rss_mb > ceiling_mb {
            warn!(rss_mb, ceiling_mb, "rejecting session under memory pressure");
            return Err(SessionError::MemoryCeiling { rss_mb, ceiling_mb });
        }
        Ok(())
    }

    async fn execute(
        &self,
        session_id: Uuid,
        request: &InboundRequest,
        started: Instant,
    ) -> Result<SessionOutcome, SessionError> {
        self.reporter
            .update_status(StatusUpdate::new(
                Phase::Downloading,
                "Fetching source video",
                &request.source_url,
            ))
            .await;

        let download = self.store.path_for(session_id, "download");
        self.source
            .fetch(&request.source_url, &download)
            .await
            .map_err(|e| SessionError::SourceFetch(e.to_string()))?;

        self.media
            .validate(&download)
            .await
            .map_err(|e| SessionError::InvalidVideo(e.to_string()))?;

        // Best-effort: an empty result only degrades the caption.
        let mut derived = self.extractor.extract(&request.source_url).await;
        if let Some(author) = &request.author_override {
            derived.author = Some(author.clone());
        }

        self.reporter
            .update_status(StatusUpdate::new(
                Phase::Processing,
                "Transforming video",
                format!("session {}", session_id),
            ))
            .await;
        let artifact = self.media.transform(session_id, &download).await;

        self.reporter
            .update_status(StatusUpdate::new(
                Phase::Staging,
                "Staging artifact",
                "uploading to the file host",
            ))
            .await;
        let staged_url = self.storage.stage(&artifact).await?;

        let generated = self.generate_captions(request, &artifact, &derived).await;
        let captions = caption::resolve(
            request.mode,
            request.caption_override.as_deref(),
            &derived,
            &generated,
            &self.config.instagram,
            &self.config.youtube,
        );

        let results = self
            .fan_out(session_id, &staged_url, &artifact, &captions)
            .await;

        let outcome = summarize(session_id, results, started.elapsed());
        self.report_outcome(&outcome, &derived).await;
        Ok(outcome)
    }

    /// AI captions are generated at most once per session, and only when a
    /// caption path can actually consume them.
    async fn generate_captions(
        &self,
        request: &InboundRequest,
        artifact: &Path,
        derived: &CaptionInfo,
    ) -> GeneratedCaptions {
        let wanted = request.mode == SessionMode::Standard
            && request.caption_override.is_none()
            && !self.publishers.is_empty();
        if !wanted {
            return GeneratedCaptions::default();
        }

        let want_youtube = self
            .publishers
            .iter()
            .any(|p| p.platform() == Platform::YouTube);

        match self.captioner.generate(artifact, derived, want_youtube).await {
            Ok(generated) => generated,
            Err(e) => {
                warn!(error = %e, "caption generation failed, using fallback captions");
                self.reporter
                    .notice(
                        NoticeLevel::Warning,
                        "AI captioning unavailable, falling back to templated caption",
                    )
                    .await;
                GeneratedCaptions::default()
            }
        }
    }

    /// Publish to every account, Instagram first, each under its own retry
    /// budget. One account's failure never stops the rest.
    async fn fan_out(
        &self,
        session_id: Uuid,
        staged_url: &str,
        artifact: &Path,
        captions: &caption::ResolvedCaptions,
    ) -> Vec<AccountResult> {
        let policy = self.config.retry.policy();
        let mut ordered: Vec<&Arc<dyn Publisher>> = self.publishers.iter().collect();
        ordered.sort_by_key(|p| match p.platform() {
            Platform::Instagram => 0,
            Platform::YouTube => 1,
        });

        let mut results = Vec::with_capacity(ordered.len());
        for (index, publisher) in ordered.iter().enumerate() {
            let platform = publisher.platform();
            let phase = match platform {
                Platform::Instagram => Phase::PublishingInstagram,
                Platform::YouTube => Phase::PublishingYoutube,
            };
            self.reporter
                .update_status(StatusUpdate::new(
                    phase,
                    format!("Publishing to {}", platform),
                    publisher.account_name().to_string(),
                ))
                .await;

            let request = PublishRequest {
                session_id,
                staged_url,
                local_artifact: artifact,
                captions,
            };
            let context = format!("{} publish for {}", platform, publisher.account_name());
            let outcome = with_retry(
                &policy,
                &context,
                self.reporter.as_ref(),
                |e: &PublishError| e.is_non_retryable(),
                || publisher.publish(&request),
            )
            .await;

            match outcome {
                Ok(success) => {
                    if let Some(permalink) = &success.permalink {
                        self.reporter
                            .notice(
                                NoticeLevel::Info,
                                &format!("{}: published at {}", publisher.account_name(), permalink),
                            )
                            .await;
                    }
                    results.push(AccountResult {
                        platform,
                        account: publisher.account_name().to_string(),
                        permalink: success.permalink,
                        error: None,
                    });
                }
                Err(e) => {
                    self.reporter
                        .notice(NoticeLevel::Error, &e.to_string())
                        .await;
                    results.push(AccountResult {
                        platform,
                        account: publisher.account_name().to_string(),
                        permalink: None,
                        error: Some(e.to_string()),
                    });
                }
            }

            // Cooldown before the next account on the same platform.
            if let Some(next) = ordered.get(index + 1) {
                if next.platform() == platform {
                    let secs = match platform {
                        Platform::Instagram => self.config.retry.instagram_cooldown_secs,
                        Platform::YouTube => self.config.retry.youtube_cooldown_secs,
                    };
                    if secs > 0 {
                        tokio::time::sleep(Duration::from_secs(secs)).await;
                    }
                }
            }
        }

        results
    }

    async fn report_outcome(&self, outcome: &SessionOutcome, derived: &CaptionInfo) {
        let phase = outcome.phase();
        let title = match phase {
            Phase::Succeeded => "Repost complete",
            Phase::PartialSuccess => "Repost partially complete",
            _ => "Repost failed",
        };

        let mut update = StatusUpdate::new(
            phase,
            title,
            format!("finished in {}s", outcome.elapsed.as_secs()),
        );
        if outcome.instagram.total > 0 {
            update = update.with_field(
                "instagram",
                format!("{}/{}", outcome.instagram.completed, outcome.instagram.total),
            );
        }
        if outcome.youtube.total > 0 {
            update = update.with_field(
                "youtube",
                format!("{}/{}", outcome.youtube.completed, outcome.youtube.total),
            );
        }
        if let Some(author) = &derived.author {
            update = update.with_field("author", author.clone());
        }
        update = update.with_field(
            "finished",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        );

        self.reporter.update_status(update).await;
    }
}

fn summarize(session_id: Uuid, results: Vec<AccountResult>, elapsed: Duration) -> SessionOutcome {
    let mut instagram = PlatformSummary::default();
    let mut youtube = PlatformSummary::default();

    for result in &results {
        let summary = match result.platform {
            Platform::Instagram => &mut instagram,
            Platform::YouTube => &mut youtube,
        };
        summary.total += 1;
        if result.succeeded() {
            summary.completed += 1;
        }
    }

    SessionOutcome {
        session_id,
        instagram,
        youtube,
        results,
        elapsed,
    }
}
