//! Progress reporting back to the originating channel.
//!
//! A session drives exactly one evolving status message, edited in place as
//! the phase changes, plus append-only notices for sub-events (retry waits,
//! comment failures). The trait boundary keeps the chat platform out of the
//! orchestrator; tests substitute a recording double.

use async_trait::async_trait;

/// Coarse pipeline phase, rendered as the status message color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Downloading,
    Processing,
    Staging,
    PublishingInstagram,
    PublishingYoutube,
    Succeeded,
    PartialSuccess,
    Failed,
}

impl Phase {
    /// Color code attached to the evolving status message.
    pub fn color(&self) -> u32 {
        match self {
            Phase::Initializing => 0x3498db,
            Phase::Downloading => 0x3498db,
            Phase::Processing => 0x9b59b6,
            Phase::Staging => 0x1abc9c,
            Phase::PublishingInstagram => 0xf1c40f,
            Phase::PublishingYoutube => 0xff0000,
            Phase::Succeeded => 0x2ecc71,
            Phase::PartialSuccess => 0xf39c12,
            Phase::Failed => 0xe74c3c,
        }
    }
}

/// Severity of an append-only notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// One in-place edit of the session's evolving status message.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub phase: Phase,
    pub title: String,
    pub description: String,
    pub fields: Vec<(String, String)>,
}

impl StatusUpdate {
    pub fn new(phase: Phase, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            phase,
            title: title.into(),
            description: description.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

/// Outbound reporting boundary for one origin channel.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Edit the session's single evolving status message.
    async fn update_status(&self, update: StatusUpdate);

    /// Append a separate informational/warning/error notice.
    async fn notice(&self, level: NoticeLevel, message: &str);
}

/// Reporter that forwards everything to the tracing subscriber.
///
/// Used when no chat channel is attached (CLI runs, tests).
#[derive(Debug, Default)]
pub struct LogReporter;

#[async_trait]
impl ProgressReporter for LogReporter {
    async fn update_status(&self, update: StatusUpdate) {
        tracing::info!(
            phase = ?update.phase,
            title = %update.title,
            description = %update.description,
            "status update"
        );
    }

    async fn notice(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => tracing::info!("{}", message),
            NoticeLevel::Warning => tracing::warn!("{}", message),
            NoticeLevel::Error => tracing::error!("{}", message),
        }
    }
}
