use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub transform: TransformPolicy,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub captioner: CaptionerConfig,

    #[serde(default)]
    pub instagram: InstagramConfig,

    #[serde(default)]
    pub youtube: YouTubeConfig,
}

/// Orchestrator-level limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Directory for per-session transient artifacts.
    #[serde(default = "default_transient_dir")]
    pub transient_dir: PathBuf,

    /// Maximum simultaneously admitted sessions.
    #[serde(default = "default_max_sessions")]
    pub max_concurrent_sessions: usize,

    /// Reject admission when process RSS exceeds this many megabytes.
    #[serde(default = "default_memory_ceiling_mb")]
    pub memory_ceiling_mb: u64,

    /// Minimum byte size for a download to count as a genuine video.
    #[serde(default = "default_min_video_bytes")]
    pub min_video_bytes: u64,

    /// Age threshold for the orphaned-artifact sweep, in seconds.
    #[serde(default = "default_orphan_age_secs")]
    pub orphan_age_secs: u64,

    /// Path to the line-oriented credentials file.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
}

fn default_transient_dir() -> PathBuf {
    PathBuf::from("/tmp/reelcast")
}
fn default_max_sessions() -> usize {
    3
}
fn default_memory_ceiling_mb() -> u64 {
    800
}
fn default_min_video_bytes() -> u64 {
    1024
}
fn default_orphan_age_secs() -> u64 {
    600
}
fn default_credentials_file() -> PathBuf {
    PathBuf::from("./credentials.env")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transient_dir: default_transient_dir(),
            max_concurrent_sessions: default_max_sessions(),
            memory_ceiling_mb: default_memory_ceiling_mb(),
            min_video_bytes: default_min_video_bytes(),
            orphan_age_secs: default_orphan_age_secs(),
            credentials_file: default_credentials_file(),
        }
    }
}

/// Cosmetic transform parameters. Tunable policy per deployment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformPolicy {
    #[serde(default = "default_speed")]
    pub speed: f64,

    #[serde(default = "default_brightness")]
    pub brightness: f64,

    #[serde(default = "default_true")]
    pub strip_metadata: bool,

    /// Optional background music bed mixed under the original audio.
    #[serde(default)]
    pub music_path: Option<PathBuf>,

    #[serde(default = "default_music_volume")]
    pub music_volume: f64,

    /// Text drawn on the branding bar; empty disables the bar.
    #[serde(default)]
    pub branding_text: String,

    #[serde(default = "default_target_width")]
    pub target_width: u32,

    #[serde(default = "default_target_height")]
    pub target_height: u32,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_transcode_timeout")]
    pub transcode_timeout_secs: u64,
}

fn default_speed() -> f64 {
    1.1
}
fn default_brightness() -> f64 {
    0.02
}
fn default_true() -> bool {
    true
}
fn default_music_volume() -> f64 {
    0.05
}
fn default_target_width() -> u32 {
    1080
}
fn default_target_height() -> u32 {
    1920
}
fn default_probe_timeout() -> u64 {
    30
}
fn default_transcode_timeout() -> u64 {
    180
}

impl Default for TransformPolicy {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            brightness: default_brightness(),
            strip_metadata: true,
            music_path: None,
            music_volume: default_music_volume(),
            branding_text: String::new(),
            target_width: default_target_width(),
            target_height: default_target_height(),
            probe_timeout_secs: default_probe_timeout(),
            transcode_timeout_secs: default_transcode_timeout(),
        }
    }
}

/// Outer per-account retry policy and inter-account cooldowns.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Cooldown between Instagram accounts during fan-out.
    #[serde(default = "default_instagram_cooldown")]
    pub instagram_cooldown_secs: u64,

    /// Cooldown between YouTube accounts during fan-out.
    #[serde(default = "default_youtube_cooldown")]
    pub youtube_cooldown_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_secs() -> u64 {
    15
}
fn default_max_delay_secs() -> u64 {
    120
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_instagram_cooldown() -> u64 {
    30
}
fn default_youtube_cooldown() -> u64 {
    10
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            multiplier: default_multiplier(),
            instagram_cooldown_secs: default_instagram_cooldown(),
            youtube_cooldown_secs: default_youtube_cooldown(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> crate::retry::RetryPolicy {
        crate::retry::RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_secs(self.base_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs),
            multiplier: self.multiplier,
        }
    }
}

/// Source-video resolution and download.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Base URL of the resolver mapping a content URL to a direct media URL.
    #[serde(default = "default_source_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    /// Per-request timeout for the resolve call, in seconds.
    #[serde(default = "default_source_request_timeout")]
    pub request_timeout_secs: u64,

    /// Wall-clock ceiling for the full streamed download, in seconds.
    #[serde(default = "default_source_total_timeout")]
    pub download_timeout_secs: u64,
}

fn default_source_base_url() -> String {
    "https://api.video-resolver.example".to_string()
}
fn default_source_request_timeout() -> u64 {
    60
}
fn default_source_total_timeout() -> u64 {
    120
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_base_url(),
            api_key: String::new(),
            request_timeout_secs: default_source_request_timeout(),
            download_timeout_secs: default_source_total_timeout(),
        }
    }
}

/// Caption-extraction method chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractConfig {
    /// Base URL for the metadata-embed endpoint and page scrape.
    #[serde(default = "default_embed_base_url")]
    pub embed_base_url: String,

    /// Base URL for the secondary structured-data endpoint.
    #[serde(default = "default_lookup_base_url")]
    pub lookup_base_url: String,

    #[serde(default = "default_embed_timeout")]
    pub embed_timeout_secs: u64,

    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,

    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_secs: u64,

    /// Outer ceiling racing the whole method chain.
    #[serde(default = "default_extract_overall_timeout")]
    pub overall_timeout_secs: u64,
}

fn default_embed_base_url() -> String {
    "https://www.instagram.com".to_string()
}
fn default_lookup_base_url() -> String {
    "https://api.media-lookup.example".to_string()
}
fn default_embed_timeout() -> u64 {
    8
}
fn default_lookup_timeout() -> u64 {
    8
}
fn default_scrape_timeout() -> u64 {
    10
}
fn default_extract_overall_timeout() -> u64 {
    20
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            embed_base_url: default_embed_base_url(),
            lookup_base_url: default_lookup_base_url(),
            embed_timeout_secs: default_embed_timeout(),
            lookup_timeout_secs: default_lookup_timeout(),
            scrape_timeout_secs: default_scrape_timeout(),
            overall_timeout_secs: default_extract_overall_timeout(),
        }
    }
}

/// Remote-storage staging.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    /// Files larger than this are rejected before any upload is attempted.
    #[serde(default = "default_storage_max_bytes")]
    pub max_upload_bytes: u64,

    #[serde(default = "default_storage_timeout")]
    pub upload_timeout_secs: u64,
}

fn default_storage_base_url() -> String {
    "https://api.file-host.example".to_string()
}
fn default_storage_max_bytes() -> u64 {
    70 * 1024 * 1024
}
fn default_storage_timeout() -> u64 {
    120
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: default_storage_base_url(),
            api_key: String::new(),
            max_upload_bytes: default_storage_max_bytes(),
            upload_timeout_secs: default_storage_timeout(),
        }
    }
}

/// AI caption generation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptionerConfig {
    #[serde(default = "default_captioner_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    /// Inputs above this size are trimmed before upload.
    #[serde(default = "default_captioner_upload_cap")]
    pub upload_cap_bytes: u64,

    /// Seconds of video kept when trimming an oversized input.
    #[serde(default = "default_trim_secs")]
    pub trim_secs: f64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Requested maximum caption length.
    #[serde(default = "default_caption_max_chars")]
    pub caption_max_chars: usize,
}

fn default_captioner_base_url() -> String {
    "https://api.captioner.example".to_string()
}
fn default_captioner_upload_cap() -> u64 {
    20 * 1024 * 1024
}
fn default_trim_secs() -> f64 {
    10.0
}
fn default_poll_interval() -> u64 {
    2
}
fn default_poll_timeout() -> u64 {
    60
}
fn default_caption_max_chars() -> usize {
    500
}

impl Default for CaptionerConfig {
    fn default() -> Self {
        Self {
            base_url: default_captioner_base_url(),
            api_key: String::new(),
            upload_cap_bytes: default_captioner_upload_cap(),
            trim_secs: default_trim_secs(),
            poll_interval_secs: default_poll_interval(),
            poll_timeout_secs: default_poll_timeout(),
            caption_max_chars: default_caption_max_chars(),
        }
    }
}

/// Instagram-like publishing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstagramConfig {
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,

    #[serde(default = "default_instagram_caption_limit")]
    pub caption_limit: usize,

    /// Fallback caption template; `%author%` and `%originalCaption%` are
    /// substituted.
    #[serde(default = "default_base_caption")]
    pub base_caption: String,

    #[serde(default = "default_hashtags")]
    pub default_hashtags: String,

    /// Promo lines; one is picked at random for the best-effort first comment.
    #[serde(default)]
    pub comment_lines: Vec<String>,
}

fn default_graph_base_url() -> String {
    "https://graph.instagram.example".to_string()
}
fn default_instagram_caption_limit() -> usize {
    2200
}
fn default_base_caption() -> String {
    "%originalCaption%\n\ncredit: %author%".to_string()
}
fn default_hashtags() -> String {
    "#reels #viral #trending".to_string()
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            base_url: default_graph_base_url(),
            caption_limit: default_instagram_caption_limit(),
            base_caption: default_base_caption(),
            default_hashtags: default_hashtags(),
            comment_lines: Vec::new(),
        }
    }
}

/// YouTube-like publishing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct YouTubeConfig {
    #[serde(default = "default_youtube_base_url")]
    pub base_url: String,

    #[serde(default = "default_youtube_auth_base_url")]
    pub auth_base_url: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_title_limit")]
    pub title_limit: usize,

    #[serde(default = "default_description_limit")]
    pub description_limit: usize,

    #[serde(default = "default_category_id")]
    pub category_id: String,
}

fn default_youtube_base_url() -> String {
    "https://upload.video-platform.example".to_string()
}
fn default_youtube_auth_base_url() -> String {
    "https://oauth.video-platform.example".to_string()
}
fn default_title_limit() -> usize {
    100
}
fn default_description_limit() -> usize {
    5000
}
fn default_category_id() -> String {
    "24".to_string()
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            base_url: default_youtube_base_url(),
            auth_base_url: default_youtube_auth_base_url(),
            client_id: String::new(),
            client_secret: String::new(),
            title_limit: default_title_limit(),
            description_limit: default_description_limit(),
            category_id: default_category_id(),
        }
    }
}
