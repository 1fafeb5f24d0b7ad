//! Shared harness for integration tests.
//!
//! Runs the real pipeline against a single [`MockServer`] that plays every
//! remote role: the source resolver, the caption-extraction endpoints, the
//! file host, the captioner, and both publishing platforms. Each role gets
//! its own path prefix so the one server can tell them apart. The only
//! substitution is the local media stage, which passes files through
//! untouched so the tests never need ffmpeg installed.

use reelcast::clients::{ChainedExtractor, HttpCaptioner, HttpRemoteStorage, HttpSourceClient};
use reelcast::config::persist::{InstagramAccount, YouTubeAccount};
use reelcast::config::Config;
use reelcast::gate::ConcurrencyGate;
use reelcast::inbound::InboundRequest;
use reelcast::publish::instagram::{IgTimings, InstagramPublisher};
use reelcast::publish::{Publisher, YouTubePublisher};
use reelcast::report::{NoticeLevel, ProgressReporter, StatusUpdate};
use reelcast::session::{MediaProcessor, SessionMode, SessionRunner};
use reelcast::store::TransientStore;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Reporter double recording every status edit and notice.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingReporter {
    pub updates: Mutex<Vec<StatusUpdate>>,
    pub notices: Mutex<Vec<(NoticeLevel, String)>>,
}

#[async_trait]
impl ProgressReporter for RecordingReporter {
    async fn update_status(&self, update: StatusUpdate) {
        self.updates.lock().push(update);
    }

    async fn notice(&self, level: NoticeLevel, message: &str) {
        self.notices.lock().push((level, message.to_string()));
    }
}

/// Media stage double: accepts every input and transforms nothing.
pub struct PassthroughMedia;

#[async_trait]
impl MediaProcessor for PassthroughMedia {
    async fn validate(&self, _input: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    async fn transform(&self, _session_id: Uuid, input: &Path) -> PathBuf {
        input.to_path_buf()
    }
}

pub struct TestHarness {
    pub server: MockServer,
    pub dir: tempfile::TempDir,
    pub store: TransientStore,
    pub reporter: Arc<RecordingReporter>,
    pub config: Config,
}

#[allow(dead_code)]
impl TestHarness {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = TransientStore::new(dir.path()).unwrap();

        let mut config = Config::default();
        config.pipeline.transient_dir = dir.path().to_path_buf();
        config.pipeline.memory_ceiling_mb = 0;
        config.retry.max_attempts = 2;
        config.retry.base_delay_secs = 0;
        config.retry.max_delay_secs = 0;
        config.retry.instagram_cooldown_secs = 0;
        config.retry.youtube_cooldown_secs = 0;

        config.source.base_url = format!("{}/src", server.uri());
        config.source.request_timeout_secs = 5;
        config.source.download_timeout_secs = 10;
        config.extract.embed_base_url = format!("{}/embed", server.uri());
        config.extract.lookup_base_url = format!("{}/lookup", server.uri());
        config.extract.embed_timeout_secs = 2;
        config.extract.lookup_timeout_secs = 2;
        config.extract.scrape_timeout_secs = 2;
        config.extract.overall_timeout_secs = 5;
        config.storage.base_url = format!("{}/storage", server.uri());
        config.captioner.base_url = format!("{}/cap", server.uri());
        config.captioner.poll_interval_secs = 0;
        config.captioner.poll_timeout_secs = 2;
        config.instagram.base_url = format!("{}/graph", server.uri());
        config.youtube.base_url = format!("{}/yt", server.uri());
        config.youtube.auth_base_url = format!("{}/auth", server.uri());

        Self {
            server,
            dir,
            store,
            reporter: Arc::new(RecordingReporter::default()),
            config,
        }
    }

    /// Trigger request pointing at this harness's mock source page.
    pub fn request(&self, mode: SessionMode) -> InboundRequest {
        InboundRequest {
            source_url: format!("{}/reel/AbC123", self.server.uri()),
            mode,
            author_override: None,
            caption_override: None,
        }
    }

    pub fn ig_publisher(&self, name: &str, id: &str) -> Arc<dyn Publisher> {
        let account = InstagramAccount {
            name: name.to_string(),
            id: id.to_string(),
            token: "tok".to_string(),
        };
        let timings = IgTimings {
            download_attempts: 2,
            download_wait: Duration::from_millis(10),
            call_attempts: 2,
            rate_limit_wait: Duration::from_millis(10),
            error_wait: Duration::from_millis(10),
            poll_iterations: 5,
            poll_min_wait: Duration::from_millis(1),
            poll_max_wait: Duration::from_millis(2),
            poll_wall_clock: Duration::from_secs(10),
            poll_rate_limit_wait: Duration::from_millis(10),
            poll_server_error_wait: Duration::from_millis(10),
        };
        Arc::new(
            InstagramPublisher::new(&self.config.instagram, account, self.store.clone())
                .with_timings(timings),
        )
    }

    pub fn yt_publisher(&self, name: &str) -> Arc<dyn Publisher> {
        let account = YouTubeAccount {
            name: name.to_string(),
            access_token: "yt-token".to_string(),
            refresh_token: "yt-refresh".to_string(),
        };
        Arc::new(YouTubePublisher::new(&self.config.youtube, account))
    }

    pub fn runner(&self, publishers: Vec<Arc<dyn Publisher>>) -> SessionRunner {
        SessionRunner::new(
            self.config.clone(),
            Arc::new(ConcurrencyGate::new(
                self.config.pipeline.max_concurrent_sessions,
            )),
            self.store.clone(),
            self.reporter.clone(),
            Arc::new(HttpSourceClient::new(&self.config.source)),
            Arc::new(ChainedExtractor::new(&self.config.extract)),
            Arc::new(HttpRemoteStorage::new(&self.config.storage)),
            Arc::new(HttpCaptioner::new(&self.config.captioner)),
            Arc::new(PassthroughMedia),
            publishers,
        )
    }

    pub fn transient_file_count(&self) -> usize {
        std::fs::read_dir(self.dir.path()).unwrap().count()
    }

    // -----------------------------------------------------------------------
    // Remote role mounts
    // -----------------------------------------------------------------------

    /// Resolver plus a 4KB media download.
    pub async fn mount_source(&self) {
        let media_url = format!("{}/src/media/clip.mp4", self.server.uri());
        Mock::given(method("GET"))
            .and(path("/src/resolve"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "media_url": media_url })),
            )
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/src/media/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_failing_source(&self) {
        Mock::given(method("GET"))
            .and(path("/src/resolve"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&self.server)
            .await;
    }

    /// Embed endpoint succeeding with the given raw caption and author.
    pub async fn mount_extraction(&self, raw_caption: &str, author: &str) {
        Mock::given(method("GET"))
            .and(path("/embed/oembed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": raw_caption,
                "author_name": author,
            })))
            .mount(&self.server)
            .await;
    }

    /// Every extraction method failing, including the page scrape.
    pub async fn mount_empty_extraction(&self) {
        Mock::given(method("GET"))
            .and(path("/embed/oembed"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/lookup/media/.*$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/reel/AbC123"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
    }

    /// File host returning a staged URL served by this same mock server.
    pub async fn mount_storage(&self) -> String {
        let staged = format!("{}/staged/final.mp4", self.server.uri());
        Mock::given(method("POST"))
            .and(path("/storage/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "url": staged })),
            )
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/staged/final.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 4096]))
            .mount(&self.server)
            .await;
        staged
    }

    pub async fn mount_failing_storage(&self) {
        Mock::given(method("POST"))
            .and(path("/storage/upload"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&self.server)
            .await;
    }

    /// Captioner happy path: upload, immediate ACTIVE, generate, release.
    /// The long-form generate mock must be mounted first so its
    /// body matcher wins over the generic one.
    pub async fn mount_captioner(&self, ig_caption: &str) {
        Mock::given(method("POST"))
            .and(path("/cap/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "handle": "files/h1", "state": "PROCESSING" }),
            ))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cap/files/files/h1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "handle": "files/h1", "state": "ACTIVE" }),
            ))
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/cap/generate"))
            .and(wiremock::matchers::body_string_contains("TITLE:"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "text": "TITLE: Generated title\nDESCRIPTION: Generated description #clips" }),
            ))
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/cap/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "text": ig_caption })),
            )
            .mount(&self.server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/cap/files/files/h1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// YouTube-like upload accepting the current access token.
    pub async fn mount_youtube_happy(&self) {
        Mock::given(method("POST"))
            .and(path("/yt/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "vid1" })),
            )
            .mount(&self.server)
            .await;
    }

    /// Full Instagram-like happy path for one account id.
    pub async fn mount_instagram_happy(&self, ig_id: &str) {
        let container = format!("container-{}", ig_id);
        let media = format!("media-{}", ig_id);

        Mock::given(method("POST"))
            .and(path_regex(format!(r"^/graph/v\d+\.0/{}/media$", ig_id)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": container })),
            )
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(format!(r"^/graph/v\d+\.0/{}$", container)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "status_code": "FINISHED" })),
            )
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(format!(
                r"^/graph/v\d+\.0/{}/media_publish$",
                ig_id
            )))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": media })),
            )
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(format!(r"^/graph/v\d+\.0/{}/comments$", media)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "c" })),
            )
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(format!(r"^/graph/v\d+\.0/{}$", media)))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "permalink": format!("https://ig.example/p/{}", media) }),
            ))
            .mount(&self.server)
            .await;
    }
}
