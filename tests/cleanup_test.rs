//! Cleanup guarantees under failure at every stage.
//!
//! Whatever stage a session dies in, its transient files must be gone and
//! its admission slot released by the time `run` returns.

mod common;

use common::TestHarness;
use reelcast::session::{SessionError, SessionMode};
use wiremock::matchers::method;
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn failed_resolve_leaves_no_transient_files() {
    let h = TestHarness::new().await;
    h.mount_failing_source().await;

    let runner = h.runner(vec![h.ig_publisher("main", "111")]);
    let err = runner
        .run(&h.request(SessionMode::Standard))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::SourceFetch(_)));
    assert_eq!(h.transient_file_count(), 0);
}

#[tokio::test]
async fn failed_staging_purges_the_download() {
    let h = TestHarness::new().await;
    h.mount_source().await;
    h.mount_extraction("caption", "@a").await;
    h.mount_failing_storage().await;

    // No publish call may happen after a fatal staging failure.
    let publish_guard = Mock::given(method("POST"))
        .and(wiremock::matchers::path_regex(r"^/graph/.*$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount_as_scoped(&h.server)
        .await;

    let runner = h.runner(vec![h.ig_publisher("main", "111")]);
    let err = runner
        .run(&h.request(SessionMode::Standard))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Staging(_)));
    assert_eq!(h.transient_file_count(), 0);
    drop(publish_guard);
}

#[tokio::test]
async fn publish_failure_still_cleans_up_and_completes_the_session() {
    let h = TestHarness::new().await;
    h.mount_source().await;
    h.mount_extraction("caption", "@a").await;
    h.mount_storage().await;
    h.mount_captioner("ai caption").await;

    // Container create rejects permanently for the only account.
    Mock::given(method("POST"))
        .and(wiremock::matchers::path_regex(r"^/graph/v\d+\.0/111/media$"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid access token"))
        .mount(&h.server)
        .await;

    let runner = h.runner(vec![h.ig_publisher("main", "111")]);
    let outcome = runner.run(&h.request(SessionMode::Standard)).await.unwrap();

    // A publish failure is a per-account outcome, not a session error.
    assert!(outcome.instagram.failed());
    assert_eq!(h.transient_file_count(), 0);
}

#[tokio::test]
async fn sessions_admit_again_after_any_outcome() {
    let h = TestHarness::new().await;
    h.mount_failing_source().await;

    let runner = h.runner(vec![]);

    // Failures release their slot: repeated runs never report busy.
    for _ in 0..5 {
        let err = runner
            .run(&h.request(SessionMode::Standard))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::SourceFetch(_)));
    }
}

#[tokio::test]
async fn stale_transient_files_from_dead_sessions_are_swept() {
    let h = TestHarness::new().await;
    h.mount_source().await;
    h.mount_extraction("caption", "@a").await;
    h.mount_storage().await;
    h.mount_captioner("ai caption").await;

    // A leftover from a crashed process, old enough to be an orphan.
    let orphan = h.dir.path().join("reelcast-dead-session-download.mp4");
    std::fs::write(&orphan, b"stale").unwrap();
    let old = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
    let file = std::fs::File::options().write(true).open(&orphan).unwrap();
    file.set_modified(old).unwrap();
    drop(file);

    let runner = h.runner(vec![]);
    let outcome = runner.run(&h.request(SessionMode::Standard)).await.unwrap();

    assert_eq!(outcome.results.len(), 0);
    assert!(!orphan.exists());
    assert_eq!(h.transient_file_count(), 0);
}
