//! End-to-end pipeline tests over a mock server playing every remote role.

mod common;

use common::TestHarness;
use reelcast::publish::Platform;
use reelcast::report::Phase;
use reelcast::session::SessionMode;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

// ---------------------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn standard_session_publishes_to_all_accounts() {
    let h = TestHarness::new().await;
    h.mount_source().await;
    h.mount_extraction("sunset run #fitness", "@runner").await;
    h.mount_storage().await;
    h.mount_captioner("fresh ai caption").await;
    h.mount_instagram_happy("111").await;
    h.mount_instagram_happy("222").await;
    h.mount_youtube_happy().await;

    let runner = h.runner(vec![
        h.ig_publisher("main", "111"),
        h.ig_publisher("backup", "222"),
        h.yt_publisher("channel"),
    ]);

    let outcome = runner.run(&h.request(SessionMode::Standard)).await.unwrap();

    assert_eq!(outcome.phase(), Phase::Succeeded);
    assert_eq!(outcome.instagram.completed, 2);
    assert_eq!(outcome.youtube.completed, 1);
    assert_eq!(outcome.results.len(), 3);

    // Instagram accounts got platform permalinks back.
    let ig_links: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| r.platform == Platform::Instagram)
        .map(|r| r.permalink.as_deref().unwrap())
        .collect();
    assert!(ig_links.iter().all(|l| l.starts_with("https://ig.example/p/")));

    // Every transient file was cleaned up.
    assert_eq!(h.transient_file_count(), 0);
}

#[tokio::test]
async fn captioner_is_invoked_exactly_once_per_session() {
    let h = TestHarness::new().await;
    h.mount_source().await;
    h.mount_extraction("caption", "@a").await;
    h.mount_storage().await;
    h.mount_instagram_happy("111").await;
    h.mount_instagram_happy("222").await;

    // Strictly one upload and one release, despite two publishing accounts.
    let upload = Mock::given(method("POST"))
        .and(path("/cap/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({ "handle": "files/once", "state": "PROCESSING" }),
        ))
        .expect(1)
        .mount_as_scoped(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cap/files/files/once"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({ "handle": "files/once", "state": "ACTIVE" }),
        ))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cap/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "ai text" })),
        )
        .mount(&h.server)
        .await;
    let release = Mock::given(method("DELETE"))
        .and(path("/cap/files/files/once"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount_as_scoped(&h.server)
        .await;

    let runner = h.runner(vec![
        h.ig_publisher("main", "111"),
        h.ig_publisher("backup", "222"),
    ]);
    let outcome = runner.run(&h.request(SessionMode::Standard)).await.unwrap();

    assert_eq!(outcome.phase(), Phase::Succeeded);
    drop(upload);
    drop(release);
}

// ---------------------------------------------------------------------------
// Caption sourcing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repost_mode_reposts_the_original_caption_without_ai() {
    let h = TestHarness::new().await;
    h.mount_source().await;
    h.mount_extraction("the original caption", "@creator").await;
    h.mount_storage().await;

    // No AI calls at all in repost mode.
    let captioner = Mock::given(method("POST"))
        .and(path("/cap/files"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount_as_scoped(&h.server)
        .await;

    // The container create must carry the original caption verbatim.
    // Mounted before the generic happy-path mocks so it matches first.
    let container = Mock::given(method("POST"))
        .and(path_regex_container("111"))
        .and(body_string_contains("the original caption"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "container-111" })),
        )
        .expect(1)
        .mount_as_scoped(&h.server)
        .await;
    h.mount_instagram_happy("111").await;

    let runner = h.runner(vec![h.ig_publisher("main", "111")]);
    let outcome = runner.run(&h.request(SessionMode::Repost)).await.unwrap();

    assert_eq!(outcome.phase(), Phase::Succeeded);
    drop(captioner);
    drop(container);
}

#[tokio::test]
async fn missing_caption_falls_back_to_template_and_skips_ai_failure() {
    let h = TestHarness::new().await;
    h.mount_source().await;
    h.mount_empty_extraction().await;
    h.mount_storage().await;

    // Captioner is down; the session degrades to the templated caption.
    Mock::given(method("POST"))
        .and(path("/cap/files"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;

    // Default hashtags from the fallback template reach the platform.
    // Mounted before the generic happy-path mocks so it matches first.
    let container = Mock::given(method("POST"))
        .and(path_regex_container("111"))
        .and(body_string_contains("#reels"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "container-111" })),
        )
        .expect(1)
        .mount_as_scoped(&h.server)
        .await;
    h.mount_instagram_happy("111").await;

    let runner = h.runner(vec![h.ig_publisher("main", "111")]);
    let outcome = runner.run(&h.request(SessionMode::Standard)).await.unwrap();

    assert_eq!(outcome.phase(), Phase::Succeeded);
    drop(container);
}

// ---------------------------------------------------------------------------
// Fan-out isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_rejected_account_yields_a_partial_outcome() {
    let h = TestHarness::new().await;
    h.mount_source().await;
    h.mount_extraction("caption", "@a").await;
    h.mount_storage().await;
    h.mount_captioner("ai caption").await;
    h.mount_instagram_happy("111").await;

    // Second account's container create is permanently rejected.
    Mock::given(method("POST"))
        .and(path_regex_container("222"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&h.server)
        .await;

    let runner = h.runner(vec![
        h.ig_publisher("main", "111"),
        h.ig_publisher("blocked", "222"),
    ]);
    let outcome = runner.run(&h.request(SessionMode::Standard)).await.unwrap();

    assert_eq!(outcome.phase(), Phase::PartialSuccess);
    assert_eq!(outcome.instagram.total, 2);
    assert_eq!(outcome.instagram.completed, 1);

    let failed = outcome.results.iter().find(|r| !r.succeeded()).unwrap();
    assert_eq!(failed.account, "blocked");
    assert!(failed.error.as_deref().unwrap().contains("403"));
}

fn path_regex_container(ig_id: &str) -> impl wiremock::Match + 'static {
    wiremock::matchers::path_regex(format!(r"^/graph/v\d+\.0/{}/media$", ig_id))
}
