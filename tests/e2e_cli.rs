//! End-to-end CLI tests using the compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn reelcast() -> Command {
    Command::cargo_bin("reelcast").unwrap()
}

#[test]
fn version_prints_package_version() {
    reelcast()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn validate_accepts_a_minimal_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        r#"
[pipeline]
max_concurrent_sessions = 2

[retry]
max_attempts = 3
"#,
    )
    .unwrap();

    reelcast()
        .arg("validate")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("max concurrent sessions: 2"));
}

#[test]
fn validate_rejects_broken_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        r#"
[pipeline]
max_concurrent_sessions = 0
"#,
    )
    .unwrap();

    reelcast().arg("validate").arg(&config).assert().failure();
}

#[test]
fn run_rejects_a_message_without_a_source_url() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        format!(
            r#"
[pipeline]
transient_dir = "{}"
credentials_file = "{}"
"#,
            dir.path().join("work").display(),
            dir.path().join("credentials.env").display(),
        ),
    )
    .unwrap();

    reelcast()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg("hello, no links here")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no recognized source URL"));
}
