//! Tests for `prebuilt lock`
use crate::utils::{CommandExt, Prebuilt, mock_config, mock_tags};
use assert_fs::assert::PathAssert;
use httpmock::prelude::*;
use predicates::prelude::*;
use prebuilt::messages::{LockMessage, Message, ResolutionMessage};

const TWO_BINARIES: &str = r#"
  - name: tool
    version: "<1.0"
    provider: "mock://local/tool?asset=tool_{{ .Version }}_linux.tar.gz"
    extractPath: "tool_{{ .Version }}/tool"
  - name: other
    version:
      prefix: "other-"
      constraints: "~2.1"
    provider: "mock://local/other?asset=other"
"#;

#[test]
fn lock_writes_resolved_versions() {
    let server = MockServer::start();
    mock_tags(&server, "tool", &["v1.0.0", "v0.1.0", "v0.0.1"]);
    mock_tags(&server, "other", &["other-2.2.0", "other-2.1.3", "other-2.1.0"]);

    let mut prebuilt = Prebuilt::with_config(&mock_config(&server, TWO_BINARIES));
    let (assert, messages) = prebuilt.cmd.with_json_messages().arg("lock").assert_with_messages();
    assert.success();

    let lockfile = std::fs::read_to_string(prebuilt.lockfile().path()).unwrap();
    assert!(lockfile.contains("digest: sha256:"), "{lockfile}");
    assert!(
        lockfile.contains(&server.url("/dl/v0.1.0/tool_v0.1.0_linux.tar.gz")),
        "{lockfile}"
    );
    assert!(lockfile.contains("extractPath: tool_v0.1.0/tool"), "{lockfile}");
    assert!(lockfile.contains("version: other-2.1.3"), "{lockfile}");

    // Sorted by name
    let other = lockfile.find("name: other").unwrap();
    let tool = lockfile.find("name: tool").unwrap();
    assert!(other < tool);

    assert!(messages.iter().any(|m| matches!(
        m,
        Message::Resolution(ResolutionMessage::VersionResolved { name, version, .. })
            if name == "tool" && version == "v0.1.0"
    )));
    assert!(messages.iter().any(|m| matches!(
        m,
        Message::Lock(LockMessage::Written { binaries: 2, .. })
    )));
}

#[test]
fn lock_digest_is_reproducible() {
    let server = MockServer::start();
    mock_tags(&server, "tool", &["v1.0.0", "v0.1.0"]);
    mock_tags(&server, "other", &["other-2.1.0"]);

    let mut prebuilt = Prebuilt::with_config(&mock_config(&server, TWO_BINARIES));
    prebuilt.cmd.arg("lock").assert().success();
    let first = std::fs::read_to_string(prebuilt.lockfile().path()).unwrap();

    prebuilt.rerun().arg("lock").assert().success();
    let second = std::fs::read_to_string(prebuilt.lockfile().path()).unwrap();

    let digest = |lockfile: &str| {
        lockfile
            .lines()
            .find(|line| line.starts_with("digest:"))
            .map(str::to_string)
    };
    assert_eq!(digest(&first), digest(&second));
    assert!(digest(&first).is_some());
}

#[test]
fn lock_fails_without_writing_when_any_binary_fails() {
    let server = MockServer::start();
    mock_tags(&server, "tool", &["v0.1.0"]);
    server.mock(|when, then| {
        when.method(GET).path("/api/other/tags");
        then.status(500).body("boom");
    });

    let mut prebuilt = Prebuilt::with_config(&mock_config(&server, TWO_BINARIES));
    prebuilt
        .cmd
        .arg("lock")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to resolve binary 'other'"));

    prebuilt.lockfile().assert(predicate::path::missing());
}

#[test]
fn lock_fails_when_no_version_matches() {
    let server = MockServer::start();
    mock_tags(&server, "tool", &["v1.0.0", "v2.0.0"]);

    let binaries = r#"
  - name: tool
    version: "<1.0"
    provider: "mock://local/tool?asset=tool"
"#;
    let mut prebuilt = Prebuilt::with_config(&mock_config(&server, binaries));
    prebuilt
        .cmd
        .arg("lock")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No version matches constraint '<1.0'"));
}

#[test]
fn lock_rejects_unknown_provider() {
    let server = MockServer::start();
    let binaries = r#"
  - name: tool
    version: latest
    provider: "nope://local/tool"
"#;

    let mut prebuilt = Prebuilt::with_config(&mock_config(&server, binaries));
    prebuilt
        .cmd
        .arg("lock")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown provider 'nope'"));
}
