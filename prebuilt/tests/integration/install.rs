//! Tests for `prebuilt install`
use crate::utils::{CommandExt, Prebuilt, mock_config, mock_download, mock_tags};
use assert_fs::prelude::*;
use flate2::{Compression, write::GzEncoder};
use httpmock::prelude::*;
use predicates::prelude::*;
use prebuilt::messages::{InstallMessage, LockMessage, Message};

const BINARIES: &str = r#"
  - name: tool
    version: "^1"
    provider: "mock://local/tool?asset=tool_{{ .Version }}.tar.gz"
    extractPath: "./tool"
  - name: ripgrep
    binName: rg
    version: latest
    provider: "mock://local/ripgrep?asset=rg"
"#;

fn tar_gz(path: &str, contents: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut data, Compression::default());
        let mut tar = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        tar.append_data(&mut header, path, contents).unwrap();
        tar.into_inner().unwrap().finish().unwrap();
    }
    data
}

#[test]
fn install_without_lockfile_resolves_on_demand() {
    let server = MockServer::start();
    mock_tags(&server, "tool", &["v1.2.0", "v1.1.0"]);
    mock_tags(&server, "ripgrep", &["14.1.0"]);
    mock_download(
        &server,
        "/dl/v1.2.0/tool_v1.2.0.tar.gz",
        &tar_gz("tool", b"tool 1.2.0"),
    );
    mock_download(&server, "/dl/14.1.0/rg", b"rg 14.1.0");

    let mut prebuilt = Prebuilt::with_config(&mock_config(&server, BINARIES));
    let (assert, messages) = prebuilt
        .cmd
        .with_json_messages()
        .arg("install")
        .assert_with_messages();
    assert.success();

    prebuilt.installed("tool").assert("tool 1.2.0");
    prebuilt.installed("rg").assert("rg 14.1.0");
    prebuilt.lockfile().assert(predicate::path::missing());

    let installed: Vec<&str> = messages
        .iter()
        .filter_map(|m| match m {
            Message::Install(InstallMessage::Installed { name, .. }) => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(installed.len(), 2);
    assert!(installed.contains(&"tool") && installed.contains(&"rg"));
}

#[test]
fn install_uses_lockfile() {
    let server = MockServer::start();
    let tags = mock_tags(&server, "tool", &["v1.1.0"]);
    mock_tags(&server, "ripgrep", &["14.1.0"]);
    let download = mock_download(
        &server,
        "/dl/v1.1.0/tool_v1.1.0.tar.gz",
        &tar_gz("tool", b"tool 1.1.0"),
    );

    let mut prebuilt = Prebuilt::with_config(&mock_config(&server, BINARIES));
    prebuilt.cmd.arg("lock").assert().success();
    tags.assert_calls(1);

    let (assert, messages) = prebuilt
        .rerun()
        .with_json_messages()
        .args(["install", "tool"])
        .assert_with_messages();
    assert.success();

    // Versions came from the lockfile, not from the listing
    tags.assert_calls(1);
    download.assert_calls(1);
    prebuilt.installed("tool").assert("tool 1.1.0");
    prebuilt.installed("rg").assert(predicate::path::missing());

    assert!(messages.iter().any(|m| matches!(
        m,
        Message::Lock(LockMessage::Loaded { binaries: 2, .. })
    )));
}

#[test]
fn install_by_config_name_maps_to_bin_name() {
    let server = MockServer::start();
    mock_tags(&server, "tool", &["v1.0.0"]);
    mock_tags(&server, "ripgrep", &["14.1.0"]);
    mock_download(&server, "/dl/14.1.0/rg", b"rg 14.1.0");

    let mut prebuilt = Prebuilt::with_config(&mock_config(&server, BINARIES));
    prebuilt.cmd.arg("lock").assert().success();

    prebuilt
        .rerun()
        .args(["install", "ripgrep"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Installed rg 14.1.0"));

    prebuilt.installed("rg").assert("rg 14.1.0");
}

#[test]
fn install_failure_of_one_binary_does_not_block_others() {
    let server = MockServer::start();
    mock_tags(&server, "tool", &["v1.0.0"]);
    mock_tags(&server, "ripgrep", &["14.1.0"]);
    server.mock(|when, then| {
        when.method(GET).path("/dl/v1.0.0/tool_v1.0.0.tar.gz");
        then.status(404).body("Not Found");
    });
    mock_download(&server, "/dl/14.1.0/rg", b"rg 14.1.0");

    let mut prebuilt = Prebuilt::with_config(&mock_config(&server, BINARIES));
    let log_file = prebuilt.cwd.child("install.log");
    prebuilt
        .cmd
        .arg("install")
        .arg("--log-file")
        .arg(log_file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Installation failed for: tool"))
        .stderr(predicate::str::contains(format!(
            "See {} for details",
            log_file.path().display()
        )))
        .stderr(predicate::str::contains("Installed rg 14.1.0"));

    prebuilt.installed("rg").assert("rg 14.1.0");
    prebuilt.installed("tool").assert(predicate::path::missing());
    log_file.assert(predicate::str::contains("404"));
}

#[test]
fn install_rejects_unknown_name() {
    let server = MockServer::start();
    let tags = mock_tags(&server, "tool", &["v1.0.0"]);

    let mut prebuilt = Prebuilt::with_config(&mock_config(&server, BINARIES));
    prebuilt
        .cmd
        .args(["install", "bat"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Binary 'bat' is not defined"));

    tags.assert_calls(0);
}

#[test]
fn install_rejects_tampered_lockfile() {
    let server = MockServer::start();
    mock_tags(&server, "tool", &["v1.0.0"]);
    mock_tags(&server, "ripgrep", &["14.1.0"]);

    let mut prebuilt = Prebuilt::with_config(&mock_config(&server, BINARIES));
    prebuilt.cmd.arg("lock").assert().success();

    let lockfile = std::fs::read_to_string(prebuilt.lockfile().path()).unwrap();
    prebuilt
        .lockfile()
        .write_str(&lockfile.replace("14.1.0", "14.0.0"))
        .unwrap();

    prebuilt
        .rerun()
        .arg("install")
        .assert()
        .failure()
        .stderr(predicate::str::contains("digest mismatch"));
}
