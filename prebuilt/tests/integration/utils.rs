//! Utility functions to help run our CLI as part of a test
use assert_cmd::{Command, assert::OutputAssertExt, cargo::cargo_bin_cmd};
use assert_fs::{TempDir, prelude::*};
use httpmock::prelude::*;
use prebuilt::messages::Message;
use serde_json::{Deserializer, json};

/// Represents the `prebuilt` binary for use in tests.
///
/// Every instance runs in its own temporary working directory with its own install directory, so
/// tests never see the host's `.prebuilt.yaml` or install anything outside the temp dir.
pub(crate) struct Prebuilt {
    pub(crate) cmd: Command,
    pub(crate) cwd: TempDir,
}

impl Prebuilt {
    /// Creates a new `Prebuilt` that locates the bin, without any test environment.
    pub(crate) fn find() -> Self {
        let cwd = TempDir::with_prefix("prebuilt-cwd-").unwrap();
        let mut cmd = cargo_bin_cmd!("prebuilt");
        cmd.current_dir(cwd.path())
            .env_remove("PREBUILT_LOG")
            .env_remove("RUST_LOG")
            .env_remove("GITHUB_TOKEN")
            .env_remove("GITLAB_TOKEN")
            .env("PREBUILT_INSTALL_DIR", cwd.path().join("bin"));

        Self { cmd, cwd }
    }

    /// Like [`Self::find`], with `config` written to `.prebuilt.yaml` in the working directory.
    pub(crate) fn with_config(config: &str) -> Self {
        let me = Self::find();
        me.cwd.child(".prebuilt.yaml").write_str(config).unwrap();
        me
    }

    /// A fresh command in the same working directory, for running the binary a second time.
    pub(crate) fn rerun(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("prebuilt");
        cmd.current_dir(self.cwd.path())
            .env_remove("PREBUILT_LOG")
            .env_remove("RUST_LOG")
            .env_remove("GITHUB_TOKEN")
            .env_remove("GITLAB_TOKEN")
            .env("PREBUILT_INSTALL_DIR", self.cwd.path().join("bin"));
        cmd
    }

    pub(crate) fn lockfile(&self) -> assert_fs::fixture::ChildPath {
        self.cwd.child(".prebuilt.lock")
    }

    pub(crate) fn installed(&self, name: &str) -> assert_fs::fixture::ChildPath {
        self.cwd
            .child("bin")
            .child(format!("{name}{}", std::env::consts::EXE_SUFFIX))
    }
}

/// A config using a provider named `mock` served by `server`.
///
/// The provider lists versions at `/api/<path>/tags` as `[{"name": ...}]` and serves downloads at
/// `/dl/<version>/<asset>`.  `binaries` is spliced in verbatim as the YAML list of binaries.
pub(crate) fn mock_config(server: &MockServer, binaries: &str) -> String {
    format!(
        r#"
providers:
  - name: mock
    versionsUrl: "{base}/api/{{{{ .Provider.Path }}}}/tags"
    versionsJsonPath: "$[*].name"
    downloadUrl: "{base}/dl/{{{{ .Version }}}}/{{{{ tpl(template=.Provider.Query.asset) }}}}"
http:
  retries: 0
binaries:
{binaries}
"#,
        base = server.base_url()
    )
}

/// Serve `tags` as the version listing of `repo` on the mock provider.
pub(crate) fn mock_tags<'a>(server: &'a MockServer, repo: &str, tags: &[&str]) -> httpmock::Mock<'a> {
    let body: Vec<_> = tags.iter().map(|tag| json!({ "name": tag })).collect();
    let path = format!("/api/{repo}/tags");
    server.mock(|when, then| {
        when.method(GET).path(path);
        then.status(200).json_body(json!(body));
    })
}

/// Serve `body` as the download at `path`.
pub(crate) fn mock_download<'a>(
    server: &'a MockServer,
    path: &str,
    body: &[u8],
) -> httpmock::Mock<'a> {
    server.mock(|when, then| {
        when.method(GET).path(path);
        then.status(200).body(body);
    })
}

/// Extension trait to add helper methods to `Command` for testing `prebuilt`
pub(crate) trait CommandExt {
    /// Add the argument to enable JSON message output in `prebuilt`
    ///
    /// NOTE: If this is used, make sure to call [`CommandExt::assert_with_messages`] to capture
    /// and parse the messages separately from the rest of the stdout output.
    fn with_json_messages(&mut self) -> &mut Self;

    /// Special case of [`OutputAssertExt::assert`] that filters out any valid JSON messages
    /// from stdout and returns them separately, as well as an [`Assert`] object which DOES NOT see
    /// the filtered JSON message output.
    fn assert_with_messages(&mut self) -> (assert_cmd::assert::Assert, Vec<Message>);
}

impl CommandExt for Command {
    fn with_json_messages(&mut self) -> &mut Self {
        self.arg("--message-format").arg("json")
    }

    fn assert_with_messages(&mut self) -> (assert_cmd::assert::Assert, Vec<Message>) {
        let output = self.assert().get_output().clone();

        let mut messages = Vec::new();
        let mut filtered_stdout = Vec::new();
        let stdout_str = String::from_utf8_lossy(&output.stdout);
        for line in stdout_str.lines() {
            match Deserializer::from_str(line).into_iter::<Message>().next() {
                Some(Ok(msg)) => messages.push(msg),
                Some(Err(_)) | None => filtered_stdout.push(line),
            }
        }

        let filtered_output = std::process::Output {
            status: output.status,
            stdout: filtered_stdout.join("\n").into_bytes(),
            stderr: output.stderr,
        };

        (filtered_output.assert(), messages)
    }
}
