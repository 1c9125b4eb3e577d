//! Very basic smoke tests that just confirm that the `prebuilt` binary is able to run at all
use crate::utils::Prebuilt;
use predicates::prelude::*;

/// Basic test, that `prebuilt` runs at all, and that `--help` at least looks vaguely right.
#[test]
fn test_help_output() {
    let mut prebuilt = Prebuilt::find();

    prebuilt
        .cmd
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("lock"))
        .stdout(predicate::str::contains("install"))
        .stderr(predicate::str::is_empty());
}

/// Sanity-check that the vergen logic to include git sha/date in version output is working.
///
/// Expects an output something like:
///
/// ```text
/// prebuilt 0.1.0 (40d26c9 2025-10-26)
/// ````
///
/// Outside of a git checkout only the version is printed.
#[test]
fn test_version_output() {
    let mut prebuilt = Prebuilt::find();

    prebuilt
        .cmd
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(
            predicate::str::is_match(r"^prebuilt \d+\.\d+\.\d+( \([0-9a-f]{7} \d{4}-\d{2}-\d{2}\))?\n$")
                .unwrap(),
        );
}

#[test]
fn test_missing_config_file() {
    let mut prebuilt = Prebuilt::find();

    prebuilt
        .cmd
        .arg("lock")
        .assert()
        .failure()
        .stderr(predicate::str::contains(".prebuilt.yaml"))
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_invalid_config_file() {
    let mut prebuilt = Prebuilt::with_config("binaries: 42\n");

    prebuilt
        .cmd
        .arg("lock")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}
