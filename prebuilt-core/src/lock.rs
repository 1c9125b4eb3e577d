//! The lockfile: a digest-stamped snapshot of fully resolved binaries.
use crate::{Result, error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::ResultExt;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

/// Everything needed to install one binary without consulting its provider again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryData {
    /// File name the binary is installed as
    pub name: String,

    /// Name of the provider the binary was resolved with
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,

    pub version: String,

    #[serde(rename = "downloadURL")]
    pub download_url: String,

    /// Path of the binary inside the downloaded archive
    #[serde(
        default,
        rename = "extractPath",
        skip_serializing_if = "Option::is_none"
    )]
    pub extract_path: Option<String>,
}

/// A resolved set of binaries.
///
/// `digest` is the SHA-256 of the JSON serialization of `binaries` sorted by name, so two locks
/// resolved from the same inputs have the same digest regardless of when or in what order they
/// were resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub generated: DateTime<Utc>,
    pub digest: String,
    pub binaries: Vec<BinaryData>,
}

impl Lock {
    /// Build a lock from resolved binaries, sorting them by name and stamping the digest.
    pub fn new(mut binaries: Vec<BinaryData>) -> Result<Self> {
        binaries.sort_by(|a, b| a.name.cmp(&b.name));
        let digest = compute_digest(&binaries)?;

        Ok(Self {
            generated: Utc::now(),
            digest,
            binaries,
        })
    }

    /// Read the lockfile at `path` and check that its digest matches its contents.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).context(error::IoSnafu { path })?;
        let lock: Self = serde_yaml::from_str(&contents).context(error::LockReadSnafu { path })?;

        let actual = compute_digest(&lock.binaries)?;
        if actual != lock.digest {
            return error::LockDigestMismatchSnafu {
                path,
                expected: lock.digest,
                actual,
            }
            .fail();
        }

        tracing::debug!(path = %path.display(), digest = %lock.digest, "Read lockfile");
        Ok(lock)
    }

    /// Write the lock to `path`, replacing any existing file in one step.
    pub fn write(&self, path: &Path) -> Result<()> {
        let contents = serde_yaml::to_string(self).context(error::LockWriteSnafu { path })?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir).context(error::IoSnafu { path: dir })?;
        file.write_all(contents.as_bytes())
            .context(error::IoSnafu { path: file.path() })?;
        file.persist(path).map_err(|e| error::Error::Io {
            path: path.to_path_buf(),
            source: e.error,
        })?;

        tracing::debug!(path = %path.display(), digest = %self.digest, "Wrote lockfile");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&BinaryData> {
        self.binaries.iter().find(|binary| binary.name == name)
    }
}

/// The lockfile that belongs to the configuration file at `config_path`: same name, `.lock`
/// extension.
pub fn lock_path(config_path: &Path) -> PathBuf {
    config_path.with_extension("lock")
}

/// `sha256:<hex>` over the JSON serialization of `binaries` sorted by name.
pub fn compute_digest(binaries: &[BinaryData]) -> Result<String> {
    let mut sorted: Vec<&BinaryData> = binaries.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let bytes = serde_json::to_vec(&sorted).context(error::JsonSnafu)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("sha256:{:x}", hasher.finalize()))
}
