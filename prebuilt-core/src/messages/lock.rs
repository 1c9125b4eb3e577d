use super::Message;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Messages related to reading and writing the lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LockMessage {
    /// An existing lockfile was read and its digest verified
    Loaded {
        path: PathBuf,
        digest: String,
        binaries: usize,
    },
    /// A lockfile was written
    Written {
        path: PathBuf,
        digest: String,
        binaries: usize,
    },
}

impl LockMessage {
    pub fn loaded(path: &Path, digest: impl Into<String>, binaries: usize) -> Self {
        Self::Loaded {
            path: path.to_path_buf(),
            digest: digest.into(),
            binaries,
        }
    }

    pub fn written(path: &Path, digest: impl Into<String>, binaries: usize) -> Self {
        Self::Written {
            path: path.to_path_buf(),
            digest: digest.into(),
            binaries,
        }
    }
}

impl From<LockMessage> for Message {
    fn from(msg: LockMessage) -> Self {
        Message::Lock(msg)
    }
}
