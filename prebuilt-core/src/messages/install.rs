use super::Message;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Messages emitted while downloading, extracting and installing binaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InstallMessage {
    /// Downloading the release asset of a binary
    Downloading { name: String, url: String },
    /// Extracting the binary from a downloaded archive
    Extracting { name: String, member: String },
    /// The binary was put in place
    Installed {
        name: String,
        version: String,
        path: PathBuf,
    },
    /// Installing the binary failed; other binaries are unaffected
    Failed { name: String, error: String },
}

impl InstallMessage {
    pub fn downloading(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Downloading {
            name: name.into(),
            url: url.into(),
        }
    }

    pub fn extracting(name: impl Into<String>, member: impl Into<String>) -> Self {
        Self::Extracting {
            name: name.into(),
            member: member.into(),
        }
    }

    pub fn installed(name: impl Into<String>, version: impl Into<String>, path: &Path) -> Self {
        Self::Installed {
            name: name.into(),
            version: version.into(),
            path: path.to_path_buf(),
        }
    }

    pub fn failed(name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::Failed {
            name: name.into(),
            error: error.to_string(),
        }
    }
}

impl From<InstallMessage> for Message {
    fn from(msg: InstallMessage) -> Self {
        Message::Install(msg)
    }
}
