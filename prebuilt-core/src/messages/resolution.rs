use super::Message;
use crate::lock::BinaryData;
use serde::{Deserialize, Serialize};

/// Messages emitted while turning binary specs into locked download information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResolutionMessage {
    /// Resolution of a binary has started
    Started { name: String },
    /// The provider a binary refers to was found
    ProviderResolved { name: String, provider: String },
    /// A version constraint was resolved against the provider's listing
    VersionResolved {
        name: String,
        constraint: String,
        version: String,
    },
    /// A binary was fully resolved
    Resolved { binary: BinaryData },
    /// Resolving a binary failed
    Failed { name: String, error: String },
}

impl ResolutionMessage {
    pub fn started(name: impl Into<String>) -> Self {
        Self::Started { name: name.into() }
    }

    pub fn provider_resolved(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::ProviderResolved {
            name: name.into(),
            provider: provider.into(),
        }
    }

    pub fn version_resolved(
        name: impl Into<String>,
        constraint: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self::VersionResolved {
            name: name.into(),
            constraint: constraint.into(),
            version: version.into(),
        }
    }

    pub fn resolved(binary: &BinaryData) -> Self {
        Self::Resolved {
            binary: binary.clone(),
        }
    }

    pub fn failed(name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::Failed {
            name: name.into(),
            error: error.to_string(),
        }
    }
}

impl From<ResolutionMessage> for Message {
    fn from(msg: ResolutionMessage) -> Self {
        Message::Resolution(msg)
    }
}
