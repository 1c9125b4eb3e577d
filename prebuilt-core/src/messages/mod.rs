pub mod install;
pub mod lock;
pub mod resolution;

use serde::{Deserialize, Serialize};
use std::sync::mpsc;

pub use install::InstallMessage;
pub use lock::LockMessage;
pub use resolution::ResolutionMessage;

/// Top-level message enum representing all possible diagnostic messages from prebuilt.
///
/// Each variant corresponds to a specific phase and wraps that phase's message type.
/// Messages are serialized as tagged JSON with a "type" field indicating the phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Message {
    Resolution(ResolutionMessage),
    Lock(LockMessage),
    Install(InstallMessage),
}

/// A reporter for diagnostic messages.
///
/// This type is cheaply cloneable and can be shared across tasks. It supports two modes:
/// - `Null`: Messages are silently discarded (no-op)
/// - `Channel`: Messages are sent to an mpsc channel for processing
///
/// The `report` method takes a closure to avoid allocating or cloning data unless messages
/// are actually enabled.
#[derive(Clone, Debug)]
pub enum MessageReporter {
    Null,
    Channel(mpsc::SyncSender<Message>),
}

impl MessageReporter {
    /// Create a null reporter that discards all messages.
    pub fn null() -> Self {
        Self::Null
    }

    /// Create a channel reporter that sends messages to the given sender.
    pub fn channel(sender: mpsc::SyncSender<Message>) -> Self {
        Self::Channel(sender)
    }

    /// Report a message by invoking the closure only if messages are enabled.
    ///
    /// ```ignore
    /// reporter.report(|| ResolutionMessage::resolved(&binary));
    /// ```
    pub fn report<F, T>(&self, f: F)
    where
        F: FnOnce() -> T,
        T: Into<Message>,
    {
        if let Self::Channel(sender) = self {
            // The receiving side going away means nobody is listening anymore, which is fine.
            let _ = sender.send(f().into());
        }
    }

    /// Returns true if message reporting is enabled (not null).
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Channel(_))
    }
}
