// Failure taxonomy shared by the background, content and popup contexts

use std::time::Duration;
use thiserror::Error;

use crate::host::TabId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    /// Read or write against the persisted settings failed
    #[error("settings store unavailable: {0}")]
    StoreUnavailable(String),

    /// Messaging infrastructure is not ready (popup opened before the worker)
    #[error("messaging channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// A specific tab could not be reached
    #[error("delivery to tab {tab} failed: {reason}")]
    DeliveryFailure { tab: TabId, reason: String },

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("unknown message type: {0}")]
    UnknownMessageKind(String),

    /// Payload of a known kind that does not decode
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The coordinator answered but did not accept the command
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl GuardError {
    /// Errors that are recovered silently with a default or a skip
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GuardError::StoreUnavailable(_) | GuardError::DeliveryFailure { .. }
        )
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(e: serde_json::Error) -> Self {
        GuardError::Malformed(e.to_string())
    }
}

pub type GuardResult<T> = Result<T, GuardError>;
