//! Watch engine error types.
//!
//! `StoreError` classifies what the versioned store reports; `WatchError` is
//! the small set of failures that cross the watch boundary to the caller.

use thiserror::Error;

/// Reason string the store uses to report that a resume token is no longer
/// retained in its history.
pub const EXPIRED_REASON: &str = "Expired";

/// Error returned by an application notification handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors reported by the versioned resource store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The requested resume token has been compacted out of the store's history
    #[error("resume token expired: {message}")]
    Expired {
        /// Store-provided description
        message: String,
    },

    /// Structured API error other than expiry
    #[error("store API error ({code} {reason}): {message}")]
    Api {
        /// HTTP-style status code
        code: u16,
        /// Machine-readable reason
        reason: String,
        /// Store-provided description
        message: String,
    },

    /// Connection, timeout or other transport-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// A watch frame that does not decode into a known notification kind
    #[error("undecodable watch frame: {0}")]
    Decode(String),
}

impl StoreError {
    /// Build an error from a structured store status, normalizing the
    /// `Expired` reason.
    pub fn from_status(code: u16, reason: &str, message: &str) -> Self {
        if reason == EXPIRED_REASON {
            Self::Expired {
                message: message.to_string(),
            }
        } else {
            Self::Api {
                code,
                reason: reason.to_string(),
                message: message.to_string(),
            }
        }
    }

    /// Whether the store no longer retains the requested resume token.
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::Transport(_))
    }
}

/// Errors that terminate a watch.
///
/// Transient store failures and expiry during streaming are recovered
/// internally and never appear here.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The caller-supplied starting token was rejected as expired
    #[error("resume token {token:?} has expired")]
    Expired {
        /// The rejected token
        token: String,
    },

    /// The store sent something outside the notification protocol
    #[error("watch protocol violation: {0}")]
    ProtocolViolation(String),

    /// The application handler returned an error
    #[error("notification handler failed: {0}")]
    Handler(#[source] HandlerError),

    /// The dispatcher task panicked or was aborted
    #[error("dispatcher task aborted: {0}")]
    Dispatcher(String),
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting is present but cannot be used
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Setting name
        key: String,
        /// Offending value
        value: String,
        /// What is wrong with it
        reason: String,
    },

    /// A required setting is absent
    #[error("missing required setting: {0}")]
    Missing(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
