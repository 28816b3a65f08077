//! Change notifications delivered by a watch.

use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error payload carried by an `Error` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    /// HTTP-style status code
    pub code: u16,
    /// Machine-readable reason, e.g. `Expired`
    pub reason: String,
    /// Human-readable description
    pub message: String,
}

/// One observed mutation of a watched resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeNotification<K> {
    /// Resource was created (or is part of an initial listing)
    Added(K),
    /// Resource was updated
    Modified(K),
    /// Resource was removed; carries its last known state
    Deleted(K),
    /// Checkpoint carrying only an updated resume token
    Bookmark { resume_token: String },
    /// In-stream error that carries no resource state
    Error(StoreStatus),
}

/// Tag of a [`ChangeNotification`], named as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// `ADDED`
    Added,
    /// `MODIFIED`
    Modified,
    /// `DELETED`
    Deleted,
    /// `BOOKMARK`
    Bookmark,
    /// `ERROR`
    Error,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::Bookmark => "BOOKMARK",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

impl<K: Resource> ChangeNotification<K> {
    /// Tag of this notification.
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Added(_) => NotificationKind::Added,
            Self::Modified(_) => NotificationKind::Modified,
            Self::Deleted(_) => NotificationKind::Deleted,
            Self::Bookmark { .. } => NotificationKind::Bookmark,
            Self::Error(_) => NotificationKind::Error,
        }
    }

    /// Resume token embedded in this notification.
    ///
    /// `None` for `Error` notifications and for resources that carry no
    /// `resourceVersion`.
    pub fn resume_token(&self) -> Option<String> {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => obj.resource_version(),
            Self::Bookmark { resume_token } => Some(resume_token.clone()),
            Self::Error(_) => None,
        }
    }

    /// The resource snapshot, if this notification carries one.
    pub fn object(&self) -> Option<&K> {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => Some(obj),
            Self::Bookmark { .. } | Self::Error(_) => None,
        }
    }
}
