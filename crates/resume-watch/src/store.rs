//! ResourceStore trait for mocking
//!
//! This trait abstracts the versioned resource store so the watch engine can
//! run against the Kubernetes API in production and a scripted store in tests.

use crate::error::StoreError;
use crate::notification::ChangeNotification;
use crate::scope::{ListRequest, WatchRequest};
use futures::stream::BoxStream;

/// Stream of notifications produced by one open watch.
pub type NotificationStream<K> = BoxStream<'static, Result<ChangeNotification<K>, StoreError>>;

/// Result of a single list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListSnapshot {
    /// Resume token of the collection at the time of the list
    pub resume_token: Option<String>,
    /// Number of items returned
    pub items: usize,
}

/// Versioned store operations consumed by the watch engine.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// List the collection once.
    async fn list(&self, request: &ListRequest) -> Result<ListSnapshot, StoreError>;

    /// Open a streaming watch. The returned stream ends when the store closes
    /// the connection; expiry and transport failures arrive as `Err` items.
    async fn watch(&self, request: &WatchRequest) -> Result<NotificationStream<K>, StoreError>;
}
