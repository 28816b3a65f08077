//! Kubernetes API implementation of [`ResourceStore`].
//!
//! Maps `kube::Api` list/watch calls and their errors onto the engine's
//! store vocabulary.

use crate::error::StoreError;
use crate::notification::{ChangeNotification, StoreStatus};
use crate::scope::{ListRequest, ResumeTokenMatch, WatchRequest};
use crate::store::{ListSnapshot, NotificationStream, ResourceStore};
use futures::StreamExt;
use kube::api::{Api, ListParams, VersionMatch, WatchEvent, WatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// The API server rejects watch timeouts at or above this value.
const MAX_WATCH_TIMEOUT_SECONDS: u32 = 290;

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(status) => {
                StoreError::from_status(status.code, &status.reason, &status.message)
            }
            kube::Error::SerdeError(e) => StoreError::Decode(e.to_string()),
            other => StoreError::Transport(other.to_string()),
        }
    }
}

/// Resource store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore<K> {
    api: Api<K>,
}

impl<K> KubeStore<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Wrap an already scoped API handle.
    pub fn new(api: Api<K>) -> Self {
        Self { api }
    }

    /// Store over all namespaces (or a cluster-scoped kind).
    pub fn all(client: Client) -> Self
    where
        K::DynamicType: Default,
    {
        Self::new(Api::all(client))
    }

    /// Store over a single namespace.
    pub fn namespaced(client: Client, namespace: &str) -> Self
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Self::new(Api::namespaced(client, namespace))
    }
}

fn list_params(request: &ListRequest) -> ListParams {
    let mut params = ListParams::default();
    if let Some(labels) = &request.label_selector {
        params = params.labels(labels);
    }
    if let Some(fields) = &request.field_selector {
        params = params.fields(fields);
    }
    if let Some(limit) = request.limit {
        params = params.limit(limit);
    }
    // resourceVersionMatch is only valid together with resourceVersion
    if let Some(token) = request.resume_token.as_deref().filter(|t| !t.is_empty()) {
        params = params.at(token);
        if let Some(mode) = request.resume_token_match {
            params = params.matching(match mode {
                ResumeTokenMatch::NotOlderThan => VersionMatch::NotOlderThan,
                ResumeTokenMatch::Exact => VersionMatch::Exact,
            });
        }
    }
    params
}

/// `resume_token_match` is not forwarded: the API server rejects
/// `resourceVersionMatch` on watch requests, and it only affects the probe list.
fn watch_params(request: &WatchRequest) -> WatchParams {
    let mut params = WatchParams::default();
    if let Some(labels) = &request.label_selector {
        params = params.labels(labels);
    }
    if let Some(fields) = &request.field_selector {
        params = params.fields(fields);
    }
    if let Some(timeout) = request.timeout_seconds {
        params = params.timeout(timeout.min(MAX_WATCH_TIMEOUT_SECONDS));
    }
    if !request.allow_bookmarks {
        params = params.disable_bookmarks();
    }
    params
}

/// Convert one watch event. In-stream expiry ends the stream as an error so
/// the reconciliation loop can force a resync.
fn convert_event<K>(event: WatchEvent<K>) -> Result<ChangeNotification<K>, StoreError> {
    match event {
        WatchEvent::Added(obj) => Ok(ChangeNotification::Added(obj)),
        WatchEvent::Modified(obj) => Ok(ChangeNotification::Modified(obj)),
        WatchEvent::Deleted(obj) => Ok(ChangeNotification::Deleted(obj)),
        WatchEvent::Bookmark(bookmark) => Ok(ChangeNotification::Bookmark {
            resume_token: bookmark.metadata.resource_version,
        }),
        WatchEvent::Error(status) => {
            match StoreError::from_status(status.code, &status.reason, &status.message) {
                expired @ StoreError::Expired { .. } => Err(expired),
                _ => Ok(ChangeNotification::Error(StoreStatus {
                    code: status.code,
                    reason: status.reason.clone(),
                    message: status.message.clone(),
                })),
            }
        }
    }
}

#[async_trait::async_trait]
impl<K> ResourceStore<K> for KubeStore<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn list(&self, request: &ListRequest) -> Result<ListSnapshot, StoreError> {
        let params = list_params(request);
        debug!(limit = ?request.limit, resume_token = ?request.resume_token, "Listing resources");

        let list = self.api.list(&params).await?;
        Ok(ListSnapshot {
            resume_token: list.metadata.resource_version,
            items: list.items.len(),
        })
    }

    async fn watch(&self, request: &WatchRequest) -> Result<NotificationStream<K>, StoreError> {
        let params = watch_params(request);
        debug!(resume_token = %request.resume_token, "Opening watch stream");

        let stream = self.api.watch(&params, &request.resume_token).await?;
        Ok(stream
            .map(|item| item.map_err(StoreError::from).and_then(convert_event))
            .boxed())
    }
}
