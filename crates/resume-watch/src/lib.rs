//! Resumable Resource Watch
//!
//! A watch engine for Kubernetes-style "list + watch" APIs. It turns a
//! disconnect-prone event stream into ordered, at-least-once delivery of
//! change notifications to application code.
//!
//! # Example
//!
//! ```no_run
//! use k8s_openapi::api::coordination::v1::Lease;
//! use kube::Client;
//! use resume_watch::{ChangeNotification, HandlerError, KubeStore, ResourceWatcher, WatchScope};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::try_default().await?;
//! let store: KubeStore<Lease> = KubeStore::namespaced(client, "kube-system");
//! let watcher = ResourceWatcher::new(store);
//!
//! let scope = WatchScope::namespaced("kube-system").timeout(290);
//! let cancel = CancellationToken::new();
//!
//! watcher
//!     .watch(scope, |notification: ChangeNotification<Lease>| async move {
//!         println!("{} {:?}", notification.kind(), notification.resume_token());
//!         Ok::<(), HandlerError>(())
//!     }, cancel)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Resume on reconnect**: transient stream failures reopen the watch from
//!   the last fully processed resume token
//! - **Resync on expiry**: an `Expired` resume token is discarded and the watch
//!   restarts from the store's current state
//! - **Ordered dispatch**: one handler invocation at a time, in arrival order
//! - **Leader election contract**: configuration, events and a lease observer
//!   built on the same engine

pub mod backoff;
mod dispatcher;
pub mod error;
pub mod kube_store;
pub mod leader_election;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod notification;
mod queue;
mod reconcile;
pub mod retry;
pub mod scope;
mod session;
pub mod settings;
pub mod store;
pub mod watcher;

#[cfg(test)]
mod reconcile_test;
#[cfg(test)]
mod test_utils;

pub use backoff::ReconnectBackoff;
pub use error::{ConfigError, HandlerError, StoreError, WatchError};
pub use kube_store::KubeStore;
pub use leader_election::{
    LeaderElectionConfig, LeaderElectionError, LeaderElector, LeadershipEvent, LeaseObserver,
};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockStore, ScriptedSession};
pub use notification::{ChangeNotification, NotificationKind, StoreStatus};
pub use retry::RetryPolicy;
pub use scope::{ListRequest, ResumeTokenMatch, WatchRequest, WatchScope};
pub use settings::WatchSettings;
pub use store::{ListSnapshot, NotificationStream, ResourceStore};
pub use watcher::{NotificationHandler, ResourceWatcher};
