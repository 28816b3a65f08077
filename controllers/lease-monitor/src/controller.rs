//! Main controller implementation.
//!
//! Watches the configured Lease with the resumable watch engine and folds
//! every notification into a [`LeaseObserver`].

use crate::error::ControllerError;
use k8s_openapi::api::coordination::v1::Lease;
use kube::Client;
use resume_watch::{
    ChangeNotification, HandlerError, KubeStore, LeaderElectionConfig, LeaseObserver,
    LeadershipEvent, ResourceStore, ResourceWatcher, WatchScope, WatchSettings,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

/// Lease monitor for one election.
pub struct Controller<S> {
    watcher: ResourceWatcher<S>,
    scope: WatchScope,
    observer: Arc<Mutex<LeaseObserver>>,
}

impl Controller<KubeStore<Lease>> {
    /// Creates a controller talking to the cluster from the ambient kubeconfig.
    pub async fn new(
        election: LeaderElectionConfig,
        settings: &WatchSettings,
    ) -> Result<Self, ControllerError> {
        info!("Initializing Lease Monitor");

        let client = Client::try_default().await?;
        let store = KubeStore::namespaced(client, &election.namespace);
        let watcher = ResourceWatcher::new(store)
            .with_retry(settings.retry())
            .with_backoff(settings.backoff());

        Ok(Self::with_watcher(watcher, &election, settings))
    }
}

impl<S> Controller<S>
where
    S: ResourceStore<Lease>,
{
    /// Creates a controller around an existing watcher.
    pub fn with_watcher(
        watcher: ResourceWatcher<S>,
        election: &LeaderElectionConfig,
        settings: &WatchSettings,
    ) -> Self {
        let span = info_span!("lease", name = %election.lease_name, identity = %election.identity);
        Self {
            watcher: watcher.with_span(span),
            scope: lease_scope(election, settings),
            observer: Arc::new(Mutex::new(LeaseObserver::new(election.identity.clone()))),
        }
    }

    /// Runs the controller until `cancel` fires or the watch fails.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ControllerError> {
        info!("Lease Monitor running");

        let observer = Arc::clone(&self.observer);
        let handler = move |notification: ChangeNotification<Lease>| {
            let observer = Arc::clone(&observer);
            async move {
                let events = observer.lock().await.observe(&notification);
                for event in events {
                    report(&event);
                }
                Ok::<(), HandlerError>(())
            }
        };

        let result = self.watcher.watch(self.scope, handler, cancel).await;

        // Nobody is following the lease any more; leadership is unknown
        if self.observer.lock().await.is_leader() {
            warn!("Stopped watching while holding the lease");
        }
        result.map_err(ControllerError::from)
    }

    /// Shared view of the observed lease state.
    pub fn observer(&self) -> Arc<Mutex<LeaseObserver>> {
        Arc::clone(&self.observer)
    }
}

fn lease_scope(election: &LeaderElectionConfig, settings: &WatchSettings) -> WatchScope {
    let scope = WatchScope::namespaced(election.namespace.clone())
        .fields(format!("metadata.name={}", election.lease_name))
        .timeout(settings.timeout_seconds);
    match &settings.resume_token {
        Some(token) => scope.from_token(token.clone()),
        None => scope,
    }
}

fn report(event: &LeadershipEvent) {
    match event {
        LeadershipEvent::Promoted => info!("Became leader"),
        LeadershipEvent::Demoted => warn!("Lost leadership"),
        LeadershipEvent::LeaderChanged { holder } => {
            info!(holder = holder.as_deref().unwrap_or("<none>"), "Leader changed");
        }
    }
}
