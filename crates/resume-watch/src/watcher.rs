//! Resource watcher entry point.
//!
//! `ResourceWatcher::watch` wires the three concurrent parts of a watch:
//! the reconciliation loop (which owns each watch session) producing into the
//! event queue, and a dispatcher task draining it into the handler.

use crate::backoff::ReconnectBackoff;
use crate::dispatcher::Dispatcher;
use crate::error::{HandlerError, WatchError};
use crate::notification::ChangeNotification;
use crate::queue::event_queue;
use crate::reconcile::ReconcileLoop;
use crate::retry::RetryPolicy;
use crate::scope::WatchScope;
use crate::store::ResourceStore;
use kube::Resource;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, info};

/// Application reaction to a resource change.
///
/// Invoked for `Added`, `Modified` and `Deleted` notifications only, one at a
/// time and in arrival order.
#[async_trait::async_trait]
pub trait NotificationHandler<K>: Send + Sync {
    async fn handle(&self, notification: ChangeNotification<K>) -> Result<(), HandlerError>;
}

#[async_trait::async_trait]
impl<K, F, Fut> NotificationHandler<K> for F
where
    K: Send + 'static,
    F: Fn(ChangeNotification<K>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, notification: ChangeNotification<K>) -> Result<(), HandlerError> {
        (self)(notification).await
    }
}

/// Watches one resource collection with resume and resync semantics.
pub struct ResourceWatcher<S> {
    store: S,
    retry: RetryPolicy,
    backoff: ReconnectBackoff,
    span: Span,
}

impl<S> ResourceWatcher<S> {
    /// Creates a new watcher with default retry and backoff policies.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            backoff: ReconnectBackoff::default(),
            span: tracing::info_span!("resource_watch"),
        }
    }

    /// Retry policy for the one-shot resume-token probe.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Delay policy between watch sessions.
    #[must_use]
    pub fn with_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Span under which every log line of this watcher is emitted.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Watch `scope` until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation. Transient failures and token expiry
    /// while streaming are handled internally. Errors are limited to an
    /// expired starting token, protocol violations and handler failures.
    ///
    /// Cancellation drops a running handler future at its next `.await`, so
    /// handlers must tolerate being stopped part way through. Queued
    /// notifications are discarded.
    pub async fn watch<K, H>(
        &self,
        scope: WatchScope,
        handler: H,
        cancel: CancellationToken,
    ) -> Result<(), WatchError>
    where
        K: Resource + Send + 'static,
        S: ResourceStore<K>,
        H: NotificationHandler<K> + 'static,
    {
        let (sender, receiver) = event_queue();
        // Stops the dispatcher on every exit path without cancelling the caller's token
        let cancel = cancel.child_token();
        let _stop = cancel.clone().drop_guard();

        info!(
            parent: &self.span,
            namespace = scope.namespace().unwrap_or("<all>"),
            labels = scope.label_selector().unwrap_or(""),
            fields = scope.field_selector().unwrap_or(""),
            resume_token = scope.resume_token().unwrap_or(""),
            "Starting watch"
        );

        let dispatcher = Dispatcher::new(
            receiver,
            handler,
            cancel.clone(),
            scope.resume_token().unwrap_or_default().to_string(),
        );
        let mut dispatcher = tokio::spawn(dispatcher.run().instrument(self.span.clone()));

        let reconcile = ReconcileLoop::new(
            &self.store,
            &scope,
            &self.retry,
            self.backoff.clone(),
            sender,
            cancel.clone(),
        )
        .run()
        .instrument(self.span.clone());

        let joined = |result: Result<Result<(), WatchError>, tokio::task::JoinError>| {
            result.unwrap_or_else(|e| Err(WatchError::Dispatcher(e.to_string())))
        };

        let outcome = tokio::select! {
            finished = &mut dispatcher => joined(finished),
            looped = reconcile => match looped {
                // The loop only ends cleanly on cancellation, a violation or a
                // dead dispatcher; the dispatcher holds the verdict
                Ok(()) => joined(dispatcher.await),
                Err(e) => {
                    dispatcher.abort();
                    Err(e)
                }
            },
        };

        match &outcome {
            Ok(()) => info!(parent: &self.span, "Watch stopped"),
            Err(e) => info!(parent: &self.span, error = %e, "Watch terminated"),
        }
        outcome
    }
}
