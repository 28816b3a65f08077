//! Reconciliation loop: keeps one logical watch alive across stream failures.
//!
//! ```text
//! Validating ──► Streaming ──► AwaitingReconnect ──► Streaming ...
//!                    │
//!                    └──► Terminated (cancellation)
//! ```
//!
//! A transient failure resumes from the dispatcher's last processed token;
//! an expired token is discarded so the next session starts from the store's
//! current state (full resync).

use crate::backoff::ReconnectBackoff;
use crate::error::WatchError;
use crate::queue::EventSender;
use crate::retry::RetryPolicy;
use crate::scope::{ListRequest, WatchRequest, WatchScope};
use crate::session::{SessionEnd, WatchSession};
use crate::store::ResourceStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Validating,
    Streaming,
    AwaitingReconnect { reset: bool, productive: bool },
    Terminated,
}

pub(crate) struct ReconcileLoop<'a, K, S> {
    store: &'a S,
    scope: &'a WatchScope,
    retry: &'a RetryPolicy,
    backoff: ReconnectBackoff,
    queue: EventSender<K>,
    cancel: CancellationToken,
}

impl<'a, K, S> ReconcileLoop<'a, K, S>
where
    K: Send + 'static,
    S: ResourceStore<K>,
{
    pub fn new(
        store: &'a S,
        scope: &'a WatchScope,
        retry: &'a RetryPolicy,
        backoff: ReconnectBackoff,
        queue: EventSender<K>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            scope,
            retry,
            backoff,
            queue,
            cancel,
        }
    }

    /// Run until cancelled. Returns an error only when the caller-supplied
    /// starting token is rejected as expired.
    pub async fn run(mut self) -> Result<(), WatchError> {
        let mut resume_token = self.scope.resume_token().unwrap_or_default().to_string();
        let mut state = if resume_token.is_empty() {
            LoopState::Streaming
        } else {
            LoopState::Validating
        };

        loop {
            state = match state {
                LoopState::Validating => self.validate(&resume_token).await?,
                LoopState::Streaming => self.stream(&resume_token).await,
                LoopState::AwaitingReconnect { reset, productive } => {
                    match self.reconnect(reset, productive).await {
                        Some(token) => {
                            resume_token = token;
                            LoopState::Streaming
                        }
                        None => LoopState::Terminated,
                    }
                }
                LoopState::Terminated => {
                    debug!("Reconciliation loop terminated");
                    return Ok(());
                }
            };
        }
    }

    /// Probe the caller's starting token with a single-item list.
    ///
    /// Expiry is surfaced because the caller chose this token explicitly;
    /// any other failure is logged and streaming proceeds anyway.
    async fn validate(&self, token: &str) -> Result<LoopState, WatchError> {
        let request = ListRequest::probe(self.scope, token);
        let probe = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(LoopState::Terminated),
            probe = self.retry.run(|| self.store.list(&request)) => probe,
        };

        match probe {
            Ok(snapshot) => {
                debug!(
                    resume_token = %token,
                    current = ?snapshot.resume_token,
                    "Resume token validated"
                );
            }
            Err(e) if e.is_expired() => {
                warn!(resume_token = %token, error = %e, "Starting resume token has expired");
                return Err(WatchError::Expired {
                    token: token.to_string(),
                });
            }
            Err(e) => {
                warn!(
                    resume_token = %token,
                    error = %e,
                    "Resume token validation failed, watching anyway"
                );
            }
        }
        Ok(LoopState::Streaming)
    }

    async fn stream(&self, token: &str) -> LoopState {
        let request = WatchRequest::new(self.scope, token);
        let report = WatchSession::new(self.store, request, &self.queue, &self.cancel)
            .run()
            .await;
        let productive = report.delivered > 0;

        match report.end {
            SessionEnd::Cancelled => LoopState::Terminated,
            SessionEnd::Detached => {
                debug!("Dispatcher stopped consuming, ending watch");
                LoopState::Terminated
            }
            SessionEnd::ProtocolViolation => {
                warn!(resume_token = %token, "Watch stream violated the notification protocol");
                LoopState::Terminated
            }
            SessionEnd::Closed => {
                debug!(delivered = report.delivered, "Watch stream closed by store, reconnecting");
                LoopState::AwaitingReconnect {
                    reset: false,
                    productive,
                }
            }
            SessionEnd::Failed(e) if e.is_expired() => {
                info!(resume_token = %token, error = %e, "Resume token expired, full resync");
                LoopState::AwaitingReconnect {
                    reset: true,
                    productive,
                }
            }
            SessionEnd::Failed(e) => {
                warn!(resume_token = %token, error = %e, "Watch stream failed, reconnecting");
                LoopState::AwaitingReconnect {
                    reset: false,
                    productive,
                }
            }
        }
    }

    /// Collect the resume token from the dispatcher and wait out the backoff.
    /// `None` means the watch should stop.
    async fn reconnect(&mut self, reset: bool, productive: bool) -> Option<String> {
        let token = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return None,
            token = self.queue.handoff(reset) => token?,
        };

        let delay = self.backoff.next_delay(productive);
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis(), "Backing off before reconnect");
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                () = tokio::time::sleep(delay) => {}
            }
        }
        debug!(resume_token = %token, "Reopening watch");
        Some(token)
    }
}
