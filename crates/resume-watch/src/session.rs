//! Watch session: one open stream, forwarded into the event queue.

use crate::error::{EXPIRED_REASON, StoreError};
use crate::notification::ChangeNotification;
use crate::queue::EventSender;
use crate::scope::WatchRequest;
use crate::store::ResourceStore;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a session stopped reading its stream.
#[derive(Debug)]
pub(crate) enum SessionEnd {
    /// The shared cancellation signal fired
    Cancelled,
    /// The store closed the stream normally (server-side timeout)
    Closed,
    /// The watch could not be opened or the stream failed
    Failed(StoreError),
    /// The stream carried an undecodable frame
    ProtocolViolation,
    /// The dispatcher is gone; nobody is consuming
    Detached,
}

#[derive(Debug)]
pub(crate) struct SessionReport {
    pub end: SessionEnd,
    /// Resource changes and bookmarks enqueued during this session
    pub delivered: u64,
}

pub(crate) struct WatchSession<'a, K, S> {
    store: &'a S,
    request: WatchRequest,
    queue: &'a EventSender<K>,
    cancel: &'a CancellationToken,
}

impl<'a, K, S> WatchSession<'a, K, S>
where
    K: Send + 'static,
    S: ResourceStore<K>,
{
    pub fn new(
        store: &'a S,
        request: WatchRequest,
        queue: &'a EventSender<K>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            store,
            request,
            queue,
            cancel,
        }
    }

    /// Open the stream and forward it until it ends.
    pub async fn run(self) -> SessionReport {
        let mut delivered = 0;
        let report = |end, delivered| SessionReport { end, delivered };

        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return report(SessionEnd::Cancelled, delivered),
            opened = self.store.watch(&self.request) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => return report(SessionEnd::Failed(e), delivered),
        };
        debug!(resume_token = %self.request.resume_token, "Watch stream open");

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return report(SessionEnd::Cancelled, delivered),
                next = stream.next() => next,
            };

            match next {
                None => return report(SessionEnd::Closed, delivered),
                Some(Ok(ChangeNotification::Error(status))) if status.reason == EXPIRED_REASON => {
                    let expired =
                        StoreError::from_status(status.code, &status.reason, &status.message);
                    return report(SessionEnd::Failed(expired), delivered);
                }
                Some(Ok(notification)) => {
                    // Error notifications leave the token alone and make no progress
                    let counts = !matches!(notification, ChangeNotification::Error(_));
                    if !self.queue.enqueue(notification) {
                        return report(SessionEnd::Detached, delivered);
                    }
                    if counts {
                        delivered += 1;
                    }
                }
                Some(Err(StoreError::Decode(detail))) => {
                    // Queued behind everything already received so the
                    // dispatcher fails at the right position
                    self.queue.violation(detail);
                    return report(SessionEnd::ProtocolViolation, delivered);
                }
                Some(Err(e)) => return report(SessionEnd::Failed(e), delivered),
            }
        }
    }
}
