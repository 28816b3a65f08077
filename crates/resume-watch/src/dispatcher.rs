//! Dispatcher: the single consumer of the event queue.
//!
//! Drains notifications in order, advances the tracked resume token and
//! awaits the application handler for each resource change before taking the
//! next one. The tracked token is written only here. Cancellation drops an
//! in-flight handler future at its next suspension point.

use crate::error::WatchError;
use crate::notification::ChangeNotification;
use crate::queue::{EventReceiver, QueueItem};
use crate::watcher::NotificationHandler;
use kube::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub(crate) struct Dispatcher<K, H> {
    queue: EventReceiver<K>,
    handler: H,
    cancel: CancellationToken,
    /// Last fully processed resume token; empty means "current state"
    resume_token: String,
}

impl<K, H> Dispatcher<K, H>
where
    K: Resource + Send + 'static,
    H: NotificationHandler<K>,
{
    pub fn new(
        queue: EventReceiver<K>,
        handler: H,
        cancel: CancellationToken,
        resume_token: String,
    ) -> Self {
        Self {
            queue,
            handler,
            cancel,
            resume_token,
        }
    }

    /// Run until cancellation, queue closure or a fatal error.
    pub async fn run(mut self) -> Result<(), WatchError> {
        loop {
            let item = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("Dispatcher cancelled");
                    return Ok(());
                }
                item = self.queue.next() => item,
            };

            let Some(item) = item else {
                debug!("Event queue closed, dispatcher exiting");
                return Ok(());
            };

            match item {
                QueueItem::Notification(notification) => self.dispatch(notification).await?,
                QueueItem::Violation(detail) => {
                    return Err(WatchError::ProtocolViolation(detail));
                }
                QueueItem::Boundary(boundary) => {
                    if boundary.reset {
                        debug!(discarded = %self.resume_token, "Discarding token for resync");
                        self.resume_token.clear();
                    }
                    // The loop may already be gone (cancelled); nothing to hand over then
                    let _ = boundary.reply.send(self.resume_token.clone());
                }
            }
        }
    }

    async fn dispatch(&mut self, notification: ChangeNotification<K>) -> Result<(), WatchError> {
        match notification {
            ChangeNotification::Bookmark { resume_token } => {
                debug!(resume_token = %resume_token, "Bookmark");
                self.advance(Some(resume_token));
                Ok(())
            }
            ChangeNotification::Error(status) => {
                warn!(
                    code = status.code,
                    reason = %status.reason,
                    message = %status.message,
                    "Watch stream reported an error; resume token unchanged"
                );
                Ok(())
            }
            change => {
                self.advance(change.resume_token());
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => {
                        debug!("Handler abandoned on cancellation");
                        Ok(())
                    }
                    handled = self.handler.handle(change) => handled.map_err(WatchError::Handler),
                }
            }
        }
    }

    fn advance(&mut self, token: Option<String>) {
        let Some(token) = token else {
            return;
        };
        if let (Ok(previous), Ok(next)) = (self.resume_token.parse::<u64>(), token.parse::<u64>()) {
            if next < previous {
                warn!(previous, next, "Resume token moved backwards");
            }
        }
        self.resume_token = token;
    }
}
