//! Event queue between the watch stream and the dispatcher.
//!
//! Single producer (the active watch session, then the reconciliation loop at
//! session boundaries), single consumer (the dispatcher). Enqueue never blocks.

use crate::notification::ChangeNotification;
use tokio::sync::{mpsc, oneshot};

/// Item travelling through the queue.
pub(crate) enum QueueItem<K> {
    Notification(ChangeNotification<K>),
    /// Stream content that is not part of the protocol; fatal once reached
    Violation(String),
    /// End of a session: the dispatcher answers with its resume token
    Boundary(SessionBoundary),
}

/// Resume-token handoff at a reconnect boundary.
pub(crate) struct SessionBoundary {
    /// Discard the tracked token before answering (expiry)
    pub reset: bool,
    pub reply: oneshot::Sender<String>,
}

pub(crate) fn event_queue<K>() -> (EventSender<K>, EventReceiver<K>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

pub(crate) struct EventSender<K> {
    tx: mpsc::UnboundedSender<QueueItem<K>>,
}

impl<K> EventSender<K> {
    /// Enqueue a notification. Returns `false` once the dispatcher is gone.
    pub fn enqueue(&self, notification: ChangeNotification<K>) -> bool {
        self.tx.send(QueueItem::Notification(notification)).is_ok()
    }

    pub fn violation(&self, detail: String) -> bool {
        self.tx.send(QueueItem::Violation(detail)).is_ok()
    }

    /// Wait for the dispatcher to process everything queued so far and
    /// return the token it reached. `None` if the dispatcher has exited.
    pub async fn handoff(&self, reset: bool) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(QueueItem::Boundary(SessionBoundary { reset, reply }))
            .ok()?;
        answer.await.ok()
    }
}

pub(crate) struct EventReceiver<K> {
    rx: mpsc::UnboundedReceiver<QueueItem<K>>,
}

impl<K> EventReceiver<K> {
    /// Next item, in enqueue order. `None` once every sender is dropped.
    pub async fn next(&mut self) -> Option<QueueItem<K>> {
        self.rx.recv().await
    }
}
