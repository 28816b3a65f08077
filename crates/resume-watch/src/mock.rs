//! Mock ResourceStore for unit testing
//!
//! This module provides a scripted implementation of [`ResourceStore`] that
//! can be used in tests without a running API server. List results and watch
//! sessions are queued up front; every request the engine makes is recorded
//! for later assertions.

use crate::error::StoreError;
use crate::notification::ChangeNotification;
use crate::scope::{ListRequest, WatchRequest};
use crate::store::{ListSnapshot, NotificationStream, ResourceStore};
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// One scripted response to a `watch` call.
#[derive(Debug, Clone)]
pub struct ScriptedSession<K> {
    refuse: Option<StoreError>,
    items: Vec<Result<ChangeNotification<K>, StoreError>>,
    hold_open: bool,
}

impl<K> ScriptedSession<K> {
    /// Deliver `items`, then close the stream.
    pub fn closing(items: Vec<Result<ChangeNotification<K>, StoreError>>) -> Self {
        Self {
            refuse: None,
            items,
            hold_open: false,
        }
    }

    /// Deliver `items`, then keep the stream open until the watch is dropped.
    pub fn holding(items: Vec<Result<ChangeNotification<K>, StoreError>>) -> Self {
        Self {
            refuse: None,
            items,
            hold_open: true,
        }
    }

    /// Fail the `watch` call itself.
    pub fn refused(error: StoreError) -> Self {
        Self {
            refuse: Some(error),
            items: Vec::new(),
            hold_open: false,
        }
    }
}

/// Mock store for testing
///
/// When the scripted sessions run out, further watches stay open without
/// delivering anything, so a test decides when to stop via cancellation.
/// When scripted list results run out, lists succeed with an empty snapshot.
pub struct MockStore<K> {
    list_results: Arc<Mutex<VecDeque<Result<ListSnapshot, StoreError>>>>,
    sessions: Arc<Mutex<VecDeque<ScriptedSession<K>>>>,
    list_requests: Arc<Mutex<Vec<ListRequest>>>,
    watch_requests: Arc<Mutex<Vec<WatchRequest>>>,
    watch_opened: Arc<Notify>,
}

impl<K> Clone for MockStore<K> {
    fn clone(&self) -> Self {
        Self {
            list_results: Arc::clone(&self.list_results),
            sessions: Arc::clone(&self.sessions),
            list_requests: Arc::clone(&self.list_requests),
            watch_requests: Arc::clone(&self.watch_requests),
            watch_opened: Arc::clone(&self.watch_opened),
        }
    }
}

impl<K> Default for MockStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K> MockStore<K> {
    /// Create a new mock store
    pub fn new() -> Self {
        Self {
            list_results: Arc::new(Mutex::new(VecDeque::new())),
            sessions: Arc::new(Mutex::new(VecDeque::new())),
            list_requests: Arc::new(Mutex::new(Vec::new())),
            watch_requests: Arc::new(Mutex::new(Vec::new())),
            watch_opened: Arc::new(Notify::new()),
        }
    }

    /// Queue the result of the next `list` call (for test setup)
    pub fn push_list_result(&self, result: Result<ListSnapshot, StoreError>) {
        lock(&self.list_results).push_back(result);
    }

    /// Queue the next watch session (for test setup)
    pub fn push_session(&self, session: ScriptedSession<K>) {
        lock(&self.sessions).push_back(session);
    }

    /// All list requests received so far
    pub fn list_requests(&self) -> Vec<ListRequest> {
        lock(&self.list_requests).clone()
    }

    /// All watch requests received so far
    pub fn watch_requests(&self) -> Vec<WatchRequest> {
        lock(&self.watch_requests).clone()
    }

    /// Resume tokens of every watch request, in order
    pub fn watch_tokens(&self) -> Vec<String> {
        lock(&self.watch_requests)
            .iter()
            .map(|request| request.resume_token.clone())
            .collect()
    }

    /// Wait until at least `count` watch requests have been made
    pub async fn wait_for_watches(&self, count: usize) {
        loop {
            let notified = self.watch_opened.notified();
            if lock(&self.watch_requests).len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait::async_trait]
impl<K> ResourceStore<K> for MockStore<K>
where
    K: Send + Sync + 'static,
{
    async fn list(&self, request: &ListRequest) -> Result<ListSnapshot, StoreError> {
        lock(&self.list_requests).push(request.clone());
        lock(&self.list_results)
            .pop_front()
            .unwrap_or_else(|| Ok(ListSnapshot::default()))
    }

    async fn watch(&self, request: &WatchRequest) -> Result<NotificationStream<K>, StoreError> {
        lock(&self.watch_requests).push(request.clone());
        self.watch_opened.notify_waiters();

        let Some(session) = lock(&self.sessions).pop_front() else {
            return Ok(stream::pending().boxed());
        };
        if let Some(error) = session.refuse {
            return Err(error);
        }

        let items = stream::iter(session.items);
        if session.hold_open {
            Ok(items.chain(stream::pending()).boxed())
        } else {
            Ok(items.boxed())
        }
    }
}
