//! Unit tests for the reconciliation loop, driven through `ResourceWatcher`

#[cfg(test)]
mod tests {
    use crate::backoff::ReconnectBackoff;
    use crate::error::{HandlerError, StoreError, WatchError};
    use crate::mock::{MockStore, ScriptedSession};
    use crate::notification::{ChangeNotification, StoreStatus};
    use crate::retry::RetryPolicy;
    use crate::scope::{ResumeTokenMatch, WatchScope};
    use crate::store::ListSnapshot;
    use crate::test_utils::*;
    use crate::watcher::ResourceWatcher;
    use k8s_openapi::api::core::v1::ConfigMap;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    fn watcher(store: &MockStore<ConfigMap>) -> ResourceWatcher<MockStore<ConfigMap>> {
        ResourceWatcher::new(store.clone())
            .with_retry(RetryPolicy::none())
            .with_backoff(ReconnectBackoff::immediate())
    }

    fn spawn_watch(
        watcher: ResourceWatcher<MockStore<ConfigMap>>,
        scope: WatchScope,
        cancel: &CancellationToken,
    ) -> (JoinHandle<Result<(), WatchError>>, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (handler, seen) = recording_handler();
        let cancel = cancel.clone();
        let task = tokio::spawn(async move { watcher.watch(scope, handler, cancel).await });
        (task, seen)
    }

    fn transport_error() -> StoreError {
        StoreError::Transport("connection reset by peer".to_string())
    }

    fn status(code: u16, reason: &str) -> Result<ChangeNotification<ConfigMap>, StoreError> {
        Ok(ChangeNotification::Error(StoreStatus {
            code,
            reason: reason.to_string(),
            message: "reported in stream".to_string(),
        }))
    }

    fn expired() -> StoreError {
        StoreError::Expired {
            message: "too old resource version: 100 (250)".to_string(),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_resumes_from_last_processed_token() {
        let store = MockStore::new();
        store.push_session(ScriptedSession::closing(vec![
            modified("a", "101"),
            modified("a", "102"),
            Err(transport_error()),
        ]));
        store.push_session(ScriptedSession::holding(vec![added("b", "103")]));

        let cancel = CancellationToken::new();
        let scope = WatchScope::all().from_token("100");
        let (task, mut seen) = spawn_watch(watcher(&store), scope, &cancel);

        assert_eq!(
            collect(&mut seen, 3).await,
            vec!["MODIFIED a@101", "MODIFIED a@102", "ADDED b@103"]
        );
        assert_eq!(store.watch_tokens(), vec!["100", "102"]);

        let probes = store.list_requests();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].resume_token.as_deref(), Some("100"));
        assert_eq!(probes[0].limit, Some(1));

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_expiry_while_streaming_forces_full_resync() {
        let store = MockStore::new();
        store.push_session(ScriptedSession::closing(vec![modified("a", "101"), Err(expired())]));
        store.push_session(ScriptedSession::holding(vec![added("a", "250"), added("b", "251")]));

        let cancel = CancellationToken::new();
        let scope = WatchScope::all().from_token("100");
        let (task, mut seen) = spawn_watch(watcher(&store), scope, &cancel);

        assert_eq!(
            collect(&mut seen, 3).await,
            vec!["MODIFIED a@101", "ADDED a@250", "ADDED b@251"]
        );
        assert_eq!(store.watch_tokens(), vec!["100", ""]);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_expired_starting_token_is_reported() {
        let store = MockStore::new();
        store.push_list_result(Err(expired()));

        let cancel = CancellationToken::new();
        let scope = WatchScope::all().from_token("5");
        let (task, _seen) = spawn_watch(watcher(&store), scope, &cancel);

        let result = task.await.unwrap();
        assert!(matches!(result, Err(WatchError::Expired { ref token }) if token == "5"));
        assert!(store.watch_requests().is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_other_than_expiry_is_ignored() {
        let store = MockStore::new();
        store.push_list_result(Err(StoreError::Api {
            code: 503,
            reason: "ServiceUnavailable".to_string(),
            message: "apiserver is shutting down".to_string(),
        }));

        let cancel = CancellationToken::new();
        let scope = WatchScope::all().from_token("100");
        let (task, _seen) = spawn_watch(watcher(&store), scope, &cancel);

        store.wait_for_watches(1).await;
        assert_eq!(store.watch_tokens(), vec!["100"]);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_no_starting_token_skips_validation() {
        let store = MockStore::new();
        store.push_session(ScriptedSession::holding(vec![added("a", "7")]));

        let cancel = CancellationToken::new();
        let (task, mut seen) = spawn_watch(watcher(&store), WatchScope::all(), &cancel);

        assert_eq!(collect(&mut seen, 1).await, vec!["ADDED a@7"]);
        assert!(store.list_requests().is_empty());
        assert_eq!(store.watch_tokens(), vec![""]);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_closed_stream_reopens_from_bookmark() {
        let store = MockStore::new();
        store.push_session(ScriptedSession::closing(vec![
            added("a", "101"),
            Ok(ChangeNotification::Bookmark {
                resume_token: "180".to_string(),
            }),
        ]));

        let cancel = CancellationToken::new();
        let (task, mut seen) = spawn_watch(watcher(&store), WatchScope::all(), &cancel);

        store.wait_for_watches(2).await;
        assert_eq!(store.watch_tokens(), vec!["", "180"]);
        // Bookmarks never reach the handler
        assert_eq!(collect(&mut seen, 1).await, vec!["ADDED a@101"]);
        assert!(seen.try_recv().is_err());

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_refused_watch_is_retried_with_same_token() {
        let store = MockStore::new();
        store.push_session(ScriptedSession::refused(transport_error()));
        store.push_session(ScriptedSession::refused(StoreError::Api {
            code: 410,
            reason: "Gone".to_string(),
            message: "watch cache is reinitializing".to_string(),
        }));

        let cancel = CancellationToken::new();
        let scope = WatchScope::all().from_token("100");
        let (task, _seen) = spawn_watch(watcher(&store), scope, &cancel);

        store.wait_for_watches(3).await;
        // 410 without the Expired reason is transient, not a resync
        assert_eq!(store.watch_tokens(), vec!["100", "100", "100"]);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_protocol_violation_terminates_after_prior_events() {
        let store = MockStore::new();
        store.push_session(ScriptedSession::closing(vec![
            added("a", "101"),
            Err(StoreError::Decode("unknown variant `RESIZED`".to_string())),
            added("b", "102"),
        ]));

        let cancel = CancellationToken::new();
        let (task, mut seen) = spawn_watch(watcher(&store), WatchScope::all(), &cancel);

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(WatchError::ProtocolViolation(ref detail)) if detail.contains("RESIZED")
        ));
        assert_eq!(collect(&mut seen, 1).await, vec!["ADDED a@101"]);
        assert_eq!(store.watch_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_terminates_watch() {
        let store = MockStore::new();
        store.push_session(ScriptedSession::holding(vec![added("a", "101")]));

        let handler =
            |_: ChangeNotification<ConfigMap>| async { Err::<(), HandlerError>("rejected".into()) };
        let result = watcher(&store)
            .watch(WatchScope::all(), handler, CancellationToken::new())
            .await;

        assert!(matches!(result, Err(WatchError::Handler(_))));
    }

    #[tokio::test]
    async fn test_cancellation_is_not_an_error() {
        let store = MockStore::new();
        let cancel = CancellationToken::new();
        let scope = WatchScope::namespaced("default");
        let (task, _seen) = spawn_watch(watcher(&store), scope, &cancel);

        store.wait_for_watches(1).await;
        cancel.cancel();

        assert!(task.await.unwrap().is_ok());
        assert_eq!(store.watch_requests()[0].namespace.as_deref(), Some("default"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unproductive_sessions_back_off() {
        let store = MockStore::new();
        for _ in 0..3 {
            store.push_session(ScriptedSession::refused(transport_error()));
        }
        let watcher = watcher(&store).with_backoff(ReconnectBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
        ));

        let started = Instant::now();
        let cancel = CancellationToken::new();
        let (task, _seen) = spawn_watch(watcher, WatchScope::all(), &cancel);

        store.wait_for_watches(4).await;
        // Immediate, then 1s, then 2s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let store = MockStore::new();
        store.push_session(ScriptedSession::refused(transport_error()));
        store.push_session(ScriptedSession::refused(transport_error()));
        let watcher = watcher(&store).with_backoff(ReconnectBackoff::new(
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));

        let cancel = CancellationToken::new();
        let (task, _seen) = spawn_watch(watcher, WatchScope::all(), &cancel);

        store.wait_for_watches(2).await;
        cancel.cancel();

        assert!(task.await.unwrap().is_ok());
        assert_eq!(store.watch_requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_retries_transient_failures() {
        let store = MockStore::new();
        store.push_list_result(Err(transport_error()));
        store.push_list_result(Err(transport_error()));
        store.push_list_result(Ok(ListSnapshot {
            resume_token: Some("120".to_string()),
            items: 1,
        }));
        let watcher = watcher(&store).with_retry(RetryPolicy::new(
            3,
            Duration::from_millis(100),
            Duration::from_secs(1),
        ));

        let cancel = CancellationToken::new();
        let (task, _seen) = spawn_watch(watcher, WatchScope::all().from_token("100"), &cancel);

        store.wait_for_watches(1).await;
        assert_eq!(store.list_requests().len(), 3);
        // The probe never moves the resume token
        assert_eq!(store.watch_tokens(), vec!["100"]);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_immediate_expiry_resyncs_from_current_state() {
        let store = MockStore::new();
        store.push_session(ScriptedSession::refused(expired()));
        store.push_session(ScriptedSession::holding(vec![added("a", "250")]));

        let cancel = CancellationToken::new();
        let scope = WatchScope::all().from_token("100");
        let (task, mut seen) = spawn_watch(watcher(&store), scope, &cancel);

        assert_eq!(collect(&mut seen, 1).await, vec!["ADDED a@250"]);
        assert_eq!(store.watch_tokens(), vec!["100", ""]);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_expired_status_notification_forces_resync() {
        let store = MockStore::new();
        store.push_session(ScriptedSession::holding(vec![
            modified("a", "101"),
            status(410, "Expired"),
        ]));
        store.push_session(ScriptedSession::holding(vec![added("a", "250")]));

        let cancel = CancellationToken::new();
        let scope = WatchScope::all().from_token("100");
        let (task, mut seen) = spawn_watch(watcher(&store), scope, &cancel);

        assert_eq!(
            collect(&mut seen, 2).await,
            vec!["MODIFIED a@101", "ADDED a@250"]
        );
        assert_eq!(store.watch_tokens(), vec!["100", ""]);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_only_sessions_back_off() {
        let store = MockStore::new();
        for _ in 0..3 {
            store.push_session(ScriptedSession::closing(vec![status(500, "InternalError")]));
        }
        let watcher = watcher(&store).with_backoff(ReconnectBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
        ));

        let started = Instant::now();
        let cancel = CancellationToken::new();
        let scope = WatchScope::all().from_token("100");
        let (task, _seen) = spawn_watch(watcher, scope, &cancel);

        store.wait_for_watches(4).await;
        // Immediate, then 1s, then 2s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
        assert_eq!(store.watch_tokens(), vec!["100", "100", "100", "100"]);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_slow_handler() {
        let store = MockStore::new();
        store.push_session(ScriptedSession::holding(vec![added("a", "101")]));

        let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
        let handler = move |_: ChangeNotification<ConfigMap>| {
            let started_tx = started_tx.clone();
            async move {
                let _ = started_tx.send(());
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<(), HandlerError>(())
            }
        };

        let cancel = CancellationToken::new();
        let began = Instant::now();
        let task = tokio::spawn({
            let (watcher, cancel) = (watcher(&store), cancel.clone());
            async move { watcher.watch(WatchScope::all(), handler, cancel).await }
        });

        started_rx.recv().await.unwrap();
        cancel.cancel();

        assert!(task.await.unwrap().is_ok());
        assert!(began.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_match_mode_reaches_watch_request() {
        let store = MockStore::new();
        let cancel = CancellationToken::new();
        let scope = WatchScope::all()
            .from_token("100")
            .matching(ResumeTokenMatch::NotOlderThan);
        let (task, _seen) = spawn_watch(watcher(&store), scope, &cancel);

        store.wait_for_watches(1).await;
        let requests = store.watch_requests();
        assert_eq!(requests[0].resume_token_match, Some(ResumeTokenMatch::NotOlderThan));
        let probes = store.list_requests();
        assert_eq!(probes[0].resume_token_match, Some(ResumeTokenMatch::NotOlderThan));

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }
}
