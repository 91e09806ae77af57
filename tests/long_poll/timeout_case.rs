use std::time::Duration;

use conf_notify::ReleaseKind;
use conf_notify::StatusCode;
use conf_notify::WatchResponse;
use tokio_util::sync::CancellationToken;

use crate::commons::fast_config;
use crate::commons::file;
use crate::commons::watch_request;
use crate::commons::Harness;

/// An idle long poll ends with not-modified at its deadline and leaves no
/// session or watcher behind.
#[tokio::test(start_paused = true)]
async fn test_idle_long_poll_times_out_and_cleans_up() {
    let mut config = fast_config();
    config.session.long_poll_timeout_ms = 30_000;
    let harness = Harness::start(config).await;
    harness.store.publish(&file("f1"), "a=1", ReleaseKind::Normal, vec![]);
    let notifier = harness.notifier.clone();

    let started = tokio::time::Instant::now();
    let response = notifier
        .open_long_poll(watch_request("c1", "f1", 1), None, CancellationToken::new())
        .await;

    assert_eq!(response, WatchResponse::not_modified());
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(notifier.sessions().session_count(), 0);
    assert_eq!(notifier.registry().watcher_count(&file("f1")), 0);
    assert_eq!(notifier.registry().client_watch_count("c1"), 0);
    harness.shutdown();
}

/// Caller-supplied deadlines are capped by the configured maximum.
#[tokio::test(start_paused = true)]
async fn test_requested_timeout_is_clamped() {
    let mut config = fast_config();
    config.session.max_long_poll_timeout_ms = 5_000;
    let harness = Harness::start(config).await;
    let notifier = harness.notifier.clone();

    let started = tokio::time::Instant::now();
    let response = notifier
        .open_long_poll(
            watch_request("c1", "f1", 0),
            Some(Duration::from_secs(600)),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(response.status, StatusCode::NotModified);
    assert!(started.elapsed() < Duration::from_secs(6));
    harness.shutdown();
}

/// A second long poll from the same client replaces the first one.
#[tokio::test]
async fn test_new_long_poll_replaces_previous_session() {
    let harness = Harness::start(fast_config()).await;
    let notifier = harness.notifier.clone();

    let first = tokio::spawn({
        let notifier = notifier.clone();
        async move {
            notifier
                .open_long_poll(watch_request("c1", "f1", 0), None, CancellationToken::new())
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = tokio::spawn({
        let notifier = notifier.clone();
        async move {
            notifier
                .open_long_poll(watch_request("c1", "f1", 0), None, CancellationToken::new())
                .await
        }
    });

    let first = tokio::time::timeout(Duration::from_secs(1), first)
        .await
        .expect("replaced session resolves immediately")
        .unwrap();
    assert_eq!(first.status, StatusCode::NotModified);
    assert!(notifier.sessions().contains("c1"));
    assert_eq!(notifier.registry().watcher_count(&file("f1")), 1);

    harness.store.publish(&file("f1"), "a=1", ReleaseKind::Normal, vec![]);
    let second = tokio::time::timeout(Duration::from_secs(1), second)
        .await
        .expect("new session still receives the change")
        .unwrap();
    assert_eq!(second.status, StatusCode::ContentChanged);
    harness.shutdown();
}
