use std::time::Duration;
use std::time::SystemTime;

use conf_notify::content_digest;
use conf_notify::Release;
use conf_notify::ReleaseKind;
use conf_notify::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use crate::commons::fast_config;
use crate::commons::file;
use crate::commons::watch_request;
use crate::commons::Harness;

/// A client that never saw `f1` is woken by its first publish.
#[tokio::test]
#[traced_test]
async fn test_publish_wakes_client_without_any_version() {
    let harness = Harness::start(fast_config()).await;
    let notifier = harness.notifier.clone();

    let poll = tokio::spawn({
        let notifier = notifier.clone();
        async move {
            notifier
                .open_long_poll(watch_request("c1", "f1", 0), None, CancellationToken::new())
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(notifier.sessions().contains("c1"));

    let published = harness.store.publish(&file("f1"), "a=1", ReleaseKind::Normal, vec![]);

    let response = tokio::time::timeout(Duration::from_secs(1), poll)
        .await
        .expect("woken well before the long-poll timeout")
        .unwrap();
    assert_eq!(response.status, StatusCode::ContentChanged);
    assert_eq!(response.version, published.version);
    assert_eq!(response.digest, published.digest);
    assert_eq!(response.resource_key(), file("f1"));

    assert_eq!(notifier.sessions().session_count(), 0);
    assert_eq!(notifier.registry().watcher_count(&file("f1")), 0);

    // Client refetches and comes back up to date.
    assert!(notifier.quick_check(&watch_request("c1", "f1", 1)).await.is_none());
    harness.shutdown();
}

/// Only the client that is behind the new version is notified.
#[tokio::test]
async fn test_version_gate_skips_clients_already_at_new_version() {
    let harness = Harness::start(fast_config()).await;
    let notifier = harness.notifier.clone();

    let content = "a=5";
    harness.store.upsert_row(Release {
        key: file("f1"),
        version: 5,
        content: content.into(),
        digest: content_digest(content.as_bytes()),
        modify_time: SystemTime::now(),
        deleted: false,
        kind: ReleaseKind::Normal,
        gray_rules: vec![],
    });
    // Wait for a steady scan to pick v5 up.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let behind = tokio::spawn({
        let notifier = notifier.clone();
        async move {
            notifier
                .open_long_poll(
                    watch_request("c5", "f1", 5),
                    Some(Duration::from_millis(800)),
                    CancellationToken::new(),
                )
                .await
        }
    });
    let ahead = tokio::spawn({
        let notifier = notifier.clone();
        async move {
            notifier
                .open_long_poll(
                    watch_request("c6", "f1", 6),
                    Some(Duration::from_millis(800)),
                    CancellationToken::new(),
                )
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(notifier.sessions().session_count(), 2);

    let published = harness.store.publish(&file("f1"), "a=6", ReleaseKind::Normal, vec![]);
    assert_eq!(published.version, 6);

    let behind = behind.await.unwrap();
    assert_eq!(behind.status, StatusCode::ContentChanged);
    assert_eq!(behind.version, 6);

    let ahead = ahead.await.unwrap();
    assert_eq!(ahead.status, StatusCode::NotModified);

    assert_eq!(notifier.sessions().session_count(), 0);
    assert_eq!(notifier.registry().watched_key_count(), 0);
    harness.shutdown();
}
