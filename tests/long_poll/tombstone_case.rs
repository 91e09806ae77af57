use std::sync::Arc;
use std::time::Duration;

use conf_notify::MemReleaseStore;
use conf_notify::ReleaseKind;
use conf_notify::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::commons::fast_config;
use crate::commons::file;
use crate::commons::old_tombstone;
use crate::commons::watch_request;
use crate::commons::Harness;

/// A tombstone older than the expiry window is never announced.
#[tokio::test]
async fn test_expired_tombstone_is_not_announced() {
    let store = Arc::new(MemReleaseStore::new());
    store.publish(&file("f1"), "a=1", ReleaseKind::Normal, vec![]);
    let harness = Harness::start_with_store(fast_config(), store).await;
    let notifier = harness.notifier.clone();

    let poll = tokio::spawn({
        let notifier = notifier.clone();
        async move {
            notifier
                .open_long_poll(
                    watch_request("c1", "f1", 1),
                    Some(Duration::from_millis(600)),
                    CancellationToken::new(),
                )
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    harness
        .store
        .upsert_row(old_tombstone("f1", 2, Duration::from_secs(10)));

    let response = poll.await.unwrap();
    assert_eq!(response.status, StatusCode::NotModified);

    // Not announced, yet the deleted release is no longer served.
    let again = notifier
        .quick_check(&watch_request("c1", "f1", 1))
        .await
        .expect("answered immediately");
    assert_eq!(again.status, StatusCode::NotFound);
    assert_eq!(again.version, 2);
    harness.shutdown();
}

/// A fresh deletion reaches watchers as not-found carrying the tombstone
/// version.
#[tokio::test]
async fn test_fresh_deletion_is_announced_as_not_found() {
    let store = Arc::new(MemReleaseStore::new());
    store.publish(&file("f1"), "a=1", ReleaseKind::Normal, vec![]);
    let harness = Harness::start_with_store(fast_config(), store).await;
    let notifier = harness.notifier.clone();

    let poll = tokio::spawn({
        let notifier = notifier.clone();
        async move {
            notifier
                .open_long_poll(watch_request("c1", "f1", 1), None, CancellationToken::new())
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let tombstone = harness.store.delete(&file("f1"), ReleaseKind::Normal).unwrap();

    let response = tokio::time::timeout(Duration::from_secs(1), poll)
        .await
        .expect("deletion wakes the watcher")
        .unwrap();
    assert_eq!(response.status, StatusCode::NotFound);
    assert_eq!(response.version, tombstone.version);

    // Clients that still report the deleted version are told it is gone.
    let again = notifier
        .quick_check(&watch_request("c1", "f1", 1))
        .await
        .expect("answered immediately");
    assert_eq!(again.status, StatusCode::NotFound);
    assert_eq!(again.version, tombstone.version);
    harness.shutdown();
}
