use std::time::Duration;

use conf_notify::FetchRequest;
use conf_notify::GrayRule;
use conf_notify::ReleaseKind;
use conf_notify::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::commons::fast_config;
use crate::commons::file;
use crate::commons::labels;
use crate::commons::watch_request;
use crate::commons::Harness;

#[tokio::test]
async fn test_gray_release_only_wakes_matching_clients() {
    let harness = Harness::start(fast_config()).await;
    let notifier = harness.notifier.clone();
    let normal = harness.store.publish(&file("f1"), "a=1", ReleaseKind::Normal, vec![]);
    let version = normal.version;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let canary = tokio::spawn({
        let notifier = notifier.clone();
        async move {
            let request = watch_request("canary", "f1", version)
                .with_labels(labels(&[("env", "canary")]));
            notifier
                .open_long_poll(request, Some(Duration::from_millis(800)), CancellationToken::new())
                .await
        }
    });
    let stable = tokio::spawn({
        let notifier = notifier.clone();
        async move {
            let request = watch_request("stable", "f1", version)
                .with_labels(labels(&[("env", "prod")]));
            notifier
                .open_long_poll(request, Some(Duration::from_millis(800)), CancellationToken::new())
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(notifier.registry().watcher_count(&file("f1")), 2);

    let gray = harness.store.publish(
        &file("f1"),
        "a=2",
        ReleaseKind::Gray,
        vec![GrayRule::new("env", "canary")],
    );

    let canary = canary.await.unwrap();
    assert_eq!(canary.status, StatusCode::ContentChanged);
    assert_eq!(canary.version, gray.version);
    assert_eq!(canary.digest, gray.digest);

    let stable = stable.await.unwrap();
    assert_eq!(stable.status, StatusCode::NotModified);

    // Fetches resolve to the release each client is entitled to.
    let mut fetch = FetchRequest::new("canary", file("f1"));
    fetch.labels = labels(&[("env", "canary")]);
    let fetched = notifier.get_config_file(&fetch).await.unwrap();
    assert_eq!(fetched.version, gray.version);

    let fetched = notifier
        .get_config_file(&FetchRequest::new("stable", file("f1")))
        .await
        .unwrap();
    assert_eq!(fetched.version, normal.version);
    harness.shutdown();
}
