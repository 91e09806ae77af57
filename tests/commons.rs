use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

use conf_notify::content_digest;
use conf_notify::ClientLabels;
use conf_notify::MemReleaseStore;
use conf_notify::Notifier;
use conf_notify::NotifierBuilder;
use conf_notify::NotifyConfig;
use conf_notify::Release;
use conf_notify::ReleaseKind;
use conf_notify::ResourceKey;
use conf_notify::WatchRequest;
use conf_notify::WatchedFile;
use tokio::sync::watch;

pub const NAMESPACE: &str = "ns1";
pub const GROUP: &str = "g1";

/// Short timers so scans and sweeps happen many times per test.
pub fn fast_config() -> NotifyConfig {
    let mut config = NotifyConfig::default();
    config.scanner.scan_interval_ms = 50;
    config.scanner.safety_backlash_ms = 1000;
    config.scanner.event_grace_ms = 2000;
    config.scanner.tombstone_expiry_ms = 2000;
    config.watch.dispatch_workers = 2;
    config.watch.event_queue_size = 1024;
    config.session.long_poll_timeout_ms = 2000;
    config.session.sweep_interval_ms = 20;
    config
}

pub fn file(name: &str) -> ResourceKey {
    ResourceKey::new(NAMESPACE, GROUP, name)
}

pub fn watch_request(
    client_id: &str,
    name: &str,
    version: u64,
) -> WatchRequest {
    WatchRequest::new(client_id, vec![WatchedFile::new(file(name), version)])
}

pub fn labels(pairs: &[(&str, &str)]) -> ClientLabels {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// A tombstone row whose deletion happened `age` ago.
pub fn old_tombstone(
    name: &str,
    version: u64,
    age: Duration,
) -> Release {
    Release {
        key: file(name),
        version,
        content: "".into(),
        digest: content_digest(b""),
        modify_time: SystemTime::now() - age,
        deleted: true,
        kind: ReleaseKind::Normal,
        gray_rules: vec![],
    }
}

pub struct Harness {
    pub notifier: Arc<Notifier>,
    pub store: Arc<MemReleaseStore>,
    shutdown_tx: watch::Sender<()>,
}

impl Harness {
    pub async fn start(config: NotifyConfig) -> Self {
        Self::start_with_store(config, Arc::new(MemReleaseStore::new())).await
    }

    pub async fn start_with_store(
        config: NotifyConfig,
        store: Arc<MemReleaseStore>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let notifier = NotifierBuilder::init(config, shutdown_rx)
            .release_store(store.clone())
            .start()
            .await
            .expect("notifier starts");
        Self {
            notifier,
            store,
            shutdown_tx,
        }
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        self.notifier.stop();
    }
}
