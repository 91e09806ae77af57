use std::time::Duration;
use std::time::SystemTime;

use bytes::Bytes;

use crate::content_digest;
use crate::ClientLabels;
use crate::GrayRule;
use crate::NotifyConfig;
use crate::Release;
use crate::ReleaseKind;
use crate::ResourceKey;

pub(crate) fn key(file_name: &str) -> ResourceKey {
    ResourceKey::new("ns1", "g1", file_name)
}

/// A fresh normal release.
pub(crate) fn release(
    namespace: &str,
    group: &str,
    file_name: &str,
    version: u64,
) -> Release {
    let content = Bytes::from(format!("{file_name}-v{version}"));
    Release {
        key: ResourceKey::new(namespace, group, file_name),
        version,
        digest: content_digest(&content),
        content,
        modify_time: SystemTime::now(),
        deleted: false,
        kind: ReleaseKind::Normal,
        gray_rules: vec![],
    }
}

pub(crate) fn gray_release(
    file_name: &str,
    version: u64,
    rules: &[(&str, &str)],
) -> Release {
    Release {
        kind: ReleaseKind::Gray,
        gray_rules: rules.iter().map(|(k, v)| GrayRule::new(*k, *v)).collect(),
        ..release("ns1", "g1", file_name, version)
    }
}

pub(crate) fn tombstone(
    file_name: &str,
    version: u64,
) -> Release {
    Release {
        deleted: true,
        ..release("ns1", "g1", file_name, version)
    }
}

/// Moves a release's modify time `by` into the past.
pub(crate) fn aged(
    mut release: Release,
    by: Duration,
) -> Release {
    release.modify_time = SystemTime::now() - by;
    release
}

pub(crate) fn labels(pairs: &[(&str, &str)]) -> ClientLabels {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Configuration with short timers for tests.
pub(crate) fn test_config() -> NotifyConfig {
    let mut config = NotifyConfig::default();
    config.scanner.scan_interval_ms = 50;
    config.scanner.safety_backlash_ms = 1000;
    config.scanner.event_grace_ms = 2000;
    config.scanner.tombstone_expiry_ms = 2000;
    config.watch.event_queue_size = 1024;
    config.watch.dispatch_workers = 2;
    config.session.long_poll_timeout_ms = 2000;
    config.session.sweep_interval_ms = 20;
    config
}
