use std::any::Any;
use std::sync::Arc;

use crate::Release;
use crate::WatchKey;

/// Marker for types that can travel on the [`EventBus`](super::EventBus).
pub trait Event: Any + Send + Sync + 'static {
    /// Name used in logs and metrics.
    const NAME: &'static str;
}

/// A genuine state transition of one release, found by a live scan.
#[derive(Debug, Clone)]
pub struct ConfigFileReleased {
    pub watch_key: WatchKey,
    pub release: Arc<Release>,
}

impl ConfigFileReleased {
    pub fn new(release: Arc<Release>) -> Self {
        Self {
            watch_key: release.key.watch_key(),
            release,
        }
    }
}

impl Event for ConfigFileReleased {
    const NAME: &'static str = "config_file_released";
}
