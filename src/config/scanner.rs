use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Error;
use crate::Result;

/// Timing of the release scanner.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScannerConfig {
    /// Period between two steady-state scans
    ///
    /// **Default**: 1000
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// How far back the startup catch-up scan reads
    ///
    /// Releases inside this window only warm the cache; they are never
    /// announced to watchers.
    ///
    /// **Default**: 600 (10 minutes)
    #[serde(default = "default_catchup_window_secs")]
    pub catchup_window_secs: u64,

    /// Overlap subtracted from the watermark before each steady scan
    ///
    /// Covers writes landing on the boundary between two scans. Overlapping
    /// rows are harmless because release processing is idempotent.
    ///
    /// **Default**: 10000
    #[serde(default = "default_safety_backlash_ms")]
    pub safety_backlash_ms: u64,

    /// Releases whose modify time is older than this are applied to the cache
    /// but not announced live
    ///
    /// Keeps a backlog burst from being replayed as live notifications.
    ///
    /// **Default**: 5000
    #[serde(default = "default_event_grace_ms")]
    pub event_grace_ms: u64,

    /// Tombstones older than this are ignored
    ///
    /// Stops an already-evicted deletion from being replayed on every scan.
    /// Must be larger than `scan_interval_ms`, otherwise a deletion can age
    /// out before any scan sees it.
    ///
    /// **Default**: 5000
    #[serde(default = "default_tombstone_expiry_ms")]
    pub tombstone_expiry_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval_ms(),
            catchup_window_secs: default_catchup_window_secs(),
            safety_backlash_ms: default_safety_backlash_ms(),
            event_grace_ms: default_event_grace_ms(),
            tombstone_expiry_ms: default_tombstone_expiry_ms(),
        }
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "scanner.scan_interval_ms must be greater than 0".into(),
            )));
        }

        if self.tombstone_expiry_ms <= self.scan_interval_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "scanner.tombstone_expiry_ms ({}) must be greater than scanner.scan_interval_ms ({})",
                self.tombstone_expiry_ms, self.scan_interval_ms
            ))));
        }

        if self.event_grace_ms <= self.scan_interval_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "scanner.event_grace_ms ({}) must be greater than scanner.scan_interval_ms ({})",
                self.event_grace_ms, self.scan_interval_ms
            ))));
        }

        if self.safety_backlash_ms < self.scan_interval_ms {
            warn!(
                "scanner.safety_backlash_ms ({}) is smaller than scanner.scan_interval_ms ({}). \
                 Writes landing between two scans may be missed.",
                self.safety_backlash_ms, self.scan_interval_ms
            );
        }

        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn catchup_window(&self) -> Duration {
        Duration::from_secs(self.catchup_window_secs)
    }

    pub fn safety_backlash(&self) -> Duration {
        Duration::from_millis(self.safety_backlash_ms)
    }

    pub fn event_grace(&self) -> Duration {
        Duration::from_millis(self.event_grace_ms)
    }

    pub fn tombstone_expiry(&self) -> Duration {
        Duration::from_millis(self.tombstone_expiry_ms)
    }
}

const fn default_scan_interval_ms() -> u64 {
    1000
}

const fn default_catchup_window_secs() -> u64 {
    600
}

const fn default_safety_backlash_ms() -> u64 {
    10_000
}

const fn default_event_grace_ms() -> u64 {
    5000
}

const fn default_tombstone_expiry_ms() -> u64 {
    5000
}
