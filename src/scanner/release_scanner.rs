use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::metrics::RELEASE_EVENTS_PUBLISHED;
use crate::metrics::SCANNED_RELEASES;
use crate::metrics::SCAN_FAILURES;
use crate::utils::time::is_older_than;
use crate::utils::time::saturating_sub;
use crate::utils::time::timestamp_millis;
use crate::CacheEntry;
use crate::ConfigFileReleased;
use crate::EventBus;
use crate::Release;
use crate::ReleaseCache;
use crate::ReleaseStore;
use crate::Result;
use crate::ScannerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerPhase {
    Init,
    CatchUp,
    SteadyPoll,
}

impl fmt::Display for ScannerPhase {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ScannerPhase::Init => f.write_str("init"),
            ScannerPhase::CatchUp => f.write_str("catch_up"),
            ScannerPhase::SteadyPoll => f.write_str("steady_poll"),
        }
    }
}

/// Watermark-driven poller of the release table.
///
/// `INIT -> CATCH_UP -> STEADY_POLL*`. The catch-up pass only warms the
/// cache; steady scans publish live events. Every scan re-reads a
/// `safety_backlash` overlap, so processing a release must be idempotent:
/// an event is published only when the release moves the cached version
/// forward.
pub struct ReleaseScanner {
    store: Arc<dyn ReleaseStore>,
    cache: Arc<dyn ReleaseCache>,
    bus: Arc<EventBus>,
    config: ScannerConfig,
    last_scan_time: Mutex<SystemTime>,
    phase: Mutex<ScannerPhase>,
}

impl fmt::Debug for ReleaseScanner {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ReleaseScanner")
            .field("phase", &self.phase())
            .field("last_scan_time", &timestamp_millis(self.last_scan_time()))
            .finish_non_exhaustive()
    }
}

impl ReleaseScanner {
    pub fn new(
        store: Arc<dyn ReleaseStore>,
        cache: Arc<dyn ReleaseCache>,
        bus: Arc<EventBus>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            bus,
            config,
            last_scan_time: Mutex::new(SystemTime::UNIX_EPOCH),
            phase: Mutex::new(ScannerPhase::Init),
        }
    }

    pub fn phase(&self) -> ScannerPhase {
        *self.phase.lock()
    }

    /// Current watermark: the newest modify time processed so far.
    pub fn last_scan_time(&self) -> SystemTime {
        *self.last_scan_time.lock()
    }

    /// Startup pass over the last `catchup_window`.
    ///
    /// Warms the cache without publishing anything. The watermark starts at
    /// the beginning of the window, so a failed catch-up is covered by the
    /// first steady scans.
    pub async fn catch_up(&self) -> Result<()> {
        *self.phase.lock() = ScannerPhase::CatchUp;

        let since = saturating_sub(SystemTime::now(), self.config.catchup_window());
        {
            let mut watermark = self.last_scan_time.lock();
            if *watermark < since {
                *watermark = since;
            }
        }

        let result = self.scan(since, false).await;
        *self.phase.lock() = ScannerPhase::SteadyPoll;

        let loaded = result?;
        info!(
            loaded,
            since = timestamp_millis(since),
            "release catch-up scan completed"
        );
        Ok(())
    }

    /// One steady scan. Returns the number of events published.
    pub async fn scan_once(&self) -> Result<usize> {
        let since = saturating_sub(self.last_scan_time(), self.config.safety_backlash());
        self.scan(since, true).await
    }

    /// Spawns the steady polling loop; it exits when `shutdown` fires.
    pub fn start(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.scan_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // Errors are logged inside; the next tick retries the same window.
                        let _ = self.scan_once().await;
                    }
                    _ = shutdown.changed() => {
                        info!("release scanner received shutdown signal");
                        break;
                    }
                }
            }
            debug!("release scanner stopped");
        })
    }

    async fn scan(
        &self,
        since: SystemTime,
        live: bool,
    ) -> Result<usize> {
        let phase = if live { "steady" } else { "catch_up" };

        let releases = match self.store.find_releases_modified_after(since).await {
            Ok(releases) => releases,
            Err(e) => {
                SCAN_FAILURES.inc();
                warn!(
                    phase,
                    since = timestamp_millis(since),
                    "release scan failed, retrying next tick: {:?}",
                    e
                );
                return Err(e);
            }
        };
        if releases.is_empty() {
            trace!(phase, since = timestamp_millis(since), "no releases modified");
            return Ok(0);
        }
        SCANNED_RELEASES.with_label_values(&[phase]).inc_by(releases.len() as u64);

        let newest = releases.iter().map(|r| r.modify_time).max();
        let now = SystemTime::now();
        let mut published = 0;
        for release in releases {
            match self.process_release(release, live, now).await {
                Ok(true) => published += 1,
                Ok(false) => {}
                Err(e) => {
                    // Keep the watermark so the whole window is read again.
                    SCAN_FAILURES.inc();
                    warn!(
                        phase,
                        since = timestamp_millis(since),
                        "release processing failed, retrying next tick: {:?}",
                        e
                    );
                    return Err(e);
                }
            }
        }

        if let Some(newest) = newest {
            let mut watermark = self.last_scan_time.lock();
            if newest > *watermark {
                *watermark = newest;
            }
        }

        debug!(phase, published, "release scan completed");
        Ok(published)
    }

    /// Applies one scanned release to the cache. Returns true when an event
    /// was published.
    async fn process_release(
        &self,
        release: Release,
        live: bool,
        now: SystemTime,
    ) -> Result<bool> {
        let key = &release.key;
        let kind = release.kind;

        let entry = self.cache.get(key, kind);
        let changed = match &entry {
            None => true,
            // filled by a reader before we saw it: still unannounced
            Some(CacheEntry::Active {
                release: cached,
                verified: false,
            }) => release.version >= cached.version,
            Some(entry) => release.version > entry.version(),
        };
        if !changed {
            trace!(key = %key, %kind, version = release.version, "release already applied");
            return Ok(false);
        }

        let event_release = if release.deleted {
            if is_older_than(release.modify_time, now, self.config.tombstone_expiry()) {
                // Too old to announce, but the cache must not keep serving
                // the release it deletes.
                if matches!(entry, Some(CacheEntry::Active { .. })) {
                    self.cache.evict(key, kind, release.version);
                    debug!(
                        key = %key,
                        %kind,
                        version = release.version,
                        "late tombstone evicted without live event"
                    );
                } else {
                    trace!(key = %key, %kind, version = release.version, "stale tombstone ignored");
                }
                return Ok(false);
            }
            self.cache.evict(key, kind, release.version);
            Arc::new(release.clone())
        } else {
            match self.cache.reload(key, kind).await? {
                Some(current) => current,
                None => {
                    // Deleted since the scan read it; the tombstone row follows.
                    debug!(key = %key, %kind, version = release.version, "release vanished before reload");
                    return Ok(false);
                }
            }
        };

        if !live {
            return Ok(false);
        }
        if is_older_than(release.modify_time, now, self.config.event_grace()) {
            debug!(
                key = %key,
                %kind,
                version = event_release.version,
                "release applied without live event: older than grace period"
            );
            return Ok(false);
        }

        debug!(
            key = %key,
            %kind,
            version = event_release.version,
            deleted = event_release.deleted,
            "publishing release event"
        );
        self.bus.publish(&ConfigFileReleased::new(event_release));
        RELEASE_EVENTS_PUBLISHED.inc();
        Ok(true)
    }
}
