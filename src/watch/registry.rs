use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::Hash;
use std::hash::Hasher;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::bounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use crossbeam_channel::TrySendError;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::event_bus::SubscriptionId;
use crate::metrics::CALLBACK_PANICS;
use crate::metrics::DISPATCH_DROPPED_EVENTS;
use crate::metrics::NOTIFICATIONS_DELIVERED;
use crate::utils::panic_message;
use crate::ClientLabels;
use crate::ConfigFileReleased;
use crate::Error;
use crate::EventBus;
use crate::ReleaseCache;
use crate::ReleaseKind;
use crate::ResourceKey;
use crate::Result;
use crate::WatchConfig;
use crate::WatchKey;
use crate::WatchResponse;
use crate::WatchedFile;

/// Invoked on a dispatch thread with `(client_id, response)`.
///
/// Must not block: it runs while other files routed to the same worker wait.
pub type DeliveryCallback = Arc<dyn Fn(&str, WatchResponse) + Send + Sync>;

struct Watcher {
    /// Session that registered this watcher
    session_id: u64,
    last_known_version: u64,
    labels: Arc<ClientLabels>,
    callback: DeliveryCallback,
}

struct WatchRegistryInner {
    /// watch key -> client id -> watcher
    watchers: DashMap<WatchKey, HashMap<String, Watcher>>,

    /// Worker threads (empty when not running)
    workers: Mutex<Vec<JoinHandle<()>>>,

    /// Dropping it disconnects every worker's shutdown arm
    shutdown_tx: Mutex<Option<Sender<()>>>,

    /// Active gray releases, consulted before fanning out a normal release
    release_cache: Option<Arc<dyn ReleaseCache>>,

    config: WatchConfig,
}

/// Registry of watchers keyed by file, with a pool of dispatch workers.
///
/// All methods are safe to call concurrently. Watchers of distinct files
/// live on distinct map shards, so registrations for different files do not
/// serialize on one lock.
pub struct WatchRegistry {
    inner: Arc<WatchRegistryInner>,
    queues: Vec<Sender<ConfigFileReleased>>,
    receivers: Vec<Receiver<ConfigFileReleased>>,
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("watched_keys", &self.inner.watchers.len())
            .field("workers", &self.queues.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl WatchRegistry {
    pub fn new(config: WatchConfig) -> Self {
        let workers = config.dispatch_workers.max(1);
        let capacity = config.per_worker_queue_size();
        let (queues, receivers): (Vec<_>, Vec<_>) = (0..workers)
            .map(|_| bounded::<ConfigFileReleased>(capacity))
            .unzip();

        Self {
            inner: Arc::new(WatchRegistryInner {
                watchers: DashMap::new(),
                workers: Mutex::new(Vec::new()),
                shutdown_tx: Mutex::new(None),
                release_cache: None,
                config,
            }),
            queues,
            receivers,
        }
    }

    /// Lets dispatch skip normal releases for watchers that an active gray
    /// release still applies to: their refetch would resolve to the gray
    /// release again.
    ///
    /// Must be called before [`Self::start`].
    pub fn with_release_cache(
        mut self,
        cache: Arc<dyn ReleaseCache>,
    ) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.release_cache = Some(cache),
            None => warn!("release cache attached after dispatch started, ignored"),
        }
        self
    }

    /// Spawns the dispatch workers. No-op when already running.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.inner.workers.lock();
        if !workers.is_empty() {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        for (index, receiver) in self.receivers.iter().enumerate() {
            let inner = self.inner.clone();
            let receiver = receiver.clone();
            let shutdown_rx = shutdown_rx.clone();

            let handle = std::thread::Builder::new()
                .name(format!("watch-dispatch-{index}"))
                .spawn(move || {
                    debug!(worker = index, "watch dispatch worker started");
                    loop {
                        crossbeam_channel::select! {
                            recv(receiver) -> event => {
                                match event {
                                    Ok(event) => Self::dispatch(&inner, event),
                                    Err(_) => {
                                        warn!(worker = index, "dispatch queue closed unexpectedly");
                                        break;
                                    }
                                }
                            }
                            recv(shutdown_rx) -> _ => {
                                debug!(worker = index, "watch dispatch worker received shutdown signal");
                                break;
                            }
                        }
                    }
                    debug!(worker = index, "watch dispatch worker stopped");
                })
                .map_err(|e| Error::Fatal(format!("failed to spawn dispatch worker {index}: {e}")))?;
            workers.push(handle);
        }

        *self.inner.shutdown_tx.lock() = Some(shutdown_tx);
        Ok(())
    }

    /// Signals every worker and waits for them to exit.
    ///
    /// Events still queued are discarded.
    pub fn stop(&self) {
        drop(self.inner.shutdown_tx.lock().take());

        let workers = std::mem::take(&mut *self.inner.workers.lock());
        for handle in workers {
            if handle.join().is_err() {
                error!("watch dispatch worker exited with a panic");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.inner.workers.lock().is_empty()
    }

    /// Forwards every [`ConfigFileReleased`] published on `bus` into the
    /// dispatch queues.
    pub fn attach(
        self: &Arc<Self>,
        bus: &EventBus,
    ) -> SubscriptionId {
        let registry = Arc::clone(self);
        bus.subscribe(move |event: &ConfigFileReleased| {
            registry.enqueue(event.clone());
        })
    }

    /// Creates or replaces the watcher of `client_id` for each file.
    ///
    /// Re-watching a file only updates the recorded version, labels,
    /// session and callback; it never duplicates the entry.
    pub fn subscribe(
        &self,
        client_id: &str,
        session_id: u64,
        files: &[WatchedFile],
        labels: &ClientLabels,
        callback: DeliveryCallback,
    ) {
        let labels = Arc::new(labels.clone());
        for file in files {
            let watcher = Watcher {
                session_id,
                last_known_version: file.version,
                labels: labels.clone(),
                callback: callback.clone(),
            };
            self.inner
                .watchers
                .entry(file.key.watch_key())
                .or_default()
                .insert(client_id.to_string(), watcher);

            trace!(client_id, key = %file.key, version = file.version, "watcher registered");
        }
    }

    /// Removes the watchers of `client_id` for the given files.
    pub fn unsubscribe(
        &self,
        client_id: &str,
        keys: &[ResourceKey],
    ) {
        for key in keys {
            // Atomically drop the file entry once its last watcher is gone.
            self.inner.watchers.remove_if_mut(&key.watch_key(), |_, watchers| {
                watchers.remove(client_id);
                watchers.is_empty()
            });
            trace!(client_id, key = %key, "watcher unregistered");
        }
    }

    /// Like [`unsubscribe`](Self::unsubscribe), but keeps watchers that a
    /// newer session of the same client has registered since.
    pub fn unsubscribe_session(
        &self,
        client_id: &str,
        session_id: u64,
        keys: &[ResourceKey],
    ) {
        for key in keys {
            self.inner.watchers.remove_if_mut(&key.watch_key(), |_, watchers| {
                if watchers.get(client_id).is_some_and(|w| w.session_id == session_id) {
                    watchers.remove(client_id);
                }
                watchers.is_empty()
            });
        }
        trace!(client_id, session_id, keys = keys.len(), "session watchers unregistered");
    }

    /// Queues an event for fan-out without blocking.
    ///
    /// Returns false when the event was dropped because its worker queue is
    /// full.
    pub fn enqueue(
        &self,
        event: ConfigFileReleased,
    ) -> bool {
        let worker = self.worker_index(&event.watch_key);
        match self.queues[worker].try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                DISPATCH_DROPPED_EVENTS.inc();
                warn!(
                    worker,
                    key = %event.release.key,
                    version = event.release.version,
                    "dispatch queue full, release event dropped"
                );
                false
            }
            Err(TrySendError::Disconnected(event)) => {
                warn!(
                    worker,
                    key = %event.release.key,
                    "dispatch queue disconnected, release event dropped"
                );
                false
            }
        }
    }

    /// Worker that owns all events of `key`.
    pub(crate) fn worker_index(
        &self,
        key: &WatchKey,
    ) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.queues.len() as u64) as usize
    }

    /// Number of clients watching `key`.
    pub fn watcher_count(
        &self,
        key: &ResourceKey,
    ) -> usize {
        self.inner.watchers.get(&key.watch_key()).map(|w| w.len()).unwrap_or(0)
    }

    /// Number of files with at least one watcher.
    pub fn watched_key_count(&self) -> usize {
        self.inner.watchers.len()
    }

    /// Number of files `client_id` is watching. Walks every shard.
    pub fn client_watch_count(
        &self,
        client_id: &str,
    ) -> usize {
        self.inner
            .watchers
            .iter()
            .filter(|entry| entry.value().contains_key(client_id))
            .count()
    }

    fn dispatch(
        inner: &WatchRegistryInner,
        event: ConfigFileReleased,
    ) {
        let release = &event.release;

        let shadowing_gray = match (release.kind, &inner.release_cache) {
            (ReleaseKind::Normal, Some(cache)) => cache
                .get(&release.key, ReleaseKind::Gray)
                .and_then(|entry| entry.release().cloned()),
            _ => None,
        };

        // Callbacks tear sessions down, which unsubscribes; never run them
        // under the shard lock.
        let targets: Vec<(String, DeliveryCallback)> = match inner.watchers.get(&event.watch_key) {
            Some(watchers) => watchers
                .iter()
                .filter(|(_, w)| w.last_known_version < release.version)
                .filter(|(_, w)| release.matches_labels(&w.labels))
                .filter(|(_, w)| {
                    !shadowing_gray
                        .as_ref()
                        .is_some_and(|gray| gray.matches_labels(&w.labels))
                })
                .map(|(client_id, w)| (client_id.clone(), w.callback.clone()))
                .collect(),
            None => {
                trace!(key = %release.key, version = release.version, "no watchers for release");
                return;
            }
        };
        if targets.is_empty() {
            trace!(key = %release.key, version = release.version, "all watchers up to date");
            return;
        }

        let response = WatchResponse::for_release(release);
        for (client_id, callback) in &targets {
            let delivered = catch_unwind(AssertUnwindSafe(|| callback(client_id.as_str(), response.clone())));
            match delivered {
                Ok(()) => NOTIFICATIONS_DELIVERED.inc(),
                Err(payload) => {
                    CALLBACK_PANICS.with_label_values(&["watch_dispatch"]).inc();
                    error!(
                        client_id = %client_id,
                        key = %release.key,
                        version = release.version,
                        panic = %panic_message(payload.as_ref()),
                        "delivery callback panicked"
                    );
                }
            }
        }

        trace!(
            key = %release.key,
            version = release.version,
            kind = %release.kind,
            notified = targets.len(),
            "release event dispatched"
        );
    }
}
