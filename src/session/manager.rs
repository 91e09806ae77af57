use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::metrics::OPEN_SESSIONS;
use crate::metrics::SESSION_RESOLUTIONS;
use crate::ClientLabels;
use crate::DeliveryCallback;
use crate::ResourceKey;
use crate::SessionConfig;
use crate::WatchRegistry;
use crate::WatchResponse;
use crate::WatchedFile;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Notified,
    Timeout,
    Replaced,
    Cancelled,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Notified => "notified",
            Resolution::Timeout => "timeout",
            Resolution::Replaced => "replaced",
            Resolution::Cancelled => "cancelled",
        }
    }
}

/// Caller side of an open session.
#[derive(Debug)]
pub struct LongPollSession {
    pub client_id: String,
    pub session_id: u64,
    pub deadline: Instant,
    /// Yields the single response of this session. Closed without a value
    /// when the session is cancelled.
    pub receiver: oneshot::Receiver<WatchResponse>,
}

struct Session {
    id: u64,
    keys: Vec<ResourceKey>,
    deadline: Instant,
    responder: oneshot::Sender<WatchResponse>,
}

/// Open long-poll sessions, keyed by client id.
pub struct SessionManager {
    sessions: DashMap<String, Session>,
    registry: Arc<WatchRegistry>,
    config: SessionConfig,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        registry: Arc<WatchRegistry>,
        config: SessionConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            registry,
            config,
            next_id: AtomicU64::new(1),
        }
    }

    /// Opens a session for `client_id` and subscribes it to `files`.
    ///
    /// An open session of the same client is replaced and receives the
    /// not-modified response.
    pub fn open(
        self: &Arc<Self>,
        client_id: &str,
        files: &[WatchedFile],
        labels: &ClientLabels,
        timeout: Duration,
    ) -> LongPollSession {
        let session_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + timeout;
        let keys: Vec<ResourceKey> = files.iter().map(|f| f.key.clone()).collect();
        let (responder, receiver) = oneshot::channel();

        // Registered before subscribing so that an early notification finds it.
        OPEN_SESSIONS.inc();
        let previous = self.sessions.insert(
            client_id.to_string(),
            Session {
                id: session_id,
                keys: keys.clone(),
                deadline,
                responder,
            },
        );
        if let Some(previous) = previous {
            debug!(client_id, session_id = previous.id, "long-poll session replaced");
            self.finish(client_id, previous, Some(WatchResponse::not_modified()), Resolution::Replaced);
        }

        let manager = Arc::downgrade(self);
        self.registry
            .subscribe(client_id, session_id, files, labels, Self::delivery_callback(manager, session_id));

        // A concurrent open of the same client may have replaced us before
        // our watchers existed; its teardown could not remove them.
        if !self.sessions.get(client_id).is_some_and(|s| s.id == session_id) {
            self.registry.unsubscribe_session(client_id, session_id, &keys);
        }

        trace!(client_id, session_id, files = files.len(), ?timeout, "long-poll session opened");
        LongPollSession {
            client_id: client_id.to_string(),
            session_id,
            deadline,
            receiver,
        }
    }

    /// Resolves the session with a change notification.
    ///
    /// Returns false if the session is already gone.
    pub fn notify(
        &self,
        client_id: &str,
        session_id: u64,
        response: WatchResponse,
    ) -> bool {
        self.resolve(client_id, session_id, Some(response), Resolution::Notified)
    }

    /// Resolves the session with the not-modified response.
    pub fn expire(
        &self,
        client_id: &str,
        session_id: u64,
    ) -> bool {
        self.resolve(
            client_id,
            session_id,
            Some(WatchResponse::not_modified()),
            Resolution::Timeout,
        )
    }

    /// Tears the session down without delivering anything.
    pub fn cancel(
        &self,
        client_id: &str,
        session_id: u64,
    ) -> bool {
        self.resolve(client_id, session_id, None, Resolution::Cancelled)
    }

    /// Expires every session whose deadline has passed. Returns how many.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        // Collect first: resolving removes entries from the map being walked.
        let expired: Vec<(String, u64)> = self
            .sessions
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| (entry.key().clone(), entry.id))
            .collect();

        let resolved = expired
            .into_iter()
            .filter(|(client_id, session_id)| self.expire(client_id, *session_id))
            .count();
        if resolved > 0 {
            debug!(resolved, "expired long-poll sessions swept");
        }
        resolved
    }

    /// Spawns the periodic timeout sweep; it exits when `shutdown` fires.
    pub fn start_sweeper(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.sweep_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sweep_expired();
                    }
                    _ = shutdown.changed() => {
                        info!("session sweeper received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether `client_id` has an open session.
    pub fn contains(
        &self,
        client_id: &str,
    ) -> bool {
        self.sessions.contains_key(client_id)
    }

    fn delivery_callback(
        manager: Weak<SessionManager>,
        session_id: u64,
    ) -> DeliveryCallback {
        Arc::new(move |client_id: &str, response: WatchResponse| {
            if let Some(manager) = manager.upgrade() {
                manager.notify(client_id, session_id, response);
            }
        })
    }

    fn resolve(
        &self,
        client_id: &str,
        session_id: u64,
        response: Option<WatchResponse>,
        resolution: Resolution,
    ) -> bool {
        match self.sessions.remove_if(client_id, |_, s| s.id == session_id) {
            Some((_, session)) => {
                self.finish(client_id, session, response, resolution);
                true
            }
            None => {
                trace!(client_id, session_id, resolution = resolution.as_str(), "session already resolved");
                false
            }
        }
    }

    /// Runs after the session left the map; nothing else can reach it.
    fn finish(
        &self,
        client_id: &str,
        session: Session,
        response: Option<WatchResponse>,
        resolution: Resolution,
    ) {
        self.registry.unsubscribe_session(client_id, session.id, &session.keys);
        OPEN_SESSIONS.dec();
        SESSION_RESOLUTIONS.with_label_values(&[resolution.as_str()]).inc();

        if let Some(response) = response {
            // Never blocks; fails only when the caller stopped waiting.
            if session.responder.send(response).is_err() {
                debug!(client_id, session_id = session.id, "long-poll caller no longer waiting");
            }
        }
        trace!(
            client_id,
            session_id = session.id,
            resolution = resolution.as_str(),
            "long-poll session resolved"
        );
    }
}
