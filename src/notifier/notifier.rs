use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::fetch_config_file;
use crate::ConfigFileResponse;
use crate::Error;
use crate::EventBus;
use crate::FetchRequest;
use crate::NotifyConfig;
use crate::ReleaseCache;
use crate::ReleaseScanner;
use crate::Result;
use crate::SessionManager;
use crate::WatchContext;
use crate::WatchRegistry;
use crate::WatchRequest;
use crate::WatchResponse;

/// The change-notification pipeline as seen by the RPC layer.
pub struct Notifier {
    config: NotifyConfig,
    cache: Arc<dyn ReleaseCache>,
    bus: Arc<EventBus>,
    scanner: Arc<ReleaseScanner>,
    registry: Arc<WatchRegistry>,
    sessions: Arc<SessionManager>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for Notifier {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("scanner", &self.scanner)
            .field("registry", &self.registry)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    pub(super) fn new(
        config: NotifyConfig,
        cache: Arc<dyn ReleaseCache>,
        bus: Arc<EventBus>,
        scanner: Arc<ReleaseScanner>,
        registry: Arc<WatchRegistry>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            config,
            cache,
            bus,
            scanner,
            registry,
            sessions,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Starts the dispatch workers, runs the catch-up scan, then spawns the
    /// steady scanner and the session sweeper.
    ///
    /// A failed catch-up is logged and left to the steady scans, whose
    /// watermark still starts at the beginning of the catch-up window.
    pub async fn start(
        &self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<()> {
        self.registry.start()?;

        if let Err(e) = self.scanner.catch_up().await {
            warn!("release catch-up scan failed, continuing with steady scans: {:?}", e);
        }

        let mut tasks = self.tasks.lock();
        tasks.push(self.scanner.clone().start(shutdown_signal.clone()));
        tasks.push(self.sessions.clone().start_sweeper(shutdown_signal));

        info!(
            dispatch_workers = self.config.watch.dispatch_workers,
            scan_interval_ms = self.config.scanner.scan_interval_ms,
            "notifier started"
        );
        Ok(())
    }

    /// Stops the dispatch workers and aborts background tasks that did not
    /// observe the shutdown signal yet.
    pub fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.registry.stop();
        info!("notifier stopped");
    }

    /// Immediate answer for a watch request, if one exists.
    ///
    /// Malformed requests get a bad-request response. Store failures are
    /// logged and reported as "no answer" so the caller falls back to the
    /// long poll.
    pub async fn quick_check(
        &self,
        request: &WatchRequest,
    ) -> Option<WatchResponse> {
        match WatchContext::from_request(request) {
            Ok(context) => self.check(&context).await,
            Err(e) => Some(WatchResponse::bad_request(e.to_string())),
        }
    }

    /// Quick check, then a long-poll session.
    ///
    /// Resolves with exactly one response: a change, the not-modified
    /// response once `timeout` (clamped to the configured maximum) elapses,
    /// or the not-modified response when `cancel` fires.
    pub async fn open_long_poll(
        &self,
        request: WatchRequest,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> WatchResponse {
        let context = match WatchContext::from_request(&request) {
            Ok(context) => context,
            Err(e) => return WatchResponse::bad_request(e.to_string()),
        };
        if let Some(response) = self.check(&context).await {
            return response;
        }

        let timeout = self.config.session.effective_timeout(timeout);
        let mut session = self.sessions.open(
            context.client_id(),
            context.files(),
            context.labels(),
            timeout,
        );

        // A release may have landed between the first check and the
        // registration above; the scanner would not announce it again.
        if let Some(response) = self.check(&context).await {
            self.sessions.notify(context.client_id(), session.session_id, response);
        }

        let timed_out = tokio::select! {
            response = &mut session.receiver => {
                return response.unwrap_or_else(|_| WatchResponse::not_modified());
            }
            _ = tokio::time::sleep_until(session.deadline) => true,
            _ = cancel.cancelled() => false,
        };

        if timed_out {
            // Races the sweeper and notifications; whichever resolved the
            // session has already sent or is about to.
            self.sessions.expire(context.client_id(), session.session_id);
            session.receiver.await.unwrap_or_else(|_| WatchResponse::not_modified())
        } else {
            self.sessions.cancel(context.client_id(), session.session_id);
            debug!(client_id = context.client_id(), "long poll cancelled by caller");
            WatchResponse::not_modified()
        }
    }

    /// Resolves the applicable release of one file, content included.
    pub async fn get_config_file(
        &self,
        request: &FetchRequest,
    ) -> Result<ConfigFileResponse> {
        fetch_config_file(self.cache.as_ref(), request).await
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn scanner(&self) -> &ReleaseScanner {
        &self.scanner
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    async fn check(
        &self,
        context: &WatchContext,
    ) -> Option<WatchResponse> {
        match context.quick_check(self.cache.as_ref()).await {
            Ok(response) => response,
            Err(Error::InvalidRequest(message)) => Some(WatchResponse::bad_request(message)),
            Err(e) => {
                warn!(client_id = context.client_id(), "quick check failed: {:?}", e);
                None
            }
        }
    }
}
