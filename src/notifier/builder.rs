//! Builder for a [`Notifier`].
//!
//! The release store is the only required component. The cache defaults to a
//! [`StoreBackedCache`] over that store and the bus to a private
//! [`EventBus`].
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let notifier = NotifierBuilder::init(config, shutdown_rx)
//!     .release_store(store)
//!     .start()
//!     .await?;
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::Notifier;
use crate::Error;
use crate::EventBus;
use crate::NotifyConfig;
use crate::ReleaseCache;
use crate::ReleaseScanner;
use crate::ReleaseStore;
use crate::Result;
use crate::SessionManager;
use crate::StoreBackedCache;
use crate::WatchRegistry;

pub struct NotifierBuilder {
    config: NotifyConfig,
    release_store: Option<Arc<dyn ReleaseStore>>,
    release_cache: Option<Arc<dyn ReleaseCache>>,
    event_bus: Option<Arc<EventBus>>,
    shutdown_signal: watch::Receiver<()>,
}

impl NotifierBuilder {
    /// Loads configuration from defaults, `CONFIG_PATH` and the environment,
    /// then the optional override file.
    pub fn new(
        config_path: Option<&str>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        let mut config = NotifyConfig::new()?;
        if let Some(path) = config_path {
            info!("with_override_config from: {}", path);
            config = config.with_override_config(path)?;
        }
        Ok(Self::init(config, shutdown_signal))
    }

    pub fn init(
        config: NotifyConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            release_store: None,
            release_cache: None,
            event_bus: None,
            shutdown_signal,
        }
    }

    pub fn release_store(
        mut self,
        store: Arc<dyn ReleaseStore>,
    ) -> Self {
        self.release_store = Some(store);
        self
    }

    pub fn release_cache(
        mut self,
        cache: Arc<dyn ReleaseCache>,
    ) -> Self {
        self.release_cache = Some(cache);
        self
    }

    /// Shares an existing bus, e.g. to observe release events elsewhere.
    pub fn event_bus(
        mut self,
        bus: Arc<EventBus>,
    ) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Validates the configuration and wires the components without starting
    /// any background work.
    pub fn build(self) -> Result<Notifier> {
        let config = self.config.validate()?;
        let store = self.release_store.ok_or_else(|| {
            Error::Fatal("release store must be set before calling build()".to_string())
        })?;
        let cache = self
            .release_cache
            .unwrap_or_else(|| Arc::new(StoreBackedCache::new(store.clone())));
        let bus = self.event_bus.unwrap_or_default();

        let registry =
            Arc::new(WatchRegistry::new(config.watch.clone()).with_release_cache(cache.clone()));
        registry.attach(&bus);
        let sessions = Arc::new(SessionManager::new(registry.clone(), config.session.clone()));
        let scanner = Arc::new(ReleaseScanner::new(
            store,
            cache.clone(),
            bus.clone(),
            config.scanner.clone(),
        ));

        Ok(Notifier::new(config, cache, bus, scanner, registry, sessions))
    }

    /// Builds the notifier and starts its background work.
    pub async fn start(self) -> Result<Arc<Notifier>> {
        let shutdown_signal = self.shutdown_signal.clone();
        let notifier = Arc::new(self.build()?);
        notifier.start(shutdown_signal).await?;
        Ok(notifier)
    }
}
