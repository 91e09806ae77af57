use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Error;
use crate::Result;

/// Fan-out settings of the watch registry.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Total capacity of the dispatch queues, split evenly across workers
    ///
    /// Must absorb a full scan burst. When a worker queue is full, new
    /// events for that worker are **dropped** and the affected clients fall
    /// back to their long-poll timeout.
    ///
    /// **Default**: 10240
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,

    /// Number of dedicated dispatch threads
    ///
    /// Events are routed to a worker by hashing the watch key, so ordering
    /// per file is preserved while a blocked callback only stalls the files
    /// sharing its worker. `1` gives a single sequential consumer.
    ///
    /// **Default**: 4
    #[serde(default = "default_dispatch_workers")]
    pub dispatch_workers: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            event_queue_size: default_event_queue_size(),
            dispatch_workers: default_dispatch_workers(),
        }
    }
}

impl WatchConfig {
    /// Validates watch configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.event_queue_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch.event_queue_size must be greater than 0".into(),
            )));
        }

        if self.dispatch_workers == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch.dispatch_workers must be greater than 0".into(),
            )));
        }

        if self.event_queue_size < self.dispatch_workers {
            return Err(Error::Config(ConfigError::Message(format!(
                "watch.event_queue_size ({}) must be at least watch.dispatch_workers ({})",
                self.event_queue_size, self.dispatch_workers
            ))));
        }

        if self.event_queue_size > 1_000_000 {
            warn!(
                "watch.event_queue_size ({}) is very large and may consume significant memory",
                self.event_queue_size
            );
        }

        if self.dispatch_workers > 64 {
            warn!(
                "watch.dispatch_workers ({}) is very large; each worker is a dedicated OS thread",
                self.dispatch_workers
            );
        }

        Ok(())
    }

    /// Capacity of each worker's queue.
    pub fn per_worker_queue_size(&self) -> usize {
        (self.event_queue_size / self.dispatch_workers.max(1)).max(1)
    }
}

const fn default_event_queue_size() -> usize {
    10_240
}

const fn default_dispatch_workers() -> usize {
    4
}
