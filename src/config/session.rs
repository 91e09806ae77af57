use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Long-poll session settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    /// Deadline applied when the caller does not pass one
    ///
    /// **Default**: 30000
    #[serde(default = "default_long_poll_timeout_ms")]
    pub long_poll_timeout_ms: u64,

    /// Upper bound for caller-supplied deadlines
    ///
    /// **Default**: 120000
    #[serde(default = "default_max_long_poll_timeout_ms")]
    pub max_long_poll_timeout_ms: u64,

    /// Period of the timeout sweep
    ///
    /// **Default**: 1000
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            long_poll_timeout_ms: default_long_poll_timeout_ms(),
            max_long_poll_timeout_ms: default_max_long_poll_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.long_poll_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "session.long_poll_timeout_ms must be greater than 0".into(),
            )));
        }

        if self.sweep_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "session.sweep_interval_ms must be greater than 0".into(),
            )));
        }

        if self.max_long_poll_timeout_ms < self.long_poll_timeout_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "session.max_long_poll_timeout_ms ({}) must not be smaller than session.long_poll_timeout_ms ({})",
                self.max_long_poll_timeout_ms, self.long_poll_timeout_ms
            ))));
        }

        Ok(())
    }

    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.long_poll_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Resolves the deadline for one call: the requested timeout clamped to
    /// the configured maximum, or the default when none was requested.
    pub fn effective_timeout(
        &self,
        requested: Option<Duration>,
    ) -> Duration {
        match requested {
            Some(t) if !t.is_zero() => t.min(Duration::from_millis(self.max_long_poll_timeout_ms)),
            _ => self.long_poll_timeout(),
        }
    }
}

const fn default_long_poll_timeout_ms() -> u64 {
    30_000
}

const fn default_max_long_poll_timeout_ms() -> u64 {
    120_000
}

const fn default_sweep_interval_ms() -> u64 {
    1000
}
