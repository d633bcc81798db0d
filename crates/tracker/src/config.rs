//! Configuration - validated tracker settings, loadable from TOML

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TrackerError};

/// Tracker settings. Every field has a default, so a TOML file only needs
/// the values it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Interval between property reads (milliseconds)
    pub poll_interval_ms: u64,

    /// Entries requested per replay page
    pub page_size: usize,

    /// Consecutive ledger failures tolerated before a stream gives up
    pub max_retries: u32,

    /// Delay before the first retry; doubles on every further attempt (milliseconds)
    pub retry_backoff_ms: u64,

    /// Upper bound on the retry delay (milliseconds)
    pub max_backoff_ms: u64,

    /// Number of recently seen cursors remembered for duplicate suppression
    pub dedup_window: usize,

    /// Items buffered between a subscription task and its consumer
    pub channel_capacity: usize,

    /// Concurrent record reads in derived views
    pub fetch_concurrency: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            page_size: 100,
            max_retries: 5,
            retry_backoff_ms: 250,
            max_backoff_ms: 10_000,
            dedup_window: 1_024,
            channel_capacity: 64,
            fetch_concurrency: 4,
        }
    }
}

impl TrackerConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: TrackerConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(TrackerError::Config("poll_interval_ms must be positive".into()));
        }
        if self.page_size == 0 {
            return Err(TrackerError::Config("page_size must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(TrackerError::Config("channel_capacity must be positive".into()));
        }
        if self.fetch_concurrency == 0 {
            return Err(TrackerError::Config("fetch_concurrency must be positive".into()));
        }
        if self.max_backoff_ms < self.retry_backoff_ms {
            return Err(TrackerError::Config("max_backoff_ms is below retry_backoff_ms".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Delay before retry number `attempt` (1-based): exponential, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let delay = self.retry_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}
