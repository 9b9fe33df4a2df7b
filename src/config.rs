//! # Core Configuration
//!
//! Tunables for the dispatch queue and its consumers. Defaults are embedded;
//! `WORKORDER_`-prefixed environment variables override individual fields
//! (e.g. `WORKORDER_DEDUP_WINDOW_SECS=120`, `WORKORDER_WORKER__BATCH_SIZE=25`).

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the workorder core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Window within which identical notification triggers coalesce into one task
    pub dedup_window_secs: u64,
    /// Upper bound on the exponential retry backoff
    pub backoff_cap_secs: u64,
    /// Retry policy applied when a notification configuration carries none
    pub default_max_retries: u32,
    pub default_retry_interval_secs: u64,
    pub worker: WorkerConfig,
}

/// Queue consumer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum tasks claimed per batch
    pub batch_size: usize,
    /// Idle poll interval when no tasks are ready
    pub poll_interval_ms: u64,
    /// Per-send timeout; an elapsed timeout counts as a transient failure
    pub send_timeout_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 60,
            backoff_cap_secs: 3600, // 1 hour
            default_max_retries: 3,
            default_retry_interval_secs: 300, // 5 minutes
            worker: WorkerConfig::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval_ms: 500,
            send_timeout_secs: 30,
        }
    }
}

impl CoreConfig {
    /// Load configuration from defaults layered with environment overrides
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&CoreConfig::default())?;
        config::Config::builder()
            .add_source(defaults)
            .add_source(config::Environment::with_prefix("WORKORDER").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::seconds(self.dedup_window_secs as i64)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::seconds(self.backoff_cap_secs as i64)
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn send_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.send_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.dedup_window_secs, 60);
        assert_eq!(config.backoff_cap_secs, 3600);
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.worker.batch_size, 10);
        assert_eq!(
            config.worker.poll_interval(),
            std::time::Duration::from_millis(500)
        );
    }

    #[test]
    fn test_duration_conversions() {
        let config = CoreConfig::default();
        assert_eq!(config.dedup_window(), Duration::seconds(60));
        assert_eq!(config.backoff_cap(), Duration::hours(1));
    }
}
