//! Runner configuration.

use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::error::SyncError;

/// Settings for one bridge runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Delay between successful syncs of a bridge, and the backoff base.
    pub sync_interval: Duration,

    /// How often the runner tries to claim a bridge.
    pub poll_interval: Duration,

    /// Upper bound on one sync attempt.
    pub sync_timeout: Duration,

    /// Backoff ceiling.
    pub max_backoff: Duration,

    /// Consecutive failures after which a bridge is disabled.
    pub max_consecutive_failures: u32,

    /// A bridge `syncing` for longer than this is presumed orphaned.
    pub stale_sync_threshold: Duration,

    /// Default `/Users` page size when a directory target does not set one.
    pub directory_page_size: u32,

    /// Compute the diff without calling the directory.
    pub dry_run: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(15 * 60),
            poll_interval: Duration::from_secs(30),
            sync_timeout: Duration::from_secs(5 * 60),
            max_backoff: Duration::from_secs(24 * 60 * 60),
            max_consecutive_failures: 10,
            stale_sync_threshold: Duration::from_secs(10 * 60),
            directory_page_size: 100,
            dry_run: false,
        }
    }
}

impl RunnerConfig {
    /// Reject settings the runner cannot honor.
    ///
    /// The sync timeout must be strictly below the stale threshold, otherwise
    /// a slow but live sync could be reclaimed by another runner.
    pub fn validate(&self) -> Result<(), SyncError> {
        let non_zero = [
            ("sync_interval", self.sync_interval),
            ("poll_interval", self.poll_interval),
            ("sync_timeout", self.sync_timeout),
            ("max_backoff", self.max_backoff),
            ("stale_sync_threshold", self.stale_sync_threshold),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(SyncError::configuration(format!("{name} must be non-zero")));
            }
        }

        if self.sync_timeout >= self.stale_sync_threshold {
            return Err(SyncError::configuration(format!(
                "sync_timeout ({}s) must be below stale_sync_threshold ({}s)",
                self.sync_timeout.as_secs(),
                self.stale_sync_threshold.as_secs()
            )));
        }
        if self.max_consecutive_failures == 0 {
            return Err(SyncError::configuration(
                "max_consecutive_failures must be at least 1",
            ));
        }
        if self.directory_page_size == 0 {
            return Err(SyncError::configuration("directory_page_size must be at least 1"));
        }
        Ok(())
    }

    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.sync_interval,
            self.max_backoff,
            self.max_consecutive_failures,
        )
    }
}
