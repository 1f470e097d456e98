//! Time budgets for a reconciliation.

use std::time::Duration;

use crate::request::TimeoutConfig;

/// Default budget for each read and each poll.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
/// Default budget for a mutating step including polling.
pub const DEFAULT_MUTATE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Default interval between operation polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default time allowed for a deleted resource to disappear.
pub const DEFAULT_DELETE_LAG_TIMEOUT: Duration = Duration::from_secs(120);
/// Default interval between post-delete re-reads.
pub const DEFAULT_DELETE_LAG_INTERVAL: Duration = Duration::from_secs(5);

/// Caller-supplied bounds on every suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Budget for each read and each poll.
    pub read_timeout: Duration,
    /// Budget for a mutating call and the polling that follows it.
    pub mutate_timeout: Duration,
    /// Interval between operation polls.
    pub poll_interval: Duration,
    /// How long a deleted resource may keep showing up in reads.
    pub delete_lag_timeout: Duration,
    /// Interval between post-delete re-reads.
    pub delete_lag_interval: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            mutate_timeout: DEFAULT_MUTATE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            delete_lag_timeout: DEFAULT_DELETE_LAG_TIMEOUT,
            delete_lag_interval: DEFAULT_DELETE_LAG_INTERVAL,
        }
    }
}

impl ReconcileOptions {
    /// Sets the read budget.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the mutate budget.
    #[must_use]
    pub const fn with_mutate_timeout(mut self, timeout: Duration) -> Self {
        self.mutate_timeout = timeout;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the delete-lag budget and re-read interval.
    #[must_use]
    pub const fn with_delete_lag(mut self, timeout: Duration, interval: Duration) -> Self {
        self.delete_lag_timeout = timeout;
        self.delete_lag_interval = interval;
        self
    }
}

impl From<&TimeoutConfig> for ReconcileOptions {
    fn from(config: &TimeoutConfig) -> Self {
        let defaults = Self::default();
        Self {
            read_timeout: config.read().unwrap_or(defaults.read_timeout),
            mutate_timeout: config.mutate().unwrap_or(defaults.mutate_timeout),
            poll_interval: config.poll_interval().unwrap_or(defaults.poll_interval),
            delete_lag_timeout: config.delete_lag().unwrap_or(defaults.delete_lag_timeout),
            delete_lag_interval: config
                .delete_lag_interval()
                .unwrap_or(defaults.delete_lag_interval),
        }
    }
}
