//! Fixed-interval retry policy for backend dials.
//!
//! # Design Decisions
//! - Backends are local worker processes that restart in seconds, so the
//!   interval is constant rather than exponential
//! - The attempt budget is small and bounded: a client is never held longer
//!   than `max_attempts * (connect_timeout + interval)`

use std::time::Duration;

use crate::config::BackendConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Sleep between two attempts.
    pub interval: Duration,
    /// Deadline of a single dial.
    pub connect_timeout: Duration,
}

impl RetryPolicy {
    /// Upper bound on the time spent before giving up.
    pub fn budget(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        self.connect_timeout * attempts + self.interval * (attempts - 1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&BackendConfig::default())
    }
}

impl From<&BackendConfig> for RetryPolicy {
    fn from(config: &BackendConfig) -> Self {
        Self {
            max_attempts: config.retry_max,
            interval: Duration::from_millis(config.retry_interval_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }
}
