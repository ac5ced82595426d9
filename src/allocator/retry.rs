use std::time::Duration;

use crate::config::AllocatorConfig;

/// How long to wait for an agent, and how many times to look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between selection attempts.
    pub interval: Duration,
    /// Total selection attempts allowed. `0` means unbounded.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Whether another selection attempt may follow attempt number `attempt`
    /// (1-based).
    pub fn allows_another(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_attempts == 0
    }
}

impl From<&AllocatorConfig> for RetryPolicy {
    fn from(config: &AllocatorConfig) -> Self {
        Self::new(config.wait_interval, config.max_attempts)
    }
}
