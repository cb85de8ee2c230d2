//! Reconnect pacing

use std::time::Duration;

use crate::config::BackendConfig;

/// Exponential backoff with a cap on the number of attempts
///
/// Attempt `n` (1-based) waits `initial_backoff * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(initial_backoff: Duration, max_attempts: u32) -> Self {
        Self {
            initial_backoff,
            max_attempts,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.initial_backoff(), config.max_reconnect_attempts)
    }

    /// Delay before the given attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }

    /// Whether another attempt is allowed after `attempts_made` failures
    pub fn allows(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Every delay this policy will ever wait, in order
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).map(|attempt| self.delay_for(attempt))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&BackendConfig::default())
    }
}
