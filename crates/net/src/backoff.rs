//! Reconnect backoff policy

use std::time::Duration;

use tellerline_core::MessagingSettings;

/// Exponential backoff: the delay before retry `n` (0-based) is `base * 2^n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts }
    }

    pub fn from_settings(settings: &MessagingSettings) -> Self {
        Self::new(settings.backoff_base(), settings.max_reconnect_attempts)
    }

    /// Delay to wait after `attempts` consecutive failures
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(Duration::MAX)
    }

    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
