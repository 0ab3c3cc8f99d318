//! Whole-host retry with exponential backoff
//!
//! Delay before retry `n` (0-indexed): `min(initial * multiplier^n, max)`.

use std::time::Duration;

use crate::config::RetrySettings;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
        }
    }

    /// Delay before retry number `retry` (0-indexed)
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let max_ms = self.max_delay.as_millis() as u64;
        let capped_ms = if delay_ms.is_finite() {
            (delay_ms as u64).min(max_ms)
        } else {
            max_ms
        };

        Duration::from_millis(capped_ms)
    }

    /// Whether retry number `retry` (0-indexed) is still allowed
    pub fn should_retry(&self, retry: u32) -> bool {
        retry < self.max_retries
    }

    /// Initial attempt plus retries
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}
