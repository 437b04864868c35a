//! Delivery retry policy for push events

use std::time::Duration;

use rand::Rng;

use crate::config::SyncSettings;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per event, including the first.
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Deliver each event at most once.
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            max_attempts: settings.push_max_attempts.max(1),
            base_backoff: settings.push_backoff,
        }
    }

    /// Exponential delay before attempt `attempt + 1`, plus up to 20% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = u64::try_from(self.base_backoff.as_millis()).unwrap_or(u64::MAX);
        let exp = attempt.saturating_sub(1).min(8);
        let cap = u64::try_from(MAX_BACKOFF.as_millis()).unwrap_or(u64::MAX);
        let backoff = base.saturating_mul(1_u64 << exp).min(cap);
        let jitter = rand::thread_rng().gen_range(0..=(backoff / 5).max(1));
        Duration::from_millis(backoff.saturating_add(jitter))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}
