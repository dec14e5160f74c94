//! Backoff policy: decides how long a failed message stays hidden.

use std::time::Duration;

use crate::config::Limits;

/// Exponential backoff keyed on the delivery's receive count.
///
/// `delay = min(max, base * 2^receive_count)`
///
/// The exponent is the raw receive count, so the first retry already waits
/// `2 * base`. With base=5s, max=900s:
/// - receive 1: 10s
/// - receive 2: 20s
/// - receive 3: 40s
/// - receive 5: 160s
/// - receive 8 and later: 900s
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_limits(limits: &Limits) -> Self {
        Self::new(limits.base_backoff(), limits.max_backoff())
    }

    /// Delay before the next delivery. Saturates at `max` instead of overflowing
    /// for large receive counts.
    pub fn delay_for(&self, receive_count: u32) -> Duration {
        let base_secs = self.base.as_secs();
        let max_secs = self.max.as_secs();
        let secs = 2u64
            .checked_pow(receive_count)
            .and_then(|factor| base_secs.checked_mul(factor))
            .map_or(max_secs, |secs| secs.min(max_secs));
        Duration::from_secs(secs)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_limits(&Limits::default())
    }
}
