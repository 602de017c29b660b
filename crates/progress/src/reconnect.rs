//! Exponential-backoff reconnection policy for the submission stream.
//!
//! Every close schedules a reconnect after [`ReconnectPolicy::delay`].
//! The attempt counter grows by one per closed-then-scheduled cycle and
//! resets on every successful open, so the first retry after a blip is
//! fast while a dead server settles into a fixed ceiling.

use std::time::Duration;

use rand::Rng;

/// Tunable parameters for the backoff ramp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt (attempt 0).
    pub base_delay: Duration,
    /// Attempts beyond this exponent stop doubling the delay.
    pub max_exponent: u32,
    /// Exclusive upper bound of the uniform random jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_exponent: 4,
            max_jitter: Duration::from_millis(200),
        }
    }
}

impl ReconnectPolicy {
    /// Delay for `attempt` before jitter: `base * 2^min(attempt, max_exponent)`.
    pub fn ramp(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(self.max_exponent);
        self.base_delay
            .checked_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX))
            .unwrap_or(Duration::MAX)
    }

    /// Delay for `attempt` with an explicit jitter, truncated to whole milliseconds.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let total = self.ramp(attempt).saturating_add(jitter);
        Duration::from_millis(total.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    /// Delay for `attempt` with jitter drawn uniformly from `[0, max_jitter)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis().min(u128::from(u64::MAX)) as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..jitter_ms))
        };
        self.delay_with_jitter(attempt, jitter)
    }
}
