//! Reconnect / retry delays for node transports.
//!
//! Bounded exponential backoff: the first retry waits `initial`, each later
//! retry doubles the wait, and no wait exceeds `max`. After `max_attempts`
//! total attempts the caller gives up and drops the report; the next
//! acquisition cycle produces a fresh one anyway.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 5)
    }
}

impl ReconnectPolicy {
    /// `max_attempts` is clamped to at least one, and `max` to at least
    /// `initial`.
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max: max.max(initial),
            max_attempts: max_attempts.max(1),
        }
    }

    /// A policy that tries once and never waits.
    pub fn no_retry() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based: retry 1 follows the first
    /// failed attempt). Retry 0 has no delay.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Every delay this policy will sleep through, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.max_attempts).map(|retry| self.delay_for_retry(retry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_until_capped() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(5), 6);
        let delays: Vec<u64> = policy.delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn test_retry_zero_has_no_delay() {
        assert_eq!(ReconnectPolicy::default().delay_for_retry(0), Duration::ZERO);
    }

    #[test]
    fn test_huge_retry_number_does_not_overflow() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_retry(200), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_attempts_is_clamped_to_one() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(2), 0);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delays().count(), 0);
    }

    #[test]
    fn test_no_retry_policy() {
        let policy = ReconnectPolicy::no_retry();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delays().count(), 0);
    }
}
