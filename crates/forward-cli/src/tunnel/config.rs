//! Tunnel readiness polling configuration.

use std::time::Duration;

/// Bounded exponential backoff used while waiting for a new tunnel.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Delay before the second status check.
    pub initial_delay: Duration,
    /// Maximum delay between status checks.
    pub max_delay: Duration,
    /// Multiplier applied to delay after each unsuccessful check.
    pub multiplier: f64,
    /// Total number of status checks.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_attempts: 8,
        }
    }
}

impl PollPolicy {
    /// Calculate the delay after a given check (0-indexed).
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt.min(30) as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Whether another check should be made after `attempt` checks.
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Upper bound on the total time spent sleeping between checks.
    pub fn total_wait(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay_for_attempt(attempt))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_policy() {
        let policy = PollPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 8);
    }

    #[test]
    fn exponential_backoff_delays() {
        let policy = PollPolicy::default();

        // 0.5s, 1s, 2s, 4s, 5s (capped), 5s
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(100), Duration::from_secs(5));
    }

    #[test]
    fn retries_are_bounded() {
        let policy = PollPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(u32::MAX));
    }

    #[test]
    fn total_wait_sums_sleeps_between_checks() {
        // 0.5 + 1 + 2 + 4 + 5 + 5 + 5
        assert_eq!(PollPolicy::default().total_wait(), Duration::from_millis(22_500));
    }
}
