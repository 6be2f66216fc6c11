//! Bounded retry with exponential backoff
//!
//! Used by the quota loops: a batch below quota is retried up to
//! `max_attempts` times in total, sleeping `initial_backoff * 2^(n-1)`
//! (capped at `max_backoff`) after the n-th short batch.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    /// Longest a full quota loop can take when every attempt runs for
    /// `per_attempt`: all attempts plus every backoff sleep between them.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        let sleeps = (1..self.max_attempts)
            .map(|n| self.backoff(n))
            .fold(Duration::ZERO, Duration::saturating_add);
        per_attempt
            .saturating_mul(self.max_attempts)
            .saturating_add(sleeps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(3),
        };
        let delays: Vec<u128> = (1..=5).map(|n| policy.backoff(n).as_millis()).collect();
        assert_eq!(delays, vec![500, 1000, 2000, 3000, 3000]);
    }

    #[test]
    fn worst_case_adds_attempts_and_sleeps() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
        };
        // 3 attempts of 10s, sleeps of 0.5s and 1s between them
        assert_eq!(
            policy.worst_case(Duration::from_secs(10)),
            Duration::from_millis(31_500)
        );

        let single = RetryPolicy {
            max_attempts: 1,
            ..policy
        };
        assert_eq!(
            single.worst_case(Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(u32::MAX), policy.max_backoff);
    }
}
