//! Reconnect backoff policy.
//!
//! Doubles the wait between reconnect attempts starting from `base`, never exceeding
//! `cap`. With the defaults the sequence for attempts 1, 2, 3, ... is
//! `1s, 2s, 4s, 8s, 16s, 30s, 30s, ...`.
//!
//! ```
//! use logtail_stream::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::default();
//! assert_eq!(policy.delay(1), Duration::from_secs(1));
//! assert_eq!(policy.delay(3), Duration::from_secs(4));
//! assert_eq!(policy.delay(9), Duration::from_secs(30));
//! ```

use std::time::Duration;

/// Capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    /// Default delay before the first retry.
    pub const DEFAULT_BASE: Duration = Duration::from_secs(1);
    /// Default upper bound.
    pub const DEFAULT_CAP: Duration = Duration::from_secs(30);

    /// Create a policy from its base delay and cap.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Wait before retry number `attempt` (1-based): `min(cap, base * 2^(attempt-1))`.
    ///
    /// Attempt `0` is treated as attempt `1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        // 2^31 of any non-zero base is already past any cap worth configuring
        let factor = 2_u32.saturating_pow(exponent.min(31));
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// The configured cap.
    pub fn cap(&self) -> Duration {
        self.cap
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (1..=8).map(|a| policy.delay(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn test_monotonic_until_cap() {
        let policy = BackoffPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..100 {
            let delay = policy.delay(attempt);
            assert!(delay >= previous);
            assert!(delay <= policy.cap());
            previous = delay;
        }
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_attempt_is_first_attempt() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), policy.delay(1));
    }

    #[test]
    fn test_custom_policy() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_millis(450));
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
        assert_eq!(policy.delay(4), Duration::from_millis(450));
    }
}
