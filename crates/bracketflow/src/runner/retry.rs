//! Retry policy for transient step failures.

use std::time::Duration;

/// Exponential backoff configuration for step retries.
///
/// When a step fails transiently, the run is rescheduled after
/// `min(base_delay * 2^(attempt-1), max_delay)`. Once `max_attempts`
/// failures accumulate for the same step, the run is failed permanently.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bracketflow::runner::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts, 5);
///
/// // A patient policy for a flaky tournament store.
/// let patient = RetryPolicy {
///     max_attempts: 8,
///     base_delay: Duration::from_secs(2),
///     max_delay: Duration::from_secs(120),
/// };
/// assert!(patient.should_retry(7));
/// assert_eq!(patient.backoff_duration(3), Duration::from_secs(8));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per step, including the initial one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff. Doubles with each retry.
    pub base_delay: Duration,

    /// Cap on the backoff growth.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Returns `true` if another retry should be attempted.
    ///
    /// `attempt` is the 1-based attempt number that just failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Backoff duration before the attempt after `attempt` failed.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(multiplier);
        delay.min(self.max_delay)
    }
}
