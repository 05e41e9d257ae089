//! Worker configuration.

use std::time::Duration;

use super::retry::RetryPolicy;

/// Configuration for the run workers.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bracketflow::runner::WorkerConfig;
///
/// let config = WorkerConfig {
///     poll_interval: Duration::from_millis(250),
///     workers: 2,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often each worker polls the ledger for due runs.
    ///
    /// Suspension wake precision is limited by this interval.
    /// Default: 1 second.
    pub poll_interval: Duration,

    /// How long a claim lease holds a run.
    ///
    /// Should exceed the longest expected step execution. If a worker
    /// crashes, the run becomes claimable after this duration.
    /// Default: 5 minutes.
    pub lock_duration: Duration,

    /// Maximum time to wait for in-flight runs during shutdown.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,

    /// Retry policy for transient step failures.
    pub retry_policy: RetryPolicy,

    /// Worker identifier for distributed coordination.
    ///
    /// Used in lease ownership; if `None`, a UUID is generated at startup.
    pub worker_id: Option<String>,

    /// Number of run workers to spawn.
    ///
    /// Workers coordinate through the ledger's claim lease, so multiple
    /// workers never execute the same run concurrently. Default: 1.
    pub workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            lock_duration: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            worker_id: None,
            workers: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = WorkerConfig::default();

        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.lock_duration, Duration::from_secs(300));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert!(config.worker_id.is_none());
        assert_eq!(config.workers, 1);
    }
}
