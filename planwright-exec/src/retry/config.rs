use std::time::Duration;

use planwright_core::Backoff;

/// Executor-wide retry settings. Steps opt in to retries with their own
/// `retry` block; this only supplies what a step leaves out.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Used when a step's retry policy has no `backoff`.
    pub default_backoff: Backoff,
    /// Upper bound on any single delay, jitter included.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            default_backoff: Backoff::Exponential {
                base: Duration::from_millis(1000),
                factor: 2.0,
                max: Some(Duration::from_secs(60)),
            },
            max_delay: Duration::from_secs(300),
        }
    }
}
