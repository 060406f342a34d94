use std::time::Duration;

use crate::executor::log_tail::DEFAULT_LOG_TAIL_LINES;
use crate::retry::RetryConfig;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Hard cap on concurrently running steps, applied on top of the
    /// strategy's own limit.
    pub max_parallel: Option<usize>,
    /// How long running steps may take to stop after cancellation.
    pub cancel_grace: Duration,
    pub retry: RetryConfig,
    /// Share one in-flight decryption between concurrent callers.
    pub secrets_single_flight: bool,
    /// Output lines kept per step; 0 disables the tail.
    pub log_tail_lines: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: None,
            cancel_grace: Duration::from_secs(5),
            retry: RetryConfig::default(),
            secrets_single_flight: true,
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
        }
    }
}
