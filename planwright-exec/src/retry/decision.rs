use std::time::Duration;

use planwright_core::RetryPolicy;

use crate::retry::config::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter { delay: Duration, reason: RetryReason },
    Stop { reason: RetryReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    NoPolicy,
    NotRetryable,
    AttemptsExhausted,
    Backoff,
}

/// Decide if a failed attempt should be retried and how long to wait.
///
/// - `attempt_no`: 1-based number of the attempt that just failed.
/// - `retryable`: whether the failure class may be retried at all.
/// - `rand_u64`: RNG for full jitter.
pub fn decide_retry(
    cfg: &RetryConfig,
    policy: Option<&RetryPolicy>,
    attempt_no: u32,
    retryable: bool,
    rand_u64: impl Fn() -> u64,
) -> RetryDecision {
    let Some(policy) = policy else {
        return RetryDecision::Stop {
            reason: RetryReason::NoPolicy,
        };
    };
    if !retryable {
        return RetryDecision::Stop {
            reason: RetryReason::NotRetryable,
        };
    }
    // attempts = initial + retries
    if attempt_no > policy.max_retries {
        return RetryDecision::Stop {
            reason: RetryReason::AttemptsExhausted,
        };
    }

    let backoff = policy.backoff.as_ref().unwrap_or(&cfg.default_backoff);
    let raw_ms = clamp(backoff.delay(attempt_no), cfg.max_delay).as_millis() as u64;

    let delay_ms = if policy.jitter && raw_ms > 0 {
        rand_u64() % (raw_ms + 1)
    } else {
        raw_ms
    };
    RetryDecision::RetryAfter {
        delay: Duration::from_millis(delay_ms),
        reason: RetryReason::Backoff,
    }
}

fn clamp(delay: Duration, max: Duration) -> Duration {
    if delay > max { max } else { delay }
}
