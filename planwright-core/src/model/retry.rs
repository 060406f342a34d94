use std::time::Duration;

/// Per-step retry declaration.
///
/// `backoff: None` defers to the executor's configured default.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Option<Backoff>,
    pub jitter: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        base: Duration,
        factor: f64,
        max: Option<Duration>,
    },
}

impl Backoff {
    /// Delay before retry number `retry_no` (1-based), before jitter.
    pub fn delay(&self, retry_no: u32) -> Duration {
        match self {
            Backoff::Fixed(d) => *d,
            Backoff::Exponential { base, factor, max } => {
                let exp = retry_no.saturating_sub(1) as i32;
                let raw = (base.as_millis() as f64) * factor.powi(exp);
                let capped = match max {
                    Some(m) => raw.min(m.as_millis() as f64),
                    None => raw,
                };
                Duration::from_millis(capped.max(0.0) as u64)
            }
        }
    }
}
