use std::sync::Arc;

use planwright_core::Strategy;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds in-flight steps according to the plan's strategy.
pub struct ConcurrencyLimits {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyLimits {
    pub fn new(strategy: Strategy, max_parallel: Option<usize>) -> Self {
        let limit = strategy_limit(strategy, max_parallel);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    /// Never waits; the decision loop only dispatches when a slot is free.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().try_acquire_owned().ok()
    }
}

pub fn strategy_limit(strategy: Strategy, max_parallel: Option<usize>) -> usize {
    let base = strategy
        .concurrency_limit()
        .unwrap_or(Semaphore::MAX_PERMITS);
    match max_parallel {
        Some(cap) => base.min(cap).max(1),
        None => base.max(1),
    }
}
