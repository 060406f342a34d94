mod plan;
mod retry;
mod scope;
mod strategy;

pub use plan::{Plan, Step, StepIndex};
pub use retry::{Backoff, RetryPolicy};
pub use scope::{ScopeKind, ScopeValue, VariableScope};
pub use strategy::{Strategy, StrategyParseError};
