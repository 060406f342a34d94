mod action;
pub mod concurrency;
mod control;
pub mod events;
mod log_tail;
pub mod metrics;
mod options;
mod plan_executor;
mod result;
mod scheduler;
mod step_runner;
mod types;
mod worker;

pub use action::{ActionContext, ActionError, ActionOutput, ActionRunner};
pub use control::{ControlError, RunControl};
pub use events::{
    CompositeEventSink, Event, EventSink, NoOpEventSink, StdoutEventSink, TracingEventSink,
};
pub use log_tail::{LogTail, DEFAULT_LOG_TAIL_LINES};
pub use metrics::{MetricsCollector, MetricsEventSink, RunMetrics};
pub use options::RunOptions;
pub use plan_executor::{PlanExecutor, PreparedRun};
pub use result::ExecutorError;
pub use types::ExecutorConfig;
pub use worker::StepOutcome;
