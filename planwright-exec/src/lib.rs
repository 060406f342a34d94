#![forbid(unsafe_code)]

//! Runtime engine for executing Planwright plans.
//!
//! Plan parsing and validation live in `planwright-core`; this crate resolves
//! variables, decrypts secrets, schedules steps and tracks their state.

pub mod executor;
pub mod resolve;
pub mod retry;
pub mod secrets;
pub mod service;
pub mod tracker;

pub use crate::executor::{
    ActionContext, ActionError, ActionOutput, ActionRunner, ExecutorConfig, ExecutorError,
    PlanExecutor, RunOptions,
};
pub use crate::service::{PlanService, RunSummary, ServiceError};
pub use crate::tracker::{ExecutionRecord, ExecutionTracker, RunStatus, StepState, VisualizationGraph};
