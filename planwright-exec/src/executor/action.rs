use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::executor::log_tail::LogTail;
use crate::resolve::ResolvedVariables;

/// Everything an action needs for one attempt.
pub struct ActionContext {
    pub run_id: Uuid,
    pub plan_id: String,
    pub step_id: String,
    /// The step's `action` payload, untouched.
    pub action: JsonValue,
    pub variables: ResolvedVariables,
    /// 1-based.
    pub attempt: u32,
    /// Fires when the run is cancelled. Cooperative runners should return
    /// [`ActionError::Cancelled`] soon after.
    pub cancel: CancellationToken,
    /// Lines written here are masked and kept on the step result.
    pub log: LogTail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    /// Short human-readable result. Masked before it reaches the tracker.
    pub summary: Option<String>,
}

impl ActionOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("{0}")]
    Failed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        ActionError::Failed(message.into())
    }
}

/// Performs the side effect of a step.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError>;
}
