use planwright_core::LoadError;

use crate::tracker::ExecutionRecord;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("unknown step in run options: {0}")]
    UnknownStep(String),
    #[error("run {} was cancelled", record.run_id)]
    Cancelled { record: Box<ExecutionRecord> },
    #[error("task join error: {0}")]
    Join(String),
}

impl ExecutorError {
    /// The final record of a cancelled run.
    pub fn record(&self) -> Option<&ExecutionRecord> {
        match self {
            ExecutorError::Cancelled { record } => Some(record),
            _ => None,
        }
    }
}
