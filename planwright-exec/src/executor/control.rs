use std::sync::Arc;

use planwright_core::{Plan, StepIndex};
use tokio::sync::{mpsc, oneshot};

use crate::tracker::StepState;

const CONTROL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("unknown step: {0}")]
    UnknownStep(String),
    #[error("step {step} is {state} and can no longer be skipped")]
    NotSkippable { step: String, state: StepState },
    #[error("run is no longer accepting requests")]
    Closed,
}

/// Requests handled by the decision loop between completions.
#[derive(Debug)]
pub(crate) enum Control {
    Skip {
        idx: StepIndex,
        reply: oneshot::Sender<Result<(), ControlError>>,
    },
}

/// Steers a run from outside its decision loop. Cheap to clone.
#[derive(Clone)]
pub struct RunControl {
    plan: Arc<Plan>,
    tx: mpsc::Sender<Control>,
}

impl RunControl {
    pub(crate) fn channel(plan: Arc<Plan>) -> (Self, mpsc::Receiver<Control>) {
        let (tx, rx) = mpsc::channel(CONTROL_CAPACITY);
        (Self { plan, tx }, rx)
    }

    /// Marks a step that has not been dispatched yet as skipped. Its
    /// dependents treat it as satisfied.
    pub async fn skip_step(&self, step_id: &str) -> Result<(), ControlError> {
        let idx = self
            .plan
            .step_index(step_id)
            .ok_or_else(|| ControlError::UnknownStep(step_id.to_string()))?;
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(Control::Skip { idx, reply })
            .await
            .map_err(|_| ControlError::Closed)?;
        answer.await.map_err(|_| ControlError::Closed)?
    }
}
