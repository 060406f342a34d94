use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use planwright_core::StepIndex;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::executor::events::Event;
use crate::executor::worker::{StepOutcome, Worker};
use crate::tracker::{StepError, StepErrorKind};

/// Sent to the decision loop when a step reaches a terminal state.
#[derive(Debug)]
pub struct Completion {
    pub idx: StepIndex,
    pub outcome: StepOutcome,
}

/// Spawns the worker task for one step. The permit is released before the
/// completion is sent so the loop can immediately dispatch into the freed slot.
pub fn spawn_step(
    worker: Worker,
    permit: OwnedSemaphorePermit,
    cancel: CancellationToken,
    grace: Duration,
    done: mpsc::Sender<Completion>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = run_step(&worker, &cancel, grace).await;
        drop(permit);
        let _ = done
            .send(Completion {
                idx: worker.idx,
                outcome,
            })
            .await;
    })
}

async fn run_step(worker: &Worker, cancel: &CancellationToken, grace: Duration) -> StepOutcome {
    worker
        .event_sink
        .emit(Event::StepStarted {
            run_id: worker.tracker.run_id(),
            step_id: worker.plan.step(worker.idx).id.clone(),
        })
        .await;

    let attempts = AssertUnwindSafe(worker.run(cancel)).catch_unwind();
    tokio::pin!(attempts);

    let finished = tokio::select! {
        r = &mut attempts => r,
        _ = cancel.cancelled() => match tokio::time::timeout(grace, &mut attempts).await {
            Ok(r) => r,
            Err(_) => {
                return worker
                    .abandon(StepError::new(
                        StepErrorKind::Cancelled,
                        format!("did not stop within {grace:?} of cancellation"),
                    ))
                    .await;
            }
        },
    };

    match finished {
        Ok(outcome) => outcome,
        Err(_) => {
            worker
                .abandon(StepError::new(StepErrorKind::Execution, "action panicked"))
                .await
        }
    }
}
