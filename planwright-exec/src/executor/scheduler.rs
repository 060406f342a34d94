use std::collections::BTreeSet;
use std::sync::Arc;

use planwright_core::{Plan, StepIndex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::executor::action::ActionRunner;
use crate::executor::concurrency::ConcurrencyLimits;
use crate::executor::control::{Control, ControlError};
use crate::executor::events::{Event, EventSink};
use crate::executor::result::ExecutorError;
use crate::executor::step_runner::{spawn_step, Completion};
use crate::executor::types::ExecutorConfig;
use crate::executor::worker::{StepOutcome, Worker};
use crate::resolve::Resolver;
use crate::tracker::{ExecutionTracker, RunStatus, SkipReason, StepState, Transition};

/// The decision loop of one run.
///
/// Only this loop reads or writes readiness state. Workers report back over
/// the completion channel and operators over the control channel; messages
/// are handled one at a time.
pub struct Scheduler {
    pub plan: Arc<Plan>,
    pub tracker: Arc<ExecutionTracker>,
    pub resolver: Arc<Resolver>,
    pub runner: Arc<dyn ActionRunner>,
    pub event_sink: Arc<dyn EventSink>,
    pub config: ExecutorConfig,
}

impl Scheduler {
    pub async fn run(
        &self,
        excluded: &[bool],
        cancel: &CancellationToken,
        control: &mut mpsc::Receiver<Control>,
    ) -> Result<RunStatus, ExecutorError> {
        let n = self.plan.len();
        let limits = ConcurrencyLimits::new(self.plan.strategy, self.config.max_parallel);
        let (deps, dependents) = effective_deps(&self.plan, excluded);
        let mut remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<StepIndex> = BTreeSet::new();

        for idx in (0..n).filter(|i| excluded[*i]) {
            self.skip(idx, SkipReason::Filtered).await;
        }
        for idx in (0..n).filter(|i| !excluded[*i] && remaining[*i] == 0) {
            self.transition(idx, Transition::Ready);
            ready.insert(idx);
        }

        let (done_tx, mut done_rx) = mpsc::channel::<Completion>(n.max(1));
        let mut handles = Vec::new();
        let mut in_flight = 0usize;
        let mut failed = false;
        let mut cancelled = cancel.is_cancelled();
        let mut control_open = true;

        loop {
            if !cancelled {
                while let Some(idx) = ready.first().copied() {
                    let Some(permit) = limits.try_acquire() else {
                        break;
                    };
                    ready.remove(&idx);
                    tracing::debug!(
                        run_id = %self.tracker.run_id(),
                        step = %self.plan.step(idx).id,
                        in_flight = limits.in_flight(),
                        "dispatching step"
                    );
                    handles.push(spawn_step(
                        self.worker(idx),
                        permit,
                        cancel.child_token(),
                        self.config.cancel_grace,
                        done_tx.clone(),
                    ));
                    in_flight += 1;
                }
            }
            if in_flight == 0 {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !cancelled => {
                    tracing::info!(run_id = %self.tracker.run_id(), in_flight, "cancellation requested");
                    cancelled = true;
                }
                request = control.recv(), if control_open => match request {
                    Some(Control::Skip { idx, reply }) => {
                        let result = self
                            .skip_on_request(idx, &dependents, &mut remaining, &mut ready)
                            .await;
                        let _ = reply.send(result);
                    }
                    None => control_open = false,
                },
                done = done_rx.recv() => {
                    let Some(Completion { idx, outcome }) = done else {
                        return Err(ExecutorError::Join("completion channel closed".to_string()));
                    };
                    in_flight -= 1;
                    match outcome {
                        StepOutcome::Succeeded => {
                            self.release(idx, &dependents, &mut remaining, &mut ready);
                        }
                        // Once cancelled, leftovers are skipped as cancelled below.
                        StepOutcome::Failed(_) if cancelled => failed = true,
                        StepOutcome::Failed(_) => {
                            failed = true;
                            self.cascade(idx, &mut ready).await;
                        }
                    }
                }
            }
        }

        if cancelled {
            for idx in 0..n {
                if matches!(self.tracker.state(idx), StepState::Pending | StepState::Ready) {
                    self.skip(idx, SkipReason::Cancelled).await;
                }
            }
        }

        drop(done_tx);
        for handle in handles {
            handle
                .await
                .map_err(|e| ExecutorError::Join(e.to_string()))?;
        }

        Ok(if cancelled {
            RunStatus::Cancelled
        } else if failed {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        })
    }

    /// Counts a satisfied step against its dependents and readies the ones
    /// left with nothing to wait for.
    fn release(
        &self,
        idx: StepIndex,
        dependents: &[Vec<StepIndex>],
        remaining: &mut [usize],
        ready: &mut BTreeSet<StepIndex>,
    ) {
        for &d in &dependents[idx] {
            remaining[d] -= 1;
            if remaining[d] == 0 && self.tracker.state(d) == StepState::Pending {
                self.transition(d, Transition::Ready);
                ready.insert(d);
            }
        }
    }

    /// Skips a step that has not been dispatched; it counts as satisfied.
    async fn skip_on_request(
        &self,
        idx: StepIndex,
        dependents: &[Vec<StepIndex>],
        remaining: &mut [usize],
        ready: &mut BTreeSet<StepIndex>,
    ) -> Result<(), ControlError> {
        let step = &self.plan.step(idx).id;
        let state = self.tracker.state(idx);
        // A dispatched step stays `ready` until its worker starts it.
        let waiting = match state {
            StepState::Pending => true,
            StepState::Ready => ready.contains(&idx),
            _ => false,
        };
        if !waiting {
            return Err(ControlError::NotSkippable {
                step: step.clone(),
                state,
            });
        }
        tracing::info!(run_id = %self.tracker.run_id(), %step, %state, "skipping step on request");
        ready.remove(&idx);
        self.skip(idx, SkipReason::Manual).await;
        self.release(idx, dependents, remaining, ready);
        Ok(())
    }

    /// Skips every not-yet-started transitive dependent of a failed step.
    async fn cascade(&self, failed: StepIndex, ready: &mut BTreeSet<StepIndex>) {
        let failed_id = &self.plan.step(failed).id;
        for d in self.plan.graph.descendants(failed) {
            if matches!(self.tracker.state(d), StepState::Pending | StepState::Ready) {
                ready.remove(&d);
                self.skip(
                    d,
                    SkipReason::UpstreamFailed {
                        step: failed_id.clone(),
                    },
                )
                .await;
            }
        }
    }

    async fn skip(&self, idx: StepIndex, reason: SkipReason) {
        self.transition(
            idx,
            Transition::Skipped {
                reason: reason.clone(),
            },
        );
        self.event_sink
            .emit(Event::StepSkipped {
                run_id: self.tracker.run_id(),
                step_id: self.plan.step(idx).id.clone(),
                reason,
            })
            .await;
    }

    fn transition(&self, idx: StepIndex, t: Transition) {
        if let Err(e) = self.tracker.record_at(idx, t) {
            tracing::warn!(error = %e, "tracker rejected transition");
        }
    }

    fn worker(&self, idx: StepIndex) -> Worker {
        Worker {
            idx,
            plan: self.plan.clone(),
            resolver: self.resolver.clone(),
            tracker: self.tracker.clone(),
            runner: self.runner.clone(),
            event_sink: self.event_sink.clone(),
            retry: self.config.retry.clone(),
            log_tail_lines: self.config.log_tail_lines,
        }
    }
}

/// Dependencies with excluded steps contracted away: a step waits on the
/// nearest non-excluded steps upstream of it. Returns `(deps, dependents)`.
fn effective_deps(plan: &Plan, excluded: &[bool]) -> (Vec<Vec<StepIndex>>, Vec<Vec<StepIndex>>) {
    let n = plan.len();
    let mut deps: Vec<Vec<StepIndex>> = vec![Vec::new(); n];
    for &i in &plan.graph.topo_order {
        let mut set = BTreeSet::new();
        for &d in &plan.step(i).deps {
            if excluded[d] {
                set.extend(deps[d].iter().copied());
            } else {
                set.insert(d);
            }
        }
        deps[i] = set.into_iter().collect();
    }

    let mut dependents: Vec<Vec<StepIndex>> = vec![Vec::new(); n];
    for (i, ds) in deps.iter().enumerate() {
        if excluded[i] {
            continue;
        }
        for &d in ds {
            dependents[d].push(i);
        }
    }
    (deps, dependents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_steps_are_contracted() {
        let plan = planwright_core::load_plan_str(
            "id: p\nsteps:\n  - id: a\n  - id: f\n    depends_on: [a]\n  - id: c\n    depends_on: [f]\n  - id: d\n",
        )
        .unwrap();
        let (deps, dependents) = effective_deps(&plan, &[false, true, false, false]);
        assert_eq!(deps[2], vec![0]);
        assert_eq!(dependents[0], vec![2]);
        assert!(deps[3].is_empty());
    }
}
