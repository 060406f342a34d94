//! Live per-run state.
//!
//! Every step has its own lock; no lock spans the whole record, so a status
//! or visualization read never blocks writers for other steps.

mod graph;
mod record;

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use planwright_core::{Plan, StepIndex, Strategy};
use uuid::Uuid;

pub use graph::{GraphEdge, GraphNode, VisualizationGraph};
pub use record::{
    ExecutionRecord, RunStatus, SkipReason, StepError, StepErrorKind, StepResult, StepState,
};

#[derive(Debug, Clone)]
pub enum Transition {
    Ready,
    Running { attempt: u32 },
    Retrying { error: StepError, delay: Duration },
    Succeeded { output: Option<String> },
    Failed { error: StepError },
    Skipped { reason: SkipReason },
}

impl Transition {
    pub fn target(&self) -> StepState {
        match self {
            Transition::Ready => StepState::Ready,
            Transition::Running { .. } => StepState::Running,
            Transition::Retrying { .. } => StepState::Retrying,
            Transition::Succeeded { .. } => StepState::Succeeded,
            Transition::Failed { .. } => StepState::Failed,
            Transition::Skipped { .. } => StepState::Skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("unknown step: {0}")]
    UnknownStep(String),
    #[error("step {step}: illegal transition {from} -> {to}")]
    InvalidTransition {
        step: String,
        from: StepState,
        to: StepState,
    },
}

struct RunSlot {
    status: RunStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

pub struct ExecutionTracker {
    run_id: Uuid,
    plan_id: String,
    strategy: Strategy,
    groups: Vec<Vec<String>>,
    index: HashMap<String, StepIndex>,
    slots: Vec<RwLock<StepResult>>,
    run: RwLock<RunSlot>,
}

impl ExecutionTracker {
    pub fn new(run_id: Uuid, plan: &Plan) -> Self {
        let concurrency = plan.concurrency_groups();
        let mut group_of = vec![0usize; plan.len()];
        for g in &concurrency {
            for s in &g.steps {
                group_of[*s] = g.index;
            }
        }
        let groups = concurrency
            .iter()
            .map(|g| g.steps.iter().map(|s| plan.step(*s).id.clone()).collect())
            .collect();

        let slots = plan
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| {
                RwLock::new(StepResult {
                    id: s.id.clone(),
                    state: StepState::Pending,
                    depends_on: s.depends_on.clone(),
                    group: group_of[i],
                    reference: s.reference.clone(),
                    description: s.description.clone(),
                    attempts: 0,
                    started_at: None,
                    finished_at: None,
                    output: None,
                    error: None,
                    skip_reason: None,
                    log: None,
                })
            })
            .collect();

        Self {
            run_id,
            plan_id: plan.id.clone(),
            strategy: plan.strategy,
            groups,
            index: plan
                .steps
                .iter()
                .enumerate()
                .map(|(i, s)| (s.id.clone(), i))
                .collect(),
            slots,
            run: RwLock::new(RunSlot {
                status: RunStatus::Pending,
                started_at: None,
                finished_at: None,
            }),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record(&self, step_id: &str, transition: Transition) -> Result<(), TrackerError> {
        let idx = self
            .index
            .get(step_id)
            .copied()
            .ok_or_else(|| TrackerError::UnknownStep(step_id.to_string()))?;
        self.record_at(idx, transition)
    }

    /// Validates and applies one transition under the step's own lock.
    pub fn record_at(&self, idx: StepIndex, transition: Transition) -> Result<(), TrackerError> {
        let slot = self
            .slots
            .get(idx)
            .ok_or_else(|| TrackerError::UnknownStep(format!("#{idx}")))?;
        let mut s = write(slot);
        let to = transition.target();
        if !s.state.can_transition_to(to) {
            return Err(TrackerError::InvalidTransition {
                step: s.id.clone(),
                from: s.state,
                to,
            });
        }
        tracing::debug!(run_id = %self.run_id, step = %s.id, from = %s.state, %to, "step transition");

        let now = Utc::now();
        s.state = to;
        match transition {
            Transition::Ready => {}
            Transition::Running { attempt } => {
                s.attempts = attempt;
                s.started_at.get_or_insert(now);
            }
            Transition::Retrying { error, .. } => s.error = Some(error),
            Transition::Succeeded { output } => {
                s.output = output;
                s.error = None;
                s.finished_at = Some(now);
            }
            Transition::Failed { error } => {
                s.error = Some(error);
                s.finished_at = Some(now);
            }
            Transition::Skipped { reason } => {
                s.skip_reason = Some(reason);
                s.finished_at = Some(now);
            }
        }
        Ok(())
    }

    /// Replaces the step's output tail; each attempt overwrites the previous one.
    pub fn record_log(&self, idx: StepIndex, log: String) {
        if let Some(slot) = self.slots.get(idx) {
            write(slot).log = Some(log);
        }
    }

    pub fn state(&self, idx: StepIndex) -> StepState {
        read(&self.slots[idx]).state
    }

    pub fn step_result(&self, idx: StepIndex) -> StepResult {
        read(&self.slots[idx]).clone()
    }

    pub fn mark_run_started(&self) {
        let mut run = write(&self.run);
        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
    }

    pub fn finish_run(&self, status: RunStatus) {
        let mut run = write(&self.run);
        run.status = status;
        run.finished_at = Some(Utc::now());
    }

    pub fn run_status(&self) -> RunStatus {
        read(&self.run).status
    }

    /// Consistent per step; steps are read one at a time.
    pub fn snapshot(&self) -> ExecutionRecord {
        let (status, started_at, finished_at) = {
            let run = read(&self.run);
            (run.status, run.started_at, run.finished_at)
        };
        ExecutionRecord {
            run_id: self.run_id,
            plan_id: self.plan_id.clone(),
            strategy: self.strategy,
            status,
            started_at,
            finished_at,
            steps: self.slots.iter().map(|s| read(s).clone()).collect(),
            groups: self.groups.clone(),
        }
    }

    pub fn graph(&self) -> VisualizationGraph {
        VisualizationGraph::from_record(&self.snapshot())
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> Plan {
        planwright_core::load_plan_str("id: p\nsteps:\n  - id: a\n  - id: b\n    depends_on: [a]\n")
            .unwrap()
    }

    #[test]
    fn rejects_non_monotonic_transitions() {
        let t = ExecutionTracker::new(Uuid::new_v4(), &plan());
        t.record("a", Transition::Ready).unwrap();
        t.record("a", Transition::Running { attempt: 1 }).unwrap();
        t.record("a", Transition::Succeeded { output: None }).unwrap();

        let err = t.record("a", Transition::Running { attempt: 2 }).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition { from: StepState::Succeeded, .. }));
        assert!(matches!(
            t.record("b", Transition::Running { attempt: 1 }),
            Err(TrackerError::InvalidTransition { from: StepState::Pending, .. })
        ));
        assert_eq!(
            t.record("zzz", Transition::Ready),
            Err(TrackerError::UnknownStep("zzz".to_string()))
        );
    }

    #[test]
    fn snapshot_reflects_recorded_state() {
        let t = ExecutionTracker::new(Uuid::new_v4(), &plan());
        t.mark_run_started();
        t.record("a", Transition::Ready).unwrap();
        t.record("a", Transition::Running { attempt: 1 }).unwrap();
        t.record(
            "a",
            Transition::Failed {
                error: StepError::new(StepErrorKind::Execution, "boom"),
            },
        )
        .unwrap();
        t.record(
            "b",
            Transition::Skipped {
                reason: SkipReason::UpstreamFailed {
                    step: "a".to_string(),
                },
            },
        )
        .unwrap();
        t.finish_run(RunStatus::Failed);

        let rec = t.snapshot();
        assert_eq!(rec.status, RunStatus::Failed);
        assert_eq!(rec.failed_steps(), vec!["a"]);
        let b = rec.step("b").unwrap();
        assert_eq!(b.state, StepState::Skipped);
        assert_eq!(b.depends_on, vec!["a"]);
        assert_eq!(rec.groups, vec![vec!["a"], vec!["b"]]);
    }
}
