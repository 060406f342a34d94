//! Run registry for an external transport layer.
//!
//! Each submitted document becomes an independent run with its own tracker,
//! secret provider and cancellation token.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::executor::{ControlError, ExecutorError, PlanExecutor, RunControl, RunOptions};
use crate::secrets::KeySource;
use crate::tracker::{ExecutionRecord, ExecutionTracker, RunStatus, VisualizationGraph};

pub const DEFAULT_MAX_RETAINED_RUNS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("run not found: {0}")]
    RunNotFound(Uuid),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Control(#[from] ControlError),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub plan_id: String,
    pub status: RunStatus,
    pub submitted_at: DateTime<Utc>,
    pub steps_total: usize,
    pub steps_finished: usize,
    /// SHA-256 of the submitted document, hex encoded.
    pub digest: String,
}

struct RunEntry {
    run_id: Uuid,
    plan_id: String,
    digest: String,
    submitted_at: DateTime<Utc>,
    tracker: Arc<ExecutionTracker>,
    cancel: CancellationToken,
    control: RunControl,
    done: watch::Receiver<bool>,
}

impl RunEntry {
    fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    fn summary(&self) -> RunSummary {
        let record = self.tracker.snapshot();
        RunSummary {
            run_id: self.run_id,
            plan_id: self.plan_id.clone(),
            status: record.status,
            submitted_at: self.submitted_at,
            steps_total: record.steps.len(),
            steps_finished: record
                .steps
                .iter()
                .filter(|s| s.state.is_terminal())
                .count(),
            digest: self.digest.clone(),
        }
    }
}

pub struct PlanService {
    executor: Arc<PlanExecutor>,
    keys: Arc<dyn KeySource>,
    max_retained_runs: usize,
    runs: Mutex<VecDeque<RunEntry>>,
}

impl PlanService {
    pub fn new(executor: Arc<PlanExecutor>, keys: Arc<dyn KeySource>) -> Self {
        Self {
            executor,
            keys,
            max_retained_runs: DEFAULT_MAX_RETAINED_RUNS,
            runs: Mutex::new(VecDeque::new()),
        }
    }

    /// Finished runs kept for status queries; the oldest are evicted first.
    pub fn with_max_retained_runs(mut self, max: usize) -> Self {
        self.max_retained_runs = max;
        self
    }

    /// Starts a run in the background and returns its id.
    ///
    /// If a run of a byte-identical document is still in progress, its id is
    /// returned instead and nothing new is started. Load errors and unknown
    /// option ids are reported here, before anything is spawned. Must be
    /// called from within a tokio runtime.
    pub fn submit(&self, document: &str, options: &RunOptions) -> Result<Uuid, ServiceError> {
        let digest = hex::encode(Sha256::digest(document.as_bytes()));

        let mut runs = self.lock();
        if let Some(existing) = runs
            .iter()
            .find(|r| r.digest == digest && !r.is_finished())
        {
            tracing::info!(run_id = %existing.run_id, "reconnected to running plan");
            return Ok(existing.run_id);
        }

        let plan = Arc::new(self.executor.verify(document)?);
        let prepared = self
            .executor
            .prepare(plan.clone(), self.keys.clone(), options)?;
        let run_id = prepared.run_id();
        let tracker = prepared.tracker();
        let control = prepared.control();
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        let executor = self.executor.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            match executor.execute(prepared, token).await {
                Ok(_) | Err(ExecutorError::Cancelled { .. }) => {}
                Err(e) => tracing::warn!(%run_id, error = %e, "run aborted"),
            }
            let _ = done_tx.send(true);
        });

        runs.push_back(RunEntry {
            run_id,
            plan_id: plan.id.clone(),
            digest,
            submitted_at: Utc::now(),
            tracker,
            cancel,
            control,
            done: done_rx,
        });
        self.evict(&mut runs);
        Ok(run_id)
    }

    pub fn status(&self, run_id: Uuid) -> Result<ExecutionRecord, ServiceError> {
        self.with_run(run_id, |r| r.tracker.snapshot())
    }

    pub fn graph(&self, run_id: Uuid) -> Result<VisualizationGraph, ServiceError> {
        self.with_run(run_id, |r| r.tracker.graph())
    }

    /// Requests cancellation. Idempotent; a finished run is left as it is.
    pub fn cancel(&self, run_id: Uuid) -> Result<(), ServiceError> {
        self.with_run(run_id, |r| {
            tracing::info!(%run_id, "cancel requested");
            r.cancel.cancel();
        })
    }

    /// Skips a step that has not been dispatched yet; its dependents treat it
    /// as satisfied. Running, finished and filtered steps are refused.
    pub async fn skip_step(&self, run_id: Uuid, step_id: &str) -> Result<(), ServiceError> {
        let control = self.with_run(run_id, |r| r.control.clone())?;
        control.skip_step(step_id).await?;
        tracing::info!(%run_id, step = step_id, "step skipped on request");
        Ok(())
    }

    pub fn list(&self) -> Vec<RunSummary> {
        self.lock().iter().map(RunEntry::summary).collect()
    }

    /// Resolves once the run has finished and returns its final record.
    pub async fn wait(&self, run_id: Uuid) -> Result<ExecutionRecord, ServiceError> {
        let (mut done, tracker) =
            self.with_run(run_id, |r| (r.done.clone(), r.tracker.clone()))?;
        // A dropped sender means the run task is gone; its tracker is final.
        let _ = done.wait_for(|finished| *finished).await;
        Ok(tracker.snapshot())
    }

    fn with_run<T>(
        &self,
        run_id: Uuid,
        f: impl FnOnce(&RunEntry) -> T,
    ) -> Result<T, ServiceError> {
        self.lock()
            .iter()
            .find(|r| r.run_id == run_id)
            .map(f)
            .ok_or(ServiceError::RunNotFound(run_id))
    }

    fn evict(&self, runs: &mut VecDeque<RunEntry>) {
        let mut finished = runs.iter().filter(|r| r.is_finished()).count();
        while finished > self.max_retained_runs {
            let Some(pos) = runs.iter().position(RunEntry::is_finished) else {
                break;
            };
            if let Some(old) = runs.remove(pos) {
                tracing::debug!(run_id = %old.run_id, "evicted finished run");
            }
            finished -= 1;
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RunEntry>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }
}
