use std::sync::Arc;

use planwright_core::{load_plan_str, Plan};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::executor::action::ActionRunner;
use crate::executor::control::{Control, RunControl};
use crate::executor::events::{Event, EventSink, NoOpEventSink};
use crate::executor::options::RunOptions;
use crate::executor::result::ExecutorError;
use crate::executor::scheduler::Scheduler;
use crate::executor::types::ExecutorConfig;
use crate::resolve::{Resolver, RunContext};
use crate::secrets::{KeySource, RunSecrets, Sha256Vault, VaultCipher};
use crate::tracker::{ExecutionRecord, ExecutionTracker, RunStatus};

/// Entry point: document in, execution record out.
pub struct PlanExecutor {
    config: ExecutorConfig,
    runner: Arc<dyn ActionRunner>,
    cipher: Arc<dyn VaultCipher>,
    event_sink: Arc<dyn EventSink>,
}

/// A run whose tracker exists but whose steps have not started yet.
pub struct PreparedRun {
    plan: Arc<Plan>,
    tracker: Arc<ExecutionTracker>,
    resolver: Arc<Resolver>,
    excluded: Vec<bool>,
    control: RunControl,
    requests: mpsc::Receiver<Control>,
}

impl PreparedRun {
    pub fn run_id(&self) -> Uuid {
        self.tracker.run_id()
    }

    pub fn plan(&self) -> &Arc<Plan> {
        &self.plan
    }

    /// Live view of the run; stays valid after the run finishes.
    pub fn tracker(&self) -> Arc<ExecutionTracker> {
        self.tracker.clone()
    }

    /// Handle for skipping steps while the run is in progress. Requests made
    /// after the run finishes fail with [`ControlError::Closed`](crate::executor::ControlError::Closed).
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }
}

impl PlanExecutor {
    pub fn new(runner: Arc<dyn ActionRunner>) -> Self {
        Self {
            config: ExecutorConfig::default(),
            runner,
            cipher: Arc::new(Sha256Vault),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn VaultCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Loads and validates without running anything.
    pub fn verify(&self, document: &str) -> Result<Plan, ExecutorError> {
        Ok(load_plan_str(document)?)
    }

    pub async fn run(
        &self,
        document: &str,
        keys: Arc<dyn KeySource>,
    ) -> Result<ExecutionRecord, ExecutorError> {
        let plan = Arc::new(load_plan_str(document)?);
        self.run_plan(plan, keys, &RunOptions::default(), CancellationToken::new())
            .await
    }

    pub async fn run_plan(
        &self,
        plan: Arc<Plan>,
        keys: Arc<dyn KeySource>,
        options: &RunOptions,
        cancel: CancellationToken,
    ) -> Result<ExecutionRecord, ExecutorError> {
        let prepared = self.prepare(plan, keys, options)?;
        self.execute(prepared, cancel).await
    }

    /// Allocates the run id, tracker and run-scoped secret provider.
    pub fn prepare(
        &self,
        plan: Arc<Plan>,
        keys: Arc<dyn KeySource>,
        options: &RunOptions,
    ) -> Result<PreparedRun, ExecutorError> {
        let excluded = options.excluded(&plan)?;
        let run_id = Uuid::new_v4();
        let secrets = RunSecrets::new(run_id, keys, self.cipher.clone())
            .with_event_sink(self.event_sink.clone())
            .with_single_flight(self.config.secrets_single_flight);
        let resolver = Resolver::new(
            plan.clone(),
            Arc::new(secrets),
            RunContext::new(plan.id.clone(), run_id),
        );
        let (control, requests) = RunControl::channel(plan.clone());
        Ok(PreparedRun {
            tracker: Arc::new(ExecutionTracker::new(run_id, &plan)),
            resolver: Arc::new(resolver),
            plan,
            excluded,
            control,
            requests,
        })
    }

    pub async fn execute(
        &self,
        prepared: PreparedRun,
        cancel: CancellationToken,
    ) -> Result<ExecutionRecord, ExecutorError> {
        let PreparedRun {
            plan,
            tracker,
            resolver,
            excluded,
            control,
            mut requests,
        } = prepared;
        drop(control);
        let run_id = tracker.run_id();

        tracing::info!(%run_id, plan_id = %plan.id, strategy = %plan.strategy, steps = plan.len(), "run started");
        tracker.mark_run_started();
        self.event_sink
            .emit(Event::RunStarted {
                run_id,
                plan_id: plan.id.clone(),
            })
            .await;

        let scheduler = Scheduler {
            plan: plan.clone(),
            tracker: tracker.clone(),
            resolver,
            runner: self.runner.clone(),
            event_sink: self.event_sink.clone(),
            config: self.config.clone(),
        };
        let status = match scheduler.run(&excluded, &cancel, &mut requests).await {
            Ok(status) => status,
            Err(e) => {
                tracker.finish_run(RunStatus::Failed);
                return Err(e);
            }
        };

        tracker.finish_run(status);
        self.event_sink
            .emit(Event::RunFinished { run_id, status })
            .await;
        let record = tracker.snapshot();
        tracing::info!(
            %run_id,
            %status,
            failed = record.failed_steps().len(),
            "run finished"
        );

        if status == RunStatus::Cancelled {
            return Err(ExecutorError::Cancelled {
                record: Box::new(record),
            });
        }
        Ok(record)
    }
}
