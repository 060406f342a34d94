use std::sync::Arc;

use planwright_core::{Plan, Step, StepIndex};
use tokio_util::sync::CancellationToken;

use crate::executor::action::{ActionContext, ActionError, ActionRunner};
use crate::executor::events::{Event, EventSink};
use crate::executor::log_tail::LogTail;
use crate::resolve::{ResolveError, Resolver};
use crate::retry::{decide_retry, RetryConfig, RetryDecision};
use crate::secrets::{mask_secrets, SecretError};
use crate::tracker::{ExecutionTracker, StepError, StepErrorKind, StepState, Transition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed(StepError),
}

/// One failed attempt.
struct Failure {
    error: StepError,
    retryable: bool,
}

impl Failure {
    fn from_resolve(e: &ResolveError, masked: String) -> Self {
        let kind = match e {
            ResolveError::UndefinedVariable(_) => StepErrorKind::UndefinedVariable,
            ResolveError::TemplateCycle { .. } => StepErrorKind::TemplateCycle,
            ResolveError::SecretTemplate { .. } => StepErrorKind::Template,
            ResolveError::Secret {
                source: SecretError::KeyNotFound(_),
                ..
            } => StepErrorKind::KeyNotFound,
            ResolveError::Secret { .. } => StepErrorKind::Secret,
        };
        Self {
            retryable: e.is_retryable(),
            error: StepError::new(kind, masked),
        }
    }

    fn from_action(e: &ActionError, masked: String) -> Self {
        let (kind, retryable) = match e {
            ActionError::Failed(_) => (StepErrorKind::Execution, true),
            ActionError::Timeout(_) => (StepErrorKind::Timeout, true),
            ActionError::Cancelled => (StepErrorKind::Cancelled, false),
        };
        Self {
            error: StepError::new(kind, masked),
            retryable,
        }
    }
}

/// Runs every attempt of a single step and records each transition.
pub struct Worker {
    pub idx: StepIndex,
    pub plan: Arc<Plan>,
    pub resolver: Arc<Resolver>,
    pub tracker: Arc<ExecutionTracker>,
    pub runner: Arc<dyn ActionRunner>,
    pub event_sink: Arc<dyn EventSink>,
    pub retry: RetryConfig,
    pub log_tail_lines: usize,
}

impl Worker {
    fn step(&self) -> &Step {
        self.plan.step(self.idx)
    }

    pub async fn run(&self, cancel: &CancellationToken) -> StepOutcome {
        let run_id = self.tracker.run_id();
        let step_id = self.step().id.clone();
        let mut attempt_no: u32 = 1;

        loop {
            self.transition(Transition::Running {
                attempt: attempt_no,
            });
            self.event_sink
                .emit(Event::AttemptStarted {
                    run_id,
                    step_id: step_id.clone(),
                    attempt_no,
                })
                .await;

            let result = self.attempt(attempt_no, cancel).await;

            self.event_sink
                .emit(Event::AttemptFinished {
                    run_id,
                    step_id: step_id.clone(),
                    attempt_no,
                    succeeded: result.is_ok(),
                })
                .await;

            let failure = match result {
                Ok(output) => {
                    self.transition(Transition::Succeeded { output });
                    tracing::debug!(%run_id, step = %step_id, attempt_no, "step succeeded");
                    self.event_sink
                        .emit(Event::StepSucceeded {
                            run_id,
                            step_id: step_id.clone(),
                        })
                        .await;
                    return StepOutcome::Succeeded;
                }
                Err(f) => f,
            };

            let retryable = failure.retryable && !cancel.is_cancelled();
            let decision = decide_retry(
                &self.retry,
                self.step().retry.as_ref(),
                attempt_no,
                retryable,
                || fastrand::u64(..),
            );
            let delay = match decision {
                RetryDecision::RetryAfter { delay, .. } => delay,
                RetryDecision::Stop { reason } => {
                    tracing::debug!(%run_id, step = %step_id, ?reason, "not retrying");
                    return self.fail(failure.error).await;
                }
            };

            tracing::debug!(
                %run_id,
                step = %step_id,
                attempt_no,
                delay_ms = delay.as_millis() as u64,
                error = %failure.error,
                "retry scheduled"
            );
            self.transition(Transition::Retrying {
                error: failure.error,
                delay,
            });
            self.event_sink
                .emit(Event::StepRetryScheduled {
                    run_id,
                    step_id: step_id.clone(),
                    delay_ms: delay.as_millis() as u64,
                })
                .await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return self
                        .fail(StepError::new(
                            StepErrorKind::Cancelled,
                            "run cancelled while waiting to retry",
                        ))
                        .await;
                }
            }
            attempt_no += 1;
        }
    }

    /// Resolve variables, then run the action under the step's timeout.
    async fn attempt(
        &self,
        attempt_no: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, Failure> {
        let step = self.step();
        let variables = self
            .resolver
            .resolve_step(self.idx, attempt_no)
            .await
            .map_err(|e| {
                let known = self.resolver.secrets().known_plaintexts();
                Failure::from_resolve(&e, mask_secrets(&e.to_string(), &known))
            })?;
        let masker = variables.clone();
        let log = LogTail::new(self.log_tail_lines);

        let ctx = ActionContext {
            run_id: self.tracker.run_id(),
            plan_id: self.plan.id.clone(),
            step_id: step.id.clone(),
            action: step.action.clone(),
            variables,
            attempt: attempt_no,
            cancel: cancel.child_token(),
            log: log.clone(),
        };
        let fut = self.runner.run(ctx);
        let result = match step.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(r) => r,
                Err(_) => Err(ActionError::Timeout(limit)),
            },
            None => fut.await,
        };

        if let Some(tail) = log.contents() {
            self.tracker.record_log(self.idx, masker.mask(&tail));
        }
        match result {
            Ok(out) => Ok(out.summary.map(|s| masker.mask(&s))),
            Err(e) => Err(Failure::from_action(&e, masker.mask(&e.to_string()))),
        }
    }

    async fn fail(&self, error: StepError) -> StepOutcome {
        tracing::warn!(
            run_id = %self.tracker.run_id(),
            step = %self.step().id,
            kind = error.kind.as_str(),
            message = %error.message,
            "step failed"
        );
        self.transition(Transition::Failed {
            error: error.clone(),
        });
        self.event_sink
            .emit(Event::StepFailed {
                run_id: self.tracker.run_id(),
                step_id: self.step().id.clone(),
                kind: error.kind,
            })
            .await;
        StepOutcome::Failed(error)
    }

    /// Fails a step whose attempt loop was abandoned (panic or grace expiry).
    pub async fn abandon(&self, error: StepError) -> StepOutcome {
        match self.tracker.state(self.idx) {
            StepState::Succeeded => return StepOutcome::Succeeded,
            StepState::Failed => {
                return StepOutcome::Failed(self.tracker.step_result(self.idx).error.unwrap_or(error))
            }
            StepState::Ready => self.transition(Transition::Running { attempt: 1 }),
            _ => {}
        }
        self.fail(error).await
    }

    fn transition(&self, t: Transition) {
        if let Err(e) = self.tracker.record_at(self.idx, t) {
            tracing::warn!(error = %e, "tracker rejected transition");
        }
    }
}
