use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::tracker::{RunStatus, SkipReason, StepErrorKind};

/// Lifecycle notifications. Never carries secret plaintext.
#[derive(Debug, Clone)]
pub enum Event {
    RunStarted {
        run_id: Uuid,
        plan_id: String,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
    },
    StepStarted {
        run_id: Uuid,
        step_id: String,
    },
    StepSucceeded {
        run_id: Uuid,
        step_id: String,
    },
    StepFailed {
        run_id: Uuid,
        step_id: String,
        kind: StepErrorKind,
    },
    StepSkipped {
        run_id: Uuid,
        step_id: String,
        reason: SkipReason,
    },
    StepRetryScheduled {
        run_id: Uuid,
        step_id: String,
        delay_ms: u64,
    },
    AttemptStarted {
        run_id: Uuid,
        step_id: String,
        attempt_no: u32,
    },
    AttemptFinished {
        run_id: Uuid,
        step_id: String,
        attempt_no: u32,
        succeeded: bool,
    },
    /// Audit trail for vault access; only the key id is recorded.
    SecretDecrypted {
        run_id: Uuid,
        key_id: String,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::RunStarted { .. } => "run.started",
            Event::RunFinished { .. } => "run.finished",
            Event::StepStarted { .. } => "step.started",
            Event::StepSucceeded { .. } => "step.succeeded",
            Event::StepFailed { .. } => "step.failed",
            Event::StepSkipped { .. } => "step.skipped",
            Event::StepRetryScheduled { .. } => "step.retry_scheduled",
            Event::AttemptStarted { .. } => "attempt.started",
            Event::AttemptFinished { .. } => "attempt.finished",
            Event::SecretDecrypted { .. } => "secret.decrypted",
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            Event::RunStarted { run_id, .. }
            | Event::RunFinished { run_id, .. }
            | Event::StepStarted { run_id, .. }
            | Event::StepSucceeded { run_id, .. }
            | Event::StepFailed { run_id, .. }
            | Event::StepSkipped { run_id, .. }
            | Event::StepRetryScheduled { run_id, .. }
            | Event::AttemptStarted { run_id, .. }
            | Event::AttemptFinished { run_id, .. }
            | Event::SecretDecrypted { run_id, .. } => *run_id,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut v = match self {
            Event::RunStarted { plan_id, .. } => json!({ "plan_id": plan_id }),
            Event::RunFinished { status, .. } => json!({ "status": status.as_str() }),
            Event::StepStarted { step_id, .. } | Event::StepSucceeded { step_id, .. } => {
                json!({ "step_id": step_id })
            }
            Event::StepFailed { step_id, kind, .. } => {
                json!({ "step_id": step_id, "kind": kind.as_str() })
            }
            Event::StepSkipped {
                step_id, reason, ..
            } => json!({ "step_id": step_id, "reason": reason }),
            Event::StepRetryScheduled {
                step_id, delay_ms, ..
            } => json!({ "step_id": step_id, "delay_ms": delay_ms }),
            Event::AttemptStarted {
                step_id,
                attempt_no,
                ..
            } => json!({ "step_id": step_id, "attempt_no": attempt_no }),
            Event::AttemptFinished {
                step_id,
                attempt_no,
                succeeded,
                ..
            } => json!({ "step_id": step_id, "attempt_no": attempt_no, "succeeded": succeeded }),
            Event::SecretDecrypted { key_id, .. } => json!({ "key_id": key_id }),
        };
        if let Some(obj) = v.as_object_mut() {
            obj.insert("type".to_string(), json!(self.kind()));
            obj.insert("run_id".to_string(), json!(self.run_id().to_string()));
        }
        v
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Default for CompositeEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl EventSink for CompositeEventSink {
    async fn emit(&self, event: Event) {
        for sink in &self.sinks {
            sink.emit(event.clone()).await;
        }
    }
}

/// One JSON object per line on stdout.
pub struct StdoutEventSink;

#[async_trait]
impl EventSink for StdoutEventSink {
    async fn emit(&self, event: Event) {
        println!("{}", serde_json::to_string(&event.to_json()).unwrap_or_default());
    }
}

/// Forwards events to `tracing` at info level (debug for audit events).
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: Event) {
        let run_id = event.run_id();
        match &event {
            Event::SecretDecrypted { key_id, .. } => {
                tracing::debug!(%run_id, %key_id, "secret decrypted");
            }
            Event::StepFailed { step_id, kind, .. } => {
                tracing::warn!(%run_id, %step_id, kind = kind.as_str(), "step failed");
            }
            other => {
                tracing::info!(%run_id, event = other.kind(), payload = %other.to_json(), "event");
            }
        }
    }
}

pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: Event) {}
}
