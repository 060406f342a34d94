use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::executor::{Event, EventSink};
use crate::tracker::RunStatus;

#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub run_id: Option<Uuid>,
    pub plan_id: String,
    pub status: String,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub total_duration: Option<Duration>,
    pub steps_total: usize,
    pub steps_succeeded: usize,
    pub steps_failed: usize,
    pub steps_skipped: usize,
    pub steps_retried: usize,
    pub attempts: usize,
    pub attempts_failed: usize,
    pub secret_decryptions: usize,
}

impl RunMetrics {
    pub fn start(&mut self, run_id: Uuid, plan_id: String) {
        self.run_id = Some(run_id);
        self.plan_id = plan_id;
        self.started_at = Some(Instant::now());
    }

    pub fn record_step_success(&mut self) {
        self.steps_succeeded += 1;
        self.steps_total += 1;
    }

    pub fn record_step_failure(&mut self) {
        self.steps_failed += 1;
        self.steps_total += 1;
    }

    pub fn record_step_skipped(&mut self) {
        self.steps_skipped += 1;
        self.steps_total += 1;
    }

    pub fn record_retry(&mut self) {
        self.steps_retried += 1;
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub fn record_attempt_failure(&mut self) {
        self.attempts_failed += 1;
    }

    pub fn record_decryption(&mut self) {
        self.secret_decryptions += 1;
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status.as_str().to_string();
        self.finished_at = Some(Instant::now());
        if let (Some(started), Some(finished)) = (self.started_at, self.finished_at) {
            self.total_duration = Some(finished.duration_since(started));
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id.map(|u| u.to_string()),
            "plan_id": self.plan_id,
            "status": self.status,
            "duration_ms": self.total_duration.map(|d| d.as_millis() as u64),
            "steps": {
                "total": self.steps_total,
                "succeeded": self.steps_succeeded,
                "failed": self.steps_failed,
                "skipped": self.steps_skipped,
                "retried": self.steps_retried,
            },
            "attempts": {
                "total": self.attempts,
                "failed": self.attempts_failed,
            },
            "secret_decryptions": self.secret_decryptions,
        })
    }
}

#[derive(Default)]
pub struct MetricsCollector {
    metrics: Mutex<RunMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, event: &Event) {
        let mut m = self.metrics.lock().await;
        match event {
            Event::RunStarted { run_id, plan_id } => m.start(*run_id, plan_id.clone()),
            Event::StepSucceeded { .. } => m.record_step_success(),
            Event::StepFailed { .. } => m.record_step_failure(),
            Event::StepSkipped { .. } => m.record_step_skipped(),
            Event::StepRetryScheduled { .. } => m.record_retry(),
            Event::AttemptStarted { .. } => m.record_attempt(),
            Event::AttemptFinished { succeeded, .. } => {
                if !succeeded {
                    m.record_attempt_failure();
                }
            }
            Event::SecretDecrypted { .. } => m.record_decryption(),
            Event::RunFinished { status, .. } => m.finish(*status),
            Event::StepStarted { .. } => {}
        }
    }

    pub async fn get_metrics(&self) -> RunMetrics {
        self.metrics.lock().await.clone()
    }
}

/// Updates a [`MetricsCollector`] and forwards every event to `base`.
pub struct MetricsEventSink {
    collector: Arc<MetricsCollector>,
    base: Arc<dyn EventSink>,
}

impl MetricsEventSink {
    pub fn new(collector: Arc<MetricsCollector>, base: Arc<dyn EventSink>) -> Self {
        Self { collector, base }
    }
}

#[async_trait]
impl EventSink for MetricsEventSink {
    async fn emit(&self, event: Event) {
        self.collector.record(&event).await;
        self.base.emit(event).await;
    }
}
