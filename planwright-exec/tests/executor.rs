use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use planwright_exec::executor::{
    ControlError, MetricsCollector, MetricsEventSink, NoOpEventSink,
};
use planwright_exec::secrets::{
    KeySource, SecretError, SecretValue, Sha256Vault, StaticKeySource, VaultCipher,
};
use planwright_exec::tracker::{SkipReason, StepErrorKind};
use planwright_exec::{
    ActionContext, ActionError, ActionOutput, ActionRunner, ExecutorConfig, ExecutorError,
    PlanExecutor, RunOptions, RunStatus, StepState,
};
use serde_json::{json, Value as JsonValue};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Recorder {
    started: Mutex<Vec<String>>,
    seen: Mutex<HashMap<String, BTreeMap<String, JsonValue>>>,
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Recorder {
    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Behaviour is driven by the step's action payload.
struct ScriptedRunner {
    recorder: Arc<Recorder>,
}

impl ScriptedRunner {
    async fn act(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let a = &ctx.action;
        if let Some(name) = a["log_var"].as_str() {
            let v = ctx.variables.get(name).cloned().unwrap_or(JsonValue::Null);
            ctx.log.push_line("starting");
            ctx.log.push_line(&format!("{name}={}", v.as_str().unwrap_or("")));
        }
        if let Some(ms) = a["sleep_ms"].as_u64() {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if a["wait_cancel"] == json!(true) {
            ctx.cancel.cancelled().await;
            return Err(ActionError::Cancelled);
        }
        if a["panic"] == json!(true) {
            panic!("scripted panic");
        }
        if let Some(n) = a["fail_times"].as_u64() {
            if u64::from(ctx.attempt) <= n {
                return Err(ActionError::failed(format!("attempt {} failed", ctx.attempt)));
            }
        }
        if a["fail"] == json!(true) {
            return Err(ActionError::failed("exit status 1"));
        }
        if let Some(name) = a["echo"].as_str() {
            let v = ctx.variables.get(name).cloned().unwrap_or(JsonValue::Null);
            return Ok(ActionOutput::with_summary(format!("echo {}", v.as_str().unwrap_or(""))));
        }
        Ok(ActionOutput::with_summary(format!("{} done", ctx.step_id)))
    }
}

#[async_trait]
impl ActionRunner for ScriptedRunner {
    async fn run(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        self.recorder.started.lock().unwrap().push(ctx.step_id.clone());
        self.recorder
            .seen
            .lock()
            .unwrap()
            .insert(ctx.step_id.clone(), ctx.variables.values.clone());
        let now = self.recorder.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder.max.fetch_max(now, Ordering::SeqCst);
        let result = self.act(&ctx).await;
        self.recorder.current.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Panics on the first key lookup and answers "pw" afterwards.
#[derive(Default)]
struct CrashOnceKeys {
    lookups: AtomicUsize,
}

#[async_trait]
impl KeySource for CrashOnceKeys {
    async fn key(&self, _key_id: &str) -> Result<SecretValue, SecretError> {
        let n = self.lookups.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        if n == 0 {
            panic!("key source crashed");
        }
        Ok(SecretValue::from("pw"))
    }
}

fn executor() -> (PlanExecutor, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let exec = PlanExecutor::new(Arc::new(ScriptedRunner {
        recorder: recorder.clone(),
    }));
    (exec, recorder)
}

fn no_keys() -> Arc<StaticKeySource> {
    Arc::new(StaticKeySource::new())
}

fn sealed(key_id: &str, password: &str, plaintext: &str) -> String {
    Sha256Vault
        .seal(key_id, &SecretValue::from(password), plaintext.as_bytes())
        .to_envelope()
}

#[tokio::test(start_paused = true)]
async fn sequential_chain_runs_in_dependency_order_one_at_a_time() {
    let (exec, recorder) = executor();
    let doc = r#"
id: chain
strategy: sequential
steps:
  - id: d
    depends_on: [c]
    action: { sleep_ms: 5 }
  - id: c
    depends_on: [b]
    action: { sleep_ms: 5 }
  - id: b
    depends_on: [a]
    action: { sleep_ms: 5 }
  - id: a
    action: { sleep_ms: 5 }
"#;
    let record = exec.run(doc, no_keys()).await.unwrap();

    assert_eq!(record.status, RunStatus::Succeeded);
    assert_eq!(recorder.started(), vec!["a", "b", "c", "d"]);
    assert_eq!(recorder.max(), 1);
    assert!(record.steps.iter().all(|s| s.state == StepState::Succeeded));
    assert_eq!(record.step("a").unwrap().output.as_deref(), Some("a done"));
}

#[tokio::test(start_paused = true)]
async fn sequential_breaks_ties_by_declaration_order() {
    let (exec, recorder) = executor();
    let doc = "id: p\nsteps:\n  - id: z\n  - id: y\n  - id: x\n";
    exec.run(doc, no_keys()).await.unwrap();
    assert_eq!(recorder.started(), vec!["z", "y", "x"]);
}

#[tokio::test(start_paused = true)]
async fn rolling_batch_never_exceeds_batch_size() {
    let (exec, recorder) = executor();
    let mut doc = String::from("id: batch\nstrategy: rolling-batch[2]\nsteps:\n");
    for i in 0..7 {
        doc.push_str(&format!("  - id: s{i}\n    action: {{ sleep_ms: {} }}\n", 10 + i));
    }
    let record = exec.run(&doc, no_keys()).await.unwrap();

    assert_eq!(record.status, RunStatus::Succeeded);
    assert_eq!(recorder.max(), 2);
    assert_eq!(recorder.started().len(), 7);
    assert_eq!(record.groups.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn max_parallel_caps_parallel_strategy() {
    let recorder = Arc::new(Recorder::default());
    let exec = PlanExecutor::new(Arc::new(ScriptedRunner {
        recorder: recorder.clone(),
    }))
    .with_config(ExecutorConfig {
        max_parallel: Some(3),
        ..ExecutorConfig::default()
    });
    let mut doc = String::from("id: wide\nstrategy: parallel\nsteps:\n");
    for i in 0..8 {
        doc.push_str(&format!("  - id: s{i}\n    action: {{ sleep_ms: 10 }}\n"));
    }
    exec.run(&doc, no_keys()).await.unwrap();
    assert_eq!(recorder.max(), 3);
}

const ABC: &str = r#"
id: abc
strategy: parallel
steps:
  - id: A
    action: { sleep_ms: 5, fail: FAIL }
  - id: B
    depends_on: [A]
    action: { sleep_ms: 20 }
  - id: C
    depends_on: [A]
    action: { sleep_ms: 20 }
"#;

#[tokio::test(start_paused = true)]
async fn parallel_runs_siblings_together_after_their_dependency() {
    let (exec, recorder) = executor();
    let record = exec
        .run(&ABC.replace("FAIL", "false"), no_keys())
        .await
        .unwrap();

    assert_eq!(record.status, RunStatus::Succeeded);
    assert_eq!(recorder.started()[0], "A");
    assert_eq!(recorder.max(), 2);
    assert_eq!(record.groups, vec![vec!["A"], vec!["B", "C"]]);
}

#[tokio::test(start_paused = true)]
async fn failed_dependency_skips_dependents_and_fails_run() {
    let (exec, recorder) = executor();
    let record = exec
        .run(&ABC.replace("FAIL", "true"), no_keys())
        .await
        .unwrap();

    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.failed_steps(), vec!["A"]);
    assert_eq!(recorder.started(), vec!["A"]);
    for id in ["B", "C"] {
        let s = record.step(id).unwrap();
        assert_eq!(s.state, StepState::Skipped);
        assert_eq!(
            s.skip_reason,
            Some(SkipReason::UpstreamFailed {
                step: "A".to_string()
            })
        );
        assert_eq!(s.attempts, 0);
    }
    let a = record.step("A").unwrap();
    assert_eq!(a.error.as_ref().unwrap().kind, StepErrorKind::Execution);
    assert_eq!(a.error.as_ref().unwrap().message, "exit status 1");
}

#[tokio::test(start_paused = true)]
async fn failure_cascade_spares_unrelated_branches() {
    let (exec, _recorder) = executor();
    let doc = r#"
id: branches
strategy: parallel
steps:
  - id: a
    action: { fail: true }
  - id: b
    depends_on: [a]
  - id: c
    depends_on: [b]
  - id: x
    action: { sleep_ms: 30 }
  - id: y
    depends_on: [x]
  - id: z
    action: { fail: true, sleep_ms: 40 }
"#;
    let record = exec.run(doc, no_keys()).await.unwrap();

    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.step("b").unwrap().state, StepState::Skipped);
    assert_eq!(record.step("c").unwrap().state, StepState::Skipped);
    assert_eq!(
        record.step("c").unwrap().skip_reason,
        Some(SkipReason::UpstreamFailed {
            step: "a".to_string()
        })
    );
    assert_eq!(record.step("x").unwrap().state, StepState::Succeeded);
    assert_eq!(record.step("y").unwrap().state, StepState::Succeeded);
    assert_eq!(record.step("z").unwrap().state, StepState::Failed);
    assert_eq!(record.failed_steps(), vec!["a", "z"]);
}

#[tokio::test]
async fn unknown_key_fails_only_the_owning_step() {
    let (exec, _recorder) = executor();
    let doc = json!({
        "id": "vault",
        "strategy": "parallel",
        "steps": [
            {
                "id": "uses_secret",
                "variables": { "token": sealed("missing-key", "pw", "s3cret") }
            },
            { "id": "sibling" },
            { "id": "after_sibling", "depends_on": ["sibling"] }
        ]
    })
    .to_string();

    let record = exec.run(&doc, no_keys()).await.unwrap();

    let failed = record.step("uses_secret").unwrap();
    assert_eq!(failed.state, StepState::Failed);
    assert_eq!(failed.error.as_ref().unwrap().kind, StepErrorKind::KeyNotFound);
    assert!(failed.error.as_ref().unwrap().message.contains("missing-key"));
    assert_eq!(record.step("sibling").unwrap().state, StepState::Succeeded);
    assert_eq!(record.step("after_sibling").unwrap().state, StepState::Succeeded);
    assert_eq!(record.status, RunStatus::Failed);
}

#[tokio::test]
async fn variables_reach_the_action_and_secrets_are_masked() {
    let (exec, recorder) = executor();
    let keys = Arc::new(StaticKeySource::new().with_key("prod", "hunter2"));
    let doc = json!({
        "id": "vars",
        "variables": {
            "name": "world",
            "greeting": "hello {{ name | upper }}",
            "token": sealed("prod", "hunter2", "tok-123")
        },
        "steps": [
            { "id": "greet", "action": { "echo": "greeting" } },
            {
                "id": "leak",
                "action": { "echo": "auth" },
                "variables": { "auth": "Bearer {{ token }}" }
            }
        ]
    })
    .to_string();

    let record = exec.run(&doc, keys).await.unwrap();
    assert_eq!(record.status, RunStatus::Succeeded);

    let seen = recorder.seen.lock().unwrap().clone();
    assert_eq!(seen["greet"]["greeting"], json!("hello WORLD"));
    assert_eq!(seen["leak"]["auth"], json!("Bearer tok-123"));

    assert_eq!(record.step("greet").unwrap().output.as_deref(), Some("echo hello WORLD"));
    let leaked = record.step("leak").unwrap().output.clone().unwrap();
    assert!(!leaked.contains("tok-123"));
    assert!(leaked.contains("********"));

    let json = serde_json::to_string(&record).unwrap();
    assert!(!json.contains("tok-123"));
}

#[tokio::test]
async fn secret_template_failures_keep_the_plaintext_out_of_the_record() {
    let (exec, recorder) = executor();
    let keys = Arc::new(StaticKeySource::new().with_key("prod", "pw"));
    let doc = json!({
        "id": "sealed-template",
        "strategy": "parallel",
        "steps": [
            { "id": "a", "variables": { "token": sealed("prod", "pw", "xy{{ Sup3r-S3cret }}") } },
            { "id": "b", "variables": { "token": sealed("prod", "pw", "{{ leaked_name }}") } }
        ]
    })
    .to_string();

    let record = exec.run(&doc, keys).await.unwrap();

    for id in ["a", "b"] {
        let step = record.step(id).unwrap();
        assert_eq!(step.state, StepState::Failed);
        assert_eq!(step.attempts, 1);
        assert_eq!(step.error.as_ref().unwrap().kind, StepErrorKind::Template);
    }
    assert!(recorder.started().is_empty());
    let json = serde_json::to_string(&record).unwrap();
    assert!(!json.contains("Sup3r-S3cret"), "{json}");
    assert!(!json.contains("leaked_name"), "{json}");
}

#[tokio::test(start_paused = true)]
async fn a_panicking_key_source_does_not_stall_steps_sharing_the_secret() {
    let (exec, _recorder) = executor();
    let doc = json!({
        "id": "shared-secret",
        "strategy": "parallel",
        "variables": { "token": sealed("prod", "pw", "tok") },
        "steps": [
            { "id": "a", "action": { "echo": "token" } },
            { "id": "b", "action": { "echo": "token" } }
        ]
    })
    .to_string();

    let record = tokio::time::timeout(
        Duration::from_secs(3),
        exec.run(&doc, Arc::new(CrashOnceKeys::default())),
    )
    .await
    .unwrap()
    .unwrap();

    let states: Vec<_> = ["a", "b"].iter().map(|id| record.step(id).unwrap().state).collect();
    assert!(states.contains(&StepState::Failed), "{states:?}");
    assert!(states.contains(&StepState::Succeeded), "{states:?}");
    assert_eq!(record.status, RunStatus::Failed);
}

#[tokio::test]
async fn output_tail_is_kept_masked_even_when_the_step_fails() {
    let (exec, _recorder) = executor();
    let keys = Arc::new(StaticKeySource::new().with_key("prod", "pw"));
    let doc = json!({
        "id": "tail",
        "variables": { "token": sealed("prod", "pw", "tok-456") },
        "steps": [
            { "id": "noisy", "action": { "log_var": "token", "fail": true } },
            { "id": "quiet", "action": {} }
        ]
    })
    .to_string();

    let record = exec.run(&doc, keys).await.unwrap();

    let noisy = record.step("noisy").unwrap();
    assert_eq!(noisy.state, StepState::Failed);
    assert_eq!(noisy.log.as_deref(), Some("starting\ntoken=********"));
    assert!(record.step("quiet").unwrap().log.is_none());
    assert!(!serde_json::to_string(&record).unwrap().contains("tok-456"));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let (exec, recorder) = executor();
    let doc = r#"
id: flaky
steps:
  - id: s
    action: { fail_times: 2 }
    retry: { max_retries: 3, backoff: { kind: fixed, delay_ms: 50 } }
"#;
    let record = exec.run(doc, no_keys()).await.unwrap();

    let s = record.step("s").unwrap();
    assert_eq!(s.state, StepState::Succeeded);
    assert_eq!(s.attempts, 3);
    assert!(s.error.is_none());
    assert_eq!(recorder.started().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_max_retries() {
    let (exec, recorder) = executor();
    let doc = r#"
id: flaky
steps:
  - id: s
    action: { fail_times: 10 }
    retry: { max_retries: 1, backoff: { kind: exponential, base_ms: 10 }, jitter: true }
"#;
    let record = exec.run(doc, no_keys()).await.unwrap();

    let s = record.step("s").unwrap();
    assert_eq!(s.state, StepState::Failed);
    assert_eq!(s.attempts, 2);
    assert_eq!(s.error.as_ref().unwrap().message, "attempt 2 failed");
    assert_eq!(recorder.started().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn template_errors_are_not_retried() {
    let (exec, recorder) = executor();
    let doc = r#"
id: broken
steps:
  - id: s
    variables: { url: "https://{{ host }}/api" }
    retry: { max_retries: 5 }
"#;
    let record = exec.run(doc, no_keys()).await.unwrap();

    let s = record.step("s").unwrap();
    assert_eq!(s.state, StepState::Failed);
    assert_eq!(s.attempts, 1);
    assert_eq!(s.error.as_ref().unwrap().kind, StepErrorKind::UndefinedVariable);
    assert!(recorder.started().is_empty());
}

#[tokio::test(start_paused = true)]
async fn step_timeout_fails_the_attempt() {
    let (exec, _recorder) = executor();
    let doc = r#"
id: slow
steps:
  - id: s
    action: { sleep_ms: 5000 }
    timeout_secs: 1
"#;
    let record = exec.run(doc, no_keys()).await.unwrap();
    let s = record.step("s").unwrap();
    assert_eq!(s.state, StepState::Failed);
    assert_eq!(s.error.as_ref().unwrap().kind, StepErrorKind::Timeout);
}

#[tokio::test]
async fn panicking_action_fails_its_step() {
    let (exec, _recorder) = executor();
    let doc = "id: p\nstrategy: parallel\nsteps:\n  - id: bad\n    action: { panic: true }\n  - id: good\n";
    let record = exec.run(doc, no_keys()).await.unwrap();

    let bad = record.step("bad").unwrap();
    assert_eq!(bad.state, StepState::Failed);
    assert_eq!(bad.error.as_ref().unwrap().kind, StepErrorKind::Execution);
    assert_eq!(record.step("good").unwrap().state, StepState::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn run_options_filter_steps_and_count_as_satisfied() {
    let (exec, recorder) = executor();
    let plan = Arc::new(
        exec.verify("id: p\nsteps:\n  - id: a\n  - id: b\n    depends_on: [a]\n  - id: c\n    depends_on: [b]\n  - id: d\n    depends_on: [c]\n")
            .unwrap(),
    );

    let opts = RunOptions {
        skip: vec!["b".into()],
        end_at: Some("c".into()),
        ..Default::default()
    };
    let record = exec
        .run_plan(plan.clone(), no_keys(), &opts, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(record.status, RunStatus::Succeeded);
    assert_eq!(recorder.started(), vec!["a", "c"]);
    assert_eq!(record.step("b").unwrap().skip_reason, Some(SkipReason::Filtered));
    assert_eq!(record.step("d").unwrap().skip_reason, Some(SkipReason::Filtered));

    let err = exec
        .run_plan(
            plan,
            no_keys(),
            &RunOptions {
                only: vec!["zz".into()],
                ..Default::default()
            },
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::UnknownStep(id) if id == "zz"));
}

#[tokio::test(start_paused = true)]
async fn a_step_waits_for_dependencies_behind_a_filtered_step() {
    let (exec, recorder) = executor();
    let plan = Arc::new(
        exec.verify(
            "id: p\nstrategy: parallel\nsteps:\n  - id: a\n    action: { sleep_ms: 20 }\n  - id: f\n    depends_on: [a]\n  - id: c\n    depends_on: [f]\n",
        )
        .unwrap(),
    );
    let opts = RunOptions {
        skip: vec!["f".into()],
        ..Default::default()
    };
    exec.run_plan(plan, no_keys(), &opts, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(recorder.started(), vec!["a", "c"]);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_dispatch_and_returns_final_record() {
    let (exec, _recorder) = executor();
    let plan = Arc::new(
        exec.verify(
            "id: p\nsteps:\n  - id: a\n    action: { wait_cancel: true }\n  - id: b\n    depends_on: [a]\n  - id: c\n",
        )
        .unwrap(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = exec
        .run_plan(plan, no_keys(), &RunOptions::default(), cancel)
        .await
        .unwrap_err();
    let record = err.record().unwrap();

    assert_eq!(record.status, RunStatus::Cancelled);
    let a = record.step("a").unwrap();
    assert_eq!(a.state, StepState::Failed);
    assert_eq!(a.error.as_ref().unwrap().kind, StepErrorKind::Cancelled);
    assert_eq!(record.step("b").unwrap().skip_reason, Some(SkipReason::Cancelled));
    assert_eq!(record.step("c").unwrap().skip_reason, Some(SkipReason::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn ready_steps_can_be_skipped_before_dispatch() {
    let (exec, recorder) = executor();
    let plan = Arc::new(
        exec.verify(
            "id: p\nstrategy: sequential\nsteps:\n  - id: hold\n    action: { wait_cancel: true }\n  - id: x\n  - id: y\n    depends_on: [x]\n",
        )
        .unwrap(),
    );
    let prepared = exec.prepare(plan, no_keys(), &RunOptions::default()).unwrap();
    let control = prepared.control();
    let tracker = prepared.tracker();
    let cancel = CancellationToken::new();

    let operator = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(tracker.state(1), StepState::Ready);
        control.skip_step("x").await.unwrap();
        assert_eq!(tracker.state(2), StepState::Ready);
        assert!(matches!(
            control.skip_step("missing").await,
            Err(ControlError::UnknownStep(_))
        ));
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(exec.execute(prepared, cancel.clone()), operator);

    let err = result.unwrap_err();
    let record = err.record().unwrap();
    assert_eq!(record.step("x").unwrap().skip_reason, Some(SkipReason::Manual));
    assert_eq!(record.step("y").unwrap().skip_reason, Some(SkipReason::Cancelled));
    assert_eq!(recorder.started(), vec!["hold"]);
    assert_eq!(control.skip_step("y").await, Err(ControlError::Closed));
}

#[tokio::test(start_paused = true)]
async fn steps_ignoring_cancellation_fail_after_grace() {
    let recorder = Arc::new(Recorder::default());
    let exec = PlanExecutor::new(Arc::new(ScriptedRunner { recorder }))
        .with_config(ExecutorConfig {
            cancel_grace: Duration::from_millis(100),
            ..ExecutorConfig::default()
        });
    let plan = Arc::new(
        exec.verify("id: p\nsteps:\n  - id: stubborn\n    action: { sleep_ms: 600000 }\n")
            .unwrap(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = exec
        .run_plan(plan, no_keys(), &RunOptions::default(), cancel)
        .await
        .unwrap_err();
    let s = err.record().unwrap().step("stubborn").unwrap().clone();
    assert_eq!(s.state, StepState::Failed);
    assert_eq!(s.error.unwrap().kind, StepErrorKind::Cancelled);
}

#[tokio::test]
async fn load_errors_abort_before_any_step_runs() {
    let (exec, recorder) = executor();
    let err = exec
        .run("id: p\nsteps:\n  - id: a\n    depends_on: [ghost]\n", no_keys())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::Load(_)));
    assert!(recorder.started().is_empty());
}

#[tokio::test(start_paused = true)]
async fn metrics_sink_counts_steps_attempts_and_decryptions() {
    let recorder = Arc::new(Recorder::default());
    let collector = Arc::new(MetricsCollector::new());
    let exec = PlanExecutor::new(Arc::new(ScriptedRunner { recorder })).with_event_sink(Arc::new(
        MetricsEventSink::new(collector.clone(), Arc::new(NoOpEventSink)),
    ));
    let keys = Arc::new(StaticKeySource::new().with_key("k", "pw"));
    let doc = json!({
        "id": "m",
        "variables": { "secret": sealed("k", "pw", "v") },
        "steps": [
            { "id": "a", "action": { "fail_times": 1 }, "retry": { "max_retries": 1 } },
            { "id": "b", "depends_on": ["a"] },
            { "id": "c", "action": { "fail": true } },
            { "id": "d", "depends_on": ["c"] }
        ]
    })
    .to_string();
    exec.run(&doc, keys).await.unwrap();

    let m = collector.get_metrics().await;
    assert_eq!(m.steps_succeeded, 2);
    assert_eq!(m.steps_failed, 1);
    assert_eq!(m.steps_skipped, 1);
    assert_eq!(m.steps_retried, 1);
    assert_eq!(m.attempts, 4);
    assert_eq!(m.attempts_failed, 2);
    assert_eq!(m.status, "failed");
    assert!(m.secret_decryptions >= 1);
}
