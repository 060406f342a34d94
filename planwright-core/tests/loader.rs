use planwright_core::{
    load_plan_str, parse_document_str, Backoff, DocumentFormat, LoadError, ScopeKind, ScopeValue,
    Strategy,
};

fn deploy_yaml() -> &'static str {
    r#"
id: deploy
description: roll out the web tier
strategy: "rolling-batch[2]"
variables:
  region: eu-west-1
  replicas: 3
  url: "https://{{ host }}/api"
  token: "$VAULT;1.0;prod\n0a0b0c0d"
steps:
  - id: build
    action: { command: "make build" }
  - id: push
    depends_on: [build]
    variables:
      host: registry.local
    retry:
      max_retries: 2
      backoff: { kind: exponential, base_ms: 100, factor: 2.0, max_ms: 2000 }
      jitter: true
    timeout_secs: 30
    reference: registry
  - id: deploy_a
    dependsOn: [push]
  - id: deploy_b
    depends_on: [push]
"#
}

#[test]
fn loads_yaml_plan() {
    let plan = load_plan_str(deploy_yaml()).unwrap();
    assert_eq!(plan.id, "deploy");
    assert_eq!(plan.strategy, Strategy::RollingBatch { size: 2 });
    assert_eq!(plan.step_ids(), vec!["build", "push", "deploy_a", "deploy_b"]);

    let push = plan.step_by_id("push").unwrap();
    assert_eq!(push.deps, vec![0]);
    assert_eq!(push.reference.as_deref(), Some("registry"));
    assert_eq!(push.timeout, Some(std::time::Duration::from_secs(30)));
    let retry = push.retry.as_ref().unwrap();
    assert_eq!(retry.max_retries, 2);
    assert!(retry.jitter);
    assert!(matches!(retry.backoff, Some(Backoff::Exponential { .. })));
    assert_eq!(push.variables.kind, ScopeKind::Step("push".to_string()));
}

#[test]
fn classifies_scope_entries() {
    let plan = load_plan_str(deploy_yaml()).unwrap();
    let vars = &plan.variables;
    assert!(matches!(vars.get("region"), Some(ScopeValue::Literal(v)) if v == "eu-west-1"));
    assert!(matches!(vars.get("replicas"), Some(ScopeValue::Literal(v)) if v == 3));
    assert!(matches!(vars.get("url"), Some(ScopeValue::Template(_))));
    match vars.get("token") {
        Some(ScopeValue::Vault(r)) => {
            assert_eq!(r.key_id, "prod");
            assert_eq!(r.ciphertext, vec![0x0a, 0x0b, 0x0c, 0x0d]);
        }
        other => panic!("expected vault entry, got {other:?}"),
    }
}

#[test]
fn parse_auto_detects_json() {
    let json = r#"{ "id": "p", "strategy": { "name": "rolling-batch", "size": 3 }, "steps": [ { "id": "a" } ] }"#;
    let parsed = parse_document_str(json, DocumentFormat::Auto).unwrap();
    assert_eq!(parsed.format, DocumentFormat::Json);
    let plan = load_plan_str(json).unwrap();
    assert_eq!(plan.strategy, Strategy::RollingBatch { size: 3 });
}

#[test]
fn strategy_defaults_to_sequential() {
    let plan = load_plan_str("id: p\nsteps:\n  - id: a\n").unwrap();
    assert_eq!(plan.strategy, Strategy::Sequential);
}

#[test]
fn rejects_unknown_fields_as_parse_error() {
    let err = load_plan_str("id: p\nsteps:\n  - id: a\n    needs: [b]\n").unwrap_err();
    assert!(matches!(err, LoadError::Parse(_)), "{err}");
}

#[test]
fn rejects_unknown_dependency() {
    let err = load_plan_str("id: p\nsteps:\n  - id: a\n    depends_on: [ghost]\n").unwrap_err();
    match err {
        LoadError::UnknownDependency { step, dependency } => {
            assert_eq!(step, "a");
            assert_eq!(dependency, "ghost");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn rejects_duplicate_and_reserved_ids() {
    let dup = load_plan_str("id: p\nsteps:\n  - id: a\n  - id: a\n").unwrap_err();
    assert!(matches!(dup, LoadError::DuplicateStep(ref id) if id == "a"));

    let reserved = load_plan_str("id: p\nsteps:\n  - id: _root\n").unwrap_err();
    assert!(matches!(reserved, LoadError::InvalidStepId { .. }));

    let comma = load_plan_str("id: p\nsteps:\n  - id: \"a,b\"\n").unwrap_err();
    assert_eq!(comma.kind(), "invalid_step_id");
}

#[test]
fn rejects_cycle_naming_members() {
    let doc = r#"
id: p
steps:
  - id: a
  - id: b
    depends_on: [d]
  - id: c
    depends_on: [b]
  - id: d
    depends_on: [c]
"#;
    match load_plan_str(doc).unwrap_err() {
        LoadError::DependencyCycle { cycle } => {
            assert_eq!(cycle, vec!["b", "d", "c", "b"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn self_dependency_is_a_cycle() {
    let err = load_plan_str("id: p\nsteps:\n  - id: a\n    depends_on: [a]\n").unwrap_err();
    assert_eq!(err.to_string(), "dependency cycle detected: a -> a");
}

#[test]
fn rejects_unknown_and_invalid_strategies() {
    let unknown = load_plan_str("id: p\nstrategy: random\nsteps: []\n").unwrap_err();
    assert!(matches!(unknown, LoadError::UnknownStrategy(ref s) if s == "random"));

    let zero = load_plan_str("id: p\nstrategy: \"rolling-batch[0]\"\nsteps: []\n").unwrap_err();
    assert!(matches!(zero, LoadError::InvalidStrategy { .. }));

    let missing = load_plan_str("id: p\nstrategy: { name: rolling-batch }\nsteps: []\n").unwrap_err();
    assert!(matches!(missing, LoadError::InvalidStrategy { .. }));
}

#[test]
fn rejects_malformed_scope_entries_naming_the_key() {
    let bad_template = load_plan_str("id: p\nvariables:\n  url: \"{{ host\"\nsteps: []\n").unwrap_err();
    match bad_template {
        LoadError::ScopeParse(e) => {
            assert_eq!(e.key, "url");
            assert_eq!(e.scope, ScopeKind::Plan);
        }
        other => panic!("unexpected error: {other}"),
    }

    let bad_filter = load_plan_str(
        "id: p\nsteps:\n  - id: a\n    variables:\n      x: \"{{ y | shout }}\"\n",
    )
    .unwrap_err();
    match bad_filter {
        LoadError::ScopeParse(e) => {
            assert_eq!(e.key, "x");
            assert_eq!(e.scope, ScopeKind::Step("a".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }

    let bad_vault = load_plan_str("id: p\nvariables:\n  t: \"$VAULT;1.0;k\\nnothex\"\nsteps: []\n")
        .unwrap_err();
    assert!(matches!(bad_vault, LoadError::ScopeParse(ref e) if e.key == "t"));

    let bad_name = load_plan_str("id: p\nvariables:\n  \"9lives\": 1\nsteps: []\n").unwrap_err();
    assert!(matches!(bad_name, LoadError::ScopeParse(ref e) if e.key == "9lives"));
}

#[test]
fn rejects_invalid_retry_policy() {
    let doc = r#"
id: p
steps:
  - id: a
    retry:
      max_retries: 1
      backoff: { kind: exponential, base_ms: 500, max_ms: 100 }
"#;
    assert!(matches!(
        load_plan_str(doc).unwrap_err(),
        LoadError::InvalidRetryPolicy { ref step, .. } if step == "a"
    ));
}

#[test]
fn rejects_empty_plan_id() {
    assert!(matches!(
        load_plan_str("id: \"\"\nsteps: []\n").unwrap_err(),
        LoadError::EmptyPlanId
    ));
}
