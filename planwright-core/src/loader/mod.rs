//! Turns a [`PlanDocument`] into a validated, immutable [`Plan`].
//!
//! Checks run in a fixed order so the same document always reports the same
//! first error: plan id, strategy, step ids, plan scope, then per step its
//! scope, retry policy and dependencies, and finally acyclicity.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::error::{LoadError, ScopeParseError};
use crate::expressions::{is_templated, is_valid_name, parse_template};
use crate::graph::build_dependency_graph;
use crate::model::{
    Backoff, Plan, RetryPolicy, ScopeKind, ScopeValue, Step, StepIndex, Strategy,
    StrategyParseError, VariableScope,
};
use crate::parser::{parse_document_str, DocumentFormat};
use crate::types::{BackoffSpec, PlanDocument, RetrySpec, StepDocument, StrategySpec};
use crate::vault::{is_vault_marker, parse_envelope};

/// Ids the engine uses for synthetic start/end/root nodes.
pub const RESERVED_STEP_IDS: &[&str] = &["_s", "_e", "_root"];

pub fn load_plan_str(input: &str) -> Result<Plan, LoadError> {
    let parsed = parse_document_str(input, DocumentFormat::Auto)?;
    load_plan(&parsed.document)
}

pub fn load_plan(doc: &PlanDocument) -> Result<Plan, LoadError> {
    if doc.id.trim().is_empty() {
        return Err(LoadError::EmptyPlanId);
    }

    let strategy = parse_strategy(doc.strategy.as_ref())?;
    let index = index_step_ids(&doc.steps)?;
    let variables = parse_scope(ScopeKind::Plan, &doc.variables)?;

    let mut steps = Vec::with_capacity(doc.steps.len());
    for step in &doc.steps {
        steps.push(build_step(step, &index)?);
    }

    let graph = build_dependency_graph(steps.iter().map(|s| s.deps.clone()).collect())
        .map_err(|cycle| LoadError::DependencyCycle {
            cycle: cycle.into_iter().map(|i| steps[i].id.clone()).collect(),
        })?;

    tracing::debug!(
        plan_id = %doc.id,
        steps = steps.len(),
        strategy = %strategy,
        "plan loaded"
    );

    Ok(Plan::new(
        doc.id.clone(),
        doc.description.clone(),
        strategy,
        variables,
        steps,
        graph,
    ))
}

fn parse_strategy(spec: Option<&StrategySpec>) -> Result<Strategy, LoadError> {
    let parsed = match spec {
        None => return Ok(Strategy::default()),
        Some(StrategySpec::Name(name)) => Strategy::parse(name, None),
        Some(StrategySpec::Detailed { name, size }) => Strategy::parse(name, *size),
    };
    parsed.map_err(|e| match e {
        StrategyParseError::Unknown(name) => LoadError::UnknownStrategy(name),
        StrategyParseError::Invalid { name, reason } => LoadError::InvalidStrategy { name, reason },
    })
}

fn index_step_ids(steps: &[StepDocument]) -> Result<HashMap<&str, StepIndex>, LoadError> {
    let mut index = HashMap::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        let id = step.id.as_str();
        let reason = if id.trim().is_empty() {
            Some("must not be empty")
        } else if id.contains(',') {
            Some("must not contain ','")
        } else if RESERVED_STEP_IDS.contains(&id) {
            Some("is reserved")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(LoadError::InvalidStepId {
                id: id.to_string(),
                reason: reason.to_string(),
            });
        }
        if index.insert(id, i).is_some() {
            return Err(LoadError::DuplicateStep(id.to_string()));
        }
    }
    Ok(index)
}

fn build_step(doc: &StepDocument, index: &HashMap<&str, StepIndex>) -> Result<Step, LoadError> {
    let variables = parse_scope(ScopeKind::Step(doc.id.clone()), &doc.variables)?;
    let retry = doc
        .retry
        .as_ref()
        .map(|r| parse_retry(&doc.id, r))
        .transpose()?;

    let mut depends_on: Vec<String> = Vec::with_capacity(doc.depends_on.len());
    let mut deps = Vec::with_capacity(doc.depends_on.len());
    for dep in &doc.depends_on {
        let Some(&idx) = index.get(dep.as_str()) else {
            return Err(LoadError::UnknownDependency {
                step: doc.id.clone(),
                dependency: dep.clone(),
            });
        };
        if !deps.contains(&idx) {
            deps.push(idx);
            depends_on.push(dep.clone());
        }
    }

    Ok(Step {
        id: doc.id.clone(),
        action: doc.action.clone(),
        depends_on,
        deps,
        variables,
        retry,
        timeout: doc.timeout_secs.map(Duration::from_secs),
        description: doc.description.clone(),
        reference: doc.reference.clone(),
    })
}

pub fn parse_scope(
    kind: ScopeKind,
    raw: &BTreeMap<String, JsonValue>,
) -> Result<VariableScope, ScopeParseError> {
    let mut scope = VariableScope::new(kind);
    for (key, value) in raw {
        if !is_valid_name(key) {
            return Err(ScopeParseError::new(
                scope.kind.clone(),
                key,
                "variable names must match [A-Za-z_][A-Za-z0-9_]*",
            ));
        }
        let parsed = parse_scope_value(value)
            .map_err(|reason| ScopeParseError::new(scope.kind.clone(), key, reason))?;
        scope.entries.insert(key.clone(), parsed);
    }
    Ok(scope)
}

fn parse_scope_value(value: &JsonValue) -> Result<ScopeValue, String> {
    let JsonValue::String(s) = value else {
        return Ok(ScopeValue::Literal(value.clone()));
    };
    if is_vault_marker(s) {
        return parse_envelope(s)
            .map(ScopeValue::Vault)
            .map_err(|e| e.to_string());
    }
    if is_templated(s) {
        return parse_template(s)
            .map(ScopeValue::Template)
            .map_err(|e| e.to_string());
    }
    Ok(ScopeValue::Literal(value.clone()))
}

fn parse_retry(step: &str, spec: &RetrySpec) -> Result<RetryPolicy, LoadError> {
    let invalid = |reason: &str| LoadError::InvalidRetryPolicy {
        step: step.to_string(),
        reason: reason.to_string(),
    };
    let backoff = match &spec.backoff {
        None => None,
        Some(BackoffSpec::Fixed { delay_ms }) => {
            Some(Backoff::Fixed(Duration::from_millis(*delay_ms)))
        }
        Some(BackoffSpec::Exponential {
            base_ms,
            factor,
            max_ms,
        }) => {
            if !factor.is_finite() || *factor < 1.0 {
                return Err(invalid("exponential factor must be a finite number >= 1.0"));
            }
            if max_ms.is_some_and(|m| m < *base_ms) {
                return Err(invalid("max_ms must not be smaller than base_ms"));
            }
            Some(Backoff::Exponential {
                base: Duration::from_millis(*base_ms),
                factor: *factor,
                max: max_ms.map(Duration::from_millis),
            })
        }
    };
    Ok(RetryPolicy {
        max_retries: spec.max_retries,
        backoff,
        jitter: spec.jitter,
    })
}
