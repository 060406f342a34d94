//! Variable resolution over the step → plan scope chain.
//!
//! A [`Resolver`] belongs to exactly one run. It memoizes every
//! `(step, name)` pair for the run's lifetime; entries that depended on a
//! secret or on `pw.attempt` are dropped when a step starts a retry attempt so
//! the retry sees a fresh decryption.

mod error;
mod render;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use planwright_core::expressions::{
    is_templated, parse_template, Builtin, Expr, ExprHead, Filter, Template, Segment,
};
use planwright_core::{Plan, ScopeValue, SecretRef, StepIndex};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::secrets::{mask_json, mask_secrets, RunSecrets, SecretError, SecretValue};

pub use error::ResolveError;
use render::{apply_filter, stringify};

/// Values the `pw.` built-ins expand to. Fixed for the whole run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub plan_id: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(plan_id: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            plan_id: plan_id.into(),
            run_id,
            started_at: Utc::now(),
        }
    }
}

/// Every variable visible to one step, resolved together.
#[derive(Clone, Default)]
pub struct ResolvedVariables {
    pub values: BTreeMap<String, JsonValue>,
    /// Plaintexts (and secret-derived renderings) that must never leave the
    /// process unmasked.
    pub secrets: Vec<SecretValue>,
    secret_names: BTreeSet<String>,
}

impl ResolvedVariables {
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.values.get(name)
    }

    pub fn is_secret(&self, name: &str) -> bool {
        self.secret_names.contains(name)
    }

    pub fn mask(&self, text: &str) -> String {
        mask_secrets(text, &self.secrets)
    }

    /// The values with every secret plaintext masked; safe to log or persist.
    pub fn masked(&self) -> BTreeMap<String, JsonValue> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), mask_json(v, &self.secrets)))
            .collect()
    }
}

impl std::fmt::Debug for ResolvedVariables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedVariables")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .field("secret_names", &self.secret_names)
            .finish()
    }
}

#[derive(Clone)]
struct Resolved {
    value: JsonValue,
    secrets: Vec<SecretValue>,
    attempt_dependent: bool,
}

impl Resolved {
    fn plain(value: JsonValue) -> Self {
        Self {
            value,
            secrets: Vec::new(),
            attempt_dependent: false,
        }
    }

    fn absorb(&mut self, other: Resolved) {
        self.secrets.extend(other.secrets);
        self.attempt_dependent |= other.attempt_dependent;
    }

    fn is_volatile(&self) -> bool {
        self.attempt_dependent || !self.secrets.is_empty()
    }
}

/// State of one resolution pass (one step attempt).
struct Pass {
    step: StepIndex,
    attempt: u32,
    in_progress: Vec<String>,
}

pub struct Resolver {
    plan: Arc<Plan>,
    secrets: Arc<RunSecrets>,
    ctx: RunContext,
    memo: Mutex<HashMap<(StepIndex, String), Resolved>>,
}

impl Resolver {
    pub fn new(plan: Arc<Plan>, secrets: Arc<RunSecrets>, ctx: RunContext) -> Self {
        Self {
            plan,
            secrets,
            ctx,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn secrets(&self) -> &RunSecrets {
        &self.secrets
    }

    /// Resolves a single name as seen from `step`.
    pub async fn resolve(
        &self,
        step: StepIndex,
        name: &str,
        attempt: u32,
    ) -> Result<JsonValue, ResolveError> {
        let mut pass = self.begin(step, attempt);
        self.resolve_name(&mut pass, name).await.map(|r| r.value)
    }

    /// Resolves every name visible from `step` (its own scope over the plan's).
    pub async fn resolve_step(
        &self,
        step: StepIndex,
        attempt: u32,
    ) -> Result<ResolvedVariables, ResolveError> {
        let mut pass = self.begin(step, attempt);
        let names: BTreeSet<&str> = self
            .plan
            .step(step)
            .variables
            .names()
            .chain(self.plan.variables.names())
            .collect();

        let mut out = ResolvedVariables::default();
        for name in names {
            let r = self.resolve_name(&mut pass, name).await?;
            if !r.secrets.is_empty() {
                out.secret_names.insert(name.to_string());
            }
            out.secrets.extend(r.secrets);
            out.values.insert(name.to_string(), r.value);
        }
        Ok(out)
    }

    fn begin(&self, step: StepIndex, attempt: u32) -> Pass {
        if attempt > 1 {
            self.memo_lock()
                .retain(|(s, _), r| *s != step || !r.is_volatile());
        }
        Pass {
            step,
            attempt,
            in_progress: Vec::new(),
        }
    }

    fn memo_lock(&self) -> std::sync::MutexGuard<'_, HashMap<(StepIndex, String), Resolved>> {
        self.memo.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lookup(&self, step: StepIndex, name: &str) -> Option<&ScopeValue> {
        self.plan
            .step(step)
            .variables
            .get(name)
            .or_else(|| self.plan.variables.get(name))
    }

    fn resolve_name<'a>(
        &'a self,
        pass: &'a mut Pass,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Resolved, ResolveError>> {
        async move {
            let key = (pass.step, name.to_string());
            let hit = self.memo_lock().get(&key).cloned();
            if let Some(hit) = hit {
                return Ok(hit);
            }
            if let Some(pos) = pass.in_progress.iter().position(|n| n == name) {
                let mut chain = pass.in_progress[pos..].to_vec();
                chain.push(name.to_string());
                return Err(ResolveError::TemplateCycle { chain });
            }
            let Some(value) = self.lookup(pass.step, name) else {
                return Err(ResolveError::UndefinedVariable(name.to_string()));
            };

            pass.in_progress.push(name.to_string());
            let out = match value {
                ScopeValue::Literal(v) => Ok(Resolved::plain(v.clone())),
                ScopeValue::Template(t) => self.render(pass, t).await,
                ScopeValue::Vault(r) => self.open_vault(pass, name, r).await,
            };
            pass.in_progress.pop();

            let out = out?;
            self.memo_lock().insert(key, out.clone());
            Ok(out)
        }
        .boxed()
    }

    async fn render(&self, pass: &mut Pass, t: &Template) -> Result<Resolved, ResolveError> {
        if let Some(e) = t.as_single_expr() {
            return self.eval(pass, e).await;
        }
        let mut text = String::new();
        let mut acc = Resolved::plain(JsonValue::Null);
        for seg in &t.segments {
            match seg {
                Segment::Literal(s) => text.push_str(s),
                Segment::Expr(e) => {
                    let r = self.eval(pass, e).await?;
                    text.push_str(&stringify(&r.value));
                    acc.absorb(r);
                }
            }
        }
        acc.value = JsonValue::String(text);
        Ok(acc)
    }

    async fn eval(&self, pass: &mut Pass, e: &Expr) -> Result<Resolved, ResolveError> {
        let mut r = match &e.head {
            ExprHead::Variable(name) => match self.resolve_name(pass, name).await {
                Err(ResolveError::UndefinedVariable(missing))
                    if missing == *name
                        && e.filters.iter().any(|f| matches!(f, Filter::Default(_))) =>
                {
                    Resolved::plain(JsonValue::Null)
                }
                other => other?,
            },
            ExprHead::Builtin(b) => self.builtin(pass, *b),
        };
        for f in &e.filters {
            r.value = apply_filter(f, r.value);
        }
        Ok(r)
    }

    fn builtin(&self, pass: &Pass, b: Builtin) -> Resolved {
        match b {
            Builtin::PlanId => Resolved::plain(JsonValue::String(self.ctx.plan_id.clone())),
            Builtin::RunId => Resolved::plain(JsonValue::String(self.ctx.run_id.to_string())),
            Builtin::StepId => {
                Resolved::plain(JsonValue::String(self.plan.step(pass.step).id.clone()))
            }
            Builtin::Now => Resolved::plain(JsonValue::String(
                self.ctx
                    .started_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            Builtin::Attempt => Resolved {
                value: JsonValue::from(pass.attempt),
                secrets: Vec::new(),
                attempt_dependent: true,
            },
        }
    }

    async fn open_vault(
        &self,
        pass: &mut Pass,
        name: &str,
        secret: &SecretRef,
    ) -> Result<Resolved, ResolveError> {
        let secret_err = |source: SecretError| ResolveError::Secret {
            name: name.to_string(),
            source,
        };
        let plaintext = if pass.attempt > 1 {
            self.secrets.decrypt_fresh(secret).await
        } else {
            self.secrets.decrypt(secret).await
        }
        .map_err(secret_err)?;

        let text = plaintext
            .expose_str()
            .ok_or_else(|| {
                secret_err(SecretError::malformed(
                    &secret.key_id,
                    "plaintext is not valid UTF-8",
                ))
            })?
            .to_string();

        let mut resolved = Resolved {
            value: JsonValue::String(text.clone()),
            secrets: vec![plaintext],
            attempt_dependent: false,
        };
        if is_templated(&text) {
            let opaque = || ResolveError::SecretTemplate {
                name: name.to_string(),
            };
            let t = parse_template(&text).map_err(|_| opaque())?;
            let inner = match self.render(pass, &t).await {
                Ok(inner) => inner,
                Err(e @ ResolveError::Secret { .. }) => return Err(e),
                Err(_) => return Err(opaque()),
            };
            resolved.value = inner.value.clone();
            resolved
                .secrets
                .push(SecretValue::from_string(stringify(&inner.value)));
            resolved.absorb(inner);
        }
        Ok(resolved)
    }
}
