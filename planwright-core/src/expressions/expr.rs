use std::sync::LazyLock;

use regex::Regex;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

static DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^default\s*\(\s*(?:'([^']*)'|"([^"]*)")\s*\)$"#).expect("valid regex")
});

/// Namespace reserved for engine-provided values, e.g. `{{ pw.run_id }}`.
pub const BUILTIN_PREFIX: &str = "pw.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub head: ExprHead,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprHead {
    Variable(String),
    Builtin(Builtin),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    PlanId,
    RunId,
    StepId,
    Attempt,
    /// Run start time; the only clock-derived value and fixed for the whole run.
    Now,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Upper,
    Lower,
    Trim,
    Default(String),
}

impl Expr {
    pub fn variable(&self) -> Option<&str> {
        match &self.head {
            ExprHead::Variable(v) => Some(v),
            ExprHead::Builtin(_) => None,
        }
    }
}

pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

pub fn parse_expr(input: &str) -> Result<Expr, ExprError> {
    let mut parts = split_pipes(input)?.into_iter();
    let head = parts.next().unwrap_or_default();
    let head = head.trim();
    if head.is_empty() {
        return Err(ExprError::EmptyName);
    }

    let head = if let Some(builtin) = head.strip_prefix(BUILTIN_PREFIX) {
        ExprHead::Builtin(parse_builtin(builtin)?)
    } else if is_valid_name(head) {
        ExprHead::Variable(head.to_string())
    } else {
        return Err(ExprError::InvalidName(head.to_string()));
    };

    let filters = parts
        .map(|p| parse_filter(p.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Expr { head, filters })
}

fn parse_builtin(name: &str) -> Result<Builtin, ExprError> {
    match name {
        "plan_id" => Ok(Builtin::PlanId),
        "run_id" => Ok(Builtin::RunId),
        "step_id" => Ok(Builtin::StepId),
        "attempt" => Ok(Builtin::Attempt),
        "now" => Ok(Builtin::Now),
        other => Err(ExprError::UnknownBuiltin(other.to_string())),
    }
}

fn parse_filter(s: &str) -> Result<Filter, ExprError> {
    match s {
        "" => Err(ExprError::EmptyFilter),
        "upper" => Ok(Filter::Upper),
        "lower" => Ok(Filter::Lower),
        "trim" => Ok(Filter::Trim),
        other => {
            let caps = DEFAULT_RE
                .captures(other)
                .ok_or_else(|| ExprError::UnknownFilter(other.to_string()))?;
            let lit = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Ok(Filter::Default(lit))
        }
    }
}

/// Splits on `|` outside of quoted literals.
fn split_pipes(input: &str) -> Result<Vec<String>, ExprError> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quote: Option<char> = None;
    for ch in input.chars() {
        match (quote, ch) {
            (None, '|') => out.push(std::mem::take(&mut cur)),
            (None, '\'' | '"') => {
                quote = Some(ch);
                cur.push(ch);
            }
            (Some(q), c) if c == q => {
                quote = None;
                cur.push(ch);
            }
            _ => cur.push(ch),
        }
    }
    if quote.is_some() {
        return Err(ExprError::UnterminatedString);
    }
    out.push(cur);
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error("variable name must not be empty")]
    EmptyName,
    #[error("invalid variable name: {0}")]
    InvalidName(String),
    #[error("unknown built-in: {BUILTIN_PREFIX}{0}")]
    UnknownBuiltin(String),
    #[error("empty filter")]
    EmptyFilter,
    #[error("unknown filter: {0}")]
    UnknownFilter(String),
    #[error("unterminated string literal")]
    UnterminatedString,
}
