use thiserror::Error;

use crate::model::ScopeKind;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unable to auto-detect document format (neither valid JSON nor valid YAML)")]
    UnknownFormat,
}

/// Everything that can reject a plan document before any step runs.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("plan id must not be empty")]
    EmptyPlanId,

    #[error("duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("invalid step id {id:?}: {reason}")]
    InvalidStepId { id: String, reason: String },

    #[error("step {step} depends on undeclared step {dependency}")]
    UnknownDependency { step: String, dependency: String },

    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("invalid strategy {name}: {reason}")]
    InvalidStrategy { name: String, reason: String },

    #[error(transparent)]
    ScopeParse(#[from] ScopeParseError),

    #[error("invalid retry policy on step {step}: {reason}")]
    InvalidRetryPolicy { step: String, reason: String },
}

impl LoadError {
    /// Stable machine-readable name for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::Parse(_) => "parse",
            LoadError::EmptyPlanId => "parse",
            LoadError::DuplicateStep(_) => "duplicate_step",
            LoadError::InvalidStepId { .. } => "invalid_step_id",
            LoadError::UnknownDependency { .. } => "unknown_dependency",
            LoadError::DependencyCycle { .. } => "dependency_cycle",
            LoadError::UnknownStrategy(_) => "unknown_strategy",
            LoadError::InvalidStrategy { .. } => "invalid_strategy",
            LoadError::ScopeParse(_) => "scope_parse",
            LoadError::InvalidRetryPolicy { .. } => "invalid_retry_policy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed variable {key:?} in {scope} scope: {reason}")]
pub struct ScopeParseError {
    pub scope: ScopeKind,
    pub key: String,
    pub reason: String,
}

impl ScopeParseError {
    pub fn new(scope: ScopeKind, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            scope,
            key: key.into(),
            reason: reason.into(),
        }
    }
}
