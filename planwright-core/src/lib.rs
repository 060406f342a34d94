#![forbid(unsafe_code)]

pub mod error;
pub mod expressions;
pub mod graph;
pub mod loader;
pub mod model;
pub mod parser;
pub mod types;
pub mod vault;

pub use crate::error::{LoadError, ParseError, ScopeParseError};
pub use crate::graph::{ConcurrencyGroup, DependencyGraph};
pub use crate::loader::{load_plan, load_plan_str};
pub use crate::model::{
    Backoff, Plan, RetryPolicy, ScopeKind, ScopeValue, Step, StepIndex, Strategy, VariableScope,
};
pub use crate::parser::{parse_document_str, DocumentFormat, ParsedDocument};
pub use crate::types::PlanDocument;
pub use crate::vault::{SecretRef, VaultEnvelopeError};
