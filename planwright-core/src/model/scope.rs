use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

use crate::expressions::Template;
use crate::vault::SecretRef;

/// Which level of the scope chain a binding came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Plan,
    Step(String),
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Plan => f.write_str("plan"),
            ScopeKind::Step(id) => write!(f, "step {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScopeValue {
    Literal(JsonValue),
    Template(Template),
    Vault(SecretRef),
}

impl ScopeValue {
    pub fn is_secret(&self) -> bool {
        matches!(self, ScopeValue::Vault(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableScope {
    pub kind: ScopeKind,
    pub entries: BTreeMap<String, ScopeValue>,
}

impl VariableScope {
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ScopeValue> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
