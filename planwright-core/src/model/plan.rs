use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::graph::{ConcurrencyGroup, DependencyGraph};
use crate::model::{RetryPolicy, Strategy, VariableScope};

/// Position of a step in [`Plan::steps`]; also its declaration order.
pub type StepIndex = usize;

/// A loaded and validated plan. Built by [`crate::loader::load_plan`] and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct Plan {
    pub id: String,
    pub description: Option<String>,
    pub strategy: Strategy,
    pub variables: VariableScope,
    pub steps: Vec<Step>,
    pub graph: DependencyGraph,
    index: HashMap<String, StepIndex>,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub id: String,
    /// Opaque to the engine; handed to the action runner untouched.
    pub action: JsonValue,
    /// Dependency ids as declared.
    pub depends_on: Vec<String>,
    /// Dependency ids resolved to arena indices, in declaration order.
    pub deps: Vec<StepIndex>,
    pub variables: VariableScope,
    pub retry: Option<RetryPolicy>,
    pub timeout: Option<Duration>,
    pub description: Option<String>,
    pub reference: Option<String>,
}

impl Plan {
    pub(crate) fn new(
        id: String,
        description: Option<String>,
        strategy: Strategy,
        variables: VariableScope,
        steps: Vec<Step>,
        graph: DependencyGraph,
    ) -> Self {
        let index = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        Self {
            id,
            description,
            strategy,
            variables,
            steps,
            graph,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, idx: StepIndex) -> &Step {
        &self.steps[idx]
    }

    pub fn step_index(&self, id: &str) -> Option<StepIndex> {
        self.index.get(id).copied()
    }

    pub fn step_by_id(&self, id: &str) -> Option<&Step> {
        self.step_index(id).map(|i| &self.steps[i])
    }

    pub fn step_ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }

    /// Steps that list `idx` as a direct dependency.
    pub fn dependents(&self, idx: StepIndex) -> &[StepIndex] {
        &self.graph.dependents[idx]
    }

    /// Every `(dependency, dependent)` pair, ordered by dependent then declaration.
    pub fn edges(&self) -> Vec<(String, String)> {
        self.steps
            .iter()
            .flat_map(|s| {
                s.deps
                    .iter()
                    .map(move |d| (self.steps[*d].id.clone(), s.id.clone()))
            })
            .collect()
    }

    pub fn concurrency_groups(&self) -> Vec<ConcurrencyGroup> {
        self.graph.concurrency_groups(self.strategy)
    }

    pub fn to_dot(&self) -> String {
        self.graph.to_dot(&self.id, &self.step_ids())
    }
}
