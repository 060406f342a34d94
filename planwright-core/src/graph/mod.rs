mod dependency;

pub(crate) use dependency::build_dependency_graph;

use crate::model::{StepIndex, Strategy};

/// Index-based view of the step dependency relation.
///
/// All vectors are indexed by [`StepIndex`] (declaration order).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DependencyGraph {
    /// For each step, which steps it depends on.
    pub depends_on: Vec<Vec<StepIndex>>,
    /// For each step, which steps depend on it.
    pub dependents: Vec<Vec<StepIndex>>,
    /// Kahn order, ties broken by declaration index.
    pub topo_order: Vec<StepIndex>,
    /// Steps grouped by longest distance from a root.
    pub levels: Vec<Vec<StepIndex>>,
}

/// A set of steps the strategy allows to be in flight together.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConcurrencyGroup {
    pub index: usize,
    pub steps: Vec<StepIndex>,
}

impl DependencyGraph {
    pub fn len(&self) -> usize {
        self.depends_on.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depends_on.is_empty()
    }

    /// Every step reachable by following dependency edges backwards from `idx`.
    pub fn ancestors(&self, idx: StepIndex) -> Vec<StepIndex> {
        walk(idx, &self.depends_on)
    }

    /// Every step reachable by following dependency edges forwards from `idx`.
    pub fn descendants(&self, idx: StepIndex) -> Vec<StepIndex> {
        walk(idx, &self.dependents)
    }

    pub fn concurrency_groups(&self, strategy: Strategy) -> Vec<ConcurrencyGroup> {
        let raw: Vec<Vec<StepIndex>> = match strategy {
            Strategy::Sequential => self.topo_order.iter().map(|i| vec![*i]).collect(),
            Strategy::Parallel => self.levels.clone(),
            Strategy::RollingBatch { size } => self
                .levels
                .iter()
                .flat_map(|level| level.chunks(size.max(1)).map(<[StepIndex]>::to_vec))
                .collect(),
        };
        raw.into_iter()
            .enumerate()
            .map(|(index, steps)| ConcurrencyGroup { index, steps })
            .collect()
    }

    pub fn to_dot(&self, plan_id: &str, ids: &[String]) -> String {
        let mut out = String::new();
        out.push_str("digraph planwright {\n");
        out.push_str(&format!("  label=\"plan: {}\";\n", escape_dot(plan_id)));
        out.push_str("  labelloc=t;\n");
        out.push_str("  rankdir=LR;\n");

        for (step, deps) in self.depends_on.iter().enumerate() {
            let step = escape_dot(&ids[step]);
            if deps.is_empty() {
                out.push_str(&format!("  \"{step}\";\n"));
            } else {
                for dep in deps {
                    out.push_str(&format!("  \"{}\" -> \"{step}\";\n", escape_dot(&ids[*dep])));
                }
            }
        }

        for level in &self.levels {
            if level.len() > 1 {
                out.push_str("  { rank=same; ");
                for s in level {
                    out.push_str(&format!("\"{}\"; ", escape_dot(&ids[*s])));
                }
                out.push_str("}\n");
            }
        }

        out.push_str("}\n");
        out
    }
}

pub fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn walk(start: StepIndex, edges: &[Vec<StepIndex>]) -> Vec<StepIndex> {
    let mut seen = vec![false; edges.len()];
    let mut stack = edges[start].clone();
    let mut out = Vec::new();
    while let Some(n) = stack.pop() {
        if std::mem::replace(&mut seen[n], true) {
            continue;
        }
        out.push(n);
        stack.extend(edges[n].iter().copied());
    }
    out.sort_unstable();
    out
}
