use std::collections::{BTreeMap, BTreeSet};

use planwright_core::graph::escape_dot;
use planwright_core::Strategy;
use uuid::Uuid;

use crate::tracker::{ExecutionRecord, RunStatus, StepState};

/// Dependency graph annotated with live step state, for strategy
/// visualization.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VisualizationGraph {
    pub run_id: Uuid,
    pub plan_id: String,
    pub strategy: Strategy,
    pub status: RunStatus,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub groups: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub state: StepState,
    pub group: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct GraphEdge {
    /// The dependency.
    pub from: String,
    /// The step that depends on `from`.
    pub to: String,
}

impl VisualizationGraph {
    pub fn from_record(record: &ExecutionRecord) -> Self {
        let nodes = record
            .steps
            .iter()
            .map(|s| GraphNode {
                id: s.id.clone(),
                state: s.state,
                group: s.group,
                reference: s.reference.clone(),
                attempts: s.attempts,
            })
            .collect();
        let edges = record
            .steps
            .iter()
            .flat_map(|s| {
                s.depends_on.iter().map(move |d| GraphEdge {
                    from: d.clone(),
                    to: s.id.clone(),
                })
            })
            .collect();
        Self {
            run_id: record.run_id,
            plan_id: record.plan_id.clone(),
            strategy: record.strategy,
            status: record.status,
            nodes,
            edges,
            groups: record.groups.clone(),
        }
    }

    pub fn edge_set(&self) -> BTreeSet<(String, String)> {
        self.edges
            .iter()
            .map(|e| (e.from.clone(), e.to.clone()))
            .collect()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// DOT with nodes coloured by state and clustered by reference.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        out.push_str("digraph planwright {\n");
        out.push_str(&format!(
            "  label=\"plan: {} ({}, {})\";\n",
            escape_dot(&self.plan_id),
            self.strategy,
            self.status
        ));
        out.push_str("  labelloc=t;\n");
        out.push_str("  rankdir=LR;\n");
        out.push_str("  node [style=filled];\n");

        let mut lanes: BTreeMap<&str, Vec<&GraphNode>> = BTreeMap::new();
        for n in &self.nodes {
            match &n.reference {
                Some(r) => lanes.entry(r.as_str()).or_default().push(n),
                None => out.push_str(&node_line("  ", n)),
            }
        }
        for (i, (lane, nodes)) in lanes.iter().enumerate() {
            out.push_str(&format!("  subgraph \"cluster_{i}\" {{\n"));
            out.push_str(&format!("    label=\"{}\";\n", escape_dot(lane)));
            for n in nodes {
                out.push_str(&node_line("    ", n));
            }
            out.push_str("  }\n");
        }

        for e in &self.edges {
            out.push_str(&format!(
                "  \"{}\" -> \"{}\";\n",
                escape_dot(&e.from),
                escape_dot(&e.to)
            ));
        }
        out.push_str("}\n");
        out
    }
}

fn node_line(indent: &str, n: &GraphNode) -> String {
    format!(
        "{indent}\"{}\" [fillcolor={}, tooltip=\"{}\"];\n",
        escape_dot(&n.id),
        state_color(n.state),
        n.state
    )
}

fn state_color(state: StepState) -> &'static str {
    match state {
        StepState::Pending => "white",
        StepState::Ready => "lightyellow",
        StepState::Running => "lightblue",
        StepState::Retrying => "orange",
        StepState::Succeeded => "palegreen",
        StepState::Failed => "salmon",
        StepState::Skipped => "lightgrey",
    }
}
