use planwright_core::{Plan, StepIndex};

use crate::executor::ExecutorError;

/// Narrows a run to part of the plan.
///
/// Excluded steps end as `skipped` with reason `filtered` and count as
/// satisfied for their dependents.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunOptions {
    /// Skip every transitive ancestor of this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_from: Option<String>,
    /// Skip every transitive descendant of this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<String>,
    /// When non-empty, run only these steps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub only: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
}

impl RunOptions {
    pub fn is_empty(&self) -> bool {
        self.start_from.is_none() && self.end_at.is_none() && self.only.is_empty() && self.skip.is_empty()
    }

    /// `excluded[i]` is true when step `i` must not run.
    pub fn excluded(&self, plan: &Plan) -> Result<Vec<bool>, ExecutorError> {
        let mut excluded = vec![false; plan.len()];

        if !self.only.is_empty() {
            excluded.iter_mut().for_each(|e| *e = true);
            for id in &self.only {
                excluded[index(plan, id)?] = false;
            }
        }
        for id in &self.skip {
            excluded[index(plan, id)?] = true;
        }
        if let Some(id) = &self.start_from {
            for a in plan.graph.ancestors(index(plan, id)?) {
                excluded[a] = true;
            }
        }
        if let Some(id) = &self.end_at {
            for d in plan.graph.descendants(index(plan, id)?) {
                excluded[d] = true;
            }
        }
        Ok(excluded)
    }
}

fn index(plan: &Plan, id: &str) -> Result<StepIndex, ExecutorError> {
    plan.step_index(id)
        .ok_or_else(|| ExecutorError::UnknownStep(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Plan {
        planwright_core::load_plan_str(
            "id: p\nsteps:\n  - id: a\n  - id: b\n    depends_on: [a]\n  - id: c\n    depends_on: [b]\n  - id: d\n    depends_on: [c]\n",
        )
        .unwrap()
    }

    #[test]
    fn start_from_and_end_at_bound_the_chain() {
        let opts = RunOptions {
            start_from: Some("b".into()),
            end_at: Some("c".into()),
            ..Default::default()
        };
        assert_eq!(opts.excluded(&chain()).unwrap(), vec![true, false, false, true]);
    }

    #[test]
    fn only_and_skip() {
        let opts = RunOptions {
            only: vec!["a".into(), "c".into()],
            skip: vec!["c".into()],
            ..Default::default()
        };
        assert_eq!(opts.excluded(&chain()).unwrap(), vec![false, true, true, true]);
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let opts = RunOptions {
            skip: vec!["nope".into()],
            ..Default::default()
        };
        assert!(matches!(
            opts.excluded(&chain()),
            Err(ExecutorError::UnknownStep(id)) if id == "nope"
        ));
    }
}
