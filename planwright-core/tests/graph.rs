use planwright_core::{load_plan_str, Strategy};

fn diamond(strategy: &str) -> String {
    format!(
        r#"
id: diamond
strategy: "{strategy}"
steps:
  - id: a
  - id: b
    depends_on: [a]
  - id: c
    depends_on: [a]
  - id: d
    depends_on: [a]
  - id: e
    depends_on: [b, c, d]
"#
    )
}

fn group_ids(plan: &planwright_core::Plan) -> Vec<Vec<String>> {
    plan.concurrency_groups()
        .into_iter()
        .map(|g| g.steps.iter().map(|i| plan.step(*i).id.clone()).collect())
        .collect()
}

#[test]
fn levels_follow_dependency_depth() {
    let plan = load_plan_str(&diamond("parallel")).unwrap();
    assert_eq!(plan.graph.levels, vec![vec![0], vec![1, 2, 3], vec![4]]);
    assert_eq!(plan.graph.topo_order, vec![0, 1, 2, 3, 4]);
    assert_eq!(plan.dependents(0), &[1, 2, 3]);
}

#[test]
fn concurrency_groups_depend_on_strategy() {
    let parallel = load_plan_str(&diamond("parallel")).unwrap();
    assert_eq!(
        group_ids(&parallel),
        vec![vec!["a"], vec!["b", "c", "d"], vec!["e"]]
    );

    let batched = load_plan_str(&diamond("rolling-batch[2]")).unwrap();
    assert_eq!(batched.strategy, Strategy::RollingBatch { size: 2 });
    assert_eq!(
        group_ids(&batched),
        vec![vec!["a"], vec!["b", "c"], vec!["d"], vec!["e"]]
    );

    let sequential = load_plan_str(&diamond("sequential")).unwrap();
    assert_eq!(
        group_ids(&sequential),
        vec![vec!["a"], vec!["b"], vec!["c"], vec!["d"], vec!["e"]]
    );
}

#[test]
fn ancestors_and_descendants_are_transitive() {
    let plan = load_plan_str(&diamond("parallel")).unwrap();
    assert_eq!(plan.graph.ancestors(4), vec![0, 1, 2, 3]);
    assert_eq!(plan.graph.descendants(1), vec![4]);
    assert_eq!(plan.graph.descendants(0), vec![1, 2, 3, 4]);
}

#[test]
fn edges_match_declarations() {
    let plan = load_plan_str(&diamond("parallel")).unwrap();
    let edges = plan.edges();
    assert_eq!(edges.len(), 6);
    assert!(edges.contains(&("a".to_string(), "b".to_string())));
    assert!(edges.contains(&("d".to_string(), "e".to_string())));
}

#[test]
fn dot_contains_every_edge() {
    let plan = load_plan_str(&diamond("parallel")).unwrap();
    let dot = plan.to_dot();
    assert!(dot.starts_with("digraph planwright {"));
    for (from, to) in plan.edges() {
        assert!(dot.contains(&format!("\"{from}\" -> \"{to}\";")), "{dot}");
    }
    assert!(dot.contains("{ rank=same; \"b\"; \"c\"; \"d\"; }"));
}
