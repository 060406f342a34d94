use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::graph::DependencyGraph;
use crate::model::StepIndex;

/// Builds the graph from per-step dependency lists.
///
/// On a cycle, returns the cycle as step indices with the first node repeated
/// at the end (`a -> b -> a`).
pub(crate) fn build_dependency_graph(
    depends_on: Vec<Vec<StepIndex>>,
) -> Result<DependencyGraph, Vec<StepIndex>> {
    let n = depends_on.len();
    let mut dependents: Vec<Vec<StepIndex>> = vec![Vec::new(); n];
    for (step, deps) in depends_on.iter().enumerate() {
        for d in deps {
            dependents[*d].push(step);
        }
    }

    let topo_order = topo_sort(&depends_on, &dependents)?;
    let levels = compute_levels(&topo_order, &depends_on);

    Ok(DependencyGraph {
        depends_on,
        dependents,
        topo_order,
        levels,
    })
}

fn topo_sort(
    depends_on: &[Vec<StepIndex>],
    dependents: &[Vec<StepIndex>],
) -> Result<Vec<StepIndex>, Vec<StepIndex>> {
    let mut indeg: Vec<usize> = depends_on.iter().map(Vec::len).collect();

    let mut q: BinaryHeap<Reverse<StepIndex>> = indeg
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut out = Vec::with_capacity(depends_on.len());
    while let Some(Reverse(node)) = q.pop() {
        out.push(node);
        for m in &dependents[node] {
            indeg[*m] -= 1;
            if indeg[*m] == 0 {
                q.push(Reverse(*m));
            }
        }
    }

    if out.len() != depends_on.len() {
        return Err(extract_cycle(depends_on, &indeg));
    }
    Ok(out)
}

/// Walks unvisited nodes along unvisited dependencies until one repeats.
///
/// Every node Kahn leaves behind still has an unvisited dependency, so the
/// walk always closes.
fn extract_cycle(depends_on: &[Vec<StepIndex>], indeg: &[usize]) -> Vec<StepIndex> {
    let remaining = |i: StepIndex| indeg[i] > 0;
    let Some(start) = (0..depends_on.len()).find(|i| remaining(*i)) else {
        return Vec::new();
    };

    let mut position: Vec<Option<usize>> = vec![None; depends_on.len()];
    let mut path = Vec::new();
    let mut cur = start;
    loop {
        if let Some(at) = position[cur] {
            let mut cycle = path[at..].to_vec();
            cycle.push(cur);
            return cycle;
        }
        position[cur] = Some(path.len());
        path.push(cur);
        match depends_on[cur].iter().copied().find(|d| remaining(*d)) {
            Some(next) => cur = next,
            None => return path,
        }
    }
}

fn compute_levels(topo: &[StepIndex], depends_on: &[Vec<StepIndex>]) -> Vec<Vec<StepIndex>> {
    let mut level = vec![0usize; depends_on.len()];
    for node in topo {
        level[*node] = depends_on[*node]
            .iter()
            .map(|d| level[*d] + 1)
            .max()
            .unwrap_or(0);
    }

    let max_level = level.iter().copied().max().unwrap_or(0);
    let mut levels = vec![Vec::<StepIndex>::new(); if topo.is_empty() { 0 } else { max_level + 1 }];
    for node in topo {
        levels[level[*node]].push(*node);
    }
    for l in &mut levels {
        l.sort_unstable();
    }
    levels
}
