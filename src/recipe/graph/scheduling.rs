//! Topological ordering with recipe-order tie-break

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::nodes::StageNode;

/// Order `subset` so that every stage comes after its dependencies.
///
/// Only dependencies inside `subset` constrain the order. Among stages
/// that are ready at the same time the one earlier in the recipe goes first.
/// The graph must be acyclic.
pub fn topological_order(
    nodes: &[StageNode],
    index: &HashMap<String, usize>,
    subset: &HashSet<usize>,
) -> Vec<usize> {
    let mut in_degree: HashMap<usize, usize> = subset.iter().map(|&i| (i, 0)).collect();
    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();

    for &i in subset {
        for dep in &nodes[i].dependencies {
            if let Some(&d) = index.get(dep) {
                if subset.contains(&d) {
                    *in_degree.entry(i).or_insert(0) += 1;
                    dependents.entry(d).or_default().push(i);
                }
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(subset.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &dependent in dependents.get(&i).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = in_degree.get_mut(&dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }
    }

    order
}
