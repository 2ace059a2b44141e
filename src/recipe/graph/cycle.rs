//! Cycle detection for the stage graph

use std::collections::{HashMap, HashSet};

use super::nodes::StageNode;
use super::ResolveError;

/// Detect circular dependencies using DFS.
///
/// Nodes are visited in recipe order so the reported cycle is stable.
pub fn detect_cycles(nodes: &[StageNode], index: &HashMap<String, usize>) -> Result<(), ResolveError> {
    let mut visited = HashSet::new();
    let mut on_path = HashSet::new();
    let mut path = Vec::new();

    for node in nodes {
        if !visited.contains(node.name.as_str()) {
            if let Some(cycle) = dfs_detect_cycle(
                nodes,
                index,
                &node.name,
                &mut visited,
                &mut on_path,
                &mut path,
            ) {
                return Err(ResolveError::Cycle { path: cycle });
            }
        }
    }

    Ok(())
}

fn dfs_detect_cycle<'a>(
    nodes: &'a [StageNode],
    index: &HashMap<String, usize>,
    name: &'a str,
    visited: &mut HashSet<&'a str>,
    on_path: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(name);
    on_path.insert(name);
    path.push(name);

    if let Some(&i) = index.get(name) {
        for dep in &nodes[i].dependencies {
            if !visited.contains(dep.as_str()) {
                if let Some(cycle) = dfs_detect_cycle(nodes, index, dep, visited, on_path, path) {
                    return Some(cycle);
                }
            } else if on_path.contains(dep.as_str()) {
                // path holds dep ... name; close the loop with dep again
                let start = path.iter().position(|p| *p == dep.as_str()).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
        }
    }

    path.pop();
    on_path.remove(name);
    None
}
