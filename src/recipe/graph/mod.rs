//! Stage dependency graph: validation, ordering and stage selection

mod cycle;
mod nodes;
mod scheduling;

#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

use super::schema::StageDefinition;

pub use nodes::StageNode;

/// Errors raised while resolving which stages run in which order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Circular dependency detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("{}", unknown_stage_message(name, referenced_by.as_deref()))]
    UnknownStage {
        name: String,
        /// The stage naming it as a dependency; `None` when it was requested directly.
        referenced_by: Option<String>,
    },
}

fn unknown_stage_message(name: &str, referenced_by: Option<&str>) -> String {
    match referenced_by {
        Some(by) => format!("Unknown stage '{name}' (dependency of '{by}')"),
        None => format!("Unknown stage '{name}'"),
    }
}

/// Acyclic dependency graph over the stages of a recipe.
#[derive(Debug, Clone)]
pub struct StageGraph {
    /// Nodes in recipe order; `nodes[i].position == i`.
    nodes: Vec<StageNode>,
    index: HashMap<String, usize>,
    /// Reverse edges: position -> positions of direct dependents.
    dependents: Vec<Vec<usize>>,
}

impl StageGraph {
    /// Build the graph; fails on unknown dependencies or cycles.
    pub fn build(stages: &[StageDefinition]) -> Result<Self, ResolveError> {
        Self::from_dependencies(
            stages
                .iter()
                .map(|s| (s.name.clone(), s.deps.clone()))
                .collect(),
        )
    }

    /// Build the graph from `(name, dependencies)` pairs in recipe order.
    pub fn from_dependencies(stages: Vec<(String, Vec<String>)>) -> Result<Self, ResolveError> {
        let nodes: Vec<StageNode> = stages
            .into_iter()
            .enumerate()
            .map(|(position, (name, dependencies))| StageNode {
                name,
                position,
                dependencies,
            })
            .collect();
        let index: HashMap<String, usize> = nodes
            .iter()
            .map(|n| (n.name.clone(), n.position))
            .collect();

        let mut dependents = vec![Vec::new(); nodes.len()];
        for node in &nodes {
            for dep in &node.dependencies {
                let &d = index.get(dep).ok_or_else(|| ResolveError::UnknownStage {
                    name: dep.clone(),
                    referenced_by: Some(node.name.clone()),
                })?;
                dependents[d].push(node.position);
            }
        }

        cycle::detect_cycles(&nodes, &index)?;

        Ok(Self {
            nodes,
            index,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn position(&self, name: &str) -> Result<usize, ResolveError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| ResolveError::UnknownStage {
                name: name.to_string(),
                referenced_by: None,
            })
    }

    fn names(&self, positions: Vec<usize>) -> Vec<String> {
        positions
            .into_iter()
            .map(|i| self.nodes[i].name.clone())
            .collect()
    }

    /// Every stage, dependencies first.
    pub fn topological_order(&self) -> Vec<String> {
        let all: HashSet<usize> = (0..self.nodes.len()).collect();
        self.names(scheduling::topological_order(&self.nodes, &self.index, &all))
    }

    /// The requested stages and all their transitive dependencies, in order.
    pub fn closure_order(&self, requested: &[String]) -> Result<Vec<String>, ResolveError> {
        self.resolve(requested, &BTreeSet::new())
    }

    /// Decide which stages to run, given the stages already done.
    ///
    /// With nothing requested, every stage not done runs. Requested stages
    /// always run; their dependencies are pulled in unless done.
    pub fn resolve(
        &self,
        requested: &[String],
        done: &BTreeSet<String>,
    ) -> Result<Vec<String>, ResolveError> {
        let mut selected = HashSet::new();

        if requested.is_empty() {
            selected.extend(
                self.nodes
                    .iter()
                    .filter(|n| !done.contains(&n.name))
                    .map(|n| n.position),
            );
        } else {
            let mut stack = Vec::with_capacity(requested.len());
            for name in requested {
                stack.push(self.position(name)?);
            }
            while let Some(i) = stack.pop() {
                if !selected.insert(i) {
                    continue;
                }
                for dep in &self.nodes[i].dependencies {
                    if done.contains(dep) {
                        continue;
                    }
                    stack.push(self.position(dep)?);
                }
            }
        }

        Ok(self.names(scheduling::topological_order(
            &self.nodes,
            &self.index,
            &selected,
        )))
    }

    /// Stages that depend on `name`, directly or transitively.
    pub fn transitive_dependents(&self, name: &str) -> Result<BTreeSet<String>, ResolveError> {
        let start = self.position(name)?;
        let mut seen = HashSet::new();
        let mut stack = self.dependents[start].clone();
        while let Some(i) = stack.pop() {
            if seen.insert(i) {
                stack.extend(self.dependents[i].iter().copied());
            }
        }
        Ok(seen.into_iter().map(|i| self.nodes[i].name.clone()).collect())
    }

    /// Direct dependencies of `name`.
    pub fn dependencies(&self, name: &str) -> Result<&[String], ResolveError> {
        Ok(&self.nodes[self.position(name)?].dependencies)
    }
}
