//! Graph node type

/// A stage as seen by the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageNode {
    pub name: String,
    /// Position in the recipe; breaks ties between independent stages.
    pub position: usize,
    pub dependencies: Vec<String>,
}
