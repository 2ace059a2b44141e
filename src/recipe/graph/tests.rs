//! Tests for the stage graph

use super::*;
use crate::recipe::schema::{StageDefinition, StageKind};
use serde_json::Map;

fn make_stage(name: &str, deps: Vec<&str>) -> StageDefinition {
    StageDefinition {
        name: name.to_string(),
        kind: StageKind::Command {
            cmd: "true".to_string(),
        },
        deps: deps.into_iter().map(String::from).collect(),
        cwd: name.to_string(),
        log_file: format!("{name}.log"),
        config: Map::new(),
        optimisations: vec![],
    }
}

fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn position_of(order: &[String], name: &str) -> usize {
    order.iter().position(|n| n == name).unwrap()
}

#[test]
fn test_chain_requested_from_the_end() {
    let stages = vec![
        make_stage("a", vec![]),
        make_stage("b", vec!["a"]),
        make_stage("c", vec!["b"]),
    ];
    let graph = StageGraph::build(&stages).unwrap();
    assert_eq!(graph.closure_order(&names(&["c"])).unwrap(), names(&["a", "b", "c"]));
}

#[test]
fn test_dependencies_precede_dependents() {
    let stages = vec![
        make_stage("report", vec!["evaluate", "reference"]),
        make_stage("evaluate", vec!["optimise"]),
        make_stage("optimise", vec!["reference"]),
        make_stage("reference", vec![]),
        make_stage("unrelated", vec![]),
    ];
    let graph = StageGraph::build(&stages).unwrap();
    let order = graph.topological_order();
    assert_eq!(order.len(), 5);
    for stage in &stages {
        for dep in &stage.deps {
            assert!(position_of(&order, dep) < position_of(&order, &stage.name));
        }
    }
}

#[test]
fn test_independent_stages_keep_recipe_order() {
    let stages = vec![
        make_stage("z", vec![]),
        make_stage("a", vec![]),
        make_stage("m", vec!["z"]),
        make_stage("b", vec![]),
    ];
    let graph = StageGraph::build(&stages).unwrap();
    assert_eq!(graph.topological_order(), names(&["z", "a", "m", "b"]));
}

#[test]
fn test_detect_cycle() {
    let stages = vec![
        make_stage("a", vec!["c"]),
        make_stage("b", vec!["a"]),
        make_stage("c", vec!["b"]),
    ];
    let err = StageGraph::build(&stages).unwrap_err();
    match &err {
        ResolveError::Cycle { path } => {
            assert_eq!(path.first(), path.last());
            assert_eq!(path.len(), 4);
        }
        other => panic!("expected cycle, got {other:?}"),
    }
    assert!(err.to_string().starts_with("Circular dependency detected: a -> "));
}

#[test]
fn test_unknown_dependency() {
    let stages = vec![make_stage("a", vec!["ghost"])];
    let err = StageGraph::build(&stages).unwrap_err();
    assert_eq!(
        err,
        ResolveError::UnknownStage {
            name: "ghost".to_string(),
            referenced_by: Some("a".to_string())
        }
    );
}

#[test]
fn test_unknown_requested_stage() {
    let graph = StageGraph::build(&[make_stage("a", vec![])]).unwrap();
    let err = graph.closure_order(&names(&["b"])).unwrap_err();
    assert_eq!(err.to_string(), "Unknown stage 'b'");
}

#[test]
fn test_resolve_skips_done_stages() {
    let stages = vec![
        make_stage("a", vec![]),
        make_stage("b", vec!["a"]),
        make_stage("c", vec!["b"]),
    ];
    let graph = StageGraph::build(&stages).unwrap();
    let done = BTreeSet::from(["a".to_string()]);
    assert_eq!(graph.resolve(&[], &done).unwrap(), names(&["b", "c"]));
}

#[test]
fn test_resolve_requested_stage_reruns_even_if_done() {
    let stages = vec![
        make_stage("a", vec![]),
        make_stage("b", vec!["a"]),
        make_stage("c", vec!["b"]),
    ];
    let graph = StageGraph::build(&stages).unwrap();
    let done = BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()]);
    assert_eq!(graph.resolve(&names(&["b"]), &done).unwrap(), names(&["b"]));
}

#[test]
fn test_resolve_stops_at_done_dependency() {
    let stages = vec![
        make_stage("a", vec![]),
        make_stage("b", vec!["a"]),
        make_stage("c", vec!["b"]),
    ];
    let graph = StageGraph::build(&stages).unwrap();
    let done = BTreeSet::from(["b".to_string()]);
    assert_eq!(graph.resolve(&names(&["c"]), &done).unwrap(), names(&["c"]));
}

#[test]
fn test_resolve_duplicates_appear_once() {
    let stages = vec![
        make_stage("a", vec![]),
        make_stage("b", vec!["a"]),
        make_stage("c", vec!["a"]),
    ];
    let graph = StageGraph::build(&stages).unwrap();
    let order = graph
        .resolve(&names(&["c", "b", "c"]), &BTreeSet::new())
        .unwrap();
    assert_eq!(order, names(&["a", "b", "c"]));
}

#[test]
fn test_transitive_dependents() {
    let stages = vec![
        make_stage("a", vec![]),
        make_stage("b", vec!["a"]),
        make_stage("c", vec!["b"]),
        make_stage("d", vec![]),
    ];
    let graph = StageGraph::build(&stages).unwrap();
    assert_eq!(
        graph.transitive_dependents("a").unwrap(),
        BTreeSet::from(["b".to_string(), "c".to_string()])
    );
    assert!(graph.transitive_dependents("d").unwrap().is_empty());
    assert_eq!(graph.dependencies("c").unwrap(), &["b".to_string()]);
}
