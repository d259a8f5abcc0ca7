//! Path and ancestor discovery
//!
//! Used interactively by the editor's variable picker: which upstream
//! nodes can a node's parameters reference, and along which paths.
//! Workflow graphs are small (tens of nodes), so the exhaustive path
//! search is acceptable here; it is never used on the execution path.

use std::collections::{HashSet, VecDeque};

use crate::graph::{build_graph, Adjacency};
use crate::types::{GraphEdge, GraphNode, NodeId};

/// Enumerate every path from `start` to `end`
///
/// Depth-first, with a visited set scoped to the current path: a node is
/// marked on entry and unmarked on backtrack. The same node can therefore
/// appear on several discovered paths (diamonds), but never twice within
/// one path. Returns an empty list when `end` is unreachable.
pub fn all_paths(start: &str, end: &str, adjacency: &Adjacency) -> Vec<Vec<NodeId>> {
    let mut paths = Vec::new();
    let mut path = Vec::new();
    let mut on_path = HashSet::new();
    walk(start, end, adjacency, &mut path, &mut on_path, &mut paths);
    paths
}

fn walk<'a>(
    current: &'a str,
    end: &str,
    adjacency: &'a Adjacency,
    path: &mut Vec<&'a str>,
    on_path: &mut HashSet<&'a str>,
    paths: &mut Vec<Vec<NodeId>>,
) {
    path.push(current);
    on_path.insert(current);

    if current == end {
        paths.push(path.iter().map(|id| id.to_string()).collect());
    } else {
        for next in adjacency.get(current).into_iter().flatten() {
            if !on_path.contains(next.as_str()) {
                walk(next, end, adjacency, path, on_path, paths);
            }
        }
    }

    on_path.remove(current);
    path.pop();
}

/// Collect every node feeding `target` through input connections
///
/// Breadth-first from `target` over the reversed adjacency. A neighbour is
/// only followed when an edge wires it into the current node's input
/// anchor, which filters out downstream nodes the reversed graph also
/// lists. The result always includes `target` and lists each node once.
pub fn connected_ancestors(target: &str, edges: &[GraphEdge], reversed: &Adjacency) -> Vec<NodeId> {
    let mut explored: HashSet<&str> = HashSet::new();
    let mut order: Vec<NodeId> = Vec::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    explored.insert(target);
    queue.push_back(target);

    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());

        let parents: HashSet<&str> = edges
            .iter()
            .filter(|e| e.target == current && e.is_input_connection())
            .map(|e| e.source.as_str())
            .collect();

        for neighbour in reversed.get(current).into_iter().flatten() {
            let neighbour = neighbour.as_str();
            if parents.contains(neighbour) && explored.insert(neighbour) {
                queue.push_back(neighbour);
            }
        }
    }

    order
}

/// Upstream nodes whose outputs `target`'s parameters may reference
///
/// The ancestor set minus the target itself, in discovery order.
pub fn variable_sources(target: &str, nodes: &[GraphNode], edges: &[GraphEdge]) -> Vec<NodeId> {
    let reversed = build_graph(nodes, edges, true);
    connected_ancestors(target, edges, &reversed.adjacency)
        .into_iter()
        .filter(|id| id != target)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use crate::types::WorkflowGraph;

    fn diamond() -> WorkflowGraph {
        WorkflowBuilder::new("wf", "Diamond")
            .add_trigger("a", "manual-trigger")
            .add_action("b", "set-values")
            .add_action("c", "set-values")
            .add_action("d", "merge")
            .connect("a", "b")
            .connect("a", "c")
            .connect("b", "d")
            .connect("c", "d")
            .build()
    }

    #[test]
    fn test_chain_has_single_path() {
        let graph = WorkflowBuilder::new("wf", "Chain")
            .add_trigger("a", "manual-trigger")
            .add_action("b", "set-values")
            .add_action("c", "set-values")
            .connect("a", "b")
            .connect("b", "c")
            .build();
        let index = build_graph(&graph.nodes, &graph.edges, false);

        assert_eq!(all_paths("a", "c", &index.adjacency), vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_diamond_shares_nodes_between_paths() {
        let graph = diamond();
        let index = build_graph(&graph.nodes, &graph.edges, false);

        let paths = all_paths("a", "d", &index.adjacency);
        assert_eq!(paths, vec![vec!["a", "b", "d"], vec!["a", "c", "d"]]);
    }

    #[test]
    fn test_unreachable_is_empty() {
        let graph = diamond();
        let index = build_graph(&graph.nodes, &graph.edges, false);

        assert!(all_paths("d", "a", &index.adjacency).is_empty());
        assert!(all_paths("b", "c", &index.adjacency).is_empty());
    }

    #[test]
    fn test_cycle_does_not_loop_forever() {
        let graph = WorkflowBuilder::new("wf", "Cycle")
            .add_trigger("a", "manual-trigger")
            .add_action("b", "set-values")
            .add_action("c", "set-values")
            .connect("a", "b")
            .connect("b", "c")
            .connect("c", "b")
            .build();
        let index = build_graph(&graph.nodes, &graph.edges, false);

        assert_eq!(all_paths("a", "c", &index.adjacency), vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_start_equals_end() {
        let graph = diamond();
        let index = build_graph(&graph.nodes, &graph.edges, false);
        assert_eq!(all_paths("b", "b", &index.adjacency), vec![vec!["b"]]);
    }

    #[test]
    fn test_ancestors_include_target_and_all_upstream() {
        let graph = diamond();
        let reversed = build_graph(&graph.nodes, &graph.edges, true);

        let ancestors = connected_ancestors("d", &graph.edges, &reversed.adjacency);
        assert_eq!(ancestors[0], "d");
        let set: HashSet<&str> = ancestors.iter().map(String::as_str).collect();
        assert_eq!(set, HashSet::from(["a", "b", "c", "d"]));
        assert_eq!(ancestors.len(), 4);
    }

    #[test]
    fn test_ancestors_skip_downstream_and_siblings() {
        let graph = diamond();
        let reversed = build_graph(&graph.nodes, &graph.edges, true);

        // Reversed adjacency of b lists both a (upstream) and d (downstream)
        let ancestors = connected_ancestors("b", &graph.edges, &reversed.adjacency);
        assert_eq!(ancestors, vec!["b", "a"]);
    }

    #[test]
    fn test_ancestors_ignore_non_input_handles() {
        let graph = WorkflowBuilder::new("wf", "Decorative")
            .add_trigger("t", "manual-trigger")
            .add_action("a", "set-values")
            .add_action("note", "set-values")
            .connect("t", "a")
            .connect_handles("note", "note-output-0", "a", "a-annotation-0")
            .build();
        let reversed = build_graph(&graph.nodes, &graph.edges, true);

        let ancestors = connected_ancestors("a", &graph.edges, &reversed.adjacency);
        assert_eq!(ancestors, vec!["a", "t"]);
    }

    #[test]
    fn test_variable_sources_exclude_target() {
        let graph = diamond();
        let sources = variable_sources("d", &graph.nodes, &graph.edges);
        assert!(!sources.contains(&"d".to_string()));
        assert_eq!(sources.len(), 3);

        let trigger_sources = variable_sources("a", &graph.nodes, &graph.edges);
        assert!(trigger_sources.is_empty());
    }
}
