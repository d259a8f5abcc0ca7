//! Graph model derived from node and edge lists
//!
//! The graph is never stored. It is rebuilt from the current node/edge
//! lists whenever a traversal needs it.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::{GraphEdge, GraphNode, NodeId};

/// Adjacency list keyed by node id
pub type Adjacency = HashMap<NodeId, Vec<NodeId>>;

/// Adjacency and in-degree maps for a workflow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphIndex {
    /// Downstream node ids per node (plus upstream ids when reversed)
    pub adjacency: Adjacency,
    /// Number of incoming edges per node
    pub in_degree: HashMap<NodeId, usize>,
}

/// Build adjacency and in-degree maps
///
/// Every node starts with in-degree 0 and an empty adjacency entry, so
/// isolated nodes are always present. With `reverse` set, each edge is also
/// recorded from target back to source, giving a graph usable for upstream
/// traversal. Edges naming unknown nodes create new entries instead of
/// failing.
pub fn build_graph(nodes: &[GraphNode], edges: &[GraphEdge], reverse: bool) -> GraphIndex {
    let mut index = GraphIndex::default();

    for node in nodes {
        index.adjacency.insert(node.id.clone(), Vec::new());
        index.in_degree.insert(node.id.clone(), 0);
    }

    for edge in edges {
        index
            .adjacency
            .entry(edge.source.clone())
            .or_default()
            .push(edge.target.clone());
        *index.in_degree.entry(edge.target.clone()).or_insert(0) += 1;

        if reverse {
            index
                .adjacency
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
        }
    }

    index
}

/// Find the nodes a run may start from
///
/// A node qualifies when nothing feeds it and its kind is trigger or
/// webhook. Results follow node-list order.
pub fn find_starting_nodes(nodes: &[GraphNode], in_degree: &HashMap<NodeId, usize>) -> Vec<NodeId> {
    nodes
        .iter()
        .filter(|n| in_degree.get(&n.id).copied().unwrap_or(0) == 0 && n.kind.is_startable())
        .map(|n| n.id.clone())
        .collect()
}

/// All node ids reachable from the given roots (roots included)
pub fn reachable_from(roots: &[NodeId], adjacency: &Adjacency) -> HashSet<NodeId> {
    let mut reachable: HashSet<NodeId> = roots.iter().cloned().collect();
    let mut queue: VecDeque<&NodeId> = roots.iter().collect();

    while let Some(current) = queue.pop_front() {
        for next in adjacency.get(current).into_iter().flatten() {
            if reachable.insert(next.clone()) {
                queue.push_back(next);
            }
        }
    }

    reachable
}

/// Topological order of a subgraph using Kahn's algorithm
///
/// Only edges with both endpoints inside `subset` are considered. On a
/// cycle, returns the ids that could not be ordered.
pub fn topological_order(
    subset: &HashSet<NodeId>,
    edges: &[GraphEdge],
) -> std::result::Result<Vec<NodeId>, Vec<NodeId>> {
    let mut in_degree: HashMap<&str, usize> = subset.iter().map(|id| (id.as_str(), 0)).collect();
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in edges {
        if subset.contains(&edge.source) && subset.contains(&edge.target) {
            *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
            outgoing
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }
    }

    let mut queue: VecDeque<&str> = {
        let mut roots: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        roots.sort_unstable();
        roots.into()
    };

    let mut order = Vec::with_capacity(subset.len());
    while let Some(node_id) = queue.pop_front() {
        order.push(node_id.to_string());
        for &target in outgoing.get(node_id).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(target) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(target);
                }
            }
        }
    }

    if order.len() < subset.len() {
        let mut stuck: Vec<NodeId> = in_degree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        stuck.sort();
        return Err(stuck);
    }

    Ok(order)
}
