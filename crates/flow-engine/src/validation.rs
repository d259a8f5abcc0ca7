//! Graph validation for workflow graphs
//!
//! Validates graph structure, anchor usage and node types, and detects
//! cycles. The scheduler runs the same checks over the reachable subgraph
//! before any node executes.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::graph::{build_graph, find_starting_nodes, topological_order};
use crate::registry::NodeRegistry;
use crate::types::{GraphEdge, GraphNode, Handle, NodeId, WorkflowGraph};

/// Validation error with location context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Cycle detected among the listed nodes
    #[error("Cycle detected between nodes: {}", .nodes.join(", "))]
    CycleDetected { nodes: Vec<NodeId> },

    /// A node has an unknown type (not in registry)
    #[error("Unknown node type '{node_type}' for node '{node_id}'")]
    UnknownNodeType { node_id: NodeId, node_type: String },

    /// An edge references a non-existent node
    #[error("Edge '{edge_id}' references unknown node '{node_id}'")]
    UnknownNode { edge_id: String, node_id: NodeId },

    /// Two nodes share an id
    #[error("Duplicate node id '{node_id}'")]
    DuplicateNode { node_id: NodeId },

    /// An input connection targets an anchor the node does not declare
    #[error("Node '{node_id}' is wired to {used} input anchors but declares {declared}")]
    AnchorOverflow {
        node_id: NodeId,
        declared: usize,
        used: usize,
    },

    /// No trigger or webhook node without upstream edges
    #[error("Workflow has no starting node")]
    NoStartingNode,

    /// A requested starting node does not exist
    #[error("Starting node '{node_id}' does not exist")]
    UnknownStartingNode { node_id: NodeId },

    /// A requested starting node is not a trigger or webhook
    #[error("Node '{node_id}' is not a trigger or webhook and cannot start a run")]
    NotStartable { node_id: NodeId },

    /// More than one starting node where exactly one is required
    #[error("Expected exactly one starting node, got {}: {}", .nodes.len(), .nodes.join(", "))]
    MultipleStartingNodes { nodes: Vec<NodeId> },
}

/// Validate a workflow graph
///
/// Returns all validation errors found (not just the first).
/// Pass a registry to enable node type validation.
pub fn validate_workflow(graph: &WorkflowGraph, registry: Option<&NodeRegistry>) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_unique_ids(&graph.nodes, &mut errors);
    validate_edge_references(&graph.nodes, &graph.edges, &mut errors);
    validate_anchor_counts(&graph.nodes, &graph.edges, &mut errors);
    detect_cycles(&graph.nodes, &graph.edges, &mut errors);

    let index = build_graph(&graph.nodes, &graph.edges, false);
    if find_starting_nodes(&graph.nodes, &index.in_degree).is_empty() {
        errors.push(ValidationError::NoStartingNode);
    }

    if let Some(reg) = registry {
        validate_node_types(&graph.nodes, reg, &mut errors);
    }

    errors
}

fn validate_unique_ids(nodes: &[GraphNode], errors: &mut Vec<ValidationError>) {
    let mut seen: HashSet<&str> = HashSet::new();
    for node in nodes {
        if !seen.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNode {
                node_id: node.id.clone(),
            });
        }
    }
}

/// Check that all edge source/target nodes exist
pub(crate) fn validate_edge_references(
    nodes: &[GraphNode],
    edges: &[GraphEdge],
    errors: &mut Vec<ValidationError>,
) {
    let node_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in edges {
        if !node_ids.contains(edge.source.as_str()) {
            errors.push(ValidationError::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: edge.source.clone(),
            });
        }
        if !node_ids.contains(edge.target.as_str()) {
            errors.push(ValidationError::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: edge.target.clone(),
            });
        }
    }
}

/// Check that input connections only target declared input anchors
fn validate_anchor_counts(nodes: &[GraphNode], edges: &[GraphEdge], errors: &mut Vec<ValidationError>) {
    let mut used: HashMap<&str, usize> = HashMap::new();
    for edge in edges.iter().filter(|e| e.is_input_connection()) {
        if let Some(handle) = Handle::parse(&edge.target_handle) {
            let slot = used.entry(edge.target.as_str()).or_insert(0);
            *slot = (*slot).max(handle.index + 1);
        }
    }

    for node in nodes {
        let count = used.get(node.id.as_str()).copied().unwrap_or(0);
        if count > node.input_anchors {
            errors.push(ValidationError::AnchorOverflow {
                node_id: node.id.clone(),
                declared: node.input_anchors,
                used: count,
            });
        }
    }
}

/// Detect cycles using Kahn's algorithm (topological sort)
fn detect_cycles(nodes: &[GraphNode], edges: &[GraphEdge], errors: &mut Vec<ValidationError>) {
    let all: HashSet<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
    if let Err(stuck) = topological_order(&all, edges) {
        errors.push(ValidationError::CycleDetected { nodes: stuck });
    }
}

/// Check that all nodes have known types in the registry
pub(crate) fn validate_node_types(
    nodes: &[GraphNode],
    registry: &NodeRegistry,
    errors: &mut Vec<ValidationError>,
) {
    for node in nodes {
        if !registry.has_node_type(&node.node_type) {
            errors.push(ValidationError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
        }
    }
}
