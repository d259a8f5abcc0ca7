//! Core types for workflow graphs
//!
//! These types define the structure of workflow graphs as drawn on the
//! canvas: nodes with their parameter sets and anchors, and the edges
//! connecting anchor handles.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Named parameter sets configured on a node
///
/// Keyed by set name (see [`parameter_sets`]); each value is the JSON
/// object the editor produced for that set.
pub type ParameterSets = BTreeMap<String, serde_json::Value>;

/// Well-known parameter set names
pub mod parameter_sets {
    pub const ACTIONS: &str = "actions";
    pub const CREDENTIALS: &str = "credentials";
    pub const NETWORKS: &str = "networks";
    pub const INPUT_PARAMETERS: &str = "inputParameters";
    /// Written back after a run with the node's last output
    pub const OUTPUT_RESPONSES: &str = "outputResponses";
}

/// Kind discriminator of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Manually or schedule-started entry point
    Trigger,
    /// Entry point started by an incoming HTTP call
    Webhook,
    /// Regular unit of work that needs upstream input
    #[default]
    Action,
    /// Any other kind (notes, decorations, ...)
    #[serde(other)]
    Other,
}

impl NodeKind {
    /// Whether a node of this kind may start a run
    pub fn is_startable(&self) -> bool {
        matches!(self, NodeKind::Trigger | NodeKind::Webhook)
    }
}

/// Direction of an anchor handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorDirection {
    Input,
    Output,
}

impl AnchorDirection {
    fn marker(&self) -> &'static str {
        match self {
            AnchorDirection::Input => "-input-",
            AnchorDirection::Output => "-output-",
        }
    }
}

/// A decoded anchor handle: `{node_id}-{input|output}-{index}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub node_id: NodeId,
    pub direction: AnchorDirection,
    pub index: usize,
}

impl Handle {
    /// Encode an input handle string
    pub fn input(node_id: &str, index: usize) -> String {
        format!("{}-input-{}", node_id, index)
    }

    /// Encode an output handle string
    pub fn output(node_id: &str, index: usize) -> String {
        format!("{}-output-{}", node_id, index)
    }

    /// Decode a handle string
    ///
    /// Node ids may themselves contain dashes, so the last direction marker
    /// wins. Returns `None` when no marker is present or the index is not
    /// a number.
    pub fn parse(handle: &str) -> Option<Handle> {
        let candidates = [AnchorDirection::Input, AnchorDirection::Output];
        let (direction, pos) = candidates
            .iter()
            .filter_map(|d| handle.rfind(d.marker()).map(|pos| (*d, pos)))
            .max_by_key(|(_, pos)| *pos)?;

        let index = handle[pos + direction.marker().len()..].parse().ok()?;
        Some(Handle {
            node_id: handle[..pos].to_string(),
            direction,
            index,
        })
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.node_id, self.direction.marker(), self.index)
    }
}

/// Which side of a branch node an edge leaves from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchLabel {
    True,
    False,
}

impl BranchLabel {
    /// Map a branch node's output anchor index to its label (0 = true, 1 = false)
    pub fn from_output_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(BranchLabel::True),
            1 => Some(BranchLabel::False),
            _ => None,
        }
    }

    /// The output anchor index this label occupies
    pub fn output_index(&self) -> usize {
        match self {
            BranchLabel::True => 0,
            BranchLabel::False => 1,
        }
    }
}

impl From<bool> for BranchLabel {
    fn from(value: bool) -> Self {
        if value {
            BranchLabel::True
        } else {
            BranchLabel::False
        }
    }
}

/// An edge connecting two anchor handles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Unique identifier for this edge
    pub id: EdgeId,
    /// Source node ID
    pub source: NodeId,
    /// Source handle (`{source}-output-{n}`)
    pub source_handle: String,
    /// Target node ID
    pub target: NodeId,
    /// Target handle (`{target}-input-{n}`)
    pub target_handle: String,
    /// Branch label for edges leaving a branch node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchLabel>,
}

impl GraphEdge {
    /// Whether the target handle marks a real data input connection
    pub fn is_input_connection(&self) -> bool {
        self.target_handle.contains(AnchorDirection::Input.marker())
    }

    /// Branch label of this edge
    ///
    /// The explicit label wins; edges saved without one fall back to the
    /// source handle's output index.
    pub fn branch_label(&self) -> Option<BranchLabel> {
        self.branch.or_else(|| {
            Handle::parse(&self.source_handle)
                .filter(|h| h.direction == AnchorDirection::Output)
                .and_then(|h| BranchLabel::from_output_index(h.index))
        })
    }
}

fn default_anchor_count() -> usize {
    1
}

/// A node instance in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Unique identifier for this node instance
    pub id: NodeId,
    /// Display label, used in the execution trace
    #[serde(default)]
    pub label: String,
    /// Registry type name (e.g. "if-else")
    pub node_type: String,
    /// Kind discriminator
    #[serde(default)]
    pub kind: NodeKind,
    /// Configured parameter sets
    #[serde(default)]
    pub parameters: ParameterSets,
    /// Number of input anchors
    #[serde(default = "default_anchor_count")]
    pub input_anchors: usize,
    /// Number of output anchors
    #[serde(default = "default_anchor_count")]
    pub output_anchors: usize,
    /// Position in the UI (x, y)
    #[serde(default)]
    pub position: (f64, f64),
}

impl GraphNode {
    /// Create a node with one input and one output anchor
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, kind: NodeKind) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            node_type: node_type.into(),
            kind,
            parameters: ParameterSets::new(),
            input_anchors: if kind.is_startable() { 0 } else { 1 },
            output_anchors: 1,
            position: (0.0, 0.0),
        }
    }

    /// Label shown in the trace, falling back to the id
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    /// Get a whole parameter set
    pub fn parameter_set(&self, set: &str) -> Option<&serde_json::Value> {
        self.parameters.get(set)
    }

    /// Get a single parameter from a set
    pub fn parameter(&self, set: &str, key: &str) -> Option<&serde_json::Value> {
        self.parameter_set(set).and_then(|v| v.get(key))
    }

    /// Replace a whole parameter set
    pub fn set_parameter_set(&mut self, set: &str, value: serde_json::Value) {
        self.parameters.insert(set.to_string(), value);
    }
}

/// A complete workflow graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    /// Unique identifier for this graph
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Nodes in the graph
    pub nodes: Vec<GraphNode>,
    /// Edges connecting nodes
    pub edges: Vec<GraphEdge>,
}

impl WorkflowGraph {
    /// Create a new empty graph
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a node by ID (mutable)
    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }
}
