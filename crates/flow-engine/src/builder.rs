//! Fluent builder for workflow graphs
//!
//! Provides a fluent API for constructing graphs programmatically.

use crate::types::{BranchLabel, GraphEdge, GraphNode, Handle, NodeKind, WorkflowGraph};

/// Fluent builder for constructing workflow graphs
///
/// # Example
///
/// ```ignore
/// let graph = WorkflowBuilder::new("wf-1", "My Workflow")
///     .add_trigger("start", "manual-trigger")
///     .add_action("check", "if-else")
///     .with_parameters("inputParameters", serde_json::json!({"value": true}))
///     .add_action("yes", "set-values")
///     .connect("start", "check")
///     .connect_branch("check", BranchLabel::True, "yes")
///     .build();
/// ```
pub struct WorkflowBuilder {
    id: String,
    name: String,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    edge_counter: usize,
}

impl WorkflowBuilder {
    /// Create a new workflow builder
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            edge_counter: 0,
        }
    }

    /// Add a node of any kind
    pub fn add_node(mut self, id: impl Into<String>, node_type: impl Into<String>, kind: NodeKind) -> Self {
        self.nodes.push(GraphNode::new(id, node_type, kind));
        self
    }

    /// Add a trigger node
    pub fn add_trigger(self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.add_node(id, node_type, NodeKind::Trigger)
    }

    /// Add a webhook node
    pub fn add_webhook(self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.add_node(id, node_type, NodeKind::Webhook)
    }

    /// Add an action node
    pub fn add_action(self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.add_node(id, node_type, NodeKind::Action)
    }

    /// Set a parameter set on the most recently added node
    ///
    /// Must be called immediately after one of the `add_*` methods.
    pub fn with_parameters(mut self, set: &str, value: serde_json::Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.set_parameter_set(set, value);
        }
        self
    }

    /// Set the label of the most recently added node
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.label = label.into();
        }
        self
    }

    /// Set anchor counts on the most recently added node
    pub fn with_anchors(mut self, inputs: usize, outputs: usize) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.input_anchors = inputs;
            node.output_anchors = outputs;
        }
        self
    }

    /// Connect first output anchor of `source` to first input anchor of `target`
    pub fn connect(self, source: &str, target: &str) -> Self {
        let source_handle = Handle::output(source, 0);
        let target_handle = Handle::input(target, 0);
        self.push_edge(source, source_handle, target, target_handle, None)
    }

    /// Connect one side of a branch node to `target`
    ///
    /// The source handle is the anchor the label occupies (true = 0, false = 1).
    pub fn connect_branch(self, source: &str, label: BranchLabel, target: &str) -> Self {
        let source_handle = Handle::output(source, label.output_index());
        let target_handle = Handle::input(target, 0);
        self.push_edge(source, source_handle, target, target_handle, Some(label))
    }

    /// Connect two explicit handles
    pub fn connect_handles(
        self,
        source: &str,
        source_handle: impl Into<String>,
        target: &str,
        target_handle: impl Into<String>,
    ) -> Self {
        self.push_edge(source, source_handle.into(), target, target_handle.into(), None)
    }

    /// Add a fully specified edge
    pub fn add_edge(mut self, edge: GraphEdge) -> Self {
        self.edge_counter += 1;
        self.edges.push(edge);
        self
    }

    fn push_edge(
        mut self,
        source: &str,
        source_handle: String,
        target: &str,
        target_handle: String,
        branch: Option<BranchLabel>,
    ) -> Self {
        self.edge_counter += 1;
        self.edges.push(GraphEdge {
            id: format!("edge-{}", self.edge_counter),
            source: source.to_string(),
            source_handle,
            target: target.to_string(),
            target_handle,
            branch,
        });
        self
    }

    /// Build the graph without validation
    pub fn build(self) -> WorkflowGraph {
        let mut graph = WorkflowGraph::new(self.id, self.name);
        graph.nodes = self.nodes;
        graph.edges = self.edges;
        graph
    }
}
