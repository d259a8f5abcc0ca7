//! Node descriptors and parameter schemas
//!
//! Every node type describes itself: its kind, its anchors and the
//! parameters it reads from each parameter set. The editor renders forms
//! from this; `required_parameter` checks it at execution time.

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::types::{GraphNode, NodeKind};

/// Complete description of a node type
///
/// This describes everything needed to render a node in the palette and
/// to check its configuration before it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    /// Unique type identifier (e.g., "if-else")
    pub node_type: String,
    /// Human-readable label
    pub label: String,
    /// Description of what the node does
    pub description: String,
    /// Kind of node instances of this type
    pub kind: NodeKind,
    /// Number of input anchors
    pub input_anchors: usize,
    /// Number of output anchors
    pub output_anchors: usize,
    /// Parameter definitions
    pub parameters: Vec<ParameterSpec>,
}

impl NodeDescriptor {
    /// An action type with one input and one output anchor
    pub fn new(node_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            label: label.into(),
            description: String::new(),
            kind: NodeKind::Action,
            input_anchors: 1,
            output_anchors: 1,
            parameters: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the kind; startable kinds lose their input anchor
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        if kind.is_startable() {
            self.input_anchors = 0;
        }
        self
    }

    pub fn with_anchors(mut self, inputs: usize, outputs: usize) -> Self {
        self.input_anchors = inputs;
        self.output_anchors = outputs;
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Instantiate a node of this type
    pub fn instantiate(&self, id: impl Into<String>) -> GraphNode {
        let mut node = GraphNode::new(id, self.node_type.clone(), self.kind);
        node.label = self.label.clone();
        node.input_anchors = self.input_anchors;
        node.output_anchors = self.output_anchors;
        node
    }

    /// Required parameters missing from a configured node
    pub fn missing_parameters<'a>(&'a self, node: &GraphNode) -> Vec<&'a ParameterSpec> {
        self.parameters
            .iter()
            .filter(|p| p.required && p.default.is_none())
            .filter(|p| node.parameter(&p.set, &p.key).map_or(true, |v| v.is_null()))
            .collect()
    }
}

/// Value type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Json,
    /// Name of an externally supplied credential
    Credential,
    /// One of a fixed list of options
    Options,
}

/// Schema for a single parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    /// Parameter set the value lives in
    pub set: String,
    pub key: String,
    pub label: String,
    pub param_type: ParameterType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl ParameterSpec {
    pub fn new(
        set: impl Into<String>,
        key: impl Into<String>,
        label: impl Into<String>,
        param_type: ParameterType,
        required: bool,
    ) -> Self {
        Self {
            set: set.into(),
            key: key.into(),
            label: label.into(),
            param_type,
            required,
            default: None,
            options: Vec::new(),
        }
    }

    /// Create a required parameter
    pub fn required(
        set: impl Into<String>,
        key: impl Into<String>,
        label: impl Into<String>,
        param_type: ParameterType,
    ) -> Self {
        Self::new(set, key, label, param_type, true)
    }

    /// Create an optional parameter
    pub fn optional(
        set: impl Into<String>,
        key: impl Into<String>,
        label: impl Into<String>,
        param_type: ParameterType,
    ) -> Self {
        Self::new(set, key, label, param_type, false)
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }
}

/// Read a parameter, falling back to the schema default
pub fn parameter_or_default<'a>(
    node: &'a GraphNode,
    spec: &'a ParameterSpec,
) -> Option<&'a serde_json::Value> {
    node.parameter(&spec.set, &spec.key)
        .filter(|v| !v.is_null())
        .or(spec.default.as_ref())
}

/// Read a parameter that must be present
pub fn required_parameter<'a>(node: &'a GraphNode, set: &str, key: &str) -> Result<&'a serde_json::Value> {
    node.parameter(set, key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| FlowError::MissingInput(format!("{}.{} on node '{}'", set, key, node.id)))
}
