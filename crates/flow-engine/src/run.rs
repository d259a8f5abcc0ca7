//! Execution run records
//!
//! An `ExecutionRun` is the per-run trace: one `NodeResult` per node that
//! completed, in completion order, plus the run state. The scheduler owns the
//! run exclusively while it is `INPROGRESS`; once terminal it is never
//! modified again.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowError, Result};
use crate::types::{parameter_sets, BranchLabel, GraphNode, NodeId, WorkflowGraph};

/// A binary attachment produced by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    /// Base64 or data-URL encoded content
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// One output item record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputItem {
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub json: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl OutputItem {
    /// Item carrying only a JSON payload
    pub fn json(json: Value) -> Self {
        Self {
            json,
            ..Default::default()
        }
    }

    /// Attach rendered HTML
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Add a binary attachment
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// What a node executor returns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutput {
    pub items: Vec<OutputItem>,
    /// Set by branch nodes to the side that was taken
    pub branch: Option<BranchLabel>,
}

impl NodeOutput {
    pub fn from_items(items: Vec<OutputItem>) -> Self {
        Self { items, branch: None }
    }

    /// Single item with a JSON payload
    pub fn json(json: Value) -> Self {
        Self::from_items(vec![OutputItem::json(json)])
    }

    /// Mark the branch taken
    pub fn with_branch(mut self, label: BranchLabel) -> Self {
        self.branch = Some(label);
        self
    }
}

/// Input assembled for a node from its completed parents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInput {
    /// All parent items concatenated in edge order
    pub items: Vec<OutputItem>,
    /// Items grouped by the target handle they arrived on
    pub slots: BTreeMap<String, Vec<OutputItem>>,
    /// Items grouped by parent node id
    pub parents: BTreeMap<NodeId, Vec<OutputItem>>,
}

impl NodeInput {
    /// Items delivered to a specific input anchor
    pub fn slot(&self, handle: &str) -> &[OutputItem] {
        self.slots.get(handle).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Trace record for one completed node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub node_id: NodeId,
    pub node_label: String,
    pub data: Vec<OutputItem>,
}

/// Run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    #[serde(rename = "INPROGRESS")]
    InProgress,
    Finished,
    Error,
    Terminated,
    Timeout,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::InProgress)
    }
}

/// Error record attached to a run that ended in `ERROR` or `TIMEOUT`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunError {
    /// Node being executed when the run failed, if any
    pub node_id: Option<NodeId>,
    pub message: String,
}

/// Trace of one workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRun {
    pub execution_id: String,
    pub workflow_id: String,
    pub state: RunState,
    pub results: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRun {
    /// Start a new run in `INPROGRESS`
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            state: RunState::InProgress,
            results: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Append a completed node's output
    pub fn record(&mut self, node: &GraphNode, data: Vec<OutputItem>) -> Result<()> {
        if self.state.is_terminal() {
            return Err(FlowError::InvalidTransition {
                from: self.state,
                to: self.state,
            });
        }
        self.results.push(NodeResult {
            node_id: node.id.clone(),
            node_label: node.display_label().to_string(),
            data,
        });
        Ok(())
    }

    /// Move out of `INPROGRESS`
    ///
    /// Terminal states are final; any further transition fails.
    pub fn transition(&mut self, to: RunState) -> Result<()> {
        if self.state.is_terminal() || !to.is_terminal() {
            return Err(FlowError::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Finish with a terminal state and error record
    pub(crate) fn fail(&mut self, to: RunState, node_id: Option<NodeId>, message: String) -> Result<()> {
        self.transition(to)?;
        self.error = Some(RunError { node_id, message });
        Ok(())
    }

    /// Turn anything but a finished run into an error
    pub fn into_result(self) -> Result<Self> {
        match self.state {
            RunState::Finished => Ok(self),
            RunState::Terminated => Err(FlowError::Cancelled),
            state => {
                let error = self.error.unwrap_or(RunError {
                    node_id: None,
                    message: format!("run ended in {:?}", state),
                });
                match (state, error.node_id) {
                    (RunState::Timeout, _) => Err(FlowError::BudgetExceeded(error.message)),
                    (_, Some(node_id)) => Err(FlowError::Executor {
                        node_id,
                        message: error.message,
                    }),
                    (_, None) => Err(FlowError::ExecutionFailed(error.message)),
                }
            }
        }
    }

    /// Ids of the nodes that completed, in completion order
    pub fn executed(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.node_id.as_str()).collect()
    }

    /// The recorded output of a node
    pub fn result_for(&self, node_id: &str) -> Option<&NodeResult> {
        self.results.iter().find(|r| r.node_id == node_id)
    }

    /// Store each node's items under its `outputResponses` parameter set
    ///
    /// Nodes that did not run keep whatever they had.
    pub fn write_back(&self, graph: &mut WorkflowGraph) -> Result<()> {
        for result in &self.results {
            if let Some(node) = graph.find_node_mut(&result.node_id) {
                let value = serde_json::to_value(&result.data)?;
                node.set_parameter_set(parameter_sets::OUTPUT_RESPONSES, serde_json::json!({ "output": value }));
            }
        }
        Ok(())
    }
}
