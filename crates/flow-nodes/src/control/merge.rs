//! Merge
//!
//! Joins the items arriving on its two input anchors. Useful after a
//! fan-out, or to rejoin the two sides of an if/else.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::types::parameter_sets;
use flow_engine::{
    ExecutorExtensions, FlowError, GraphNode, Handle, NodeDescriptor, NodeExecutor, NodeInput, NodeOutput,
    OutputItem, ParameterSpec, ParameterType, Result,
};
use serde_json::{json, Value};

/// Merge node
///
/// # Parameters (`inputParameters`)
/// - `mode` - `append` (default) emits anchor 0's items then anchor 1's;
///   `combine` merges the two lists pairwise by position, object keys from
///   anchor 1 winning
#[derive(Clone, Default)]
pub struct Merge;

impl Merge {
    pub const NODE_TYPE: &'static str = "merge";
    pub const PARAM_MODE: &'static str = "mode";
}

fn combine(left: &[OutputItem], right: &[OutputItem]) -> Vec<OutputItem> {
    let len = left.len().max(right.len());
    (0..len)
        .map(|i| match (left.get(i), right.get(i)) {
            (Some(a), Some(b)) => {
                let json = match (&a.json, &b.json) {
                    (Value::Object(a), Value::Object(b)) => {
                        let mut merged = a.clone();
                        merged.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
                        Value::Object(merged)
                    }
                    (_, b) => b.clone(),
                };
                let mut item = OutputItem::json(json);
                item.attachments = a.attachments.iter().chain(&b.attachments).cloned().collect();
                item.html = b.html.clone().or_else(|| a.html.clone());
                item
            }
            (Some(only), None) | (None, Some(only)) => only.clone(),
            (None, None) => OutputItem::default(),
        })
        .collect()
}

#[async_trait]
impl NodeExecutor for Merge {
    fn describe(&self) -> NodeDescriptor {
        NodeDescriptor::new(Self::NODE_TYPE, "Merge")
            .with_description("Joins the items of two inputs")
            .with_anchors(2, 1)
            .with_parameter(
                ParameterSpec::optional(
                    parameter_sets::INPUT_PARAMETERS,
                    Self::PARAM_MODE,
                    "Mode",
                    ParameterType::Options,
                )
                .with_options(&["append", "combine"])
                .with_default(json!("append")),
            )
    }

    async fn execute(
        &self,
        node: &GraphNode,
        input: NodeInput,
        _extensions: &ExecutorExtensions,
    ) -> Result<NodeOutput> {
        let first = input.slot(&Handle::input(&node.id, 0));
        let second = input.slot(&Handle::input(&node.id, 1));

        let mode = node
            .parameter(parameter_sets::INPUT_PARAMETERS, Self::PARAM_MODE)
            .and_then(Value::as_str)
            .unwrap_or("append");

        let items = match mode {
            "append" => first.iter().chain(second).cloned().collect(),
            "combine" => combine(first, second),
            other => return Err(FlowError::failed(format!("unknown merge mode '{}'", other))),
        };

        log::debug!(
            "Merge {}: {} + {} items -> {} ({})",
            node.id,
            first.len(),
            second.len(),
            items.len(),
            mode
        );
        Ok(NodeOutput::from_items(items))
    }
}

inventory::submit!(flow_engine::BuiltinNode {
    node_type: Merge::NODE_TYPE,
    factory: || Arc::new(Merge),
});
