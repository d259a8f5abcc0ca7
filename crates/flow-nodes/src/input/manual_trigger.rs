//! Manual Trigger
//!
//! Starts a run from the editor's "execute" button. The items it emits are
//! taken from its `payload` parameter so a user can test a workflow with
//! fixed sample data.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::types::parameter_sets;
use flow_engine::{
    ExecutorExtensions, GraphNode, NodeDescriptor, NodeExecutor, NodeInput, NodeKind, NodeOutput, OutputItem,
    ParameterSpec, ParameterType, Result,
};
use serde_json::Value;

/// Manual trigger node
///
/// # Parameters (`inputParameters`)
/// - `payload` (optional) - An object becomes one item, an array one item per
///   element. Without a payload a single empty item is emitted so downstream
///   nodes still run.
#[derive(Clone, Default)]
pub struct ManualTrigger;

impl ManualTrigger {
    pub const NODE_TYPE: &'static str = "manual-trigger";
    pub const PARAM_PAYLOAD: &'static str = "payload";
}

#[async_trait]
impl NodeExecutor for ManualTrigger {
    fn describe(&self) -> NodeDescriptor {
        NodeDescriptor::new(Self::NODE_TYPE, "Manual Trigger")
            .with_description("Starts the workflow on demand")
            .with_kind(NodeKind::Trigger)
            .with_parameter(ParameterSpec::optional(
                parameter_sets::INPUT_PARAMETERS,
                Self::PARAM_PAYLOAD,
                "Payload",
                ParameterType::Json,
            ))
    }

    async fn execute(
        &self,
        node: &GraphNode,
        _input: NodeInput,
        _extensions: &ExecutorExtensions,
    ) -> Result<NodeOutput> {
        let items = match node.parameter(parameter_sets::INPUT_PARAMETERS, Self::PARAM_PAYLOAD) {
            Some(Value::Array(values)) => values.iter().cloned().map(OutputItem::json).collect(),
            Some(value) if !value.is_null() => vec![OutputItem::json(value.clone())],
            _ => vec![OutputItem::json(Value::Object(Default::default()))],
        };

        log::debug!("ManualTrigger {}: emitting {} items", node.id, items.len());
        Ok(NodeOutput::from_items(items))
    }
}

inventory::submit!(flow_engine::BuiltinNode {
    node_type: ManualTrigger::NODE_TYPE,
    factory: || Arc::new(ManualTrigger),
});
