//! Set Values
//!
//! Writes fixed fields onto every item passing through.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::descriptor::required_parameter;
use flow_engine::types::parameter_sets;
use flow_engine::{
    ExecutorExtensions, FlowError, GraphNode, NodeDescriptor, NodeExecutor, NodeInput, NodeOutput, OutputItem,
    ParameterSpec, ParameterType, Result,
};
use serde_json::{json, Map, Value};

/// Set values node
///
/// # Parameters (`inputParameters`)
/// - `values` (required) - Object of fields to write onto each item
/// - `keepOnlySet` - Drop every field not listed in `values` (default false)
///
/// Without input items a single item holding just `values` is emitted.
#[derive(Clone, Default)]
pub struct SetValues;

impl SetValues {
    pub const NODE_TYPE: &'static str = "set-values";
    pub const PARAM_VALUES: &'static str = "values";
    pub const PARAM_KEEP_ONLY_SET: &'static str = "keepOnlySet";
}

#[async_trait]
impl NodeExecutor for SetValues {
    fn describe(&self) -> NodeDescriptor {
        NodeDescriptor::new(Self::NODE_TYPE, "Set Values")
            .with_description("Sets fields on each item")
            .with_parameter(ParameterSpec::required(
                parameter_sets::INPUT_PARAMETERS,
                Self::PARAM_VALUES,
                "Values",
                ParameterType::Json,
            ))
            .with_parameter(
                ParameterSpec::optional(
                    parameter_sets::INPUT_PARAMETERS,
                    Self::PARAM_KEEP_ONLY_SET,
                    "Keep Only Set",
                    ParameterType::Boolean,
                )
                .with_default(json!(false)),
            )
    }

    async fn execute(
        &self,
        node: &GraphNode,
        input: NodeInput,
        _extensions: &ExecutorExtensions,
    ) -> Result<NodeOutput> {
        let values = required_parameter(node, parameter_sets::INPUT_PARAMETERS, Self::PARAM_VALUES)?
            .as_object()
            .ok_or_else(|| FlowError::failed(format!("'values' on node '{}' must be an object", node.id)))?;
        let keep_only_set = node
            .parameter(parameter_sets::INPUT_PARAMETERS, Self::PARAM_KEEP_ONLY_SET)
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let items = if input.items.is_empty() {
            vec![OutputItem::json(Value::Object(values.clone()))]
        } else {
            input
                .items
                .into_iter()
                .map(|mut item| {
                    let mut fields = match item.json {
                        Value::Object(fields) if !keep_only_set => fields,
                        _ => Map::new(),
                    };
                    fields.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
                    item.json = Value::Object(fields);
                    item
                })
                .collect()
        };

        log::debug!("SetValues {}: set {} fields on {} items", node.id, values.len(), items.len());
        Ok(NodeOutput::from_items(items))
    }
}

inventory::submit!(flow_engine::BuiltinNode {
    node_type: SetValues::NODE_TYPE,
    factory: || Arc::new(SetValues),
});
