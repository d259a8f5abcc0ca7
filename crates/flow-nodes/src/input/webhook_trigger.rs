//! Webhook Trigger
//!
//! Starts a run when an HTTP request arrives. The host writes the request
//! into the node's `inputParameters` before dispatching the run; this node
//! turns it into a single item.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::types::parameter_sets;
use flow_engine::{
    ExecutorExtensions, GraphNode, NodeDescriptor, NodeExecutor, NodeInput, NodeKind, NodeOutput, ParameterSpec,
    ParameterType, Result,
};
use serde_json::{json, Value};

/// Webhook trigger node
///
/// # Parameters (`inputParameters`)
/// - `method` - HTTP method the webhook accepts (default `POST`)
/// - `body`, `headers`, `query` - The received request, filled in by the host
///
/// # Output
/// One item `{ "body": .., "headers": {..}, "query": {..} }`
#[derive(Clone, Default)]
pub struct WebhookTrigger;

impl WebhookTrigger {
    pub const NODE_TYPE: &'static str = "webhook-trigger";
    pub const PARAM_METHOD: &'static str = "method";
    pub const PARAM_BODY: &'static str = "body";
    pub const PARAM_HEADERS: &'static str = "headers";
    pub const PARAM_QUERY: &'static str = "query";
}

fn request_part(node: &GraphNode, key: &str, empty: Value) -> Value {
    node.parameter(parameter_sets::INPUT_PARAMETERS, key)
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or(empty)
}

#[async_trait]
impl NodeExecutor for WebhookTrigger {
    fn describe(&self) -> NodeDescriptor {
        NodeDescriptor::new(Self::NODE_TYPE, "Webhook")
            .with_description("Starts the workflow when a webhook request is received")
            .with_kind(NodeKind::Webhook)
            .with_parameter(
                ParameterSpec::optional(
                    parameter_sets::INPUT_PARAMETERS,
                    Self::PARAM_METHOD,
                    "HTTP Method",
                    ParameterType::Options,
                )
                .with_options(&["GET", "POST", "PUT", "PATCH", "DELETE"])
                .with_default(json!("POST")),
            )
    }

    async fn execute(
        &self,
        node: &GraphNode,
        _input: NodeInput,
        _extensions: &ExecutorExtensions,
    ) -> Result<NodeOutput> {
        let item = json!({
            "body": request_part(node, Self::PARAM_BODY, Value::Null),
            "headers": request_part(node, Self::PARAM_HEADERS, json!({})),
            "query": request_part(node, Self::PARAM_QUERY, json!({})),
        });

        log::debug!("WebhookTrigger {}: received request", node.id);
        Ok(NodeOutput::json(item))
    }
}

inventory::submit!(flow_engine::BuiltinNode {
    node_type: WebhookTrigger::NODE_TYPE,
    factory: || Arc::new(WebhookTrigger),
});
