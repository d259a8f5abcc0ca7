//! If / Else
//!
//! Routes its input down one of two branches. Output anchor 0 is the true
//! side, anchor 1 the false side; the scheduler prunes the side not taken.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::descriptor::required_parameter;
use flow_engine::types::parameter_sets;
use flow_engine::{
    BranchLabel, ExecutorExtensions, FlowError, GraphNode, NodeDescriptor, NodeExecutor, NodeInput, NodeOutput,
    OutputItem, ParameterSpec, ParameterType, Result,
};
use serde_json::{json, Value};

/// Comparison applied to `value1` and `value2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
}

impl Operation {
    pub const ALL: [&'static str; 7] = [
        "equals",
        "notEquals",
        "contains",
        "greaterThan",
        "lessThan",
        "isEmpty",
        "isNotEmpty",
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "equals" => Self::Equals,
            "notEquals" => Self::NotEquals,
            "contains" => Self::Contains,
            "greaterThan" => Self::GreaterThan,
            "lessThan" => Self::LessThan,
            "isEmpty" => Self::IsEmpty,
            "isNotEmpty" => Self::IsNotEmpty,
            _ => return None,
        })
    }

    pub fn evaluate(self, left: &Value, right: &Value) -> bool {
        match self {
            Self::Equals => left == right,
            Self::NotEquals => left != right,
            Self::Contains => match (left, right) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
                (Value::Array(values), needle) => values.contains(needle),
                (Value::Object(map), Value::String(key)) => map.contains_key(key),
                _ => false,
            },
            Self::GreaterThan => compare(left, right).is_some_and(|o| o.is_gt()),
            Self::LessThan => compare(left, right).is_some_and(|o| o.is_lt()),
            Self::IsEmpty => is_empty(left),
            Self::IsNotEmpty => !is_empty(left),
        }
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Resolve `$json.a.b` references against the first input item
fn resolve(value: &Value, input: &[OutputItem]) -> Value {
    let Some(path) = value.as_str().and_then(|s| s.strip_prefix("$json.")) else {
        return value.clone();
    };
    let Some(first) = input.first() else {
        return Value::Null;
    };
    path.split('.')
        .try_fold(&first.json, |current, key| current.get(key))
        .cloned()
        .unwrap_or(Value::Null)
}

/// If / Else node
///
/// # Parameters (`inputParameters`)
/// - `value1` (required) - Left operand; `$json.path` reads the first input item
/// - `operation` - One of [`Operation::ALL`] (default `equals`)
/// - `value2` - Right operand, resolved like `value1`
///
/// # Output
/// The input items unchanged, tagged with the branch taken.
#[derive(Clone, Default)]
pub struct IfElse;

impl IfElse {
    pub const NODE_TYPE: &'static str = "if-else";
    pub const PARAM_VALUE1: &'static str = "value1";
    pub const PARAM_OPERATION: &'static str = "operation";
    pub const PARAM_VALUE2: &'static str = "value2";
}

#[async_trait]
impl NodeExecutor for IfElse {
    fn describe(&self) -> NodeDescriptor {
        NodeDescriptor::new(Self::NODE_TYPE, "If / Else")
            .with_description("Routes items down the true or false branch")
            .with_anchors(1, 2)
            .with_parameter(ParameterSpec::required(
                parameter_sets::INPUT_PARAMETERS,
                Self::PARAM_VALUE1,
                "Value 1",
                ParameterType::Json,
            ))
            .with_parameter(
                ParameterSpec::optional(
                    parameter_sets::INPUT_PARAMETERS,
                    Self::PARAM_OPERATION,
                    "Operation",
                    ParameterType::Options,
                )
                .with_options(&Operation::ALL)
                .with_default(json!("equals")),
            )
            .with_parameter(ParameterSpec::optional(
                parameter_sets::INPUT_PARAMETERS,
                Self::PARAM_VALUE2,
                "Value 2",
                ParameterType::Json,
            ))
    }

    async fn execute(
        &self,
        node: &GraphNode,
        input: NodeInput,
        _extensions: &ExecutorExtensions,
    ) -> Result<NodeOutput> {
        let value1 = required_parameter(node, parameter_sets::INPUT_PARAMETERS, Self::PARAM_VALUE1)?;
        let value2 = node
            .parameter(parameter_sets::INPUT_PARAMETERS, Self::PARAM_VALUE2)
            .unwrap_or(&Value::Null);
        let operation_name = node
            .parameter(parameter_sets::INPUT_PARAMETERS, Self::PARAM_OPERATION)
            .and_then(Value::as_str)
            .unwrap_or("equals");
        let operation = Operation::parse(operation_name)
            .ok_or_else(|| FlowError::failed(format!("unknown operation '{}'", operation_name)))?;

        let left = resolve(value1, &input.items);
        let right = resolve(value2, &input.items);
        let outcome = operation.evaluate(&left, &right);

        log::debug!(
            "IfElse {}: {} {:?} {} -> {}",
            node.id,
            left,
            operation,
            right,
            outcome
        );

        Ok(NodeOutput::from_items(input.items).with_branch(BranchLabel::from(outcome)))
    }
}

inventory::submit!(flow_engine::BuiltinNode {
    node_type: IfElse::NODE_TYPE,
    factory: || Arc::new(IfElse),
});
