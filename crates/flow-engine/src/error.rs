//! Error types for the flow engine

use thiserror::Error;

use crate::run::RunState;
use crate::types::NodeId;
use crate::validation::ValidationError;

/// Result type alias using FlowError
pub type Result<T> = std::result::Result<T, FlowError>;

/// Errors that can occur in the flow engine
#[derive(Debug, Error)]
pub enum FlowError {
    /// The workflow graph is malformed; raised before any node executes
    #[error(
        "Invalid workflow configuration: {}",
        .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    Configuration(Vec<ValidationError>),

    /// A node's executor failed
    #[error("Node '{node_id}' failed: {message}")]
    Executor { node_id: NodeId, message: String },

    /// Executor-internal failure, reported by node implementations
    #[error("Node execution failed: {0}")]
    ExecutionFailed(String),

    /// Missing required input or parameter
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// Run was cancelled externally
    #[error("Workflow cancelled")]
    Cancelled,

    /// A run or node budget was exceeded
    #[error("Execution budget exceeded: {0}")]
    BudgetExceeded(String),

    /// A run state transition out of a terminal state was attempted
    #[error("Invalid run state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RunState, to: RunState },

    /// Publishing on a closed channel
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create a configuration error from a single validation problem
    pub fn configuration(error: ValidationError) -> Self {
        Self::Configuration(vec![error])
    }

    /// Whether this error was raised before any node executed
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
