//! Flow Engine - Graph-based workflow execution
//!
//! This crate provides the execution core of a visual workflow automation
//! system. It supports:
//!
//! - A typed graph model of nodes, edges and anchor handles
//! - Structural queries: starting nodes, all paths, connected ancestors
//! - Dependency-ordered scheduling with fail-fast, branch pruning,
//!   cancellation, run/node budgets and bounded concurrency
//! - Webhook-started runs whose results are published per client
//!
//! # Architecture
//!
//! - `NodeRegistry`: one `NodeExecutor` per node type, including the
//!   built-ins collected at link time through `inventory`
//! - `Scheduler`: validates a run up front, then drives it to a terminal
//!   `RunState` and returns the `ExecutionRun` trace
//! - `EventSink`: generic progress streaming (not tied to any transport)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use flow_engine::{NodeRegistry, Scheduler, SchedulerConfig, WorkflowBuilder};
//!
//! let graph = WorkflowBuilder::new("wf", "Example")
//!     .add_trigger("start", "manual-trigger")
//!     .add_action("set", "set-values")
//!     .connect("start", "set")
//!     .build();
//!
//! let scheduler = Scheduler::new(Arc::new(NodeRegistry::with_builtins()), SchedulerConfig::default());
//! let run = scheduler.run_workflow(&graph).await?;
//! ```

pub mod builder;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod extensions;
pub mod graph;
pub mod listeners;
pub mod paths;
pub mod registry;
pub mod run;
pub mod scheduler;
pub mod types;
pub mod validation;
pub mod webhook;

// Re-export key types
pub use builder::WorkflowBuilder;
pub use config::SchedulerConfig;
pub use descriptor::{NodeDescriptor, ParameterSpec, ParameterType};
pub use error::{FlowError, Result};
pub use events::{ChannelEventSink, EventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use extensions::{extension_keys, CredentialLookup, ExecutorExtensions};
pub use graph::{build_graph, find_starting_nodes, Adjacency, GraphIndex};
pub use listeners::{ListenerHandle, ListenerTable};
pub use paths::{all_paths, connected_ancestors, variable_sources};
pub use registry::{BuiltinNode, NodeExecutor, NodeRegistry};
pub use run::{Attachment, ExecutionRun, NodeInput, NodeOutput, NodeResult, OutputItem, RunError, RunState};
pub use scheduler::{Dispatch, Scheduler};
pub use types::{
    AnchorDirection, BranchLabel, EdgeId, GraphEdge, GraphNode, Handle, NodeId, NodeKind, WorkflowGraph,
};
pub use validation::{validate_workflow, ValidationError};
pub use webhook::{WebhookChannel, WebhookMessage};

// Re-export so hosts and node crates do not need their own dependency
pub use async_trait::async_trait;
pub use inventory;
pub use tokio_util::sync::CancellationToken;
