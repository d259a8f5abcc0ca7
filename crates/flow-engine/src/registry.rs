//! Node type registry for dynamic node resolution
//!
//! Maps node type strings to executors and descriptors. The scheduler
//! dispatches on `GraphNode::node_type` only; it never inspects a node's
//! parameters to decide what runs.
//!
//! # Usage
//!
//! ```ignore
//! use flow_engine::{NodeRegistry, Scheduler};
//!
//! let mut registry = NodeRegistry::with_builtins();
//! registry.register(Arc::new(MyConnector));
//!
//! let scheduler = Scheduler::new(Arc::new(registry), SchedulerConfig::default());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::descriptor::NodeDescriptor;
use crate::error::Result;
use crate::extensions::ExecutorExtensions;
use crate::run::{NodeInput, NodeOutput};
use crate::types::{GraphNode, NodeKind};

/// Per-node-type executor
///
/// A `NodeExecutor` handles exactly one node type: it describes itself and
/// turns the input assembled from its parents into output items.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Static description of the node type
    fn describe(&self) -> NodeDescriptor;

    /// Execute one node instance
    async fn execute(
        &self,
        node: &GraphNode,
        input: NodeInput,
        extensions: &ExecutorExtensions,
    ) -> Result<NodeOutput>;
}

/// Factory for creating or returning a shared NodeExecutor
pub trait NodeExecutorFactory: Send + Sync {
    fn create_executor(&self) -> Arc<dyn NodeExecutor>;
}

/// Link-time registration of a built-in node type
///
/// The `factory` field is a function pointer so registrations can be
/// `static`:
///
/// ```ignore
/// inventory::submit!(flow_engine::BuiltinNode {
///     node_type: "if-else",
///     factory: || Arc::new(IfElseNode),
/// });
/// ```
pub struct BuiltinNode {
    /// The node type this factory produces
    pub node_type: &'static str,
    /// Creates the executor instance
    pub factory: fn() -> Arc<dyn NodeExecutor>,
}

inventory::collect!(BuiltinNode);

/// A registration entry combining a descriptor with an optional executor factory
struct RegistryEntry {
    descriptor: NodeDescriptor,
    factory: Option<Arc<dyn NodeExecutorFactory>>,
}

/// Registry of node types with their descriptors and executors
///
/// # Composability
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = NodeRegistry::with_builtins();
/// registry.merge(connector_registry); // Add connector nodes
/// ```
pub struct NodeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry holding every node type submitted through `inventory`
    ///
    /// Only registrations linked into the final binary are visible, so the
    /// crate providing them must be a dependency of the caller.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in inventory::iter::<BuiltinNode> {
            let executor = (builtin.factory)();
            let descriptor = executor.describe();
            if descriptor.node_type != builtin.node_type {
                log::warn!(
                    "Built-in '{}' describes itself as '{}'; registering under '{}'",
                    builtin.node_type,
                    descriptor.node_type,
                    builtin.node_type
                );
            }
            registry.entries.insert(
                builtin.node_type.to_string(),
                RegistryEntry {
                    descriptor,
                    factory: Some(Arc::new(SharedExecutorFactory { executor })),
                },
            );
        }
        log::debug!("Registered {} built-in node types", registry.entries.len());
        registry
    }

    /// Register a shared executor under the node type it describes
    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) {
        let descriptor = executor.describe();
        self.register_factory(descriptor, Arc::new(SharedExecutorFactory { executor }));
    }

    /// Register a node type with a descriptor and an executor factory
    pub fn register_factory(&mut self, descriptor: NodeDescriptor, factory: Arc<dyn NodeExecutorFactory>) {
        self.entries.insert(
            descriptor.node_type.clone(),
            RegistryEntry {
                descriptor,
                factory: Some(factory),
            },
        );
    }

    /// Register a node type backed by an async callback
    ///
    /// The callback receives the node and its assembled input.
    pub fn register_callback<F, Fut>(&mut self, descriptor: NodeDescriptor, callback: F)
    where
        F: Fn(GraphNode, NodeInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutput>> + Send + 'static,
    {
        let executor = Arc::new(CallbackNodeExecutor {
            descriptor: descriptor.clone(),
            callback: Box::new(move |node, input| Box::pin(callback(node, input))),
        });
        self.register_factory(descriptor, Arc::new(SharedExecutorFactory { executor }));
    }

    /// Register a node type backed by a synchronous callback
    pub fn register_sync<F>(&mut self, descriptor: NodeDescriptor, callback: F)
    where
        F: Fn(&GraphNode, NodeInput) -> Result<NodeOutput> + Send + Sync + 'static,
    {
        let executor = Arc::new(SyncCallbackNodeExecutor::new(descriptor.clone(), callback));
        self.register_factory(descriptor, Arc::new(SharedExecutorFactory { executor }));
    }

    /// Register a node type with a descriptor only (no executor)
    ///
    /// Used for palette-only registrations such as notes.
    pub fn register_descriptor(&mut self, descriptor: NodeDescriptor) {
        self.entries.insert(
            descriptor.node_type.clone(),
            RegistryEntry {
                descriptor,
                factory: None,
            },
        );
    }

    /// Get the descriptor for a node type
    pub fn get_descriptor(&self, node_type: &str) -> Option<&NodeDescriptor> {
        self.entries.get(node_type).map(|e| &e.descriptor)
    }

    /// Get all registered descriptors
    pub fn all_descriptors(&self) -> Vec<&NodeDescriptor> {
        self.entries.values().map(|e| &e.descriptor).collect()
    }

    /// Descriptors grouped by node kind
    pub fn descriptors_by_kind(&self) -> HashMap<NodeKind, Vec<&NodeDescriptor>> {
        let mut grouped: HashMap<NodeKind, Vec<&NodeDescriptor>> = HashMap::new();
        for entry in self.entries.values() {
            grouped.entry(entry.descriptor.kind).or_default().push(&entry.descriptor);
        }
        grouped
    }

    /// Resolve the executor for a node type
    ///
    /// Returns `None` for unknown types and descriptor-only registrations.
    pub fn resolve_executor(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.entries
            .get(node_type)
            .and_then(|e| e.factory.as_ref())
            .map(|f| f.create_executor())
    }

    /// Check if a node type is registered with an executor
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries
            .get(node_type)
            .is_some_and(|e| e.factory.is_some())
    }

    /// List all registered node type strings
    pub fn node_types(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same node_type.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.entries.extend(other.entries);
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

type BoxedCallback = Box<
    dyn Fn(GraphNode, NodeInput) -> Pin<Box<dyn Future<Output = Result<NodeOutput>> + Send>> + Send + Sync,
>;

/// Async callback-based NodeExecutor
///
/// Wraps an async closure as a NodeExecutor, for hosts that bridge node
/// types into another runtime.
pub struct CallbackNodeExecutor {
    descriptor: NodeDescriptor,
    callback: BoxedCallback,
}

#[async_trait]
impl NodeExecutor for CallbackNodeExecutor {
    fn describe(&self) -> NodeDescriptor {
        self.descriptor.clone()
    }

    async fn execute(
        &self,
        node: &GraphNode,
        input: NodeInput,
        _extensions: &ExecutorExtensions,
    ) -> Result<NodeOutput> {
        (self.callback)(node.clone(), input).await
    }
}

/// Synchronous callback-based NodeExecutor
pub struct SyncCallbackNodeExecutor {
    descriptor: NodeDescriptor,
    callback: Box<dyn Fn(&GraphNode, NodeInput) -> Result<NodeOutput> + Send + Sync>,
}

impl SyncCallbackNodeExecutor {
    pub fn new(
        descriptor: NodeDescriptor,
        callback: impl Fn(&GraphNode, NodeInput) -> Result<NodeOutput> + Send + Sync + 'static,
    ) -> Self {
        Self {
            descriptor,
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl NodeExecutor for SyncCallbackNodeExecutor {
    fn describe(&self) -> NodeDescriptor {
        self.descriptor.clone()
    }

    async fn execute(
        &self,
        node: &GraphNode,
        input: NodeInput,
        _extensions: &ExecutorExtensions,
    ) -> Result<NodeOutput> {
        (self.callback)(node, input)
    }
}

/// Factory that returns a shared executor instance
struct SharedExecutorFactory {
    executor: Arc<dyn NodeExecutor>,
}

impl NodeExecutorFactory for SharedExecutorFactory {
    fn create_executor(&self) -> Arc<dyn NodeExecutor> {
        self.executor.clone()
    }
}
