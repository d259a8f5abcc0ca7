//! Dependency-ordered workflow execution
//!
//! The scheduler runs a workflow from its starting nodes. A node becomes
//! ready once every edge feeding it has been settled: its source completed
//! (taken) or the edge lies on a branch that was not taken (pruned). Ready
//! nodes with at least one taken input run; the rest are skipped and prune
//! their own outgoing edges in turn.
//!
//! Every structural problem is reported before the first node runs. Once
//! execution starts, the first executor failure ends the run (`ERROR`),
//! as do cancellation (`TERMINATED`) and budget overruns (`TIMEOUT`).
//! Output already recorded stays in the trace in every case.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::error::{FlowError, Result};
use crate::events::{EventSink, NullEventSink, WorkflowEvent};
use crate::extensions::ExecutorExtensions;
use crate::graph::{build_graph, find_starting_nodes, reachable_from, topological_order};
use crate::registry::{NodeExecutor, NodeRegistry};
use crate::run::{ExecutionRun, NodeInput, NodeOutput, OutputItem, RunState};
use crate::types::{GraphEdge, GraphNode, NodeId, NodeKind, WorkflowGraph};
use crate::validation::{validate_edge_references, ValidationError};
use crate::webhook::{WebhookChannel, WebhookMessage};

/// Runs workflows against a node registry
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<NodeRegistry>,
    config: SchedulerConfig,
    event_sink: Arc<dyn EventSink>,
    extensions: Arc<ExecutorExtensions>,
    webhooks: Arc<WebhookChannel>,
}

/// How a dispatched run reports completion
#[derive(Debug)]
pub enum Dispatch {
    /// The run finished and is returned directly
    Completed(ExecutionRun),
    /// The run continues in the background and publishes its result on the
    /// webhook channel under `client_id`
    Pending { client_id: String },
}

/// Result of one executor invocation
enum NodeOutcome {
    Completed(Result<NodeOutput>),
    TimedOut(Duration),
}

/// Validated view of a workflow, restricted to what the run can reach
struct Plan<'a> {
    edges: &'a [GraphEdge],
    nodes: HashMap<&'a str, &'a GraphNode>,
    executors: HashMap<&'a str, Arc<dyn NodeExecutor>>,
    starting: Vec<&'a str>,
    /// Indices of edges leaving reachable nodes, grouped by target
    incoming: HashMap<&'a str, Vec<usize>>,
    /// Indices of edges leaving reachable nodes, grouped by source
    outgoing: HashMap<&'a str, Vec<usize>>,
}

/// Mutable bookkeeping for one run
struct Progress<'a> {
    /// Unsettled incoming edges per node
    remaining: HashMap<&'a str, usize>,
    /// Settled incoming edges that were taken, per node
    live: HashMap<&'a str, usize>,
    taken: Vec<bool>,
    outputs: HashMap<&'a str, Vec<OutputItem>>,
    ready: VecDeque<&'a str>,
}

impl<'a> Progress<'a> {
    fn new(plan: &Plan<'a>) -> Self {
        Self {
            remaining: plan
                .incoming
                .iter()
                .map(|(&id, edges)| (id, edges.len()))
                .collect(),
            live: HashMap::new(),
            taken: vec![false; plan.edges.len()],
            outputs: HashMap::new(),
            ready: plan.starting.iter().copied().collect(),
        }
    }

    /// Assemble a node's input from the taken edges feeding it, in edge order
    fn input_for(&self, plan: &Plan<'a>, node_id: &str) -> NodeInput {
        let mut input = NodeInput::default();
        for &i in plan.incoming.get(node_id).into_iter().flatten() {
            if !self.taken[i] {
                continue;
            }
            let edge = &plan.edges[i];
            let Some(items) = self.outputs.get(edge.source.as_str()) else {
                continue;
            };
            input.items.extend(items.iter().cloned());
            input
                .slots
                .entry(edge.target_handle.clone())
                .or_default()
                .extend(items.iter().cloned());
            input
                .parents
                .entry(edge.source.clone())
                .or_insert_with(|| items.clone());
        }
        input
    }

    /// Record a completed node and settle its outgoing edges
    ///
    /// Returns the nodes that became skippable as a consequence.
    fn complete(&mut self, plan: &Plan<'a>, node_id: &'a str, output: &NodeOutput) -> Vec<&'a str> {
        self.outputs.insert(node_id, output.items.clone());

        let mut settle = VecDeque::new();
        for &i in plan.outgoing.get(node_id).into_iter().flatten() {
            let edge = &plan.edges[i];
            let taken = match output.branch {
                Some(label) => edge.branch_label() == Some(label),
                None => true,
            };
            self.taken[i] = taken;
            settle.push_back((edge.target.as_str(), taken));
        }
        self.settle(plan, settle)
    }

    /// Settle edges in edge order so siblings become ready in the order
    /// they were connected.
    fn settle(&mut self, plan: &Plan<'a>, mut work: VecDeque<(&'a str, bool)>) -> Vec<&'a str> {
        let mut skipped = Vec::new();
        while let Some((target, taken)) = work.pop_front() {
            let Some(remaining) = self.remaining.get_mut(target) else {
                continue;
            };
            *remaining = remaining.saturating_sub(1);
            let settled = *remaining == 0;
            if taken {
                *self.live.entry(target).or_insert(0) += 1;
            }
            if !settled {
                continue;
            }

            if self.live.get(target).copied().unwrap_or(0) > 0 {
                self.ready.push_back(target);
            } else {
                skipped.push(target);
                for &i in plan.outgoing.get(target).into_iter().flatten() {
                    work.push_back((plan.edges[i].target.as_str(), false));
                }
            }
        }
        skipped
    }
}

impl Scheduler {
    pub fn new(registry: Arc<NodeRegistry>, config: SchedulerConfig) -> Self {
        Self {
            registry,
            config,
            event_sink: Arc::new(NullEventSink),
            extensions: Arc::new(ExecutorExtensions::new()),
            webhooks: Arc::new(WebhookChannel::new()),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn with_extensions(mut self, extensions: Arc<ExecutorExtensions>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Share a webhook channel with the transport layer
    pub fn with_webhook_channel(mut self, webhooks: Arc<WebhookChannel>) -> Self {
        self.webhooks = webhooks;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn webhooks(&self) -> &Arc<WebhookChannel> {
        &self.webhooks
    }

    /// Run from the given starting nodes
    pub async fn execute(
        &self,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
        starting: &[NodeId],
    ) -> Result<ExecutionRun> {
        self.execute_with_cancel("", nodes, edges, starting, CancellationToken::new())
            .await
    }

    /// Run a stored workflow from the given starting nodes
    pub async fn execute_graph(&self, graph: &WorkflowGraph, starting: &[NodeId]) -> Result<ExecutionRun> {
        self.execute_with_cancel(&graph.id, &graph.nodes, &graph.edges, starting, CancellationToken::new())
            .await
    }

    /// Run a stored workflow from every trigger and webhook without inputs
    pub async fn run_workflow(&self, graph: &WorkflowGraph) -> Result<ExecutionRun> {
        let index = build_graph(&graph.nodes, &graph.edges, false);
        let starting = find_starting_nodes(&graph.nodes, &index.in_degree);
        self.execute_graph(graph, &starting).await
    }

    /// Check that a run could start, without executing anything
    pub fn preflight(&self, nodes: &[GraphNode], edges: &[GraphEdge], starting: &[NodeId]) -> Result<()> {
        self.prepare(nodes, edges, starting).map(|_| ())
    }

    /// Run with an external cancellation signal
    ///
    /// Configuration problems are returned as `Err` before any node runs.
    /// Every other outcome, including executor failures, is an `Ok` run
    /// whose state tells how it ended.
    pub async fn execute_with_cancel(
        &self,
        workflow_id: &str,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
        starting: &[NodeId],
        cancel: CancellationToken,
    ) -> Result<ExecutionRun> {
        let plan = self.prepare(nodes, edges, starting)?;
        let run = ExecutionRun::new(workflow_id);

        log::info!(
            "Starting run {} of workflow '{}' from {:?}",
            run.execution_id,
            workflow_id,
            plan.starting
        );
        self.emit(WorkflowEvent::RunStarted {
            workflow_id: workflow_id.to_string(),
            execution_id: run.execution_id.clone(),
            starting_nodes: plan.starting.iter().map(|s| s.to_string()).collect(),
        });

        let run = self.drive(&plan, run, cancel).await?;

        log::info!("Run {} ended in state {:?}", run.execution_id, run.state);
        self.emit(WorkflowEvent::RunFinished {
            workflow_id: run.workflow_id.clone(),
            execution_id: run.execution_id.clone(),
            state: run.state,
            error: run.error.as_ref().map(|e| e.message.clone()),
        });
        Ok(run)
    }

    /// Start a run, reporting webhook-started runs over the webhook channel
    ///
    /// Trigger-started runs complete before this returns. When any starting
    /// node is a webhook, the run is validated, spawned onto the runtime and
    /// its result published under `client_id`; subscribe before dispatching.
    /// The client's channel is retired once the result is published.
    pub async fn dispatch(
        &self,
        graph: Arc<WorkflowGraph>,
        starting: Vec<NodeId>,
        client_id: Option<String>,
    ) -> Result<Dispatch> {
        let webhook_started = starting
            .iter()
            .any(|id| graph.find_node(id).is_some_and(|n| n.kind == NodeKind::Webhook));

        if !webhook_started {
            return Ok(Dispatch::Completed(self.execute_graph(&graph, &starting).await?));
        }

        let client_id = client_id
            .ok_or_else(|| FlowError::MissingInput("client id for webhook-started run".to_string()))?;
        self.preflight(&graph.nodes, &graph.edges, &starting)?;

        let scheduler = self.clone();
        let channel_id = client_id.clone();
        tokio::spawn(async move {
            let message = match scheduler.execute_graph(&graph, &starting).await {
                Ok(run) => WebhookMessage::Completed(run),
                Err(e) => WebhookMessage::Failed { message: e.to_string() },
            };
            if let Err(e) = scheduler.webhooks.publish_once(&channel_id, message) {
                log::warn!("Dropped webhook run result for client '{}': {}", channel_id, e);
            }
        });

        Ok(Dispatch::Pending { client_id })
    }

    /// Validate the run and resolve everything it needs
    fn prepare<'a>(
        &self,
        nodes: &'a [GraphNode],
        edges: &'a [GraphEdge],
        starting: &[NodeId],
    ) -> Result<Plan<'a>> {
        let mut errors = Vec::new();
        validate_edge_references(nodes, edges, &mut errors);

        let index = build_graph(nodes, edges, false);
        let by_id: HashMap<&'a str, &'a GraphNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut start: Vec<&'a str> = Vec::new();
        for id in starting {
            match by_id.get(id.as_str()) {
                None => errors.push(ValidationError::UnknownStartingNode { node_id: id.clone() }),
                Some(&node) => {
                    let fed = index.in_degree.get(id).copied().unwrap_or(0) > 0;
                    if !node.kind.is_startable() || fed {
                        errors.push(ValidationError::NotStartable { node_id: id.clone() });
                    } else if !start.contains(&node.id.as_str()) {
                        start.push(node.id.as_str());
                    }
                }
            }
        }

        if starting.is_empty() {
            errors.push(ValidationError::NoStartingNode);
        }
        if self.config.require_single_starting_node && start.len() > 1 {
            errors.push(ValidationError::MultipleStartingNodes {
                nodes: start.iter().map(|s| s.to_string()).collect(),
            });
        }
        if !errors.is_empty() {
            return Err(FlowError::Configuration(errors));
        }

        let roots: Vec<NodeId> = start.iter().map(|s| s.to_string()).collect();
        let reachable = reachable_from(&roots, &index.adjacency);

        if let Err(stuck) = topological_order(&reachable, edges) {
            errors.push(ValidationError::CycleDetected { nodes: stuck });
        }

        let mut executors = HashMap::new();
        for node in nodes.iter().filter(|n| reachable.contains(&n.id)) {
            match self.registry.resolve_executor(&node.node_type) {
                Some(executor) => {
                    executors.insert(node.id.as_str(), executor);
                }
                None => errors.push(ValidationError::UnknownNodeType {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                }),
            }
        }

        if !errors.is_empty() {
            return Err(FlowError::Configuration(errors));
        }

        let mut incoming: HashMap<&'a str, Vec<usize>> = HashMap::new();
        let mut outgoing: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            if reachable.contains(&edge.source) {
                outgoing.entry(edge.source.as_str()).or_default().push(i);
                incoming.entry(edge.target.as_str()).or_default().push(i);
            }
        }

        Ok(Plan {
            edges,
            nodes: by_id,
            executors,
            starting: start,
            incoming,
            outgoing,
        })
    }

    async fn drive<'a>(
        &self,
        plan: &Plan<'a>,
        mut run: ExecutionRun,
        cancel: CancellationToken,
    ) -> Result<ExecutionRun> {
        let mut progress = Progress::new(plan);
        let limit = self.config.concurrency();
        let node_timeout = self.config.node_timeout();
        let run_timeout = self.config.run_timeout();
        let deadline = run_timeout.map(|t| Instant::now() + t);
        let mut join_set: JoinSet<(NodeId, NodeOutcome)> = JoinSet::new();

        loop {
            while join_set.len() < limit && !cancel.is_cancelled() {
                let Some(node_id) = progress.ready.pop_front() else {
                    break;
                };
                self.spawn_node(&mut join_set, plan, &progress, node_id, &run.execution_id, node_timeout);
            }

            if cancel.is_cancelled() {
                self.wind_down(&mut join_set, plan, &mut run).await?;
                log::info!("Run {} cancelled", run.execution_id);
                run.transition(RunState::Terminated)?;
                break;
            }

            if join_set.is_empty() {
                run.transition(RunState::Finished)?;
                break;
            }

            let joined = tokio::select! {
                _ = cancel.cancelled() => continue,
                _ = deadline_elapsed(deadline) => {
                    self.wind_down(&mut join_set, plan, &mut run).await?;
                    let budget = run_timeout.unwrap_or_default();
                    log::warn!("Run {} exceeded its {:?} budget", run.execution_id, budget);
                    run.fail(
                        RunState::Timeout,
                        None,
                        FlowError::BudgetExceeded(format!("run exceeded {} ms", budget.as_millis())).to_string(),
                    )?;
                    break;
                }
                joined = join_set.join_next() => joined,
            };
            let Some(joined) = joined else {
                continue;
            };

            match joined {
                Ok((node_id, NodeOutcome::Completed(Ok(output)))) => {
                    let Some(key) = self.record_completion(plan, &mut run, &node_id, &output)? else {
                        continue;
                    };

                    for skipped in progress.complete(plan, key, &output) {
                        log::debug!("Node '{}' skipped: no taken input", skipped);
                        self.emit(WorkflowEvent::NodeSkipped {
                            node_id: skipped.to_string(),
                            execution_id: run.execution_id.clone(),
                        });
                    }
                }
                Ok((node_id, NodeOutcome::Completed(Err(e)))) => {
                    self.wind_down(&mut join_set, plan, &mut run).await?;
                    let message = e.to_string();
                    log::warn!("Node '{}' failed: {}", node_id, message);
                    self.emit(WorkflowEvent::NodeFailed {
                        node_id: node_id.clone(),
                        execution_id: run.execution_id.clone(),
                        error: message.clone(),
                    });
                    run.fail(RunState::Error, Some(node_id), message)?;
                    break;
                }
                Ok((node_id, NodeOutcome::TimedOut(budget))) => {
                    self.wind_down(&mut join_set, plan, &mut run).await?;
                    let message = FlowError::BudgetExceeded(format!(
                        "node '{}' exceeded {} ms",
                        node_id,
                        budget.as_millis()
                    ))
                    .to_string();
                    log::warn!("{}", message);
                    self.emit(WorkflowEvent::NodeFailed {
                        node_id: node_id.clone(),
                        execution_id: run.execution_id.clone(),
                        error: message.clone(),
                    });
                    run.fail(RunState::Timeout, Some(node_id), message)?;
                    break;
                }
                Err(e) => {
                    self.wind_down(&mut join_set, plan, &mut run).await?;
                    log::error!("Node task in run {} did not complete: {}", run.execution_id, e);
                    run.fail(RunState::Error, None, format!("Node task did not complete: {}", e))?;
                    break;
                }
            }
        }

        Ok(run)
    }

    fn spawn_node<'a>(
        &self,
        join_set: &mut JoinSet<(NodeId, NodeOutcome)>,
        plan: &Plan<'a>,
        progress: &Progress<'a>,
        node_id: &str,
        execution_id: &str,
        node_timeout: Option<Duration>,
    ) {
        let (Some(&node), Some(executor)) = (plan.nodes.get(node_id), plan.executors.get(node_id)) else {
            log::error!("Ready node '{}' was not prepared", node_id);
            return;
        };

        let node = node.clone();
        let executor = executor.clone();
        let extensions = self.extensions.clone();
        let input = progress.input_for(plan, node_id);

        log::debug!("Starting node '{}' ({}) with {} items", node.id, node.node_type, input.items.len());
        self.emit(WorkflowEvent::NodeStarted {
            node_id: node.id.clone(),
            execution_id: execution_id.to_string(),
        });

        join_set.spawn(async move {
            let outcome = {
                let call = executor.execute(&node, input, &extensions);
                match node_timeout {
                    Some(budget) => match tokio::time::timeout(budget, call).await {
                        Ok(result) => NodeOutcome::Completed(result),
                        Err(_) => NodeOutcome::TimedOut(budget),
                    },
                    None => NodeOutcome::Completed(call.await),
                }
            };
            (node.id, outcome)
        });
    }

    /// Record a successful node and announce it
    ///
    /// Returns the plan's key for the node, or `None` if it is not part of
    /// the plan.
    fn record_completion<'a>(
        &self,
        plan: &Plan<'a>,
        run: &mut ExecutionRun,
        node_id: &str,
        output: &NodeOutput,
    ) -> Result<Option<&'a str>> {
        let Some((&key, &node)) = plan.nodes.get_key_value(node_id) else {
            return Ok(None);
        };
        log::debug!("Node '{}' completed with {} items", key, output.items.len());
        run.record(node, output.items.clone())?;
        self.emit(WorkflowEvent::NodeCompleted {
            node_id: node_id.to_string(),
            execution_id: run.execution_id.clone(),
            item_count: output.items.len(),
        });
        Ok(Some(key))
    }

    /// Abort in-flight nodes and wait for them to stop
    ///
    /// Nodes that had already succeeded before the abort landed are still
    /// recorded in the trace; nothing downstream of them is started.
    async fn wind_down(
        &self,
        join_set: &mut JoinSet<(NodeId, NodeOutcome)>,
        plan: &Plan<'_>,
        run: &mut ExecutionRun,
    ) -> Result<()> {
        join_set.abort_all();
        while let Some(joined) = join_set.join_next().await {
            if let Ok((node_id, NodeOutcome::Completed(Ok(output)))) = joined {
                self.record_completion(plan, run, &node_id, &output)?;
            }
        }
        Ok(())
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Err(e) = self.event_sink.send(event) {
            log::warn!("Failed to send workflow event: {}", e);
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use crate::builder::WorkflowBuilder;
    use crate::descriptor::NodeDescriptor;
    use crate::events::VecEventSink;
    use crate::run::NodeResult;
    use crate::types::{BranchLabel, Handle};

    /// Records invocation order and echoes its input plus its own id
    #[derive(Default)]
    struct Journal {
        calls: Mutex<Vec<String>>,
    }

    impl Journal {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    fn registry(journal: Arc<Journal>) -> NodeRegistry {
        let mut registry = NodeRegistry::new();

        let j = journal.clone();
        registry.register_sync(NodeDescriptor::new("manual-trigger", "Trigger"), move |node, _input| {
            j.calls.lock().push(node.id.clone());
            Ok(NodeOutput::json(serde_json::json!({ "from": node.id })))
        });

        let j = journal.clone();
        registry.register_sync(NodeDescriptor::new("pass", "Pass"), move |node, input| {
            j.calls.lock().push(node.id.clone());
            let mut items = input.items;
            items.push(OutputItem::json(serde_json::json!({ "from": node.id })));
            Ok(NodeOutput::from_items(items))
        });

        let j = journal.clone();
        registry.register_sync(NodeDescriptor::new("fail", "Fail"), move |node, _input| {
            j.calls.lock().push(node.id.clone());
            Err(FlowError::failed("connector returned 500"))
        });

        let j = journal.clone();
        registry.register_sync(
            NodeDescriptor::new("branch", "Branch").with_anchors(1, 2),
            move |node, _input| {
                j.calls.lock().push(node.id.clone());
                let value = node
                    .parameter("inputParameters", "value")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                Ok(NodeOutput::default().with_branch(BranchLabel::from(value)))
            },
        );

        registry.register_callback(NodeDescriptor::new("slow", "Slow"), |_node, _input| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(NodeOutput::default())
        });

        registry
    }

    fn scheduler(journal: Arc<Journal>) -> Scheduler {
        Scheduler::new(Arc::new(registry(journal)), SchedulerConfig::default())
    }

    fn chain(middle_type: &str) -> WorkflowGraph {
        WorkflowBuilder::new("wf", "Chain")
            .add_trigger("T", "manual-trigger")
            .add_action("A", middle_type)
            .add_action("B", "pass")
            .connect("T", "A")
            .connect("A", "B")
            .build()
    }

    fn ids(ids: &[&str]) -> Vec<NodeId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn branch_graph(value: bool) -> WorkflowGraph {
        WorkflowBuilder::new("wf", "Branch")
            .add_trigger("T", "manual-trigger")
            .add_action("IF", "branch")
            .with_anchors(1, 2)
            .with_parameters("inputParameters", serde_json::json!({ "value": value }))
            .add_action("X", "pass")
            .add_action("Y", "pass")
            .add_action("Y2", "pass")
            .connect("T", "IF")
            .connect_branch("IF", BranchLabel::True, "X")
            .connect_branch("IF", BranchLabel::False, "Y")
            .connect("Y", "Y2")
            .build()
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let journal = Arc::new(Journal::default());
        let sink = Arc::new(VecEventSink::new());
        let scheduler = scheduler(journal.clone()).with_event_sink(sink.clone());

        let graph = chain("pass");
        let run = scheduler.execute_graph(&graph, &ids(&["T"])).await.unwrap();

        assert_eq!(run.state, RunState::Finished);
        assert_eq!(run.executed(), vec!["T", "A", "B"]);
        assert_eq!(journal.calls(), vec!["T", "A", "B"]);
        assert_eq!(run.workflow_id, "wf");
        assert!(run.error.is_none());

        // B sees T's item forwarded by A plus A's own
        let b: &NodeResult = run.result_for("B").unwrap();
        assert_eq!(b.data.len(), 3);
        assert_eq!(b.node_label, "B");

        let events = sink.events();
        assert!(matches!(events.first(), Some(WorkflowEvent::RunStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(WorkflowEvent::RunFinished {
                state: RunState::Finished,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_failure_stops_downstream() {
        let journal = Arc::new(Journal::default());
        let sink = Arc::new(VecEventSink::new());
        let scheduler = scheduler(journal.clone()).with_event_sink(sink.clone());

        let graph = chain("fail");
        let run = scheduler.execute_graph(&graph, &ids(&["T"])).await.unwrap();

        assert_eq!(run.state, RunState::Error);
        assert_eq!(run.executed(), vec!["T"]);
        assert_eq!(journal.calls(), vec!["T", "A"]);

        let error = run.error.as_ref().unwrap();
        assert_eq!(error.node_id.as_deref(), Some("A"));
        assert!(error.message.contains("connector returned 500"));

        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, WorkflowEvent::NodeFailed { node_id, .. } if node_id == "A")));
    }

    #[tokio::test]
    async fn test_failure_keeps_finished_siblings() {
        let journal = Arc::new(Journal::default());
        let scheduler = Scheduler::new(
            Arc::new(registry(journal.clone())),
            SchedulerConfig::default().with_max_concurrency(2),
        );

        let graph = WorkflowBuilder::new("wf", "Fail fast")
            .add_trigger("T", "manual-trigger")
            .add_action("B", "pass")
            .add_action("A", "fail")
            .add_action("C", "pass")
            .connect("T", "B")
            .connect("T", "A")
            .connect("B", "C")
            .build();
        let run = scheduler.execute_graph(&graph, &ids(&["T"])).await.unwrap();

        assert_eq!(run.state, RunState::Error);
        assert_eq!(run.error.as_ref().unwrap().node_id.as_deref(), Some("A"));
        assert!(!run.executed().contains(&"A"));

        // Every node that ran to success is in the trace
        let calls = journal.calls();
        let executed = run.executed();
        for id in ["T", "B", "C"] {
            assert_eq!(
                calls.iter().any(|c| c == id),
                executed.contains(&id),
                "trace {:?} disagrees with calls {:?} for {}",
                executed,
                calls,
                id
            );
        }
    }

    #[tokio::test]
    async fn test_wind_down_records_finished_nodes() {
        let sink = Arc::new(VecEventSink::new());
        let scheduler = scheduler(Arc::new(Journal::default())).with_event_sink(sink.clone());
        let graph = chain("pass");
        let plan = scheduler.prepare(&graph.nodes, &graph.edges, &ids(&["T"])).unwrap();
        let mut run = ExecutionRun::new("wf");

        let mut join_set: JoinSet<(NodeId, NodeOutcome)> = JoinSet::new();
        let finished = join_set.spawn(async {
            let output = NodeOutput::json(serde_json::json!({ "done": true }));
            ("A".to_string(), NodeOutcome::Completed(Ok(output)))
        });
        join_set.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ("B".to_string(), NodeOutcome::Completed(Ok(NodeOutput::default())))
        });
        while !finished.is_finished() {
            tokio::task::yield_now().await;
        }

        scheduler.wind_down(&mut join_set, &plan, &mut run).await.unwrap();

        assert!(join_set.is_empty());
        assert_eq!(run.executed(), vec!["A"]);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, WorkflowEvent::NodeCompleted { node_id, .. } if node_id == "A")));
    }

    #[tokio::test]
    async fn test_siblings_run_in_edge_order() {
        let journal = Arc::new(Journal::default());
        let scheduler = scheduler(journal.clone());

        let graph = WorkflowBuilder::new("wf", "Siblings")
            .add_trigger("T", "manual-trigger")
            .add_action("A", "pass")
            .add_action("B", "pass")
            .add_action("C", "pass")
            .connect("T", "A")
            .connect("T", "B")
            .connect("T", "C")
            .build();
        let run = scheduler.execute_graph(&graph, &ids(&["T"])).await.unwrap();

        assert_eq!(journal.calls(), vec!["T", "A", "B", "C"]);
        assert_eq!(run.executed(), vec!["T", "A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_true_branch_runs_only_true_side() {
        let journal = Arc::new(Journal::default());
        let sink = Arc::new(VecEventSink::new());
        let scheduler = scheduler(journal.clone()).with_event_sink(sink.clone());

        let run = scheduler
            .execute_graph(&branch_graph(true), &ids(&["T"]))
            .await
            .unwrap();

        assert_eq!(run.state, RunState::Finished);
        assert_eq!(journal.calls(), vec!["T", "IF", "X"]);

        let skipped: Vec<String> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                WorkflowEvent::NodeSkipped { node_id, .. } => Some(node_id),
                _ => None,
            })
            .collect();
        assert_eq!(skipped, vec!["Y", "Y2"]);
    }

    #[tokio::test]
    async fn test_false_branch_runs_only_false_side() {
        let journal = Arc::new(Journal::default());
        let run = scheduler(journal.clone())
            .execute_graph(&branch_graph(false), &ids(&["T"]))
            .await
            .unwrap();

        assert_eq!(run.state, RunState::Finished);
        assert_eq!(journal.calls(), vec!["T", "IF", "Y", "Y2"]);
    }

    #[tokio::test]
    async fn test_legacy_branch_edges_use_handle_index() {
        let journal = Arc::new(Journal::default());
        let graph = WorkflowBuilder::new("wf", "Legacy")
            .add_trigger("T", "manual-trigger")
            .add_action("IF", "branch")
            .with_parameters("inputParameters", serde_json::json!({ "value": false }))
            .add_action("X", "pass")
            .add_action("Y", "pass")
            .connect("T", "IF")
            .connect_handles("IF", Handle::output("IF", 0), "X", Handle::input("X", 0))
            .connect_handles("IF", Handle::output("IF", 1), "Y", Handle::input("Y", 0))
            .build();

        let run = scheduler(journal.clone()).execute_graph(&graph, &ids(&["T"])).await.unwrap();
        assert_eq!(run.state, RunState::Finished);
        assert_eq!(journal.calls(), vec!["T", "IF", "Y"]);
    }

    #[tokio::test]
    async fn test_branch_rejoin_runs_once() {
        // X and Y both feed Z; Z runs after the taken side only
        let journal = Arc::new(Journal::default());
        let graph = WorkflowBuilder::new("wf", "Rejoin")
            .add_trigger("T", "manual-trigger")
            .add_action("IF", "branch")
            .with_parameters("inputParameters", serde_json::json!({ "value": true }))
            .add_action("X", "pass")
            .add_action("Y", "pass")
            .add_action("Z", "pass")
            .connect("T", "IF")
            .connect_branch("IF", BranchLabel::True, "X")
            .connect_branch("IF", BranchLabel::False, "Y")
            .connect("X", "Z")
            .connect("Y", "Z")
            .build();

        let run = scheduler(journal.clone()).execute_graph(&graph, &ids(&["T"])).await.unwrap();
        assert_eq!(run.state, RunState::Finished);
        assert_eq!(journal.calls(), vec!["T", "IF", "X", "Z"]);
    }

    #[tokio::test]
    async fn test_diamond_joins_once() {
        let journal = Arc::new(Journal::default());
        let graph = WorkflowBuilder::new("wf", "Diamond")
            .add_trigger("A", "manual-trigger")
            .add_action("B", "pass")
            .add_action("C", "pass")
            .add_action("D", "pass")
            .connect("A", "B")
            .connect("A", "C")
            .connect("B", "D")
            .connect("C", "D")
            .build();

        let run = scheduler(journal.clone()).execute_graph(&graph, &ids(&["A"])).await.unwrap();
        assert_eq!(run.state, RunState::Finished);

        let calls = journal.calls();
        assert_eq!(calls.iter().filter(|c| *c == "D").count(), 1);
        assert_eq!(calls.last().map(String::as_str), Some("D"));

        // D receives B's and C's items, each keyed by parent
        let d = run.result_for("D").unwrap();
        assert_eq!(d.data.len(), 5);
    }

    #[tokio::test]
    async fn test_input_slots_and_parents() {
        let captured: Arc<Mutex<Option<NodeInput>>> = Arc::new(Mutex::new(None));
        let mut registry = registry(Arc::new(Journal::default()));
        let sink = captured.clone();
        registry.register_sync(NodeDescriptor::new("capture", "Capture").with_anchors(2, 1), move |_node, input| {
            *sink.lock() = Some(input);
            Ok(NodeOutput::default())
        });

        let graph = WorkflowBuilder::new("wf", "Slots")
            .add_trigger("T", "manual-trigger")
            .add_action("P", "pass")
            .add_action("Q", "pass")
            .add_action("M", "capture")
            .with_anchors(2, 1)
            .connect("T", "P")
            .connect("T", "Q")
            .connect_handles("P", Handle::output("P", 0), "M", Handle::input("M", 0))
            .connect_handles("Q", Handle::output("Q", 0), "M", Handle::input("M", 1))
            .build();

        let scheduler = Scheduler::new(Arc::new(registry), SchedulerConfig::default());
        let run = scheduler.execute_graph(&graph, &ids(&["T"])).await.unwrap();
        assert_eq!(run.state, RunState::Finished);

        let input = captured.lock().clone().unwrap();
        assert_eq!(input.items.len(), 4);
        assert_eq!(input.slot("M-input-0").len(), 2);
        assert_eq!(input.slot("M-input-1").len(), 2);
        assert_eq!(input.slot("M-input-1")[1].json["from"], "Q");
        assert_eq!(input.parents.len(), 2);
        assert_eq!(input.items[1].json["from"], "P");
    }

    #[tokio::test]
    async fn test_unreached_nodes_do_not_run() {
        let journal = Arc::new(Journal::default());
        let graph = WorkflowBuilder::new("wf", "Two triggers")
            .add_trigger("T", "manual-trigger")
            .add_action("A", "pass")
            .add_trigger("U", "manual-trigger")
            .add_action("B", "unregistered")
            .connect("T", "A")
            .connect("U", "B")
            .build();

        // B's unknown type does not matter when only T starts
        let run = scheduler(journal.clone()).execute_graph(&graph, &ids(&["T"])).await.unwrap();
        assert_eq!(run.state, RunState::Finished);
        assert_eq!(journal.calls(), vec!["T", "A"]);
    }

    #[tokio::test]
    async fn test_multiple_triggers() {
        let journal = Arc::new(Journal::default());
        let graph = WorkflowBuilder::new("wf", "Two triggers")
            .add_trigger("T", "manual-trigger")
            .add_trigger("U", "manual-trigger")
            .add_action("A", "pass")
            .connect("T", "A")
            .connect("U", "A")
            .build();

        let run = scheduler(journal.clone()).run_workflow(&graph).await.unwrap();
        assert_eq!(run.state, RunState::Finished);
        assert_eq!(journal.calls(), vec!["T", "U", "A"]);

        let strict = Scheduler::new(
            Arc::new(registry(journal)),
            SchedulerConfig::default().with_single_starting_node(),
        );
        let err = strict.run_workflow(&graph).await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Configuration(ref errors)
                if matches!(errors[..], [ValidationError::MultipleStartingNodes { .. }])
        ));
    }

    #[tokio::test]
    async fn test_cycle_is_configuration_error() {
        let journal = Arc::new(Journal::default());
        let graph = WorkflowBuilder::new("wf", "Cycle")
            .add_trigger("T", "manual-trigger")
            .add_action("A", "pass")
            .add_action("B", "pass")
            .connect("T", "A")
            .connect("A", "B")
            .connect("B", "A")
            .build();

        let err = scheduler(journal.clone())
            .execute_graph(&graph, &ids(&["T"]))
            .await
            .unwrap_err();
        match err {
            FlowError::Configuration(errors) => assert_eq!(
                errors,
                vec![ValidationError::CycleDetected { nodes: ids(&["A", "B"]) }]
            ),
            other => panic!("Expected configuration error, got {:?}", other),
        }
        assert!(journal.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bad_starting_nodes_are_configuration_errors() {
        let journal = Arc::new(Journal::default());
        let scheduler = scheduler(journal.clone());
        let graph = chain("pass");

        let err = scheduler.execute_graph(&graph, &ids(&["A", "ghost"])).await.unwrap_err();
        match err {
            FlowError::Configuration(errors) => {
                assert!(errors.contains(&ValidationError::NotStartable { node_id: "A".to_string() }));
                assert!(errors.contains(&ValidationError::UnknownStartingNode {
                    node_id: "ghost".to_string()
                }));
            }
            other => panic!("Expected configuration error, got {:?}", other),
        }

        assert!(scheduler.execute_graph(&graph, &[]).await.unwrap_err().is_configuration());
        assert!(journal.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dangling_edge_and_unknown_type_rejected() {
        let journal = Arc::new(Journal::default());
        let scheduler = scheduler(journal.clone());

        let dangling = WorkflowBuilder::new("wf", "Dangling")
            .add_trigger("T", "manual-trigger")
            .connect("T", "ghost")
            .build();
        assert!(scheduler.execute_graph(&dangling, &ids(&["T"])).await.unwrap_err().is_configuration());

        let unknown = chain("no-such-type");
        let err = scheduler.execute_graph(&unknown, &ids(&["T"])).await.unwrap_err();
        assert!(err.to_string().contains("no-such-type"));
        assert!(journal.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_start_terminates() {
        let journal = Arc::new(Journal::default());
        let graph = chain("pass");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = scheduler(journal.clone())
            .execute_with_cancel(&graph.id, &graph.nodes, &graph.edges, &ids(&["T"]), cancel)
            .await
            .unwrap();
        assert_eq!(run.state, RunState::Terminated);
        assert!(run.results.is_empty());
        assert!(journal.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_node() {
        let journal = Arc::new(Journal::default());
        let graph = chain("slow");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let run = scheduler(journal.clone())
            .execute_with_cancel(&graph.id, &graph.nodes, &graph.edges, &ids(&["T"]), cancel)
            .await
            .unwrap();
        assert_eq!(run.state, RunState::Terminated);
        assert_eq!(run.executed(), vec!["T"]);
        assert!(!journal.calls().contains(&"B".to_string()));
    }

    #[tokio::test]
    async fn test_node_timeout() {
        let journal = Arc::new(Journal::default());
        let scheduler = Scheduler::new(
            Arc::new(registry(journal.clone())),
            SchedulerConfig::default().with_node_timeout(Duration::from_millis(20)),
        );

        let run = scheduler.execute_graph(&chain("slow"), &ids(&["T"])).await.unwrap();
        assert_eq!(run.state, RunState::Timeout);
        assert_eq!(run.executed(), vec!["T"]);
        assert_eq!(run.error.as_ref().and_then(|e| e.node_id.as_deref()), Some("A"));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let journal = Arc::new(Journal::default());
        let scheduler = Scheduler::new(
            Arc::new(registry(journal.clone())),
            SchedulerConfig::default().with_run_timeout(Duration::from_millis(20)),
        );

        let run = scheduler.execute_graph(&chain("slow"), &ids(&["T"])).await.unwrap();
        assert_eq!(run.state, RunState::Timeout);
        assert_eq!(run.executed(), vec!["T"]);
        assert!(run.error.as_ref().unwrap().node_id.is_none());
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_respected() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut registry = registry(Arc::new(Journal::default()));
        let (a, p) = (active.clone(), peak.clone());
        registry.register_callback(NodeDescriptor::new("busy", "Busy"), move |_node, _input| {
            let (active, peak) = (a.clone(), p.clone());
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(NodeOutput::default())
            }
        });

        let mut builder = WorkflowBuilder::new("wf", "Fan out").add_trigger("T", "manual-trigger");
        for i in 0..6 {
            let id = format!("N{}", i);
            builder = builder.add_action(id.as_str(), "busy").connect("T", &id);
        }
        let graph = builder.build();

        let scheduler = Scheduler::new(
            Arc::new(registry),
            SchedulerConfig::default().with_max_concurrency(2),
        );
        let run = scheduler.execute_graph(&graph, &ids(&["T"])).await.unwrap();

        assert_eq!(run.state, RunState::Finished);
        assert_eq!(run.results.len(), 7);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_extensions_reach_executors() {
        struct NeedsCredential;

        #[async_trait::async_trait]
        impl NodeExecutor for NeedsCredential {
            fn describe(&self) -> NodeDescriptor {
                NodeDescriptor::new("needs-credential", "Needs credential")
            }

            async fn execute(
                &self,
                _node: &GraphNode,
                _input: NodeInput,
                extensions: &ExecutorExtensions,
            ) -> Result<NodeOutput> {
                let key = extensions
                    .credential("api")
                    .ok_or_else(|| FlowError::MissingInput("api credential".to_string()))?;
                Ok(NodeOutput::json(serde_json::json!({ "key": key })))
            }
        }

        let mut registry = registry(Arc::new(Journal::default()));
        registry.register(Arc::new(NeedsCredential));

        let mut extensions = ExecutorExtensions::new();
        let vault: HashMap<String, String> = HashMap::from([("api".to_string(), "k-1".to_string())]);
        extensions.set_credentials(Arc::new(vault));

        let graph = chain("needs-credential");
        let scheduler = Scheduler::new(Arc::new(registry), SchedulerConfig::default())
            .with_extensions(Arc::new(extensions));
        let run = scheduler.execute_graph(&graph, &ids(&["T"])).await.unwrap();

        assert_eq!(run.state, RunState::Finished);
        assert_eq!(run.result_for("A").unwrap().data[0].json["key"], "k-1");
    }

    #[tokio::test]
    async fn test_webhook_dispatch_publishes_on_channel() {
        let journal = Arc::new(Journal::default());
        let mut registry = registry(journal.clone());
        registry.register_sync(
            NodeDescriptor::new("webhook", "Webhook").with_kind(NodeKind::Webhook),
            |_node, _input| Ok(NodeOutput::json(serde_json::json!({ "body": "ping" }))),
        );
        let scheduler = Scheduler::new(Arc::new(registry), SchedulerConfig::default());

        let graph = Arc::new(
            WorkflowBuilder::new("wf", "Hook")
                .add_webhook("W", "webhook")
                .add_action("A", "pass")
                .connect("W", "A")
                .build(),
        );

        let mut rx = scheduler.webhooks().subscribe("client-1");
        let dispatch = scheduler
            .dispatch(graph.clone(), ids(&["W"]), Some("client-1".to_string()))
            .await
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Pending { ref client_id } if client_id == "client-1"));

        match rx.recv().await.unwrap() {
            WebhookMessage::Completed(run) => {
                assert_eq!(run.state, RunState::Finished);
                assert_eq!(run.executed(), vec!["W", "A"]);
            }
            other => panic!("Expected completed run, got {:?}", other),
        }
        assert!(matches!(rx.recv().await, Err(tokio::sync::broadcast::error::RecvError::Closed)));
        assert!(!scheduler.webhooks().close("client-1"));

        // Webhook runs need a correlation id
        assert!(scheduler.dispatch(graph, ids(&["W"]), None).await.is_err());
    }

    #[tokio::test]
    async fn test_trigger_dispatch_returns_directly() {
        let journal = Arc::new(Journal::default());
        let scheduler = scheduler(journal);
        let dispatch = scheduler
            .dispatch(Arc::new(chain("pass")), ids(&["T"]), None)
            .await
            .unwrap();

        match dispatch {
            Dispatch::Completed(run) => assert_eq!(run.state, RunState::Finished),
            other => panic!("Expected direct completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_without_graph_wrapper() {
        let journal = Arc::new(Journal::default());
        let graph = chain("pass");
        let run = scheduler(journal)
            .execute(&graph.nodes, &graph.edges, &ids(&["T"]))
            .await
            .unwrap();
        assert_eq!(run.state, RunState::Finished);
        assert_eq!(run.workflow_id, "");
    }
}
