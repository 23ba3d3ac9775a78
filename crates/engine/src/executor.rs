//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Validates the graph's structure.
//! 2. Walks it depth-first from the TRIGGER node, dispatching registry
//!    kinds through `ExecutableNode` and interpreting control-flow kinds
//!    (CONDITION/LOOP/PARALLEL/APPROVAL/SCHEDULE) inline.
//! 3. Passes the previous node's JSON output as input to the next node.
//! 4. Persists per-node results via the injected `ExecutionSink`.
//! 5. Handles `NodeError::Retryable` (up to `max_retries`) and
//!    `NodeError::Fatal` (abort immediately).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{instrument, warn};
use uuid::Uuid;

use nodes::adapters::{Clock, EmailSink, RecordStore, SmsSink};
use nodes::config::{FailureHandling, LoopConfig, NodeKind, ParallelConfig};
use nodes::resolver::condition::{evaluate_group, ConditionGroup};
use nodes::resolver::path::resolve_prefixed;
use nodes::{ExecutableNode, ExecutionContext, NodeError};

use crate::dag::validate_graph;
use crate::logger::Logger;
use crate::models::{
    Approval, ApprovalStatus, Connection, ExecutionStatus, LogLevel, NodeExecution, NodeExecutionStatus,
    Workflow, WorkflowExecution, WorkflowNode,
};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of times a retryable node failure will be retried.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
    /// Per-node timeout; a node that runs longer is treated as a fatal
    /// failure.
    pub node_timeout: Duration,
    /// Maximum number of times any single node may be visited within one
    /// execution — bounds LOOP-induced cycles.
    pub visit_cap: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            node_timeout: Duration::from_secs(30),
            visit_cap: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// Node registry — overrides on top of the built-in implementations
// ---------------------------------------------------------------------------

/// Maps a node kind's tag (`"EMAIL"`, `"SMS"`, ...) to an override
/// implementation. Built-in kinds fall back to `nodes::impls::build_executable`
/// when no override is registered; tests register `MockNode` here keyed by
/// tag.
pub type NodeRegistry = HashMap<String, Arc<dyn ExecutableNode>>;

fn dispatch_leaf(kind: &NodeKind, registry: &NodeRegistry) -> Result<Arc<dyn ExecutableNode>, EngineError> {
    if let Some(overridden) = registry.get(kind.tag()) {
        return Ok(overridden.clone());
    }
    nodes::impls::build_executable(kind)
        .ok_or_else(|| EngineError::DefinitionError(format!("node kind '{}' has no executable implementation", kind.tag())))
}

// ---------------------------------------------------------------------------
// Execution sink — persistence port
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn create_execution(&self, workflow_id: Uuid, input: Value) -> Result<WorkflowExecution, db::DbError>;
    async fn update_execution_status(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        output: Option<Value>,
    ) -> Result<(), db::DbError>;
    async fn insert_node_execution(&self, row: NodeExecution) -> Result<(), db::DbError>;
    async fn node_executions_for(&self, execution_id: Uuid) -> Result<Vec<NodeExecution>, db::DbError>;
    async fn create_approval(&self, approval: Approval) -> Result<(), db::DbError>;
}

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Everything the triggering event carried, independent of the graph state
/// the executor accumulates as it walks.
#[derive(Debug, Clone, Default)]
pub struct TriggerInput {
    pub payload: Value,
    pub user: Option<Value>,
    pub organization: Option<Value>,
    pub trigger: Option<Value>,
}

#[derive(Debug)]
pub enum ExecutionOutcome {
    Completed { execution_id: Uuid, output: Value },
    Paused { execution_id: Uuid, node_id: String, approval_id: Uuid },
}

enum StepOutcome {
    Done(Value),
    Paused { node_id: String, approval_id: Uuid },
}

enum RouteDecision {
    Default,
    Branch(String),
}

/// Per-execution accumulator. Owned exclusively by the task running
/// `WorkflowExecutor::run`; nothing here is shared across executions.
#[derive(Default)]
struct RunState {
    shared: HashMap<String, Value>,
    node_outputs: HashMap<String, Value>,
    visit_counts: HashMap<String, u32>,
    loop_ctx_stack: Vec<Value>,
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

pub struct WorkflowExecutor {
    registry: NodeRegistry,
    execution_sink: Arc<dyn ExecutionSink>,
    config: ExecutorConfig,
    email_sink: Arc<dyn EmailSink>,
    sms_sink: Option<Arc<dyn SmsSink>>,
    record_store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    logger: Arc<Logger>,
}

impl WorkflowExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: NodeRegistry,
        execution_sink: Arc<dyn ExecutionSink>,
        config: ExecutorConfig,
        email_sink: Arc<dyn EmailSink>,
        sms_sink: Option<Arc<dyn SmsSink>>,
        record_store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            registry,
            execution_sink,
            config,
            email_sink,
            sms_sink,
            record_store,
            clock,
            logger,
        }
    }

    /// Run the workflow from its TRIGGER node to completion or the first
    /// APPROVAL pause point.
    #[instrument(skip(self, input), fields(workflow_id = %workflow.id))]
    pub async fn run(&self, workflow: &Workflow, input: TriggerInput) -> Result<ExecutionOutcome, EngineError> {
        validate_graph(workflow)?;

        let entry = workflow
            .nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Trigger))
            .or_else(|| workflow.nodes.first())
            .ok_or_else(|| EngineError::CorruptGraph("workflow has no nodes".into()))?;

        let exec_row = self
            .execution_sink
            .create_execution(workflow.id, input.payload.clone())
            .await?;
        let execution_id = exec_row.id;

        let module = workflow.primary_module();

        self.logger.info(execution_id, None, format!("execution started at node '{}'", entry.id)).await;

        let mut state = RunState::default();
        let outcome = self
            .walk(workflow, &entry.id, input.payload.clone(), &input, &module, execution_id, &mut state)
            .await;

        match outcome {
            Ok(StepOutcome::Done(output)) => {
                self.execution_sink
                    .update_execution_status(execution_id, ExecutionStatus::Succeeded, Some(output.clone()))
                    .await?;
                self.logger.info(execution_id, None, "execution succeeded").await;
                Ok(ExecutionOutcome::Completed { execution_id, output })
            }
            Ok(StepOutcome::Paused { node_id, approval_id }) => {
                self.execution_sink
                    .update_execution_status(execution_id, ExecutionStatus::PendingApproval, None)
                    .await?;
                self.logger
                    .info(execution_id, Some(node_id.clone()), "execution paused for approval")
                    .await;
                Ok(ExecutionOutcome::Paused { execution_id, node_id, approval_id })
            }
            Err(e) => {
                let _ = self
                    .execution_sink
                    .update_execution_status(execution_id, ExecutionStatus::Failed, None)
                    .await;
                self.logger.error(execution_id, None, format!("execution failed: {e}")).await;
                Err(e)
            }
        }
    }

    /// Resume an execution parked at an APPROVAL node, rebuilding
    /// `nodeOutputs`/`shared` from persisted rows rather than requiring a
    /// durable in-memory `RunState` (Open Question (c) — a PENDING approval
    /// may span a process restart).
    pub async fn resume_after_approval(
        &self,
        workflow: &Workflow,
        execution_id: Uuid,
        node_id: &str,
        approved: bool,
    ) -> Result<ExecutionOutcome, EngineError> {
        let rows = self.execution_sink.node_executions_for(execution_id).await?;

        let mut state = RunState::default();
        for row in &rows {
            if let Some(output) = &row.output {
                state.node_outputs.insert(row.node_id.clone(), output.clone());
                if let Some(key) = &row.result_key {
                    state.shared.insert(key.clone(), output.clone());
                }
            }
        }

        if !approved {
            self.execution_sink
                .update_execution_status(execution_id, ExecutionStatus::Cancelled, None)
                .await?;
            return Ok(ExecutionOutcome::Completed {
                execution_id,
                output: json!({ "approved": false }),
            });
        }

        let module = workflow.primary_module();
        let trigger_input = TriggerInput::default();
        let approval_output = state.node_outputs.get(node_id).cloned().unwrap_or(Value::Null);

        let mut outcome = StepOutcome::Done(approval_output.clone());
        for connection in workflow.outgoing(node_id) {
            outcome = self
                .walk(
                    workflow,
                    &connection.target_node_id,
                    approval_output.clone(),
                    &trigger_input,
                    &module,
                    execution_id,
                    &mut state,
                )
                .await?;
            if matches!(outcome, StepOutcome::Paused { .. }) {
                break;
            }
        }

        match outcome {
            StepOutcome::Done(output) => {
                self.execution_sink
                    .update_execution_status(execution_id, ExecutionStatus::Succeeded, Some(output.clone()))
                    .await?;
                Ok(ExecutionOutcome::Completed { execution_id, output })
            }
            StepOutcome::Paused { node_id, approval_id } => {
                self.execution_sink
                    .update_execution_status(execution_id, ExecutionStatus::PendingApproval, None)
                    .await?;
                Ok(ExecutionOutcome::Paused { execution_id, node_id, approval_id })
            }
        }
    }

    // -------------------------------------------------------------------
    // Graph walk
    // -------------------------------------------------------------------

    fn walk<'a>(
        &'a self,
        workflow: &'a Workflow,
        node_id: &'a str,
        input: Value,
        trigger_input: &'a TriggerInput,
        module: &'a str,
        execution_id: Uuid,
        state: &'a mut RunState,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutcome, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            let visits = state.visit_counts.entry(node_id.to_string()).or_insert(0);
            *visits += 1;
            if *visits > self.config.visit_cap {
                return Err(EngineError::VisitCapExceeded {
                    node_id: node_id.to_string(),
                    max_visits: self.config.visit_cap,
                });
            }

            let node = workflow
                .find_node(node_id)
                .ok_or_else(|| EngineError::CorruptGraph(format!("node '{node_id}' missing from graph")))?;

            let started_at = Utc::now();
            let ctx = self.build_context(workflow, module, execution_id, trigger_input, state);

            self.logger
                .info(execution_id, Some(node_id.to_string()), format!("entering node ({})", node.kind.tag()))
                .await;

            let (output, route, node_status) = match &node.kind {
                NodeKind::Trigger => (input.clone(), RouteDecision::Default, NodeExecutionStatus::Succeeded),

                NodeKind::Condition(cfg) => {
                    let group = ConditionGroup {
                        conditions: cfg.conditions.clone(),
                        logical_operator: cfg.logical_operator,
                    };
                    let matched = evaluate_group(&group, &ctx.resolver_ctx());
                    let branch = if matched { "true" } else { "false" };
                    let resolved_branch = if workflow.outgoing(node_id).iter().any(|c| c.branch.as_deref() == Some(branch)) {
                        branch.to_string()
                    } else {
                        "fallback".to_string()
                    };
                    (input.clone(), RouteDecision::Branch(resolved_branch), NodeExecutionStatus::Succeeded)
                }

                NodeKind::Loop(cfg) => {
                    match self
                        .run_loop(workflow, node_id, cfg, &input, trigger_input, module, execution_id, state)
                        .await?
                    {
                        (StepOutcome::Done(v), branch) => (v, RouteDecision::Branch(branch), NodeExecutionStatus::Succeeded),
                        (paused @ StepOutcome::Paused { .. }, _) => return Ok(paused),
                    }
                }

                NodeKind::Parallel(cfg) => {
                    if cfg.parallel_node_ids.is_empty() {
                        (
                            json!({ "skipped": true, "reason": "parallelNodeIds is empty" }),
                            RouteDecision::Default,
                            NodeExecutionStatus::Skipped,
                        )
                    } else {
                        match self
                            .run_parallel(workflow, cfg, &input, trigger_input, module, execution_id, state)
                            .await?
                        {
                            StepOutcome::Done(v) => (v, RouteDecision::Default, NodeExecutionStatus::Succeeded),
                            paused @ StepOutcome::Paused { .. } => return Ok(paused),
                        }
                    }
                }

                NodeKind::Approval(cfg) => {
                    let approval_id = self.pause_for_approval(execution_id, node_id, cfg).await?;
                    return Ok(StepOutcome::Paused {
                        node_id: node_id.to_string(),
                        approval_id,
                    });
                }

                NodeKind::Schedule(_) => (input.clone(), RouteDecision::Default, NodeExecutionStatus::Succeeded),

                leaf_kind => {
                    let executable = dispatch_leaf(leaf_kind, &self.registry)?;
                    let timeout = node_timeout(node, &self.config);
                    let first_attempt = tokio::time::timeout(timeout, executable.execute(input.clone(), &ctx))
                        .await
                        .map_err(|_| EngineError::NodeTimeout {
                            node_id: node_id.to_string(),
                            timeout_ms: timeout.as_millis() as u64,
                        });

                    let max_retries = node.retry_limit.unwrap_or(self.config.max_retries);
                    let result = match first_attempt {
                        Ok(first) => {
                            self.execute_leaf_with_retry(node_id, executable.as_ref(), input.clone(), &ctx, first, max_retries)
                                .await
                        }
                        Err(e) => Err(e),
                    };

                    match result {
                        Ok(outcome) => (outcome.into_value(), RouteDecision::Default, NodeExecutionStatus::Succeeded),
                        Err(e) if node.is_optional => {
                            self.logger
                                .warn(execution_id, Some(node_id.to_string()), format!("optional node failed, skipping: {e}"))
                                .await;
                            (
                                json!({ "skipped": true, "reason": e.to_string() }),
                                RouteDecision::Default,
                                NodeExecutionStatus::Skipped,
                            )
                        }
                        Err(e) => {
                            self.logger.error(execution_id, Some(node_id.to_string()), format!("node failed: {e}")).await;
                            return Err(e);
                        }
                    }
                }
            };

            state.node_outputs.insert(node_id.to_string(), output.clone());
            if let Some(key) = node.kind.result_key() {
                state.shared.insert(key.to_string(), output.clone());
            }

            self.execution_sink
                .insert_node_execution(NodeExecution {
                    id: Uuid::new_v4(),
                    execution_id,
                    node_id: node_id.to_string(),
                    status: node_status,
                    input: input.clone(),
                    output: Some(output.clone()),
                    result_key: node.kind.result_key().map(str::to_string),
                    started_at,
                    finished_at: Some(Utc::now()),
                })
                .await?;

            let mut next: Vec<Connection> = match &route {
                RouteDecision::Default => workflow
                    .outgoing(node_id)
                    .into_iter()
                    .filter(|c| c.branch.is_none())
                    .cloned()
                    .collect(),
                RouteDecision::Branch(b) => workflow
                    .outgoing(node_id)
                    .into_iter()
                    .filter(|c| c.branch.as_deref() == Some(b.as_str()))
                    .cloned()
                    .collect(),
            };

            // A CONDITION's chosen true/false branch (or a LOOP's "empty"
            // branch) may have no outgoing connection; fall through to a
            // "fallback"/"default" handle if the workflow author wired one.
            if next.is_empty() {
                if let RouteDecision::Branch(b) = &route {
                    if b != "fallback" && b != "default" {
                        next = workflow
                            .outgoing(node_id)
                            .into_iter()
                            .filter(|c| matches!(c.branch.as_deref(), Some("fallback") | Some("default")))
                            .cloned()
                            .collect();
                    }
                }
            }

            if next.is_empty() {
                return Ok(StepOutcome::Done(output));
            }

            let mut last = StepOutcome::Done(output);
            for connection in &next {
                let carried_input = match &last {
                    StepOutcome::Done(v) => v.clone(),
                    StepOutcome::Paused { .. } => break,
                };
                last = self
                    .walk(workflow, &connection.target_node_id, carried_input, trigger_input, module, execution_id, state)
                    .await?;
            }
            Ok(last)
        })
    }

    /// Retries a leaf node's *first* attempt result (already computed under
    /// a timeout by the caller) and any subsequent retryable failures.
    #[allow(clippy::too_many_arguments)]
    async fn execute_leaf_with_retry(
        &self,
        node_id: &str,
        node: &dyn ExecutableNode,
        input: Value,
        ctx: &ExecutionContext,
        first_attempt: Result<nodes::NodeOutcome, NodeError>,
        max_retries: u32,
    ) -> Result<nodes::NodeOutcome, EngineError> {
        let mut attempt_result = first_attempt;
        let mut attempts = 0u32;

        loop {
            match attempt_result {
                Ok(outcome) => return Ok(outcome),
                Err(NodeError::Fatal(msg)) => {
                    return Err(EngineError::NodeFatal {
                        node_id: node_id.to_owned(),
                        message: msg,
                    });
                }
                Err(NodeError::Retryable(msg)) => {
                    attempts += 1;
                    if attempts > max_retries {
                        return Err(EngineError::NodeRetryExhausted {
                            node_id: node_id.to_owned(),
                            message: msg,
                        });
                    }
                    let delay = self.config.retry_base_delay * 2u32.pow(attempts.saturating_sub(1));
                    warn!(
                        "node '{}' retryable error (attempt {}/{}), retrying in {:?}: {}",
                        node_id, attempts, max_retries, delay, msg
                    );
                    tokio::time::sleep(delay).await;
                    attempt_result = node.execute(input.clone(), ctx).await;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        &self,
        workflow: &Workflow,
        node_id: &str,
        cfg: &LoopConfig,
        input: &Value,
        trigger_input: &TriggerInput,
        module: &str,
        execution_id: Uuid,
        state: &mut RunState,
    ) -> Result<(StepOutcome, String), EngineError> {
        let ctx = self.build_context(workflow, module, execution_id, trigger_input, state);
        let source_path = cfg.data_source.as_deref().or(cfg.source_key.as_deref());
        let source_value = match source_path {
            Some(path) => resolve_prefixed(&ctx.resolver_ctx(), path).unwrap_or(Value::Null),
            None => input.clone(),
        };
        let items = as_array(&source_value);
        if items.is_empty() {
            return Ok((StepOutcome::Done(json!([])), "empty".to_string()));
        }
        let max_iterations = cfg.max_iterations.unwrap_or(items.len());

        let mut results = Vec::new();
        for (index, item) in items.iter().enumerate().take(max_iterations) {
            let mut loop_ctx_map = serde_json::Map::new();
            loop_ctx_map.insert(cfg.item_variable.clone(), item.clone());
            loop_ctx_map.insert(cfg.index_variable.clone(), json!(index));
            loop_ctx_map.insert("total".to_string(), json!(items.len()));
            let loop_ctx_value = Value::Object(loop_ctx_map);
            state.loop_ctx_stack.push(loop_ctx_value.clone());

            let mut iteration_outcome = StepOutcome::Done(item.clone());
            for connection in workflow.outgoing(node_id) {
                if connection.branch.as_deref() != Some("body") {
                    continue;
                }
                iteration_outcome = self
                    .walk(workflow, &connection.target_node_id, item.clone(), trigger_input, module, execution_id, state)
                    .await?;
                break;
            }

            let should_break = match &cfg.break_condition {
                Some(group) => {
                    let break_ctx = self.build_context(workflow, module, execution_id, trigger_input, state);
                    evaluate_group(group, &break_ctx.resolver_ctx())
                }
                None => false,
            };

            state.loop_ctx_stack.pop();

            match iteration_outcome {
                StepOutcome::Done(v) => results.push(v),
                paused @ StepOutcome::Paused { .. } => return Ok((paused, "exit".to_string())),
            }

            if should_break {
                break;
            }
        }

        Ok((StepOutcome::Done(json!(results)), "exit".to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_parallel(
        &self,
        workflow: &Workflow,
        cfg: &ParallelConfig,
        input: &Value,
        trigger_input: &TriggerInput,
        module: &str,
        execution_id: Uuid,
        state: &mut RunState,
    ) -> Result<StepOutcome, EngineError> {
        // Branches execute sequentially against the single owned `RunState`.
        let mut outputs = Vec::new();
        let mut failures = Vec::new();

        for target_id in &cfg.parallel_node_ids {
            match self
                .walk(workflow, target_id, input.clone(), trigger_input, module, execution_id, state)
                .await
            {
                Ok(StepOutcome::Done(v)) => outputs.push(v),
                Ok(paused @ StepOutcome::Paused { .. }) => return Ok(paused),
                Err(e) => match cfg.failure_handling {
                    FailureHandling::FailOnAny => return Err(e),
                    FailureHandling::FailOnAll | FailureHandling::ContinueOnFailure => failures.push(e.to_string()),
                },
            }
        }

        if cfg.failure_handling == FailureHandling::FailOnAll
            && !cfg.parallel_node_ids.is_empty()
            && failures.len() == cfg.parallel_node_ids.len()
        {
            return Err(EngineError::NodeFatal {
                node_id: "parallel".into(),
                message: format!("all {} parallel branches failed", failures.len()),
            });
        }

        Ok(StepOutcome::Done(json!({ "branches": outputs, "failures": failures })))
    }

    async fn pause_for_approval(
        &self,
        execution_id: Uuid,
        node_id: &str,
        cfg: &nodes::config::ApprovalConfig,
    ) -> Result<Uuid, EngineError> {
        let now = self.clock.now();
        let approval = Approval {
            id: Uuid::new_v4(),
            execution_id,
            node_id: node_id.to_string(),
            approver_ids: cfg.approver_ids.clone(),
            status: ApprovalStatus::Pending,
            decided_by: None,
            expires_at: cfg.expires_in_seconds.map(|secs| now + chrono::Duration::seconds(secs)),
            created_at: now,
        };
        let id = approval.id;
        self.execution_sink.create_approval(approval).await?;
        Ok(id)
    }

    fn build_context(
        &self,
        workflow: &Workflow,
        module: &str,
        execution_id: Uuid,
        trigger_input: &TriggerInput,
        state: &RunState,
    ) -> ExecutionContext {
        ExecutionContext {
            workflow_id: workflow.id,
            execution_id,
            organization_id: workflow.organization_id,
            secrets: HashMap::new(),
            module: module.to_string(),
            payload: trigger_input.payload.clone(),
            user: trigger_input.user.clone(),
            organization: trigger_input.organization.clone(),
            trigger: trigger_input.trigger.clone(),
            shared: state.shared.clone(),
            node_outputs: state.node_outputs.clone(),
            loop_ctx: state.loop_ctx_stack.last().cloned(),
            now: self.clock.now(),
            email_sink: self.email_sink.clone(),
            sms_sink: self.sms_sink.clone(),
            record_store: self.record_store.clone(),
            clock: self.clock.clone(),
        }
    }
}

fn node_timeout(node: &WorkflowNode, config: &ExecutorConfig) -> Duration {
    node.timeout_seconds.map(Duration::from_secs).unwrap_or(config.node_timeout)
}

fn as_array(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}
