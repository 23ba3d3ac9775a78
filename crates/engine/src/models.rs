//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory. They round-trip through the JSONB columns the `db` crate's
//! repositories read and write.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use nodes::NodeKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// How a workflow is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Triggered by an incoming HTTP request to `/webhook/{path}`.
    Webhook { path: String },
    /// Triggered manually via the REST API.
    Manual,
    /// Triggered by a domain event dispatched against `module`/`event_type`,
    /// optionally narrowed to a specific `entity_type` and further narrowed
    /// by a condition group.
    Event {
        module: String,
        event_type: String,
        #[serde(default)]
        entity_type: Option<String>,
        #[serde(default)]
        conditions: nodes::resolver::condition::ConditionGroup,
    },
    /// Triggered on a schedule. The schedule itself (cron/frequency/timezone)
    /// lives in `WorkflowSchedule`, looked up by `workflow_id`.
    Scheduled,
}

// ---------------------------------------------------------------------------
// WorkflowTrigger
// ---------------------------------------------------------------------------

/// A single trigger owned by a workflow, pointing at the node where
/// execution should begin when it fires. A workflow can carry several of
/// these — e.g. one EVENT trigger for "ticket created" and another for
/// "ticket reopened" both feeding into the same graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub id: Uuid,
    pub node_id: String,
    #[serde(flatten)]
    pub trigger: Trigger,
    pub is_active: bool,
    pub trigger_count: i64,
    pub last_triggered: Option<DateTime<Utc>>,
}

impl WorkflowTrigger {
    pub fn new(node_id: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id: node_id.into(),
            trigger,
            is_active: true,
            trigger_count: 0,
            last_triggered: None,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowNode
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique identifier within this workflow (referenced by connections).
    pub id: String,
    /// The node's kind and its kind-specific configuration.
    pub kind: NodeKind,
    /// When `true`, a failure at this node is swallowed (recorded as
    /// `Skipped`) instead of propagating and aborting the branch.
    #[serde(default)]
    pub is_optional: bool,
    /// Overrides `ExecutorConfig::max_retries` for this node alone.
    #[serde(default)]
    pub retry_limit: Option<u32>,
    /// Overrides `ExecutorConfig::node_timeout` for this node alone.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Directed edge from one node to another.
///
/// `branch` distinguishes between a CONDITION node's `true`/`false` arms and
/// a LOOP node's `body`/`exit` arms; it is `None` for an unconditional
/// connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub source_node_id: String,
    pub target_node_id: String,
    pub branch: Option<String>,
    /// Explicit ordering among a node's outgoing connections. Absent
    /// connections are ordered by `(source_node_id, target_node_id)`.
    pub execution_order: Option<i64>,
}

/// Order a node's outgoing connections: explicit `execution_order` first
/// (ascending), then connections without one, tie-broken by
/// `(source_node_id, target_node_id)` ascending (Open Question (b)).
pub fn connection_order(a: &Connection, b: &Connection) -> Ordering {
    match (a.execution_order, b.execution_order) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => (a.source_node_id.as_str(), a.target_node_id.as_str())
            .cmp(&(b.source_node_id.as_str(), b.target_node_id.as_str())),
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub triggers: Vec<WorkflowTrigger>,
    pub nodes: Vec<WorkflowNode>,
    pub connections: Vec<Connection>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Convenience constructor for testing and for single-trigger callers
    /// (the REST API still accepts one `trigger` per workflow on creation).
    /// The trigger is anchored to the first `Trigger` node if one exists,
    /// otherwise to a sentinel `"trigger"` node id.
    pub fn new(
        name: impl Into<String>,
        organization_id: Uuid,
        trigger: Trigger,
        nodes: Vec<WorkflowNode>,
        connections: Vec<Connection>,
    ) -> Self {
        let node_id = nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Trigger))
            .map(|n| n.id.clone())
            .unwrap_or_else(|| "trigger".to_string());

        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            triggers: vec![WorkflowTrigger::new(node_id, trigger)],
            nodes,
            connections,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn find_node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn outgoing(&self, node_id: &str) -> Vec<&Connection> {
        let mut out: Vec<&Connection> = self
            .connections
            .iter()
            .filter(|c| c.source_node_id == node_id)
            .collect();
        out.sort_by(|a, b| connection_order(a, b));
        out
    }

    /// Active triggers of kind `Event`, the set the dispatcher matches
    /// incoming domain events against.
    pub fn event_triggers(&self) -> impl Iterator<Item = &WorkflowTrigger> {
        self.triggers
            .iter()
            .filter(|t| t.is_active && matches!(t.trigger, Trigger::Event { .. }))
    }

    /// Best-effort module for a workflow run that isn't carrying its own
    /// `TriggerInput.module` (e.g. a manual or scheduled execution): the
    /// first active event trigger's module, or empty string.
    pub fn primary_module(&self) -> String {
        self.event_triggers()
            .find_map(|t| match &t.trigger {
                Trigger::Event { module, .. } => Some(module.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Execution records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    PendingApproval,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeExecutionStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// A single node's run within an execution. Carries `result_key` so
/// `resumeAfterApproval` can rebuild the `shared` map from persisted rows
/// (Open Question (c)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub status: NodeExecutionStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub result_key: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: Option<String>,
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSchedule {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub cron: Option<String>,
    pub frequency: Option<nodes::config::ScheduleFrequency>,
    pub timezone: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
    pub is_active: bool,
    /// Consecutive failures since the last success; drives backoff.
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Approvals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub approver_ids: Vec<Uuid>,
    pub status: ApprovalStatus,
    pub decided_by: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
