//! The `ExecutableNode` trait — the contract every registry-dispatched node
//! kind must fulfil.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::{Clock, EmailSink, RecordStore, SmsSink};
use crate::resolver::ResolverContext;
use crate::NodeError;

/// Shared context passed to every node during execution.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency. Owns a
/// snapshot of everything the variable resolver needs plus the side-effect
/// adapters a leaf node may call through.
#[derive(Clone)]
pub struct ExecutionContext {
    pub workflow_id: uuid::Uuid,
    pub execution_id: uuid::Uuid,
    pub organization_id: uuid::Uuid,
    /// Decrypted secrets scoped to this workflow.
    pub secrets: HashMap<String, String>,

    pub module: String,
    pub payload: Value,
    pub user: Option<Value>,
    pub organization: Option<Value>,
    pub trigger: Option<Value>,
    /// Per-execution `shared` map, keyed by user-declared `resultKey`, as of
    /// the moment this node started (a snapshot — nodes never mutate it
    /// directly; the executor writes the outcome back after `execute`
    /// returns).
    pub shared: HashMap<String, Value>,
    /// Per-execution `nodeOutputs` map, keyed by graph `nodeId`.
    pub node_outputs: HashMap<String, Value>,
    /// Current LOOP iteration context (`$loop.item` / `$loop.index` / `$loop.total`), if any.
    pub loop_ctx: Option<Value>,
    pub now: chrono::DateTime<chrono::Utc>,

    pub email_sink: Arc<dyn EmailSink>,
    pub sms_sink: Option<Arc<dyn SmsSink>>,
    pub record_store: Arc<dyn RecordStore>,
    pub clock: Arc<dyn Clock>,
}

impl ExecutionContext {
    /// Build the borrowed view the variable resolver and condition engine
    /// operate over.
    pub fn resolver_ctx(&self) -> ResolverContext<'_> {
        ResolverContext {
            module: &self.module,
            payload: &self.payload,
            user: self.user.as_ref(),
            organization: self.organization.as_ref(),
            trigger: self.trigger.as_ref(),
            shared: &self.shared,
            node_outputs: &self.node_outputs,
            loop_ctx: self.loop_ctx.as_ref(),
            now: self.now,
        }
    }
}

/// What a node produced. `Skipped` is distinct from an error: the node ran to
/// completion without doing its side effect (e.g. SMS with no provider
/// configured) and the graph should proceed exactly as if it had succeeded.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    Completed(Value),
    Skipped(Value),
}

impl NodeOutcome {
    pub fn into_value(self) -> Value {
        match self {
            NodeOutcome::Completed(v) => v,
            NodeOutcome::Skipped(v) => v,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, NodeOutcome::Skipped(_))
    }
}

/// The core node trait.
///
/// Implemented by every registry-dispatched ("leaf") node kind: EMAIL, SMS,
/// DELAY, DATA_TRANSFORM, QUERY, FILTER, CREATE_RECORD, UPDATE_RECORD.
/// Control-flow kinds (CONDITION, LOOP, PARALLEL, APPROVAL, SCHEDULE,
/// TRIGGER) are interpreted inline by the executor instead.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Execute the node, receive the *previous* node's JSON output as `input`,
    /// and return this node's JSON output.
    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, NodeError>;
}
